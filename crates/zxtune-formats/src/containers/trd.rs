//! TR-DOS disk images.
//!
//! Track 0 holds up to 128 16-byte catalogue records in sectors 0..8 and the
//! service sector 8. A record is `name[8] type[3] length:u16le sectors:u8
//! sector:u8 track:u8`; files are addressed by logical track and sector.

use log::debug;

use super::trdos::{file_name, CatalogueBuilder, FileRecord, SECTOR_SIZE};
use super::{Archive, Entry};
use crate::binary::Container;
use crate::error::{FormatError, Result};

/// Format identifier.
pub const ID: &str = "TRD";

const SECTORS_PER_TRACK: usize = 16;
const RECORD_SIZE: usize = 16;
const MAX_RECORDS: usize = 128;
const SERVICE_SECTOR: usize = 8 * SECTOR_SIZE;
const TRDOS_ID_OFFSET: usize = SERVICE_SECTOR + 0xE7;
const TRDOS_ID: u8 = 0x10;
const MIN_SIZE: usize = SERVICE_SECTOR + SECTOR_SIZE;
/// 160 logical tracks of 16 sectors.
const MAX_SIZE: usize = 160 * SECTORS_PER_TRACK * SECTOR_SIZE;

const END_OF_CATALOGUE: u8 = 0;
const DELETED: u8 = 1;

/// Catalogue record.
#[derive(Debug, Clone, Copy)]
struct Record<'a> {
    name: &'a [u8],
    kind: &'a [u8],
    sectors: usize,
    sector: usize,
    track: usize,
}

impl<'a> Record<'a> {
    fn parse(raw: &'a [u8]) -> Self {
        Self {
            name: &raw[0..8],
            kind: &raw[8..11],
            sectors: usize::from(raw[13]),
            sector: usize::from(raw[14]),
            track: usize::from(raw[15]),
        }
    }

    fn offset(&self) -> usize {
        (self.track * SECTORS_PER_TRACK + self.sector) * SECTOR_SIZE
    }

    fn size(&self) -> usize {
        self.sectors * SECTOR_SIZE
    }

    /// Sane placement: out of the system track, sector within track.
    fn is_valid(&self) -> bool {
        self.sector < SECTORS_PER_TRACK && self.offset() >= SECTORS_PER_TRACK * SECTOR_SIZE
    }
}

fn records(data: &[u8]) -> impl Iterator<Item = Record<'_>> {
    data[..MAX_RECORDS * RECORD_SIZE]
        .chunks_exact(RECORD_SIZE)
        .map(Record::parse)
        .take_while(|r| r.name[0] != END_OF_CATALOGUE)
}

/// TR-DOS image container.
#[derive(Debug, Default, Clone, Copy)]
pub struct Trd;

impl Archive for Trd {
    fn check(&self, data: &[u8]) -> bool {
        if !(MIN_SIZE..=MAX_SIZE).contains(&data.len()) || data.len() % SECTOR_SIZE != 0 {
            return false;
        }
        if data[TRDOS_ID_OFFSET] != TRDOS_ID {
            return false;
        }
        let mut live = records(data).filter(|r| r.name[0] != DELETED).peekable();
        live.peek().is_some() && live.all(|r| r.sectors == 0 || r.is_valid())
    }

    fn entries(&self, data: &Container) -> Result<Vec<Entry>> {
        if !self.check(data.data()) {
            return Err(FormatError::NotRecognized);
        }
        let mut builder = CatalogueBuilder::default();
        for record in records(data.data()) {
            if record.name[0] == DELETED || record.sectors == 0 {
                continue;
            }
            builder.add(FileRecord {
                name: file_name(record.name, record.kind),
                offset: record.offset(),
                size: record.size(),
            });
        }
        let entries = builder.build(data);
        debug!("TRD: {} files", entries.len());
        Ok(entries)
    }
}
