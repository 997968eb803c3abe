//! SCL archives: TR-DOS files without the disk geometry.
//!
//! `"SINCLAIR" count:u8`, then `count` 14-byte records (`name[8] type[3]
//! length:u16le sectors:u8`), the sector-aligned file bodies in catalogue
//! order and a 32-bit sum of every preceding byte.

use log::{debug, warn};

use super::trdos::{file_name, CatalogueBuilder, FileRecord, SECTOR_SIZE};
use super::{Archive, Entry};
use crate::binary::Container;
use crate::error::{FormatError, Result};
use crate::reader::ByteReader;

/// Format identifier.
pub const ID: &str = "SCL";

const SIGNATURE: &[u8] = b"SINCLAIR";
const HEADER_SIZE: usize = 9;
const RECORD_SIZE: usize = 14;
const CHECKSUM_SIZE: usize = 4;

/// Records, bodies start and total body size.
fn layout(data: &[u8]) -> Option<(&[u8], usize, usize)> {
    if !data.starts_with(SIGNATURE) {
        return None;
    }
    let count = usize::from(*data.get(SIGNATURE.len())?);
    let body = HEADER_SIZE + count * RECORD_SIZE;
    let records = data.get(HEADER_SIZE..body)?;
    let total: usize = records
        .chunks_exact(RECORD_SIZE)
        .map(|r| usize::from(r[13]) * SECTOR_SIZE)
        .sum();
    (count != 0 && body + total <= data.len()).then_some((records, body, total))
}

fn checksum(data: &[u8]) -> u32 {
    data.iter().fold(0u32, |sum, &b| sum.wrapping_add(u32::from(b)))
}

/// SCL archive container.
#[derive(Debug, Default, Clone, Copy)]
pub struct Scl;

impl Archive for Scl {
    fn check(&self, data: &[u8]) -> bool {
        layout(data).is_some()
    }

    fn entries(&self, data: &Container) -> Result<Vec<Entry>> {
        let raw = data.data();
        let (records, body, total) = layout(raw).ok_or(FormatError::NotRecognized)?;
        let end = body + total;
        match ByteReader::at(raw, end).read_u32le() {
            Ok(stored) if stored != checksum(&raw[..end]) => warn!("SCL: checksum mismatch"),
            Ok(_) => {}
            Err(_) => debug!("SCL: no checksum"),
        }
        let mut builder = CatalogueBuilder::default();
        let mut offset = body;
        for record in records.chunks_exact(RECORD_SIZE) {
            let size = usize::from(record[13]) * SECTOR_SIZE;
            if size != 0 {
                builder.add(FileRecord {
                    name: file_name(&record[0..8], &record[8..11]),
                    offset,
                    size,
                });
            }
            offset += size;
        }
        let entries = builder.build(data);
        debug!("SCL: {} files", entries.len());
        Ok(entries)
    }
}

/// Whole archive with `files` packed and the checksum appended.
#[cfg(test)]
pub(crate) fn archive(files: &[(&str, &[u8])]) -> Vec<u8> {
    let mut data = SIGNATURE.to_vec();
    data.push(files.len() as u8);
    let mut bodies = Vec::new();
    for (name, body) in files {
        let (base, ext) = name.split_once('.').unwrap_or((*name, " "));
        let mut record = [b' '; RECORD_SIZE];
        record[..base.len()].copy_from_slice(base.as_bytes());
        record[8] = ext.as_bytes()[0];
        record[11..13].copy_from_slice(&(body.len() as u16).to_le_bytes());
        record[13] = body.len().div_ceil(SECTOR_SIZE) as u8;
        data.extend_from_slice(&record);
        bodies.extend_from_slice(body);
        bodies.resize(bodies.len().div_ceil(SECTOR_SIZE) * SECTOR_SIZE, 0);
    }
    data.extend_from_slice(&bodies);
    let sum = checksum(&data);
    data.extend_from_slice(&sum.to_le_bytes());
    data
}
