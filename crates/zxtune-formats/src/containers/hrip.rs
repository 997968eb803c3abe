//! HRiP archives.
//!
//! An 8-byte header `"HRi" files:u8 used_in_last:u8 sectors:u16le
//! catalogue:u8` is followed by the files, each a chain of `"Hrst2"` blocks:
//!
//! ```text
//! id[5] flag:u8 data_size:u16le packed_size:u16le additional:u8
//! packed_crc:u16le data_crc:u16le name[8] type[3] ...  (additional bytes)
//! packed data (packed_size bytes)
//! ```
//!
//! Stored blocks are copied; Hrust 2.x packed blocks go through a
//! [`Decompressor`].

use log::{debug, warn};

use super::trdos::{file_name, SECTOR_SIZE};
use super::{Archive, Entry};
use crate::binary::Container;
use crate::error::{FormatError, Result};
use crate::reader::{peek_u16le, ByteReader};

/// Format identifier.
pub const ID: &str = "HRIP";

const SIGNATURE: &[u8] = b"HRi";
const BLOCK_SIGNATURE: &[u8] = b"Hrst2";
const HEADER_SIZE: usize = 8;
/// CRCs, name and type.
const MIN_FILE_ADDITIONAL: usize = 15;

const NO_COMPRESSION: u8 = 1;
const LAST_BLOCK: u8 = 2;
const DELETED: u8 = 32;

/// Unpacker for compressed blocks.
pub trait Decompressor: Send + Sync {
    /// Unpack `packed` into exactly `size` bytes.
    fn decompress(&self, packed: &[u8], size: usize) -> Result<Vec<u8>>;
}

/// Rejects every compressed block.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoDecompressor;

impl Decompressor for NoDecompressor {
    fn decompress(&self, _packed: &[u8], _size: usize) -> Result<Vec<u8>> {
        Err(FormatError::Unsupported {
            what: "Hrust 2.x compressed block".to_string(),
        })
    }
}

/// CRC-16/XMODEM as used for packed block data.
fn crc16(data: &[u8]) -> u16 {
    data.iter().fold(0u16, |crc, &b| {
        (0..8).fold(crc ^ (u16::from(b) << 8), |crc, _| {
            if crc & 0x8000 != 0 {
                (crc << 1) ^ 0x1021
            } else {
                crc << 1
            }
        })
    })
}

/// Files count and archive size.
fn header(data: &[u8]) -> Option<(usize, usize)> {
    if !data.starts_with(SIGNATURE) || data.len() < HEADER_SIZE {
        return None;
    }
    let files = usize::from(data[3]);
    let sectors = usize::from(peek_u16le(data, 5)?);
    let catalogue = data[7];
    if files == 0 || sectors == 0 || catalogue > 1 {
        return None;
    }
    let size = SECTOR_SIZE * (sectors - 1) + usize::from(data[4]);
    Some((files, size))
}

#[derive(Debug)]
struct Block<'a> {
    flag: u8,
    data_size: usize,
    packed_crc: Option<u16>,
    info: &'a [u8],
    packed: &'a [u8],
}

impl<'a> Block<'a> {
    /// Block at `offset`; `Ok(None)` once the packed data runs out.
    fn parse(data: &'a [u8], offset: usize) -> Result<Option<(Block<'a>, usize)>> {
        let mut reader = ByteReader::at(data, offset);
        let id = reader.bytes(BLOCK_SIGNATURE.len())?;
        if id != BLOCK_SIGNATURE {
            return Err(FormatError::InvalidData {
                msg: format!("no block signature at 0x{offset:x}"),
            });
        }
        let flag = reader.read_u8()?;
        let data_size = usize::from(reader.read_u16le()?);
        let packed_size = usize::from(reader.read_u16le()?);
        let additional = usize::from(reader.read_u8()?);
        let info = reader.bytes(additional)?;
        if reader.remaining() < packed_size {
            return Ok(None);
        }
        let packed = reader.bytes(packed_size)?;
        let packed_crc = (additional > 2).then(|| u16::from_le_bytes([info[0], info[1]]));
        let block = Block {
            flag,
            data_size,
            packed_crc,
            info,
            packed,
        };
        Ok(Some((block, reader.position())))
    }

    fn decode(&self, decompressor: &dyn Decompressor, out: &mut Vec<u8>) -> Result<()> {
        if let Some(crc) = self.packed_crc {
            if crc != crc16(self.packed) {
                return Err("packed data CRC mismatch".into());
            }
        }
        if self.flag & NO_COMPRESSION != 0 {
            let start = out.len();
            out.extend_from_slice(self.packed);
            out.resize(start + self.data_size, 0);
        } else {
            let unpacked = decompressor.decompress(self.packed, self.data_size)?;
            if unpacked.len() != self.data_size {
                return Err(format!("unpacked {} bytes instead of {}", unpacked.len(), self.data_size).into());
            }
            out.extend_from_slice(&unpacked);
        }
        Ok(())
    }
}

/// HRiP archive container.
pub struct Hrip {
    decompressor: Box<dyn Decompressor>,
}

impl Hrip {
    /// Archive reader with a custom unpacker for compressed blocks.
    pub fn with_decompressor(decompressor: impl Decompressor + 'static) -> Self {
        Self {
            decompressor: Box::new(decompressor),
        }
    }

    fn decode_file(&self, blocks: &[Block<'_>]) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        for block in blocks {
            block.decode(self.decompressor.as_ref(), &mut out)?;
        }
        Ok(out)
    }
}

impl Default for Hrip {
    fn default() -> Self {
        Self::with_decompressor(NoDecompressor)
    }
}

impl std::fmt::Debug for Hrip {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hrip").finish_non_exhaustive()
    }
}

impl Archive for Hrip {
    fn check(&self, data: &[u8]) -> bool {
        header(data).is_some() && data[HEADER_SIZE..].starts_with(BLOCK_SIGNATURE)
    }

    fn entries(&self, data: &Container) -> Result<Vec<Entry>> {
        let (files, size) = header(data.data()).ok_or(FormatError::NotRecognized)?;
        let raw = &data.data()[..size.min(data.size())];
        let mut entries = Vec::new();
        let mut offset = HEADER_SIZE;
        'files: for idx in 0..files {
            let mut blocks = Vec::new();
            loop {
                let parsed = match Block::parse(raw, offset) {
                    Ok(parsed) => parsed,
                    Err(e) => {
                        warn!("HRIP: file {idx}: {e}");
                        break 'files;
                    }
                };
                let Some((block, next)) = parsed else {
                    debug!("HRIP: file {idx} is truncated");
                    break;
                };
                offset = next;
                let last = block.flag & LAST_BLOCK != 0;
                blocks.push(block);
                if last {
                    break;
                }
            }
            let Some(first) = blocks.first() else {
                break;
            };
            if first.info.len() < MIN_FILE_ADDITIONAL {
                warn!("HRIP: file {idx} has no name");
                continue;
            }
            let name = file_name(&first.info[4..12], &first.info[12..15]);
            if first.flag & DELETED != 0 {
                debug!("HRIP: '{name}' is deleted");
                continue;
            }
            match self.decode_file(&blocks) {
                Ok(content) => entries.push(Entry {
                    name,
                    data: Container::new(content),
                }),
                Err(e) => warn!("HRIP: skipping '{name}': {e}"),
            }
        }
        debug!("HRIP: {} of {files} files decoded", entries.len());
        Ok(entries)
    }
}
