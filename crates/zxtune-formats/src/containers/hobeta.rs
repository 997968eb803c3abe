//! Hobeta: a single TR-DOS file behind a 17-byte header.
//!
//! `name[8] type:u8 start:u16le length:u16le full_length:u16le crc:u16le`.
//! `full_length` is the sector-aligned size and the header checksum is
//! `sum(257 * byte[i] + i)` over the first 15 bytes.

use super::trdos::{file_name, SECTOR_SIZE};
use super::{Archive, Entry};
use crate::binary::Container;
use crate::error::{FormatError, Result};
use crate::reader::peek_u16le;

/// Format identifier.
pub const ID: &str = "HOBETA";

const HEADER_SIZE: usize = 17;
const CHECKED_SIZE: usize = 15;

fn header_crc(header: &[u8]) -> u16 {
    header[..CHECKED_SIZE]
        .iter()
        .enumerate()
        .fold(0u32, |crc, (idx, &b)| crc + 257 * u32::from(b) + idx as u32) as u16
}

/// Payload size when the header is consistent.
fn payload_size(data: &[u8]) -> Option<usize> {
    let header = data.get(..HEADER_SIZE)?;
    let length = usize::from(peek_u16le(header, 11)?);
    let full = usize::from(peek_u16le(header, 13)?);
    let crc = peek_u16le(header, 15)?;
    let sane = length != 0
        && full % SECTOR_SIZE == 0
        && length <= full
        && HEADER_SIZE + length <= data.len()
        && crc == header_crc(header);
    sane.then_some(length)
}

/// Hobeta file wrapper.
#[derive(Debug, Default, Clone, Copy)]
pub struct Hobeta;

impl Archive for Hobeta {
    fn check(&self, data: &[u8]) -> bool {
        payload_size(data).is_some()
    }

    fn entries(&self, data: &Container) -> Result<Vec<Entry>> {
        let raw = data.data();
        let size = payload_size(raw).ok_or(FormatError::NotRecognized)?;
        let body = data
            .subcontainer(HEADER_SIZE, size)
            .ok_or(FormatError::OutOfRange { offset: HEADER_SIZE, size })?;
        Ok(vec![Entry {
            name: file_name(&raw[0..8], &raw[8..9]),
            data: body,
        }])
    }
}

/// `body` wrapped as `name.type` with a valid header.
#[cfg(test)]
pub(crate) fn wrap(name: &[u8; 8], kind: u8, body: &[u8]) -> Vec<u8> {
    let mut data = name.to_vec();
    data.push(kind);
    data.extend_from_slice(&0x8000u16.to_le_bytes());
    data.extend_from_slice(&(body.len() as u16).to_le_bytes());
    let full = body.len().div_ceil(SECTOR_SIZE) * SECTOR_SIZE;
    data.extend_from_slice(&(full as u16).to_le_bytes());
    let crc = header_crc(&data);
    data.extend_from_slice(&crc.to_le_bytes());
    data.extend_from_slice(body);
    data.resize(HEADER_SIZE + full, 0);
    data
}
