//! Bounds-checked little-endian field access over byte slices.
//!
//! Every header is decoded field by field through these helpers; nothing is
//! reinterpreted in place.

use crate::error::{FormatError, Result};

/// Cursor over a byte slice.
#[derive(Debug, Clone)]
pub struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    /// Cursor at the start of `data`.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Cursor at `pos`.
    pub fn at(data: &'a [u8], pos: usize) -> Self {
        Self { data, pos }
    }

    /// Current offset.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Bytes left after the cursor.
    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    /// Move to an absolute offset.
    pub fn seek(&mut self, pos: usize) -> Result<()> {
        if pos > self.data.len() {
            return Err(FormatError::UnexpectedEof { offset: pos });
        }
        self.pos = pos;
        Ok(())
    }

    /// Skip `count` bytes.
    pub fn skip(&mut self, count: usize) -> Result<()> {
        self.bytes(count).map(|_| ())
    }

    /// Next `count` bytes.
    pub fn bytes(&mut self, count: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(count)
            .filter(|&end| end <= self.data.len())
            .ok_or(FormatError::UnexpectedEof { offset: self.pos })?;
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    /// Next byte.
    pub fn read_u8(&mut self) -> Result<u8> {
        let byte = *self
            .data
            .get(self.pos)
            .ok_or(FormatError::UnexpectedEof { offset: self.pos })?;
        self.pos += 1;
        Ok(byte)
    }

    /// Next signed byte.
    pub fn read_i8(&mut self) -> Result<i8> {
        self.read_u8().map(|b| b as i8)
    }

    /// Next little-endian word.
    pub fn read_u16le(&mut self) -> Result<u16> {
        let b = self.bytes(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    /// Next little-endian signed word.
    pub fn read_i16le(&mut self) -> Result<i16> {
        self.read_u16le().map(|w| w as i16)
    }

    /// Next big-endian word.
    pub fn read_u16be(&mut self) -> Result<u16> {
        let b = self.bytes(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    /// Next little-endian dword.
    pub fn read_u32le(&mut self) -> Result<u32> {
        let b = self.bytes(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }
}

/// Byte at `offset`.
pub fn u8_at(data: &[u8], offset: usize) -> Result<u8> {
    data.get(offset)
        .copied()
        .ok_or(FormatError::UnexpectedEof { offset })
}

/// Little-endian word at `offset`.
pub fn u16le_at(data: &[u8], offset: usize) -> Result<u16> {
    ByteReader::at(data, offset).read_u16le()
}

/// Little-endian word at `offset`, `None` when truncated. For checkers.
pub fn peek_u16le(data: &[u8], offset: usize) -> Option<u16> {
    let bytes = data.get(offset..offset.checked_add(2)?)?;
    Some(u16::from_le_bytes([bytes[0], bytes[1]]))
}

/// Fail unless `offset..offset+size` lies within `limit`.
pub fn ensure_range(offset: usize, size: usize, limit: usize) -> Result<()> {
    match offset.checked_add(size) {
        Some(end) if end <= limit => Ok(()),
        _ => Err(FormatError::OutOfRange { offset, size }),
    }
}

/// Fixed-width text field with trailing spaces and NULs removed.
pub fn trimmed_text(raw: &[u8]) -> String {
    let end = raw
        .iter()
        .rposition(|&b| b != b' ' && b != 0)
        .map_or(0, |p| p + 1);
    let start = raw[..end].iter().position(|&b| b != b' ').unwrap_or(end);
    raw[start..end]
        .iter()
        .map(|&b| if b.is_ascii_graphic() || b == b' ' { b as char } else { '?' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reads_little_endian_fields() {
        let data = [0x34, 0x12, 0xFF, 0x01, 0x02];
        let mut reader = ByteReader::new(&data);
        assert_eq!(reader.read_u16le().unwrap(), 0x1234);
        assert_eq!(reader.read_i8().unwrap(), -1);
        assert_eq!(reader.read_u16be().unwrap(), 0x0102);
        assert_eq!(reader.remaining(), 0);
        assert!(matches!(
            reader.read_u8(),
            Err(FormatError::UnexpectedEof { offset: 5 })
        ));
    }

    #[test]
    fn test_checked_helpers() {
        let data = [1u8, 2, 3];
        assert_eq!(u16le_at(&data, 1).unwrap(), 0x0302);
        assert!(u16le_at(&data, 2).is_err());
        assert_eq!(peek_u16le(&data, usize::MAX), None);
        assert!(ensure_range(1, 2, 3).is_ok());
        assert!(ensure_range(2, 2, 3).is_err());
        assert!(ensure_range(usize::MAX, 2, 3).is_err());
    }

    #[test]
    fn test_trimmed_text() {
        assert_eq!(trimmed_text(b"  Tune name   \0\0"), "Tune name");
        assert_eq!(trimmed_text(b"    "), "");
        assert_eq!(trimmed_text(b"a\x01b"), "a?b");
    }
}
