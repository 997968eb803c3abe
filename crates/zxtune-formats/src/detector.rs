//! Byte signatures used to recognise player code compiled in front of a module.
//!
//! Signature text syntax:
//! - `a9` exact byte, `x` in either nibble matches any nibble (`3x`)
//! - `?` any byte
//! - `+12+` skip 12 bytes (decimal)
//! - `%01xx1100` bit mask, `x` any bit
//! - `'A` literal character

use nom::branch::alt;
use nom::character::complete::{anychar, char, digit1, multispace1, one_of};
use nom::combinator::{all_consuming, map, map_res};
use nom::multi::{count, many0};
use nom::sequence::{delimited, pair, preceded};
use nom::IResult;

use crate::error::{FormatError, Result};

/// Single byte matcher: `data & mask == value`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ByteMatch {
    mask: u8,
    value: u8,
}

impl ByteMatch {
    const ANY: ByteMatch = ByteMatch { mask: 0, value: 0 };

    fn matches(self, byte: u8) -> bool {
        byte & self.mask == self.value
    }
}

/// Compiled signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    pattern: Vec<ByteMatch>,
}

fn nibble(c: char) -> (u8, u8) {
    match c.to_digit(16) {
        Some(v) => (0x0F, v as u8),
        None => (0, 0),
    }
}

fn hex_byte(input: &str) -> IResult<&str, Vec<ByteMatch>> {
    let hex = "0123456789abcdefABCDEFx";
    map(pair(one_of(hex), one_of(hex)), |(hi, lo)| {
        let (hm, hv) = nibble(hi);
        let (lm, lv) = nibble(lo);
        vec![ByteMatch {
            mask: hm << 4 | lm,
            value: hv << 4 | lv,
        }]
    })(input)
}

fn any_byte(input: &str) -> IResult<&str, Vec<ByteMatch>> {
    map(char('?'), |_| vec![ByteMatch::ANY])(input)
}

fn skip_bytes(input: &str) -> IResult<&str, Vec<ByteMatch>> {
    map(
        delimited(char('+'), map_res(digit1, str::parse::<usize>), char('+')),
        |n| vec![ByteMatch::ANY; n],
    )(input)
}

fn bit_mask(input: &str) -> IResult<&str, Vec<ByteMatch>> {
    map(preceded(char('%'), count(one_of("01x"), 8)), |bits| {
        let mut mask = 0u8;
        let mut value = 0u8;
        for bit in bits {
            mask <<= 1;
            value <<= 1;
            if bit != 'x' {
                mask |= 1;
                value |= u8::from(bit == '1');
            }
        }
        vec![ByteMatch { mask, value }]
    })(input)
}

fn symbol(input: &str) -> IResult<&str, Vec<ByteMatch>> {
    map(preceded(char('\''), anychar), |c| {
        vec![ByteMatch {
            mask: 0xFF,
            value: c as u8,
        }]
    })(input)
}

fn separator(input: &str) -> IResult<&str, Vec<ByteMatch>> {
    map(multispace1, |_| Vec::new())(input)
}

fn pattern(input: &str) -> IResult<&str, Vec<ByteMatch>> {
    map(
        all_consuming(many0(alt((hex_byte, any_byte, skip_bytes, bit_mask, symbol, separator)))),
        |parts| parts.into_iter().flatten().collect(),
    )(input)
}

impl Signature {
    /// Compile signature text.
    pub fn parse(text: &str) -> Result<Self> {
        let (_, pattern) = pattern(text).map_err(|e| FormatError::InvalidData {
            msg: format!("invalid signature '{text}': {e}"),
        })?;
        Ok(Self { pattern })
    }

    /// Number of bytes covered.
    pub fn len(&self) -> usize {
        self.pattern.len()
    }

    /// True for an empty signature.
    pub fn is_empty(&self) -> bool {
        self.pattern.is_empty()
    }

    /// True when `data` starts with the signature.
    pub fn matches(&self, data: &[u8]) -> bool {
        data.len() >= self.pattern.len()
            && self.pattern.iter().zip(data).all(|(m, &b)| m.matches(b))
    }
}

/// Player code compiled in front of module data.
#[derive(Debug, Clone, Copy)]
pub struct PlayerPrefix {
    /// Signature of the player entry point.
    pub signature: &'static str,
    /// Size of the player code; module data follows it.
    pub player_size: usize,
}

/// Offsets to try when looking for module data: 0 first, then the end of every
/// matching player prefix.
pub fn module_offsets(data: &[u8], prefixes: &[PlayerPrefix]) -> Vec<usize> {
    let mut offsets = vec![0];
    for prefix in prefixes {
        let matched = Signature::parse(prefix.signature)
            .map(|sig| sig.matches(data))
            .unwrap_or(false);
        if matched && prefix.player_size < data.len() {
            offsets.push(prefix.player_size);
        }
    }
    offsets
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_and_wildcards() {
        let sig = Signature::parse("21??18?c3").unwrap();
        assert_eq!(sig.len(), 6);
        assert!(sig.matches(&[0x21, 0x00, 0x80, 0x18, 0x77, 0xC3, 0xAA]));
        assert!(!sig.matches(&[0x21, 0x00, 0x80, 0x18, 0x77, 0xC4]));
        assert!(!sig.matches(&[0x21, 0x00]));
    }

    #[test]
    fn test_skip_nibble_mask_and_symbol() {
        let sig = Signature::parse("c3+2+3x %1xxxxxx1 'P").unwrap();
        assert_eq!(sig.len(), 6);
        assert!(sig.matches(&[0xC3, 1, 2, 0x3F, 0x81, b'P']));
        assert!(!sig.matches(&[0xC3, 1, 2, 0x4F, 0x81, b'P']));
        assert!(!sig.matches(&[0xC3, 1, 2, 0x3F, 0x80, b'P']));
    }

    #[test]
    fn test_invalid_text() {
        assert!(Signature::parse("2").is_err());
        assert!(Signature::parse("+a+").is_err());
        assert!(Signature::parse("zz").is_err());
    }

    #[test]
    fn test_module_offsets() {
        const PREFIXES: &[PlayerPrefix] = &[PlayerPrefix {
            signature: "f3c9",
            player_size: 2,
        }];
        assert_eq!(module_offsets(&[0xF3, 0xC9, 0x00], PREFIXES), vec![0, 2]);
        assert_eq!(module_offsets(&[0xF3, 0x00, 0x00], PREFIXES), vec![0]);
    }
}
