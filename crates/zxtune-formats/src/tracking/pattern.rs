//! Run-length pattern stream decoding.
//!
//! Tracker patterns keep one byte stream per channel. After a channel emits a
//! row it stays silent for `period` rows, so each stream carries its own skip
//! counter and rows are assembled by advancing all counters together.

use super::model::{Line, Pattern};
use crate::error::{FormatError, Result};
use crate::warnings::Scope;

/// Longest pattern accepted; longer streams are truncated with a warning.
pub const MAX_PATTERN_LINES: usize = 256;

/// Decoding state of one channel stream.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChannelCursor {
    /// Offset of the next byte
    pub offset: usize,
    /// Rows to skip after each emitted row
    pub period: usize,
    /// Rows left to skip
    pub counter: usize,
}

/// Assemble a pattern from per-channel streams starting at `starts`.
///
/// `parse_row` reads one row of channel `idx` into the line, moving the cursor
/// and updating its period. At least one line is decoded; the pattern ends
/// once channel 0 is due to read and its next byte equals `terminator`.
pub fn decode_pattern<C, F>(
    data: &[u8],
    starts: &[usize],
    terminator: u8,
    warnings: &mut Scope<'_>,
    mut parse_row: F,
) -> Result<Pattern<C>>
where
    F: FnMut(usize, &mut ChannelCursor, &mut Line<C>) -> Result<()>,
{
    let mut cursors: Vec<ChannelCursor> = starts
        .iter()
        .map(|&offset| ChannelCursor {
            offset,
            ..ChannelCursor::default()
        })
        .collect();
    let channels = cursors.len();
    let mut lines = Pattern::new();
    loop {
        if lines.len() >= MAX_PATTERN_LINES {
            warnings.add(format!("truncated at {MAX_PATTERN_LINES} lines"));
            break;
        }
        let mut line = Line::new(channels);
        for (idx, cursor) in cursors.iter_mut().enumerate() {
            if cursor.counter > 0 {
                cursor.counter -= 1;
                continue;
            }
            parse_row(idx, cursor, &mut line)?;
            cursor.counter = cursor.period;
        }
        lines.push(line);
        let skip = cursors.iter().map(|c| c.counter).min().unwrap_or(0);
        for cursor in &mut cursors {
            cursor.counter -= skip;
        }
        let target = (lines.len() + skip).min(MAX_PATTERN_LINES);
        lines.resize_with(target, || Line::new(channels));
        match cursors.first() {
            Some(first) if first.counter == 0 => {
                let byte = *data
                    .get(first.offset)
                    .ok_or(FormatError::UnexpectedEof { offset: first.offset })?;
                if byte == terminator {
                    break;
                }
            }
            Some(_) => {}
            None => break,
        }
    }
    Ok(lines)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::warnings::Warnings;

    // Row format: 0x01..=0x7F note, 0x80+n period n, 0x00 end of stream
    fn parse(data: &[u8], idx: usize, cursor: &mut ChannelCursor, line: &mut Line<()>) -> Result<()> {
        loop {
            let byte = *data
                .get(cursor.offset)
                .ok_or(FormatError::UnexpectedEof { offset: cursor.offset })?;
            cursor.offset += 1;
            if byte >= 0x80 {
                cursor.period = usize::from(byte - 0x80);
            } else {
                line.channels[idx].note = Some(usize::from(byte));
                return Ok(());
            }
        }
    }

    fn decode(data: &[u8], starts: &[usize]) -> Result<Pattern<()>> {
        let mut warnings = Warnings::new();
        let mut scope = warnings.scope("Pattern");
        decode_pattern(data, starts, 0, &mut scope, |idx, cursor, line| {
            parse(data, idx, cursor, line)
        })
    }

    fn notes(pattern: &Pattern<()>, chan: usize) -> Vec<Option<usize>> {
        pattern.iter().map(|l| l.channels[chan].note).collect()
    }

    #[test]
    fn test_independent_skip_counters() {
        // A: period 2, notes 1 and 2; B: period 0, notes 3..=8
        let data = [0x82, 1, 2, 0, 3, 4, 5, 6, 7, 8, 0];
        let pattern = decode(&data, &[0, 4]).unwrap();
        assert_eq!(pattern.len(), 6);
        assert_eq!(notes(&pattern, 0), vec![Some(1), None, None, Some(2), None, None]);
        assert_eq!(
            notes(&pattern, 1),
            vec![Some(3), Some(4), Some(5), Some(6), Some(7), Some(8)]
        );
    }

    #[test]
    fn test_common_skip_appends_empty_lines() {
        let data = [0x81, 1, 2, 0];
        let pattern = decode(&data, &[0]).unwrap();
        assert_eq!(notes(&pattern, 0), vec![Some(1), None, Some(2), None]);
    }

    #[test]
    fn test_truncated_stream() {
        let data = [1, 2];
        assert!(matches!(
            decode(&data, &[0]),
            Err(FormatError::UnexpectedEof { offset: 2 })
        ));
    }

    #[test]
    fn test_long_pattern_truncated() {
        let mut data = vec![0xFF, 1];
        data.extend(std::iter::repeat(1).take(10));
        data.push(0);
        let pattern = decode(&data, &[0]).unwrap();
        assert_eq!(pattern.len(), MAX_PATTERN_LINES);
    }
}
