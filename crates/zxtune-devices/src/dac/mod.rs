//! Multichannel 8-bit sample player
//!
//! Used by digital soundtracker formats: every channel replays an unsigned 8-bit
//! sample at a pitch derived from a note number.

mod chip;

pub use chip::{DacChip, FREQ_TABLE};

/// Update for a single DAC channel. `None` keeps the current value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChannelData {
    /// Channel index
    pub channel: usize,
    /// Channel on/off
    pub enabled: Option<bool>,
    /// Note number, 0 is C-1
    pub note: Option<usize>,
    /// Note offset in halftones
    pub note_slide: Option<i32>,
    /// Frequency offset in Hz
    pub freq_slide_hz: Option<i32>,
    /// Sample slot
    pub sample_num: Option<usize>,
    /// Position inside the sample in bytes
    pub pos_in_sample: Option<usize>,
}

impl ChannelData {
    /// Empty update for `channel`.
    pub fn new(channel: usize) -> Self {
        Self {
            channel,
            ..Self::default()
        }
    }

    /// True when the update carries at least one field.
    pub fn has_changes(&self) -> bool {
        self.enabled.is_some()
            || self.note.is_some()
            || self.note_slide.is_some()
            || self.freq_slide_hz.is_some()
            || self.sample_num.is_some()
            || self.pos_in_sample.is_some()
    }
}

/// Tick-stamped set of channel updates.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DataChunk {
    /// Absolute chip tick this chunk renders until
    pub tick: u64,
    /// Channel updates applied before rendering
    pub channels: Vec<ChannelData>,
}
