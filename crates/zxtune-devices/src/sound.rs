//! Sample types, render parameters and sample receivers.

use serde::{Deserialize, Serialize};

/// Single channel output sample.
pub type Sample = u16;

/// Lowest sample value (silence for AYM channels).
pub const SAMPLE_MIN: Sample = 0;
/// Highest sample value.
pub const SAMPLE_MAX: Sample = Sample::MAX;
/// Midpoint of the sample range (silence for DAC channels).
pub const SAMPLE_MID: Sample = 0x8000;

/// Fixed point scale used for fractional sample positions.
pub const FIXED_POINT_PRECISION: u64 = 1 << 16;

/// Default ZX Spectrum 128 AY clock.
pub const DEFAULT_CLOCK_FREQ: u64 = 1_773_400;
/// Default output sample rate.
pub const DEFAULT_SOUND_FREQ: u32 = 44_100;
/// Default frame duration (50Hz interrupt).
pub const DEFAULT_FRAME_DURATION_US: u32 = 20_000;

/// Volume curve of the emulated PSG.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChipType {
    /// General Instrument AY-3-8910 (16 volume steps).
    #[default]
    Ay,
    /// Yamaha YM2149 (32 volume steps).
    Ym,
}

/// Rendering parameters shared by every device and player.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderParameters {
    /// Chip clock in Hz
    pub clock_freq: u64,
    /// Output sample rate in Hz
    pub sound_freq: u32,
    /// Duration of one player frame in microseconds
    pub frame_duration_us: u32,
    /// Restart from the loop position instead of stopping at the end
    pub looped: bool,
    /// Volume curve selection
    pub chip_type: ChipType,
}

impl Default for RenderParameters {
    fn default() -> Self {
        Self {
            clock_freq: DEFAULT_CLOCK_FREQ,
            sound_freq: DEFAULT_SOUND_FREQ,
            frame_duration_us: DEFAULT_FRAME_DURATION_US,
            looped: false,
            chip_type: ChipType::Ay,
        }
    }
}

impl RenderParameters {
    /// Chip clock ticks per player frame.
    pub fn clocks_per_frame(&self) -> u64 {
        self.clock_freq * u64::from(self.frame_duration_us) / 1_000_000
    }

    /// Chip clock ticks per output sample, never zero.
    pub fn ticks_per_sample(&self) -> u64 {
        (self.clock_freq / u64::from(self.sound_freq.max(1))).max(1)
    }

    /// Output samples per player frame (rounded down).
    pub fn samples_per_frame(&self) -> u64 {
        u64::from(self.sound_freq) * u64::from(self.frame_duration_us) / 1_000_000
    }

    /// True when the YM volume curve is selected.
    pub fn is_ym(&self) -> bool {
        self.chip_type == ChipType::Ym
    }
}

/// Consumer of rendered samples.
pub trait Receiver {
    /// Accept one output sample tick holding one value per device channel.
    fn apply_sample(&mut self, samples: &[Sample]);

    /// End of stream.
    fn flush(&mut self) {}
}

/// Receiver collecting interleaved samples in memory.
#[derive(Debug, Default, Clone)]
pub struct BufferReceiver {
    /// Interleaved sample data
    pub data: Vec<Sample>,
    /// Channels per sample tick (taken from the first tick)
    pub channels: usize,
    /// Number of sample ticks received
    pub ticks: usize,
    /// Whether `flush` was called
    pub flushed: bool,
}

impl BufferReceiver {
    /// Samples of one channel.
    pub fn channel(&self, idx: usize) -> impl Iterator<Item = Sample> + '_ {
        let stride = self.channels.max(1);
        self.data.iter().skip(idx).step_by(stride).copied()
    }
}

impl Receiver for BufferReceiver {
    fn apply_sample(&mut self, samples: &[Sample]) {
        if self.ticks == 0 {
            self.channels = samples.len();
        }
        self.data.extend_from_slice(samples);
        self.ticks += 1;
    }

    fn flush(&mut self) {
        self.flushed = true;
    }
}

/// Receiver averaging any number of input channels down to a fixed layout.
///
/// Input channel `i` contributes to output `i % outputs`.
pub struct MixingReceiver<'a> {
    target: &'a mut dyn Receiver,
    outputs: usize,
    sums: Vec<u32>,
    counts: Vec<u32>,
    result: Vec<Sample>,
}

impl<'a> MixingReceiver<'a> {
    /// Wrap `target`, producing `outputs` channels per tick.
    pub fn new(target: &'a mut dyn Receiver, outputs: usize) -> Self {
        let outputs = outputs.max(1);
        Self {
            target,
            outputs,
            sums: vec![0; outputs],
            counts: vec![0; outputs],
            result: vec![0; outputs],
        }
    }
}

impl Receiver for MixingReceiver<'_> {
    fn apply_sample(&mut self, samples: &[Sample]) {
        self.sums.iter_mut().for_each(|s| *s = 0);
        self.counts.iter_mut().for_each(|c| *c = 0);
        for (idx, &sample) in samples.iter().enumerate() {
            let out = idx % self.outputs;
            self.sums[out] += u32::from(sample);
            self.counts[out] += 1;
        }
        for out in 0..self.outputs {
            self.result[out] = match self.counts[out] {
                0 => SAMPLE_MIN,
                n => (self.sums[out] / n) as Sample,
            };
        }
        self.target.apply_sample(&self.result);
    }

    fn flush(&mut self) {
        self.target.flush();
    }
}

/// Live state of one device channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChannelState {
    /// Channel produces sound
    pub enabled: bool,
    /// Spectrum band (note index), `None` for silent channels
    pub band: Option<usize>,
    /// Level, 0..=255
    pub level: u8,
}
