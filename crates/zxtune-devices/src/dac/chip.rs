use super::{ChannelData, DataChunk};
use crate::sound::{ChannelState, Receiver, RenderParameters, Sample, FIXED_POINT_PRECISION};
use crate::{Chip, DeviceError, Result};
use log::{trace, warn};

/// Unsigned 8-bit silence.
const SILENT: u8 = 128;

/// Note frequencies in Hz, starting at C-1.
pub const FREQ_TABLE: [f64; 64] = [
    32.70, 34.65, 36.71, 38.89, 41.20, 43.65, 46.25, 49.00, 51.91, 55.00, 58.27, 61.73, //
    65.41, 69.29, 73.42, 77.78, 82.41, 87.30, 92.50, 98.00, 103.82, 110.00, 116.54, 123.46, //
    130.82, 138.58, 146.84, 155.56, 164.82, 174.60, 185.00, 196.00, 207.64, 220.00, 233.08,
    246.92, //
    261.64, 277.16, 293.68, 311.12, 329.64, 349.20, 370.00, 392.00, 415.28, 440.00, 466.16,
    493.84, //
    523.28, 554.32, 587.36, 622.24, 659.28, 698.40, 740.00, 784.00, 830.56, 880.00, 932.32,
    987.68, //
    1046.50, 1108.60, 1174.70, 1244.50,
];

#[inline]
fn step_by_frequency(freq: f64, sound_freq: u32, sample_freq: u32) -> u64 {
    (freq * FIXED_POINT_PRECISION as f64 * f64::from(sample_freq)
        / (FREQ_TABLE[0] * f64::from(sound_freq.max(1)) * 2.0)) as u64
}

#[inline]
fn scale(sample: u8) -> Sample {
    Sample::from(sample) << 8
}

#[derive(Debug, Clone)]
struct DacSample {
    data: Vec<u8>,
    loop_start: usize,
    gain: u32,
}

impl DacSample {
    fn new(data: Vec<u8>, loop_start: usize) -> Self {
        let gain = data
            .iter()
            .map(|&s| (i32::from(s) - i32::from(SILENT)).unsigned_abs())
            .sum::<u32>()
            / data.len().max(1) as u32;
        Self {
            data,
            loop_start,
            gain,
        }
    }

    fn size(&self) -> usize {
        self.data.len()
    }
}

impl Default for DacSample {
    fn default() -> Self {
        Self {
            data: vec![SILENT],
            loop_start: 1,
            gain: 0,
        }
    }
}

#[derive(Debug, Clone, Default)]
struct ChannelPlayback {
    enabled: bool,
    note: usize,
    note_slide: i32,
    freq_slide: i32,
    sample: usize,
    pos: u64,
    step: u64,
}

/// Multichannel DAC emulator
#[derive(Debug, Clone)]
pub struct DacChip {
    samples: Vec<DacSample>,
    channels: Vec<ChannelPlayback>,
    sample_freq: u32,
    max_gain: u32,
    tick: u64,
    table_freq: u32,
    steps: Vec<u64>,
}

impl DacChip {
    /// Create a chip with `channels` voices and `samples` sample slots.
    ///
    /// # Arguments
    /// * `channels` - Number of independent voices
    /// * `samples` - Number of sample slots, each starting as a silent 1-byte sample
    /// * `sample_freq` - Rate the samples were recorded at
    pub fn new(channels: usize, samples: usize, sample_freq: u32) -> Self {
        Self {
            samples: vec![DacSample::default(); samples.max(1)],
            channels: vec![ChannelPlayback::default(); channels],
            sample_freq,
            max_gain: 0,
            tick: 0,
            table_freq: 0,
            steps: Vec::new(),
        }
    }

    /// Number of voices.
    pub fn channels_count(&self) -> usize {
        self.channels.len()
    }

    /// Register or replace a sample slot.
    ///
    /// An empty `data` keeps the slot silent.
    pub fn set_sample(&mut self, idx: usize, data: Vec<u8>, loop_start: usize) -> Result<()> {
        let count = self.samples.len();
        let slot = self
            .samples
            .get_mut(idx)
            .ok_or(DeviceError::InvalidSample { index: idx, count })?;
        *slot = if data.is_empty() {
            DacSample::default()
        } else {
            DacSample::new(data, loop_start)
        };
        self.max_gain = self.samples.iter().map(|s| s.gain).max().unwrap_or(0);
        Ok(())
    }

    fn update_channel(&mut self, update: &ChannelData) {
        let Some(chan) = self.channels.get_mut(update.channel) else {
            warn!("DAC update for missing channel {}", update.channel);
            return;
        };
        if let Some(enabled) = update.enabled {
            chan.enabled = enabled;
        }
        if let Some(note) = update.note {
            chan.note = note;
        }
        if let Some(slide) = update.note_slide {
            chan.note_slide = slide;
        }
        if let Some(slide) = update.freq_slide_hz {
            chan.freq_slide = slide;
        }
        if let Some(num) = update.sample_num {
            if num < self.samples.len() {
                chan.sample = num;
            } else {
                warn!("DAC channel {} refers to missing sample {}", update.channel, num);
            }
        }
        if let Some(pos) = update.pos_in_sample {
            let size = self.samples[chan.sample].size();
            chan.pos = FIXED_POINT_PRECISION * pos.min(size.saturating_sub(1)) as u64;
        }
    }

    fn update_steps(&mut self, sound_freq: u32) {
        if self.table_freq != sound_freq || self.steps.is_empty() {
            self.table_freq = sound_freq;
            self.steps = FREQ_TABLE
                .iter()
                .map(|&f| step_by_frequency(f, sound_freq, self.sample_freq))
                .take_while(|&step| step != 0)
                .collect();
            if self.steps.is_empty() {
                self.steps.push(1);
            }
        }
        let first = self.steps[0];
        let last = self.steps[self.steps.len() - 1];
        for chan in &mut self.channels {
            let idx = (chan.note as i64 + i64::from(chan.note_slide)).clamp(0, self.steps.len() as i64 - 1);
            let tone_step = self.steps[idx as usize];
            chan.step = if chan.freq_slide != 0 {
                let delta = step_by_frequency(f64::from(chan.freq_slide.unsigned_abs()), sound_freq, self.sample_freq) as i64;
                let step = tone_step as i64 + i64::from(chan.freq_slide.signum()) * delta;
                step.clamp(first as i64, last as i64) as u64
            } else {
                tone_step
            };
        }
    }

    fn value(&self, chan: &ChannelPlayback) -> Sample {
        if !chan.enabled {
            return scale(SILENT);
        }
        let sample = &self.samples[chan.sample];
        let pos = (chan.pos / FIXED_POINT_PRECISION) as usize;
        scale(sample.data.get(pos).copied().unwrap_or(SILENT))
    }

    /// Steps left before the integer sample position changes.
    fn const_steps(chan: &ChannelPlayback) -> u64 {
        if !chan.enabled {
            return u64::MAX;
        }
        let boundary = FIXED_POINT_PRECISION * (chan.pos / FIXED_POINT_PRECISION + 1);
        (boundary - chan.pos - 1) / chan.step.max(1)
    }

    fn skip_steps(&mut self, steps: u64) {
        for chan in &mut self.channels {
            if !chan.enabled {
                continue;
            }
            chan.pos += steps * chan.step;
            let sample = &self.samples[chan.sample];
            let size = sample.size() as u64 * FIXED_POINT_PRECISION;
            if chan.pos >= size {
                if sample.loop_start < sample.size() {
                    let loop_len = (sample.size() - sample.loop_start) as u64 * FIXED_POINT_PRECISION;
                    chan.pos = size - loop_len + (chan.pos - size) % loop_len;
                } else {
                    trace!("DAC sample {} finished", chan.sample);
                    chan.enabled = false;
                }
            }
        }
    }
}

impl Chip for DacChip {
    type Chunk = DataChunk;

    fn render_data(&mut self, params: &RenderParameters, chunk: &DataChunk, dst: &mut dyn Receiver) {
        for update in &chunk.channels {
            self.update_channel(update);
        }
        self.update_steps(params.sound_freq);

        let ticks_per_sample = params.ticks_per_sample();
        let mut result = vec![0 as Sample; self.channels.len()];
        while self.tick < chunk.tick {
            for (out, chan) in result.iter_mut().zip(&self.channels) {
                *out = self.value(chan);
            }
            let const_steps = self.channels.iter().map(Self::const_steps).min().unwrap_or(u64::MAX);
            let skips = 1 + ((chunk.tick - self.tick) / ticks_per_sample).min(const_steps);
            self.tick += skips * ticks_per_sample;
            self.skip_steps(skips);
            for _ in 0..skips {
                dst.apply_sample(&result);
            }
        }
    }

    fn reset(&mut self) {
        for chan in &mut self.channels {
            *chan = ChannelPlayback::default();
        }
        self.tick = 0;
    }

    fn get_state(&self) -> Vec<ChannelState> {
        self.channels
            .iter()
            .map(|chan| {
                if !chan.enabled {
                    return ChannelState::default();
                }
                let gain = self.samples[chan.sample].gain;
                ChannelState {
                    enabled: true,
                    band: Some(chan.note),
                    level: (gain * 255 / self.max_gain.max(1)).min(255) as u8,
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sound::{BufferReceiver, SAMPLE_MID};
    use approx::assert_relative_eq;

    fn chunk(tick: u64, updates: Vec<ChannelData>) -> DataChunk {
        DataChunk {
            tick,
            channels: updates,
        }
    }

    fn start(channel: usize, sample: usize, note: usize) -> ChannelData {
        ChannelData {
            enabled: Some(true),
            note: Some(note),
            sample_num: Some(sample),
            pos_in_sample: Some(0),
            ..ChannelData::new(channel)
        }
    }

    #[test]
    fn test_step_by_frequency() {
        // C-1 plays at half the recording rate
        let step = step_by_frequency(FREQ_TABLE[0], 8000, 8000);
        assert!(step.abs_diff(FIXED_POINT_PRECISION / 2) <= 1, "step {step}");
        let octave = step_by_frequency(FREQ_TABLE[12], 8000, 8000) as f64;
        assert_relative_eq!(octave / FIXED_POINT_PRECISION as f64, 1.0, epsilon = 0.01);
    }

    #[test]
    fn test_silence_is_midpoint() {
        let params = RenderParameters::default();
        let mut chip = DacChip::new(2, 4, 8000);
        let mut receiver = BufferReceiver::default();
        chip.render_data(&params, &chunk(params.clocks_per_frame(), vec![]), &mut receiver);
        assert_eq!(receiver.channels, 2);
        assert!(receiver.data.iter().all(|&s| s == SAMPLE_MID));
    }

    #[test]
    fn test_sample_without_loop_disables_channel() {
        let params = RenderParameters::default();
        let mut chip = DacChip::new(1, 2, 8000);
        chip.set_sample(1, vec![255; 16], 16).expect("slot exists");
        let mut receiver = BufferReceiver::default();
        chip.render_data(
            &params,
            &chunk(params.clocks_per_frame(), vec![start(0, 1, 12)]),
            &mut receiver,
        );
        let loud = receiver.data.iter().filter(|&&s| s == 0xFF00).count();
        // 16 bytes at 8000Hz replayed at 44100Hz: roughly 88 output samples
        assert!((80..=96).contains(&loud), "loud samples: {loud}");
        assert!(!chip.get_state()[0].enabled);
    }

    #[test]
    fn test_sample_with_loop_keeps_playing() {
        let params = RenderParameters::default();
        let mut chip = DacChip::new(1, 2, 8000);
        chip.set_sample(1, vec![255; 16], 8).expect("slot exists");
        let mut receiver = BufferReceiver::default();
        chip.render_data(
            &params,
            &chunk(params.clocks_per_frame(), vec![start(0, 1, 12)]),
            &mut receiver,
        );
        assert!(receiver.data.iter().all(|&s| s == 0xFF00));
        let state = chip.get_state();
        assert!(state[0].enabled);
        assert_eq!(state[0].band, Some(12));
        assert_eq!(state[0].level, 255);
    }

    #[test]
    fn test_invalid_sample_slot() {
        let mut chip = DacChip::new(1, 2, 8000);
        assert!(matches!(
            chip.set_sample(5, vec![1], 0),
            Err(DeviceError::InvalidSample { index: 5, count: 2 })
        ));
    }

    #[test]
    fn test_reset_disables_channels() {
        let params = RenderParameters::default();
        let mut chip = DacChip::new(1, 2, 8000);
        chip.set_sample(1, vec![200; 4], 0).expect("slot exists");
        chip.render_data(
            &params,
            &chunk(params.clocks_per_frame(), vec![start(0, 1, 0)]),
            &mut BufferReceiver::default(),
        );
        chip.reset();
        assert!(chip.get_state().iter().all(|s| !s.enabled));
    }
}
