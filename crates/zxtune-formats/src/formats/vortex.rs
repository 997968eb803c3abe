//! Vortex playback engine.
//!
//! Shared by ProTracker 3.x modules and the TurboSound pairs built from them.
//! Behaviour depends on the editor subversion: it selects the volume table,
//! the note table and a couple of effect quirks.

use zxtune_devices::aym::{self, MixerFlags, Register, MASK_ENV};

use super::tables::{
    FreqTable, NOTES, PT3_ASM_34R, PT3_ASM_34_35, PT3_PT_33_34R, PT3_PT_34_35, PT3_REAL_34R, PT3_REAL_34_35, PT3_ST,
    PT3_VOLUME_33_34, PT3_VOLUME_35,
};
use crate::tracking::{FrameRenderer, ModuleData, Ornament, TrackModel, TrackState};

pub(crate) const CHANNELS: usize = 3;

/// Channel effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Command {
    /// Tone slide by `delta` every `period` frames
    Gliss { period: usize, delta: i32 },
    /// Tone slide towards `target`
    GlissNote { period: usize, delta: i32, target: usize },
    SampleOffset(usize),
    OrnamentOffset(usize),
    /// Channel gating: `on` frames audible, `off` frames muted
    Vibrate { on: usize, off: usize },
    /// Envelope period slide
    SlideEnvelope { period: usize, delta: i32 },
    Envelope { shape: u8, period: u16 },
    NoEnvelope,
    NoiseBase(u8),
    /// Tempo change marker; the value lives in the line
    Tempo,
}

/// One step of a sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) struct SampleLine {
    pub level: u8,
    pub vol_slide_addon: i32,
    pub tone_mask: bool,
    pub tone_offset: i32,
    pub keep_tone_offset: bool,
    pub noise_mask: bool,
    pub env_mask: bool,
    /// Envelope offset when noise is masked, noise offset otherwise (5-bit signed)
    pub noise_or_env_offset: i32,
    pub keep_noise_or_env_offset: bool,
}

impl SampleLine {
    /// Decode the 4-byte packed form.
    pub(crate) fn from_bytes(b: [u8; 4]) -> Self {
        let noise_mask = b[1] & 0x80 != 0;
        let raw = (b[0] >> 1) & 0x1F;
        let noise_or_env_offset = if raw & 0x10 != 0 {
            i32::from((raw | 0xF0) as i8)
        } else {
            i32::from(raw)
        };
        let vol_slide_addon = match (b[0] & 0x80 != 0, b[0] & 0x40 != 0) {
            (false, _) => 0,
            (true, true) => 1,
            (true, false) => -1,
        };
        Self {
            level: b[1] & 0x0F,
            vol_slide_addon,
            tone_mask: b[1] & 0x10 != 0,
            tone_offset: i32::from(i16::from_le_bytes([b[2], b[3]])),
            keep_tone_offset: b[1] & 0x40 != 0,
            noise_mask,
            env_mask: b[0] & 0x01 != 0,
            noise_or_env_offset,
            keep_noise_or_env_offset: b[1] & 0x20 != 0,
        }
    }
}

/// Looped sequence of sample lines, never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Sample {
    pub loop_pos: usize,
    pub lines: Vec<SampleLine>,
}

impl Default for Sample {
    fn default() -> Self {
        Self {
            loop_pos: 0,
            lines: vec![SampleLine::default()],
        }
    }
}

impl Sample {
    pub(crate) fn new(loop_pos: usize, lines: Vec<SampleLine>) -> Self {
        if lines.is_empty() {
            return Self::default();
        }
        let loop_pos = loop_pos.min(lines.len() - 1);
        Self { loop_pos, lines }
    }

    fn line(&self, pos: usize) -> SampleLine {
        self.lines.get(pos).copied().unwrap_or_default()
    }

    fn next_pos(&self, pos: usize) -> usize {
        if pos + 1 >= self.lines.len() {
            self.loop_pos
        } else {
            pos + 1
        }
    }
}

pub(crate) type VortexData = ModuleData<Command, Sample>;

/// Editor-version dependent lookup tables.
#[derive(Clone, Copy)]
pub(crate) struct Tables {
    /// Editor subversion, 3.x
    pub version: u32,
    pub freq: &'static FreqTable,
    pub volumes: &'static [u8; 256],
}

impl Tables {
    /// Tables for `version` and the note table index stored in the header.
    pub(crate) fn new(version: u32, freq_table: u8) -> Self {
        let freq = match freq_table {
            0 if version <= 3 => &PT3_PT_33_34R,
            0 => &PT3_PT_34_35,
            1 => &PT3_ST,
            2 if version <= 3 => &PT3_ASM_34R,
            2 => &PT3_ASM_34_35,
            _ if version <= 3 => &PT3_REAL_34R,
            _ => &PT3_REAL_34_35,
        };
        let volumes = if version <= 4 { &PT3_VOLUME_33_34 } else { &PT3_VOLUME_35 };
        Self { version, freq, volumes }
    }

    /// Subversion digit from the header, 6 when absent.
    pub(crate) fn version_from(subversion: u8) -> u32 {
        if subversion.is_ascii_digit() {
            u32::from(subversion - b'0')
        } else {
            6
        }
    }

    fn volume(&self, volume: u8, level: i32) -> u8 {
        let level = level.clamp(0, 15) as usize;
        self.volumes[usize::from(volume & 0x0F) * 16 + level]
    }

    fn tone(&self, note: usize) -> i32 {
        i32::from(self.freq[note.min(NOTES - 1)])
    }
}

impl std::fmt::Debug for Tables {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tables").field("version", &self.version).finish()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Slider {
    period: usize,
    value: i32,
    counter: usize,
    delta: i32,
}

impl Slider {
    fn update(&mut self) -> bool {
        if self.counter == 0 {
            return false;
        }
        self.counter -= 1;
        if self.counter == 0 {
            self.value += self.delta;
            self.counter = self.period;
            true
        } else {
            false
        }
    }

    fn reset(&mut self) {
        self.counter = 0;
        self.value = 0;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ChannelState {
    enabled: bool,
    envelope: bool,
    note: usize,
    sample: usize,
    pos_in_sample: usize,
    ornament: usize,
    pos_in_ornament: usize,
    volume: u8,
    vol_slide: i32,
    tone_slider: Slider,
    target_note: Option<usize>,
    tone_accumulator: i32,
    env_sliding: i32,
    noise_sliding: i32,
    vibrate_counter: usize,
    vibrate_on: usize,
    vibrate_off: usize,
}

impl Default for ChannelState {
    fn default() -> Self {
        Self {
            enabled: false,
            envelope: false,
            note: 0,
            sample: 0,
            pos_in_sample: 0,
            ornament: 0,
            pos_in_ornament: 0,
            volume: 15,
            vol_slide: 0,
            tone_slider: Slider::default(),
            target_note: None,
            tone_accumulator: 0,
            env_sliding: 0,
            noise_sliding: 0,
            vibrate_counter: 0,
            vibrate_on: 0,
            vibrate_off: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct CommonState {
    env_base: i32,
    env_slider: Slider,
    noise_base: i32,
    noise_addon: i32,
}

/// Frame renderer for Vortex-family modules.
pub(crate) struct VortexRenderer {
    data: VortexData,
    tables: Tables,
    channels: [ChannelState; CHANNELS],
    common: CommonState,
}

impl VortexRenderer {
    pub(crate) fn new(data: VortexData, tables: Tables) -> Self {
        Self {
            data,
            tables,
            channels: Default::default(),
            common: CommonState::default(),
        }
    }

    /// Number of channels currently sounding.
    pub(crate) fn active_channels(&self) -> usize {
        self.channels.iter().filter(|c| c.enabled).count()
    }

    fn apply_line(&mut self, state: &TrackState, chunk: &mut aym::DataChunk) {
        if state.line == 0 {
            self.common.noise_base = 0;
        }
        let Some(line) = self.data.line(state.pattern, state.line) else {
            return;
        };
        let version = self.tables.version;
        for (src, dst) in line.channels.iter().zip(&mut self.channels) {
            if let Some(enabled) = src.enabled {
                dst.pos_in_sample = 0;
                dst.pos_in_ornament = 0;
                dst.vol_slide = 0;
                dst.env_sliding = 0;
                dst.noise_sliding = 0;
                dst.tone_slider.reset();
                dst.tone_accumulator = 0;
                dst.vibrate_counter = 0;
                dst.enabled = enabled;
            }
            if let Some(note) = src.note {
                dst.note = note;
            }
            if let Some(sample) = src.sample {
                dst.sample = sample;
            }
            if let Some(ornament) = src.ornament {
                dst.ornament = ornament;
                dst.pos_in_ornament = 0;
            }
            if let Some(volume) = src.volume {
                dst.volume = volume;
            }
            for cmd in &src.commands {
                match *cmd {
                    Command::Gliss { period, delta } => {
                        dst.tone_slider.period = period;
                        dst.tone_slider.counter = period;
                        dst.tone_slider.delta = delta;
                        dst.target_note = None;
                        dst.vibrate_counter = 0;
                        if period == 0 && version >= 7 {
                            dst.tone_slider.counter += 1;
                        }
                    }
                    Command::GlissNote { period, delta, target } => {
                        dst.tone_slider.period = period;
                        dst.tone_slider.counter = period;
                        dst.target_note = Some(target);
                        dst.vibrate_counter = 0;
                        // rising note means falling period
                        dst.tone_slider.delta = if (dst.note < target) != (delta < 0) { -delta } else { delta };
                    }
                    Command::SampleOffset(pos) => dst.pos_in_sample = pos,
                    Command::OrnamentOffset(pos) => dst.pos_in_ornament = pos,
                    Command::Vibrate { on, off } => {
                        dst.vibrate_counter = on;
                        dst.vibrate_on = on;
                        dst.vibrate_off = off;
                        dst.tone_slider.value = 0;
                        dst.tone_slider.counter = 0;
                    }
                    Command::SlideEnvelope { period, delta } => {
                        self.common.env_slider.period = period;
                        self.common.env_slider.counter = period;
                        self.common.env_slider.delta = delta;
                    }
                    Command::Envelope { shape, period } => {
                        chunk.set(Register::EnvelopeShape, shape);
                        self.common.env_base = i32::from(period);
                        self.common.env_slider.reset();
                        dst.envelope = true;
                        dst.pos_in_ornament = 0;
                    }
                    Command::NoEnvelope => {
                        dst.envelope = false;
                        dst.pos_in_ornament = 0;
                    }
                    Command::NoiseBase(base) => self.common.noise_base = i32::from(base),
                    Command::Tempo => {}
                }
            }
        }
    }

    fn apply_channel(&mut self, chan: usize, mixer: &mut MixerFlags, chunk: &mut aym::DataChunk, env_addon: &mut i32) {
        let tables = self.tables;
        let common = &mut self.common;
        let dst = &mut self.channels[chan];
        if dst.enabled {
            let default_sample = Sample::default();
            let default_ornament = Ornament::new(0, vec![0]);
            let sample = self.data.samples.get(dst.sample).unwrap_or(&default_sample);
            let line = sample.line(dst.pos_in_sample);
            let ornament = self.data.ornaments.get(dst.ornament).unwrap_or(&default_ornament);

            let tone_addon = line.tone_offset + dst.tone_accumulator;
            if line.keep_tone_offset {
                dst.tone_accumulator = tone_addon;
            }
            let half_tone = (dst.note as i32 + ornament.get(dst.pos_in_ornament)).clamp(0, NOTES as i32 - 1);
            let tone = (tables.tone(half_tone as usize) + dst.tone_slider.value + tone_addon) & 0xFFF;
            if dst.tone_slider.update() {
                if let Some(target) = dst.target_note {
                    let target_tone = tables.tone(target);
                    let delta = dst.tone_slider.delta;
                    if (delta > 0 && tone + delta > target_tone) || (delta < 0 && tone + delta < target_tone) {
                        dst.note = target;
                        dst.target_note = None;
                        dst.tone_slider.value = 0;
                        dst.tone_slider.counter = 0;
                    }
                }
            }
            chunk.set_tone(chan, tone as u16);

            dst.vol_slide = (dst.vol_slide + line.vol_slide_addon).clamp(-15, 15);
            let env = if dst.envelope && !line.env_mask { MASK_ENV } else { 0 };
            chunk.set(Register::volume(chan), tables.volume(dst.volume, dst.vol_slide + i32::from(line.level)) | env);

            if line.tone_mask {
                *mixer |= MixerFlags::tone(chan);
            }
            if line.noise_mask {
                *mixer |= MixerFlags::noise(chan);
                let addon = line.noise_or_env_offset + dst.env_sliding;
                if line.keep_noise_or_env_offset {
                    dst.env_sliding = addon;
                }
                *env_addon += addon;
            } else {
                common.noise_addon = line.noise_or_env_offset + dst.noise_sliding;
                if line.keep_noise_or_env_offset {
                    dst.noise_sliding = common.noise_addon;
                }
            }
            dst.pos_in_sample = sample.next_pos(dst.pos_in_sample);
            dst.pos_in_ornament = ornament.next_pos(dst.pos_in_ornament);
        } else {
            chunk.set(Register::volume(chan), 0);
            *mixer |= MixerFlags::tone(chan) | MixerFlags::noise(chan);
        }
        if dst.vibrate_counter > 0 {
            dst.vibrate_counter -= 1;
            if dst.vibrate_counter == 0 {
                dst.enabled = !dst.enabled;
                dst.vibrate_counter = if dst.enabled { dst.vibrate_on } else { dst.vibrate_off };
            }
        }
    }
}

impl FrameRenderer for VortexRenderer {
    type Chunk = aym::DataChunk;

    fn model(&self) -> &dyn TrackModel {
        &self.data
    }

    fn synthesize(&mut self, state: &TrackState, chunk: &mut aym::DataChunk) {
        if state.is_line_start() {
            self.apply_line(state, chunk);
        }
        let mut mixer = MixerFlags::empty();
        let mut env_addon = 0;
        for chan in 0..CHANNELS {
            self.apply_channel(chan, &mut mixer, chunk, &mut env_addon);
        }
        chunk.set(Register::Mixer, mixer.bits());
        let env_period = env_addon + self.common.env_slider.value + self.common.env_base;
        chunk.set(Register::ToneN, ((self.common.noise_base + self.common.noise_addon) & 0x1F) as u8);
        chunk.set_envelope_period((env_period & 0xFFFF) as u16);
        self.common.env_slider.update();
    }

    fn reset(&mut self) {
        self.channels = Default::default();
        self.common = CommonState::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracking::{Line, Position};

    fn module(lines: Vec<Line<Command>>, samples: Vec<Sample>) -> VortexData {
        VortexData {
            positions: vec![Position::new(0)],
            loop_position: 0,
            initial_tempo: 1,
            patterns: vec![lines],
            samples,
            ornaments: vec![Ornament::new(0, vec![0])],
            channels: CHANNELS,
        }
    }

    fn audible_sample() -> Sample {
        // level 15, tone on, noise off
        Sample::new(0, vec![SampleLine::from_bytes([0x00, 0x8F, 0x00, 0x00])])
    }

    fn state(line: usize, frame: usize) -> TrackState {
        TrackState {
            position: 0,
            pattern: 0,
            line,
            frame,
            tempo: 1,
        }
    }

    #[test]
    fn test_sample_line_bits() {
        let line = SampleLine::from_bytes([0xC3, 0xEA, 0xFE, 0xFF]);
        assert!(line.env_mask);
        assert_eq!(line.vol_slide_addon, 1);
        assert_eq!(line.level, 10);
        assert!(!line.tone_mask);
        assert!(line.keep_noise_or_env_offset);
        assert!(line.keep_tone_offset);
        assert!(line.noise_mask);
        assert_eq!(line.tone_offset, -2);
        assert_eq!(line.noise_or_env_offset, 1);

        let line = SampleLine::from_bytes([0xA0, 0x80, 0, 0]);
        assert_eq!(line.vol_slide_addon, -1);
        assert_eq!(line.noise_or_env_offset, -16);
        let line = SampleLine::from_bytes([0x1E, 0x00, 0, 0]);
        assert_eq!(line.noise_or_env_offset, 15);
    }

    #[test]
    fn test_tables_by_version() {
        assert_eq!(Tables::version_from(b'4'), 4);
        assert_eq!(Tables::version_from(b'!'), 6);
        let old = Tables::new(3, 0);
        assert_eq!(old.freq[0], PT3_PT_33_34R[0]);
        assert_eq!(old.volumes[16 + 8], PT3_VOLUME_33_34[24]);
        let new = Tables::new(5, 0);
        assert_eq!(new.freq[0], PT3_PT_34_35[0]);
        assert_eq!(Tables::new(5, 1).freq[0], PT3_ST[0]);
        assert_eq!(Tables::new(5, 9).freq[0], PT3_REAL_34_35[0]);
    }

    #[test]
    fn test_slider_counts_down() {
        let mut slider = Slider {
            period: 2,
            value: 0,
            counter: 2,
            delta: 5,
        };
        assert!(!slider.update());
        assert!(slider.update());
        assert_eq!(slider.value, 5);
        assert_eq!(slider.counter, 2);
        slider.reset();
        assert!(!slider.update());
    }

    #[test]
    fn test_note_renders_tone_and_volume() {
        let mut line = Line::new(CHANNELS);
        line.channels[0].enabled = Some(true);
        line.channels[0].note = Some(0);
        line.channels[0].sample = Some(1);
        let data = module(vec![line], vec![Sample::default(), audible_sample()]);
        let mut renderer = VortexRenderer::new(data, Tables::new(5, 0));
        let mut chunk = aym::DataChunk::default();
        renderer.synthesize(&state(0, 0), &mut chunk);
        assert_eq!(chunk.get(Register::ToneALo), Some((PT3_PT_34_35[0] & 0xFF) as u8));
        assert_eq!(chunk.get(Register::ToneAHi), Some((PT3_PT_34_35[0] >> 8) as u8));
        assert_eq!(chunk.get(Register::VolumeA), Some(15));
        assert_eq!(chunk.get(Register::VolumeB), Some(0));
        let mixer = MixerFlags::from_bits_truncate(chunk.get(Register::Mixer).unwrap_or(0));
        assert!(!mixer.contains(MixerFlags::tone(0)));
        assert!(mixer.contains(MixerFlags::noise(0)));
        assert!(mixer.contains(MixerFlags::tone(1) | MixerFlags::noise(1)));
        assert_eq!(renderer.active_channels(), 1);
    }

    #[test]
    fn test_envelope_command() {
        let mut line = Line::new(CHANNELS);
        line.channels[1].enabled = Some(true);
        line.channels[1].sample = Some(1);
        line.channels[1].commands.push(Command::Envelope { shape: 0x0E, period: 0x0123 });
        let data = module(vec![line], vec![Sample::default(), audible_sample()]);
        let mut renderer = VortexRenderer::new(data, Tables::new(5, 0));
        let mut chunk = aym::DataChunk::default();
        renderer.synthesize(&state(0, 0), &mut chunk);
        assert_eq!(chunk.get(Register::EnvelopeShape), Some(0x0E));
        assert_eq!(chunk.get(Register::ToneELo), Some(0x23));
        assert_eq!(chunk.get(Register::ToneEHi), Some(0x01));
        assert_eq!(chunk.get(Register::VolumeB), Some(15 | MASK_ENV));
    }

    #[test]
    fn test_vibrate_gates_channel() {
        let mut line = Line::new(CHANNELS);
        line.channels[0].enabled = Some(true);
        line.channels[0].sample = Some(1);
        line.channels[0].commands.push(Command::Vibrate { on: 1, off: 2 });
        let data = module(vec![line], vec![Sample::default(), audible_sample()]);
        let mut renderer = VortexRenderer::new(data, Tables::new(5, 0));
        let volumes: Vec<Option<u8>> = (0..4)
            .map(|frame| {
                let mut chunk = aym::DataChunk::default();
                renderer.synthesize(&state(0, frame), &mut chunk);
                chunk.get(Register::VolumeA)
            })
            .collect();
        assert_eq!(volumes, vec![Some(15), Some(0), Some(0), Some(15)]);
    }

    #[test]
    fn test_kept_envelope_offset_accumulates() {
        let mut line = Line::new(CHANNELS);
        line.channels[0].enabled = Some(true);
        line.channels[0].sample = Some(1);
        // noise masked, kept envelope offset +1, looping on itself
        let sliding = Sample::new(0, vec![SampleLine::from_bytes([0xC3, 0xEA, 0xFE, 0xFF])]);
        let data = module(vec![line], vec![Sample::default(), sliding]);
        let mut renderer = VortexRenderer::new(data, Tables::new(5, 0));
        let periods: Vec<Option<u8>> = (0..3)
            .map(|frame| {
                let mut chunk = aym::DataChunk::default();
                renderer.synthesize(&state(0, frame), &mut chunk);
                chunk.get(Register::ToneELo)
            })
            .collect();
        assert_eq!(periods, vec![Some(1), Some(2), Some(3)]);
    }

    #[test]
    fn test_gliss_note_reaches_target() {
        let mut line = Line::new(CHANNELS);
        line.channels[0].enabled = Some(true);
        line.channels[0].sample = Some(1);
        line.channels[0].note = Some(0);
        line.channels[0].commands.push(Command::GlissNote {
            period: 1,
            delta: 0x200,
            target: 12,
        });
        let data = module(vec![line], vec![Sample::default(), audible_sample()]);
        let mut renderer = VortexRenderer::new(data, Tables::new(5, 0));
        for frame in 0..8 {
            let mut chunk = aym::DataChunk::default();
            renderer.synthesize(&state(0, frame), &mut chunk);
        }
        assert_eq!(renderer.channels[0].note, 12);
        assert_eq!(renderer.channels[0].target_note, None);
    }
}
