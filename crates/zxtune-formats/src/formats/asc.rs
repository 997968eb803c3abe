//! ASC Sound Master modules.
//!
//! Layout: 9-byte header (tempo, loop, offsets of the pattern, sample and
//! ornament tables, length) followed by the position list and an optional
//! `ASM COMPILATION OF <title> BY <author>` block. Object and channel stream
//! offsets are relative to the table they are stored in. Samples and ornaments
//! mark loop begin, loop end and the last line with flag bits.

use log::debug;
use zxtune_devices::aym::{self, MixerFlags, Register, MASK_ENV};

use super::tables::{note_period, ASM_SOUND};
use super::{aym_player, module_info, mute_bits, Decoded};
use crate::error::{require, FormatError, Result};
use crate::reader::{trimmed_text, u16le_at, ByteReader};
use crate::tracking::{decode_pattern, ChannelCursor, FrameRenderer, Line, ModuleData, Position, TrackModel, TrackState};
use crate::warnings::Warnings;

/// Format identifier.
pub const ID: &str = "ASC";
/// Editor name reported in module properties.
pub const PROGRAM: &str = "ASC Sound Master";

const HEADER_SIZE: usize = 9;
const ID_PREFIX: &[u8] = b"ASM COMPILATION OF ";
const ID_INFIX: &[u8] = b" BY ";
const ID_TEXT_SIZE: usize = 20;
const SAMPLES_COUNT: usize = 32;
const ORNAMENTS_COUNT: usize = 32;
const MAX_SAMPLE_LINES: usize = 150;
const MAX_ORNAMENT_LINES: usize = 30;
const MAX_PATTERNS: usize = 32;
const MAX_MODULE_SIZE: usize = 16384;
const PATTERN_ENTRY_SIZE: usize = 6;
const PATTERN_END: u8 = 0xFF;
const CHANNELS: usize = 3;

const LOOP_BEGIN: u8 = 0x80;
const LOOP_END: u8 = 0x40;
const FINISHED: u8 = 0x20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    /// Either part may be absent when only the other one was given.
    Envelope { shape: Option<u8>, tone: Option<u8> },
    EnvelopeOn,
    EnvelopeOff,
    Noise(u8),
    ContinueSample,
    ContinueOrnament,
    Gliss(i32),
    Slide(i32),
    SlideNote { steps: i32, target: usize },
    AmplitudeSlide { period: u8, delta: i32 },
    BreakSample,
}

/// Low five bits as a signed value.
fn signed5(byte: u8) -> i32 {
    i32::from(((byte << 3) as i8) >> 3)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct SampleLine {
    level: u8,
    tone_deviation: i32,
    tone_mask: bool,
    noise_mask: bool,
    adding: i32,
    command: SampleCommand,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum SampleCommand {
    #[default]
    None,
    Envelope,
    DecVolume,
    IncVolume,
}

impl SampleLine {
    // BEFaaaaa TTTTTTTT LLLLnCCt
    fn from_bytes(b: &[u8]) -> Self {
        Self {
            level: b[2] >> 4,
            tone_deviation: i32::from(b[1] as i8),
            tone_mask: b[2] & 0x01 != 0,
            noise_mask: b[2] & 0x08 != 0,
            adding: signed5(b[0]),
            command: match (b[2] & 0x06) >> 1 {
                1 => SampleCommand::Envelope,
                2 => SampleCommand::DecVolume,
                3 => SampleCommand::IncVolume,
                _ => SampleCommand::None,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct OrnamentLine {
    note: i32,
    noise: i32,
}

/// Flag-delimited object: lines up to the finished mark with loop bounds.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Looped<L> {
    lines: Vec<L>,
    loop_pos: usize,
    loop_limit: usize,
}

impl<L: Default + Copy> Default for Looped<L> {
    fn default() -> Self {
        Self {
            lines: Vec::new(),
            loop_pos: 0,
            loop_limit: 0,
        }
    }
}

impl<L: Default + Copy> Looped<L> {
    fn parse(data: &[u8], offset: usize, line_size: usize, max_lines: usize, decode: impl Fn(&[u8]) -> L) -> Result<Self> {
        let mut reader = ByteReader::at(data, offset);
        let mut result = Self::default();
        for idx in 0..max_lines {
            let raw = reader.bytes(line_size)?;
            result.lines.push(decode(raw));
            if raw[0] & LOOP_BEGIN != 0 {
                result.loop_pos = idx;
            }
            if raw[0] & LOOP_END != 0 {
                result.loop_limit = idx;
            }
            if raw[0] & FINISHED != 0 {
                break;
            }
        }
        Ok(result)
    }

    fn line(&self, pos: usize) -> L {
        self.lines.get(pos).copied().unwrap_or_default()
    }

    fn end(&self, offset: usize, line_size: usize) -> usize {
        offset + self.lines.len() * line_size
    }
}

type Sample = Looped<SampleLine>;
type AscOrnament = Looped<OrnamentLine>;
type AscData = ModuleData<Command, Sample>;

struct Header {
    tempo: u8,
    loop_pos: u8,
    patterns_offset: usize,
    samples_offset: usize,
    ornaments_offset: usize,
    positions: Vec<u8>,
}

fn read_header(data: &[u8]) -> Result<Header> {
    let mut reader = ByteReader::new(data);
    let tempo = reader.read_u8()?;
    let loop_pos = reader.read_u8()?;
    let patterns_offset = usize::from(reader.read_u16le()?);
    let samples_offset = usize::from(reader.read_u16le()?);
    let ornaments_offset = usize::from(reader.read_u16le()?);
    let length = usize::from(reader.read_u8()?);
    let positions = reader.bytes(length)?.to_vec();
    Ok(Header {
        tempo,
        loop_pos,
        patterns_offset,
        samples_offset,
        ornaments_offset,
        positions,
    })
}

/// Title and author from the identification block after the positions.
fn read_id(data: &[u8], offset: usize) -> Option<(String, String)> {
    let size = ID_PREFIX.len() + ID_TEXT_SIZE + ID_INFIX.len() + ID_TEXT_SIZE;
    let block = data.get(offset..offset + size)?;
    let (prefix, rest) = block.split_at(ID_PREFIX.len());
    let (title, rest) = rest.split_at(ID_TEXT_SIZE);
    let (infix, author) = rest.split_at(ID_INFIX.len());
    (prefix == ID_PREFIX && infix == ID_INFIX).then(|| (trimmed_text(title), trimmed_text(author)))
}

/// Disjoint areas inside a size limit.
struct RangeChecker {
    limit: usize,
    ranges: Vec<(usize, usize)>,
}

impl RangeChecker {
    fn new(limit: usize) -> Self {
        Self {
            limit,
            ranges: Vec::new(),
        }
    }

    /// Register `[offset, offset + size)`; false if it leaves the limit or
    /// intersects an area added before.
    fn add(&mut self, offset: usize, size: usize) -> bool {
        let end = offset + size;
        if end > self.limit || self.ranges.iter().any(|&(s, e)| offset < e && s < end) {
            return false;
        }
        self.ranges.push((offset, end));
        true
    }

    /// True if `size` bytes from `offset` fit the limit and `offset` is outside every area.
    fn is_free(&self, offset: usize, size: usize) -> bool {
        offset + size <= self.limit && !self.ranges.iter().any(|&(s, e)| (s..e).contains(&offset))
    }
}

fn patterns_count(positions: &[u8]) -> usize {
    positions.iter().max().map_or(0, |&max| usize::from(max) + 1)
}

/// Structural validation of header, tables and object starts.
fn check_module(data: &[u8]) -> bool {
    let data = &data[..data.len().min(MAX_MODULE_SIZE)];
    let Ok(header) = read_header(data) else {
        return false;
    };
    let count = patterns_count(&header.positions);
    if header.positions.is_empty() || count > MAX_PATTERNS || header.tempo == 0 {
        return false;
    }
    let mut checker = RangeChecker::new(data.len());
    checker.add(0, HEADER_SIZE + header.positions.len());
    if !checker.add(header.patterns_offset, PATTERN_ENTRY_SIZE * count)
        || !checker.add(header.samples_offset, SAMPLES_COUNT * 2)
        || !checker.add(header.ornaments_offset, ORNAMENTS_COUNT * 2)
    {
        return false;
    }
    let starts_free = |table: usize, entries: usize, size: usize| {
        (0..entries).all(|idx| match u16le_at(data, table + idx * 2) {
            Ok(rel) => checker.is_free(table + usize::from(rel), size),
            Err(_) => false,
        })
    };
    starts_free(header.samples_offset, SAMPLES_COUNT, 3)
        && starts_free(header.ornaments_offset, ORNAMENTS_COUNT, 2)
        && (0..count).all(|pat| {
            (0..CHANNELS).all(|chan| {
                match u16le_at(data, header.patterns_offset + pat * PATTERN_ENTRY_SIZE + chan * 2) {
                    Ok(rel) => checker.is_free(header.patterns_offset + usize::from(rel), 1),
                    Err(_) => false,
                }
            })
        })
}

/// Quick structural test.
pub fn check(data: &[u8]) -> bool {
    check_module(data)
}

fn parse_row(data: &[u8], cursor: &mut ChannelCursor, line: &mut Line<Command>, chan: usize, envelopes: &mut u8) -> Result<()> {
    let mut reader = ByteReader::at(data, cursor.offset);
    let env_mask = 1u8 << chan;
    let mut continue_sample = false;
    loop {
        let cmd = reader.read_u8()?;
        let channel = &mut line.channels[chan];
        match cmd {
            0x00..=0x55 => {
                if !continue_sample {
                    channel.enabled = Some(true);
                }
                match channel.commands.last_mut() {
                    Some(last) if matches!(last, Command::Slide(_)) => {
                        if let Command::Slide(steps) = *last {
                            *last = Command::SlideNote {
                                steps,
                                target: usize::from(cmd),
                            };
                        }
                    }
                    _ => channel.note = Some(usize::from(cmd)),
                }
                if *envelopes & env_mask != 0 {
                    let param = reader.read_u8()?;
                    match channel.find_command(|c| matches!(c, Command::Envelope { .. })) {
                        Some(Command::Envelope { tone, .. }) => *tone = Some(param),
                        _ => channel.commands.push(Command::Envelope {
                            shape: None,
                            tone: Some(param),
                        }),
                    }
                }
                break;
            }
            0x56..=0x5D => break,
            0x5E => {
                channel.commands.push(Command::BreakSample);
                break;
            }
            0x5F => {
                channel.enabled = Some(false);
                break;
            }
            0x60..=0x9F => cursor.period = usize::from(cmd - 0x60),
            0xA0..=0xBF => channel.sample = Some(usize::from(cmd - 0xA0)),
            0xC0..=0xDF => channel.ornament = Some(usize::from(cmd - 0xC0)),
            0xE0 => {
                channel.volume = Some(15);
                channel.commands.push(Command::EnvelopeOn);
                *envelopes |= env_mask;
            }
            0xE1..=0xEF => {
                channel.volume = Some(cmd - 0xE0);
                channel.commands.push(Command::EnvelopeOff);
                *envelopes &= !env_mask;
            }
            0xF0 => channel.commands.push(Command::Noise(reader.read_u8()?)),
            0xF1..=0xF3 => {
                if cmd & 1 != 0 {
                    continue_sample = true;
                    channel.commands.push(Command::ContinueSample);
                }
                if cmd & 2 != 0 {
                    channel.commands.push(Command::ContinueOrnament);
                }
            }
            0xF4 => line.tempo = Some(usize::from(reader.read_u8()?)),
            0xF5 | 0xF6 => {
                let sign = if cmd == 0xF5 { -16 } else { 16 };
                channel.commands.push(Command::Gliss(sign * i32::from(reader.read_i8()?)));
            }
            0xF7 | 0xF9 => {
                if cmd == 0xF7 {
                    channel.commands.push(Command::ContinueSample);
                }
                channel.commands.push(Command::Slide(i32::from(reader.read_i8()?)));
            }
            0xF8 | 0xFA | 0xFC | 0xFE => {
                let new_shape = cmd & 0x0F;
                match channel.find_command(|c| matches!(c, Command::Envelope { .. })) {
                    Some(Command::Envelope { shape, .. }) => *shape = Some(new_shape),
                    _ => channel.commands.push(Command::Envelope {
                        shape: Some(new_shape),
                        tone: None,
                    }),
                }
            }
            0xFB => {
                let step = reader.read_u8()?;
                channel.commands.push(Command::AmplitudeSlide {
                    period: step & 0x1F,
                    delta: if step & 0x20 != 0 { -1 } else { 1 },
                });
            }
            // 0xFD and 0xFF carry no meaning
            _ => {}
        }
    }
    cursor.offset = reader.position();
    Ok(())
}

struct Parsed {
    data: AscData,
    ornaments: Vec<AscOrnament>,
    title: String,
    author: String,
    size: usize,
}

fn decode(data: &[u8], warnings: &mut Warnings) -> Result<Parsed> {
    let data = &data[..data.len().min(MAX_MODULE_SIZE)];
    require(check_module(data), || "inconsistent module structure".to_string())?;
    let header = read_header(data)?;
    let mut end = HEADER_SIZE + header.positions.len();

    let mut samples = Vec::with_capacity(SAMPLES_COUNT);
    for idx in 0..SAMPLES_COUNT {
        let offset = header.samples_offset + usize::from(u16le_at(data, header.samples_offset + idx * 2)?);
        let sample = Sample::parse(data, offset, 3, MAX_SAMPLE_LINES, SampleLine::from_bytes)?;
        end = end.max(sample.end(offset, 3));
        samples.push(sample);
    }
    let mut ornaments = Vec::with_capacity(ORNAMENTS_COUNT);
    for idx in 0..ORNAMENTS_COUNT {
        let offset = header.ornaments_offset + usize::from(u16le_at(data, header.ornaments_offset + idx * 2)?);
        let ornament = AscOrnament::parse(data, offset, 2, MAX_ORNAMENT_LINES, |b| OrnamentLine {
            note: i32::from(b[1] as i8),
            noise: signed5(b[0]),
        })?;
        end = end.max(ornament.end(offset, 2));
        ornaments.push(ornament);
    }

    let count = patterns_count(&header.positions);
    let mut patterns = Vec::with_capacity(count);
    for idx in 0..count {
        let entry = header.patterns_offset + idx * PATTERN_ENTRY_SIZE;
        let mut starts = [0usize; CHANNELS];
        for (chan, start) in starts.iter_mut().enumerate() {
            *start = header.patterns_offset + usize::from(u16le_at(data, entry + chan * 2)?);
        }
        let mut envelopes = 0u8;
        let mut last_offset = 0;
        let mut scope = warnings.scope(format!("Pattern {idx}"));
        let pattern = decode_pattern(data, &starts, PATTERN_END, &mut scope, |chan, cursor, line| {
            parse_row(data, cursor, line, chan, &mut envelopes)?;
            last_offset = last_offset.max(cursor.offset);
            Ok(())
        })?;
        end = end.max(last_offset + 1);
        patterns.push(pattern);
    }

    let positions: Vec<Position> = header.positions.iter().map(|&p| Position::new(usize::from(p))).collect();
    let mut loop_position = usize::from(header.loop_pos);
    if loop_position >= positions.len() {
        warnings.add(format!("loop position {loop_position} out of range"));
        loop_position = 0;
    }
    let (title, author) = read_id(data, HEADER_SIZE + positions.len()).unwrap_or_default();
    Ok(Parsed {
        data: AscData {
            positions,
            loop_position,
            initial_tempo: usize::from(header.tempo),
            patterns,
            samples,
            ornaments: Vec::new(),
            channels: CHANNELS,
        },
        ornaments,
        title,
        author,
        size: end.min(data.len()),
    })
}

/// Decode a module.
pub fn create(data: &[u8]) -> Result<Decoded> {
    if !check_module(data) {
        return Err(FormatError::NotRecognized);
    }
    let mut warnings = Warnings::new();
    let parsed = decode(data, &mut warnings)?;
    debug!("ASC: {} positions, {} patterns", parsed.data.positions.len(), parsed.data.patterns.len());
    let info = module_info(ID, &parsed.title, &parsed.author, PROGRAM, warnings);
    Ok(Decoded {
        player: aym_player(info, AscRenderer::new(parsed.data, parsed.ornaments)),
        size: parsed.size,
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ChannelState {
    enabled: bool,
    envelope: bool,
    envelope_tone: i32,
    volume: u8,
    volume_addon: i32,
    vol_slide_delay: u8,
    vol_slide_addon: i32,
    vol_slide_counter: u8,
    base_noise: i32,
    current_noise: i32,
    note: usize,
    note_addon: i32,
    sample: usize,
    current_sample: usize,
    pos_in_sample: usize,
    ornament: usize,
    current_ornament: usize,
    pos_in_ornament: usize,
    tone_deviation: i32,
    /// Negative slides forever
    sliding_steps: i32,
    sliding: i32,
    sliding_target: Option<usize>,
    glissade: i32,
}

impl Default for ChannelState {
    fn default() -> Self {
        Self {
            enabled: false,
            envelope: false,
            envelope_tone: 0,
            volume: 15,
            volume_addon: 0,
            vol_slide_delay: 0,
            vol_slide_addon: 0,
            vol_slide_counter: 0,
            base_noise: 0,
            current_noise: 0,
            note: 0,
            note_addon: 0,
            sample: 0,
            current_sample: 0,
            pos_in_sample: 0,
            ornament: 0,
            current_ornament: 0,
            pos_in_ornament: 0,
            tone_deviation: 0,
            sliding_steps: 0,
            sliding: 0,
            sliding_target: None,
            glissade: 0,
        }
    }
}

fn sliding_difference(from: usize, to: usize) -> i32 {
    i32::from(note_period(&ASM_SOUND, to as i32)) - i32::from(note_period(&ASM_SOUND, from as i32))
}

struct AscRenderer {
    data: AscData,
    ornaments: Vec<AscOrnament>,
    channels: [ChannelState; CHANNELS],
}

impl AscRenderer {
    fn new(data: AscData, ornaments: Vec<AscOrnament>) -> Self {
        Self {
            data,
            ornaments,
            channels: Default::default(),
        }
    }

    /// Apply line updates; returns channels whose sample loop is broken this frame.
    fn apply_line(&mut self, state: &TrackState, chunk: &mut aym::DataChunk) -> [bool; CHANNELS] {
        let mut break_samples = [false; CHANNELS];
        if state.line == 0 {
            for dst in &mut self.channels {
                dst.base_noise = 0;
            }
        }
        let Some(line) = self.data.line(state.pattern, state.line) else {
            return break_samples;
        };
        for ((src, dst), brk) in line.channels.iter().zip(&mut self.channels).zip(&mut break_samples) {
            if src.is_empty() {
                continue;
            }
            if let Some(enabled) = src.enabled {
                dst.enabled = enabled;
            }
            dst.vol_slide_counter = 0;
            dst.sliding_steps = 0;
            let (mut cont_sample, mut cont_ornament) = (false, false);
            for cmd in &src.commands {
                match *cmd {
                    Command::Envelope { shape, tone } => {
                        if let Some(shape) = shape {
                            chunk.set(Register::EnvelopeShape, shape);
                        }
                        if let Some(tone) = tone {
                            dst.envelope_tone = i32::from(tone);
                            chunk.set_envelope_period(tone.into());
                        }
                    }
                    Command::EnvelopeOn => dst.envelope = true,
                    Command::EnvelopeOff => dst.envelope = false,
                    Command::Noise(noise) => dst.base_noise = i32::from(noise),
                    Command::ContinueSample => cont_sample = true,
                    Command::ContinueOrnament => cont_ornament = true,
                    Command::Gliss(step) => {
                        dst.glissade = step;
                        dst.sliding_steps = -1;
                    }
                    Command::Slide(steps) => {
                        dst.sliding_steps = steps;
                        let aligned = (dst.sliding | 0x0F) ^ 0x0F;
                        dst.glissade = (-aligned).checked_div(steps).unwrap_or(0);
                        dst.sliding = dst.glissade * steps;
                    }
                    Command::SlideNote { steps, target } => {
                        dst.sliding_steps = steps;
                        dst.sliding_target = Some(target);
                        let absolute = sliding_difference(dst.note, target);
                        let relative = absolute - if cont_sample { dst.sliding / 16 } else { 0 };
                        dst.glissade = (16 * relative).checked_div(steps).unwrap_or(0);
                    }
                    Command::AmplitudeSlide { period, delta } => {
                        dst.vol_slide_counter = period;
                        dst.vol_slide_delay = period;
                        dst.vol_slide_addon = delta;
                    }
                    Command::BreakSample => *brk = true,
                }
            }
            if let Some(ornament) = src.ornament {
                dst.ornament = ornament;
            }
            if let Some(sample) = src.sample {
                dst.sample = sample;
            }
            if let Some(note) = src.note {
                dst.note = note;
                dst.current_noise = dst.base_noise;
                if dst.sliding_steps <= 0 {
                    dst.sliding = 0;
                }
                if !cont_sample {
                    dst.current_sample = dst.sample;
                    dst.pos_in_sample = 0;
                    dst.volume_addon = 0;
                    dst.tone_deviation = 0;
                }
                if !cont_ornament {
                    dst.current_ornament = dst.ornament;
                    dst.pos_in_ornament = 0;
                    dst.note_addon = 0;
                }
            }
            if let Some(volume) = src.volume {
                dst.volume = volume;
            }
        }
        break_samples
    }
}

impl FrameRenderer for AscRenderer {
    type Chunk = aym::DataChunk;

    fn model(&self) -> &dyn TrackModel {
        &self.data
    }

    fn synthesize(&mut self, state: &TrackState, chunk: &mut aym::DataChunk) {
        let break_samples = if state.is_line_start() {
            self.apply_line(state, chunk)
        } else {
            [false; CHANNELS]
        };
        let default_sample = Sample::default();
        let default_ornament = AscOrnament::default();
        let mut mixer = 0u8;
        for (chan, dst) in self.channels.iter_mut().enumerate() {
            if !dst.enabled {
                chunk.set(Register::volume(chan), 0);
                mixer |= mute_bits(chan);
                continue;
            }
            let sample = self.data.samples.get(dst.current_sample).unwrap_or(&default_sample);
            let line = sample.line(dst.pos_in_sample);
            let ornament = self.ornaments.get(dst.current_ornament).unwrap_or(&default_ornament);
            let orn_line = ornament.line(dst.pos_in_ornament);

            if dst.vol_slide_counter >= 2 {
                dst.vol_slide_counter -= 1;
            } else if dst.vol_slide_counter != 0 {
                dst.volume_addon += dst.vol_slide_addon;
                dst.vol_slide_counter = dst.vol_slide_delay;
            }
            match line.command {
                SampleCommand::IncVolume => dst.volume_addon += 1,
                SampleCommand::DecVolume => dst.volume_addon -= 1,
                _ => {}
            }
            dst.volume_addon = dst.volume_addon.clamp(-15, 15);

            dst.tone_deviation += line.tone_deviation;
            dst.note_addon += orn_line.note;
            let half_tone = dst.note as i32 + dst.note_addon;
            let tone = i32::from(note_period(&ASM_SOUND, half_tone)) + dst.tone_deviation + dst.sliding / 16;
            chunk.set_tone(chan, (tone & 0x0FFF) as u16);

            let level = (i32::from(dst.volume) + 1) * (dst.volume_addon + i32::from(line.level)).clamp(0, 15) / 16;
            let sample_envelope = line.command == SampleCommand::Envelope;
            let env = if dst.envelope && sample_envelope { MASK_ENV } else { 0 };
            chunk.set(Register::volume(chan), level.clamp(0, 15) as u8 | env);

            dst.current_noise += orn_line.noise;
            if line.tone_mask {
                mixer |= MixerFlags::tone(chan).bits();
            }
            if line.noise_mask && sample_envelope {
                dst.envelope_tone += line.adding;
                chunk.set_envelope_period((dst.envelope_tone & 0xFFFF) as u16);
            } else {
                dst.current_noise += line.adding;
            }
            if line.noise_mask {
                mixer |= MixerFlags::noise(chan).bits();
            } else {
                chunk.set(Register::ToneN, ((dst.current_noise + dst.sliding / 256) & 0x1F) as u8);
            }

            if dst.sliding_steps != 0 {
                if dst.sliding_steps > 0 {
                    dst.sliding_steps -= 1;
                    if dst.sliding_steps == 0 {
                        if let Some(target) = dst.sliding_target.take() {
                            dst.note = target;
                            dst.sliding = 0;
                            dst.glissade = 0;
                        }
                    }
                }
                dst.sliding += dst.glissade;
            }

            let pos = dst.pos_in_sample;
            dst.pos_in_sample += 1;
            if pos >= sample.loop_limit {
                if !break_samples[chan] {
                    dst.pos_in_sample = sample.loop_pos;
                } else if dst.pos_in_sample >= sample.lines.len() {
                    dst.enabled = false;
                }
            }
            let pos = dst.pos_in_ornament;
            dst.pos_in_ornament += 1;
            if pos >= ornament.loop_limit {
                dst.pos_in_ornament = ornament.loop_pos;
            }
        }
        chunk.set(Register::Mixer, mixer);
    }

    fn reset(&mut self) {
        self.channels = Default::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracking::Chan;
    use zxtune_common::{attributes, PlaybackState};
    use zxtune_devices::sound::{BufferReceiver, RenderParameters};

    /// Tempo 3, one position of pattern 0: channel A plays note 0x30 with a
    /// one-line looped sample (level 15, noise off), B and C are stopped.
    fn module() -> Vec<u8> {
        let mut data = vec![3u8, 0, 0, 0, 0, 0, 0, 0, 1, 0];
        data.extend_from_slice(ID_PREFIX);
        data.extend_from_slice(format!("{:<20}", "Asc Title").as_bytes());
        data.extend_from_slice(ID_INFIX);
        data.extend_from_slice(format!("{:<20}", "Asc Author").as_bytes());
        let patterns = data.len();
        data.extend_from_slice(&[0u8; PATTERN_ENTRY_SIZE]);
        let samples = data.len();
        for _ in 0..SAMPLES_COUNT {
            data.extend_from_slice(&64u16.to_le_bytes());
        }
        data.extend_from_slice(&[LOOP_BEGIN | LOOP_END | FINISHED, 0x00, 0xF8]);
        let ornaments = data.len();
        for _ in 0..ORNAMENTS_COUNT {
            data.extend_from_slice(&64u16.to_le_bytes());
        }
        data.extend_from_slice(&[LOOP_BEGIN | LOOP_END | FINISHED, 0x00]);
        let streams = data.len() - patterns;
        data.extend_from_slice(&[0x5F, 0x5F, 0x30, PATTERN_END]);
        for (chan, rel) in [streams + 2, streams, streams + 1].into_iter().enumerate() {
            let at = patterns + chan * 2;
            data[at..at + 2].copy_from_slice(&(rel as u16).to_le_bytes());
        }
        data[2..4].copy_from_slice(&(patterns as u16).to_le_bytes());
        data[4..6].copy_from_slice(&(samples as u16).to_le_bytes());
        data[6..8].copy_from_slice(&(ornaments as u16).to_le_bytes());
        data
    }

    fn looped_sample() -> Sample {
        Sample::parse(&[LOOP_BEGIN | LOOP_END | FINISHED, 0x00, 0xF8], 0, 3, MAX_SAMPLE_LINES, SampleLine::from_bytes)
            .unwrap()
    }

    fn renderer(chan: Chan<Command>) -> AscRenderer {
        let mut line = Line::new(CHANNELS);
        line.channels[0] = chan;
        let data = AscData {
            positions: vec![Position::new(0)],
            loop_position: 0,
            initial_tempo: 8,
            patterns: vec![vec![line]],
            samples: vec![looped_sample()],
            ornaments: Vec::new(),
            channels: CHANNELS,
        };
        AscRenderer::new(data, Vec::new())
    }

    fn frame(renderer: &mut AscRenderer, frame: usize) -> aym::DataChunk {
        let state = TrackState {
            position: 0,
            pattern: 0,
            line: 0,
            frame,
            tempo: 8,
        };
        let mut chunk = aym::DataChunk::new(0);
        renderer.synthesize(&state, &mut chunk);
        chunk
    }

    fn tone(chunk: &aym::DataChunk) -> u16 {
        u16::from(chunk.get(Register::ToneALo).unwrap()) | u16::from(chunk.get(Register::ToneAHi).unwrap()) << 8
    }

    #[test]
    fn test_check_and_properties() {
        let data = module();
        assert!(check(&data));
        let decoded = create(&data).unwrap();
        assert_eq!(decoded.size, data.len());
        let info = decoded.player.information();
        assert_eq!(info.get(attributes::TYPE), Some(ID));
        assert_eq!(info.get(attributes::TITLE), Some("Asc Title"));
        assert_eq!(info.get(attributes::AUTHOR), Some("Asc Author"));
        assert_eq!(info.get(attributes::PROGRAM), Some(PROGRAM));
        assert_eq!(info.statistics.frames, 3);
    }

    #[test]
    fn test_validation() {
        let mut data = module();
        data[9] = MAX_PATTERNS as u8;
        assert!(!check(&data));

        let mut data = module();
        let patterns = [data[2], data[3]];
        data[4..6].copy_from_slice(&patterns);
        assert!(!check(&data), "overlapping tables");

        let mut data = module();
        data[8] = 0;
        assert!(!check(&data));

        let data = module();
        assert!(!check(&data[..data.len() - 3]));
    }

    #[test]
    fn test_object_flags() {
        let raw = [0x1F, 0x05, 0x93, 0x80, 0xFB, 0x40, 0x61, 0x00, 0x00];
        let sample = Sample::parse(&raw, 0, 3, MAX_SAMPLE_LINES, SampleLine::from_bytes).unwrap();
        assert_eq!(sample.lines.len(), 3);
        assert_eq!(sample.loop_pos, 1);
        assert_eq!(sample.loop_limit, 2);
        let first = sample.lines[0];
        assert_eq!(first.adding, -1);
        assert_eq!(first.tone_deviation, 5);
        assert_eq!(first.level, 9);
        assert!(first.tone_mask);
        assert_eq!(first.command, SampleCommand::Envelope);
        assert!(!first.noise_mask);
        assert_eq!(sample.lines[1].tone_deviation, -5);
        assert_eq!(sample.lines[2].command, SampleCommand::None);
        assert_eq!(signed5(0x10), -16);
        assert_eq!(signed5(0x0F), 15);
    }

    #[test]
    fn test_envelope_rows() {
        let data = [0xE0, 0xF8, 0x30, 0x10, 0x31, 0x20];
        let mut envelopes = 0;
        let mut line = Line::new(CHANNELS);
        let mut cursor = ChannelCursor::default();
        parse_row(&data, &mut cursor, &mut line, 1, &mut envelopes).unwrap();
        assert_eq!(cursor.offset, 4);
        assert_eq!(envelopes, 2);
        let chan = &line.channels[1];
        assert_eq!(chan.volume, Some(15));
        assert_eq!(chan.note, Some(0x30));
        assert_eq!(
            chan.commands,
            vec![
                Command::EnvelopeOn,
                Command::Envelope {
                    shape: Some(8),
                    tone: Some(0x10)
                }
            ]
        );
        let mut line = Line::new(CHANNELS);
        parse_row(&data, &mut cursor, &mut line, 1, &mut envelopes).unwrap();
        assert_eq!(cursor.offset, data.len());
        assert_eq!(
            line.channels[1].commands,
            vec![Command::Envelope {
                shape: None,
                tone: Some(0x20)
            }]
        );
    }

    #[test]
    fn test_slide_and_continue_rows() {
        let mut envelopes = 0;
        let mut line = Line::new(CHANNELS);
        parse_row(&[0xF9, 0x04, 0x40], &mut ChannelCursor::default(), &mut line, 0, &mut envelopes).unwrap();
        let chan = &line.channels[0];
        assert_eq!(chan.note, None);
        assert_eq!(chan.enabled, Some(true));
        assert_eq!(chan.commands, vec![Command::SlideNote { steps: 4, target: 0x40 }]);

        let mut line = Line::new(CHANNELS);
        parse_row(&[0xF1, 0x30], &mut ChannelCursor::default(), &mut line, 0, &mut envelopes).unwrap();
        let chan = &line.channels[0];
        assert_eq!(chan.enabled, None);
        assert_eq!(chan.note, Some(0x30));
        assert_eq!(chan.commands, vec![Command::ContinueSample]);
    }

    #[test]
    fn test_volume_scaling() {
        let mut r = renderer(Chan {
            enabled: Some(true),
            note: Some(0x30),
            volume: Some(7),
            ..Chan::default()
        });
        let chunk = frame(&mut r, 0);
        assert_eq!(chunk.get(Register::VolumeA), Some(7));
        assert_eq!(tone(&chunk), ASM_SOUND[0x30] & 0x0FFF);
        assert_eq!(chunk.get(Register::Mixer), Some(MixerFlags::noise(0).bits() | mute_bits(1) | mute_bits(2)));
    }

    #[test]
    fn test_slide_to_note() {
        let mut r = renderer(Chan {
            enabled: Some(true),
            commands: vec![Command::SlideNote { steps: 2, target: 12 }],
            ..Chan::default()
        });
        let start = ASM_SOUND[0];
        let target = ASM_SOUND[12];
        assert_eq!(tone(&frame(&mut r, 0)), start);
        let middle = i32::from(start) + (i32::from(target) - i32::from(start)) / 2;
        assert_eq!(i32::from(tone(&frame(&mut r, 1))), middle);
        assert_eq!(tone(&frame(&mut r, 2)), target);
    }

    #[test]
    fn test_plays_and_stops() {
        let mut player = create(&module()).unwrap().player;
        let params = RenderParameters::default();
        let mut out = BufferReceiver::default();
        for _ in 0..3 {
            assert_eq!(player.render_frame(&params, &mut out), PlaybackState::Playing);
        }
        assert_eq!(player.render_frame(&params, &mut out), PlaybackState::Stopped);
    }
}
