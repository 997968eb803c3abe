//! Sound Tracker Pro (compiled) modules.
//!
//! Layout: 10-byte header with offsets of the position list, pattern table,
//! ornament and sample offset tables, optionally followed by a
//! `KSA SOFTWARE COMPILATION OF ` block carrying the title. Positions store
//! pattern offsets (multiples of 6) with a transposition each.

use log::debug;
use zxtune_devices::aym::{self, MixerFlags, Register, MASK_ENV};

use super::tables::{note_period, SOUNDTRACKER};
use super::{aym_player, module_info, mute_bits, Decoded};
use crate::detector::{module_offsets, PlayerPrefix};
use crate::error::{require, FormatError, Result};
use crate::reader::{ensure_range, trimmed_text, u16le_at, u8_at, ByteReader};
use crate::tracking::{
    decode_pattern, ChannelCursor, FrameRenderer, Line, ModuleData, Ornament, Position, TrackModel, TrackState,
};
use crate::warnings::Warnings;

/// Format identifier.
pub const ID: &str = "STP";
/// Editor name reported in module properties.
pub const PROGRAM: &str = "Sound Tracker Pro";

const HEADER_SIZE: usize = 10;
const ID_SIGNATURE: &[u8] = b"KSA SOFTWARE COMPILATION OF ";
const TITLE_SIZE: usize = 25;
const PATTERN_ENTRY_SIZE: usize = 6;
const SAMPLE_LINE_SIZE: usize = 4;
const SAMPLES_COUNT: usize = 15;
const ORNAMENTS_COUNT: usize = 16;
const MAX_OBJECT_SIZE: usize = 32;
const MAX_MODULE_SIZE: usize = 16384;
const PATTERN_END: u8 = 0x00;
const CHANNELS: usize = 3;

const PLAYERS: &[PlayerPrefix] = &[PlayerPrefix {
    signature: "21??c3??c3??ed4b??c3??+62+f322??3e?32??32??32??7e2332??cd??7e32??23",
    player_size: 1896,
}];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    /// Shape 0 keeps the envelope registers untouched.
    Envelope { shape: u8, period: u8 },
    NoEnvelope,
    Gliss(i32),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct SampleLine {
    level: u8,
    noise: u8,
    tone_mask: bool,
    noise_mask: bool,
    env_mask: bool,
    vibrato: i32,
}

impl SampleLine {
    // NxxTaaaa xxnnnnnE vvvvvvvv vvvvvvvv
    fn from_bytes(b: &[u8]) -> Self {
        Self {
            level: b[0] & 0x0F,
            tone_mask: b[0] & 0x10 != 0,
            noise_mask: b[0] & 0x80 != 0,
            env_mask: b[1] & 0x01 != 0,
            noise: (b[1] & 0x3E) >> 1,
            vibrato: i32::from(i16::from_le_bytes([b[2], b[3]])),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Sample {
    /// `None` stops the channel at the end of the sample
    loop_pos: Option<usize>,
    lines: Vec<SampleLine>,
}

impl Default for Sample {
    fn default() -> Self {
        Self {
            loop_pos: None,
            lines: vec![SampleLine::default()],
        }
    }
}

type StpData = ModuleData<Command, Sample>;

struct Header {
    tempo: u8,
    positions_offset: usize,
    patterns_offset: usize,
    ornaments_offset: usize,
    samples_offset: usize,
}

fn read_header(data: &[u8]) -> Result<Header> {
    let mut reader = ByteReader::new(data);
    Ok(Header {
        tempo: reader.read_u8()?,
        positions_offset: usize::from(reader.read_u16le()?),
        patterns_offset: usize::from(reader.read_u16le()?),
        ornaments_offset: usize::from(reader.read_u16le()?),
        samples_offset: usize::from(reader.read_u16le()?),
    })
}

fn read_title(data: &[u8]) -> Option<String> {
    let block = data.get(HEADER_SIZE..HEADER_SIZE + ID_SIGNATURE.len() + TITLE_SIZE)?;
    block
        .starts_with(ID_SIGNATURE)
        .then(|| trimmed_text(&block[ID_SIGNATURE.len()..]))
}

/// Offsets of an object table; every entry must be nonzero and inside `limit`.
fn object_offsets(data: &[u8], table: usize, count: usize) -> Result<Vec<usize>> {
    (0..count)
        .map(|idx| {
            let offset = usize::from(u16le_at(data, table + idx * 2)?);
            require(offset != 0 && offset < data.len(), || {
                format!("object {idx} at invalid offset 0x{offset:04x}")
            })?;
            Ok(offset)
        })
        .collect()
}

/// Loop byte and size of an object, checked against the size limits.
fn object_header(data: &[u8], offset: usize, line_size: usize) -> Result<(i8, usize)> {
    let loop_pos = u8_at(data, offset)? as i8;
    let size = usize::from(u8_at(data, offset + 1)?);
    require(size <= MAX_OBJECT_SIZE && i32::from(loop_pos) <= MAX_OBJECT_SIZE as i32, || {
        format!("object at 0x{offset:04x} is too big")
    })?;
    ensure_range(offset + 2, size * line_size, data.len())?;
    Ok((loop_pos, size))
}

fn check_module(data: &[u8]) -> bool {
    let data = &data[..data.len().min(MAX_MODULE_SIZE)];
    let limit = data.len();
    let Ok(header) = read_header(data) else {
        return false;
    };
    if header.tempo == 0
        || header.positions_offset > limit
        || header.patterns_offset >= header.ornaments_offset
        || (header.ornaments_offset - header.patterns_offset) % PATTERN_ENTRY_SIZE != 0
        || header.ornaments_offset > limit
    {
        return false;
    }
    let positions_ok = match u8_at(data, header.positions_offset) {
        Ok(length) if length != 0 => {
            let entries = header.positions_offset + 2;
            ensure_range(entries, usize::from(length) * 2, limit).is_ok()
                && (0..usize::from(length)).all(|idx| data[entries + idx * 2] % PATTERN_ENTRY_SIZE as u8 == 0)
        }
        _ => false,
    };
    let objects_ok = |table: usize, count: usize, line_size: usize| {
        object_offsets(data, table, count).map_or(false, |offsets| {
            offsets
                .into_iter()
                .all(|offset| object_header(data, offset, line_size).is_ok())
        })
    };
    positions_ok
        && objects_ok(header.ornaments_offset, ORNAMENTS_COUNT, 1)
        && objects_ok(header.samples_offset, SAMPLES_COUNT, SAMPLE_LINE_SIZE)
}

/// Quick structural test, allowing a compiled player in front of the module.
pub fn check(data: &[u8]) -> bool {
    module_offsets(data, PLAYERS)
        .into_iter()
        .any(|offset| check_module(&data[offset..]))
}

fn parse_row(data: &[u8], cursor: &mut ChannelCursor, line: &mut Line<Command>, chan: usize) -> Result<()> {
    let mut reader = ByteReader::at(data, cursor.offset);
    loop {
        let cmd = reader.read_u8()?;
        let channel = &mut line.channels[chan];
        match cmd {
            0x00 => {
                return Err(FormatError::InvalidData {
                    msg: format!("channel {chan}: unexpected end of pattern at 0x{:04x}", reader.position() - 1),
                })
            }
            0x01..=0x60 => {
                channel.note = Some(usize::from(cmd - 1));
                channel.enabled = Some(true);
                break;
            }
            0x61..=0x6F => channel.sample = Some(usize::from(cmd - 0x61)),
            0x70..=0x7F => {
                channel.ornament = Some(usize::from(cmd - 0x70));
                channel.commands.push(Command::NoEnvelope);
                channel.commands.push(Command::Gliss(0));
            }
            0x80..=0xBF => cursor.period = usize::from(cmd - 0x80),
            0xC0..=0xCF => {
                let period = if cmd == 0xC0 { 0 } else { reader.read_u8()? };
                channel.commands.push(Command::Envelope {
                    shape: cmd - 0xC0,
                    period,
                });
                channel.ornament = Some(0);
                channel.commands.push(Command::Gliss(0));
            }
            0xD0..=0xDF => {
                channel.enabled = Some(false);
                break;
            }
            0xE0..=0xEF => break,
            0xF0 => channel.commands.push(Command::Gliss(i32::from(reader.read_i8()?))),
            0xF1..=0xFF => channel.volume = Some(cmd - 0xF1),
        }
    }
    cursor.offset = reader.position();
    Ok(())
}

fn decode(data: &[u8], warnings: &mut Warnings) -> Result<(StpData, Option<String>, usize)> {
    let data = &data[..data.len().min(MAX_MODULE_SIZE)];
    require(check_module(data), || "inconsistent module structure".to_string())?;
    let header = read_header(data)?;
    let title = read_title(data);
    let mut end = HEADER_SIZE;

    let mut samples = Vec::with_capacity(SAMPLES_COUNT);
    for (idx, offset) in object_offsets(data, header.samples_offset, SAMPLES_COUNT)?.into_iter().enumerate() {
        let (loop_pos, size) = object_header(data, offset, SAMPLE_LINE_SIZE)?;
        let body = &data[offset + 2..offset + 2 + size * SAMPLE_LINE_SIZE];
        end = end.max(offset + 2 + body.len());
        let mut sample = Sample::default();
        if size != 0 {
            sample.lines = body.chunks_exact(SAMPLE_LINE_SIZE).map(SampleLine::from_bytes).collect();
        }
        if loop_pos >= 0 {
            let loop_pos = usize::from(loop_pos as u8);
            if loop_pos >= sample.lines.len() {
                warnings.add(format!("Sample {idx}: loop {loop_pos} out of bounds"));
            }
            sample.loop_pos = Some(loop_pos.min(sample.lines.len() - 1));
        }
        samples.push(sample);
    }
    end = end.max(header.samples_offset + SAMPLES_COUNT * 2);

    let mut ornaments = Vec::with_capacity(ORNAMENTS_COUNT);
    for (idx, offset) in object_offsets(data, header.ornaments_offset, ORNAMENTS_COUNT)?.into_iter().enumerate() {
        let (loop_pos, size) = object_header(data, offset, 1)?;
        let lines: Vec<i32> = data[offset + 2..offset + 2 + size].iter().map(|&b| i32::from(b as i8)).collect();
        end = end.max(offset + 2 + size);
        let loop_pos = usize::from(loop_pos as u8);
        if loop_pos > lines.len() {
            warnings.add(format!("Ornament {idx}: loop {loop_pos} out of bounds"));
        }
        ornaments.push(Ornament::new(loop_pos, lines));
    }
    end = end.max(header.ornaments_offset + ORNAMENTS_COUNT * 2);

    let mut patterns = Vec::new();
    for entry in (header.patterns_offset..header.ornaments_offset).step_by(PATTERN_ENTRY_SIZE) {
        let starts = [
            usize::from(u16le_at(data, entry)?),
            usize::from(u16le_at(data, entry + 2)?),
            usize::from(u16le_at(data, entry + 4)?),
        ];
        let mut last_offset = 0;
        let mut scope = warnings.scope(format!("Pattern {}", patterns.len()));
        let pattern = decode_pattern(data, &starts, PATTERN_END, &mut scope, |chan, cursor, line| {
            parse_row(data, cursor, line, chan)?;
            last_offset = last_offset.max(cursor.offset);
            Ok(())
        })?;
        end = end.max(last_offset + 1);
        patterns.push(pattern);
    }

    let length = usize::from(data[header.positions_offset]);
    let loop_byte = usize::from(u8_at(data, header.positions_offset + 1)?);
    let entries = &data[header.positions_offset + 2..header.positions_offset + 2 + length * 2];
    end = end.max(header.positions_offset + 2 + entries.len());
    let positions: Vec<Position> = entries
        .chunks_exact(2)
        .filter_map(|entry| {
            let pattern = usize::from(entry[0]) / PATTERN_ENTRY_SIZE;
            (pattern < patterns.len()).then(|| Position {
                pattern,
                transposition: i32::from(entry[1] as i8),
            })
        })
        .collect();
    require(!positions.is_empty(), || "no playable positions".to_string())?;
    if positions.len() != length {
        warnings.add(format!("{} of {length} positions are playable", positions.len()));
    }
    let loop_position = if loop_byte < positions.len() {
        loop_byte
    } else {
        warnings.add(format!("loop position {loop_byte} out of range"));
        0
    };

    let module = StpData {
        positions,
        loop_position,
        initial_tempo: usize::from(header.tempo),
        patterns,
        samples,
        ornaments,
        channels: CHANNELS,
    };
    Ok((module, title, end.min(data.len())))
}

/// Decode a module, allowing a compiled player in front of it.
pub fn create(data: &[u8]) -> Result<Decoded> {
    let mut last_error = FormatError::NotRecognized;
    for offset in module_offsets(data, PLAYERS) {
        let body = &data[offset..];
        if !check_module(body) {
            continue;
        }
        let mut warnings = Warnings::new();
        match decode(body, &mut warnings) {
            Ok((module, title, size)) => {
                debug!("STP at +{offset}: {} patterns", module.patterns.len());
                let info = module_info(ID, title.as_deref().unwrap_or_default(), "", PROGRAM, warnings);
                return Ok(Decoded {
                    player: aym_player(info, StpRenderer::new(module)),
                    size: offset + size,
                });
            }
            Err(err) => last_error = err,
        }
    }
    Err(last_error)
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct ChannelState {
    enabled: bool,
    envelope: bool,
    volume: u8,
    note: usize,
    sample: usize,
    pos_in_sample: usize,
    ornament: usize,
    pos_in_ornament: usize,
    ton_slide: i32,
    glissade: i32,
}

struct StpRenderer {
    data: StpData,
    channels: [ChannelState; CHANNELS],
}

impl StpRenderer {
    fn new(data: StpData) -> Self {
        Self {
            data,
            channels: Default::default(),
        }
    }

    fn apply_line(&mut self, state: &TrackState, chunk: &mut aym::DataChunk) {
        let Some(line) = self.data.line(state.pattern, state.line) else {
            return;
        };
        for (src, dst) in line.channels.iter().zip(&mut self.channels) {
            if let Some(enabled) = src.enabled {
                dst.enabled = enabled;
                dst.pos_in_sample = 0;
                dst.pos_in_ornament = 0;
            }
            if let Some(note) = src.note {
                dst.note = note;
                dst.pos_in_sample = 0;
                dst.pos_in_ornament = 0;
                dst.ton_slide = 0;
            }
            if let Some(sample) = src.sample {
                dst.sample = sample;
                dst.pos_in_sample = 0;
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
                    Command::Envelope { shape, period } => {
                        if shape != 0 {
                            chunk.set(Register::EnvelopeShape, shape);
                            chunk.set(Register::ToneELo, period);
                        }
                        dst.envelope = true;
                    }
                    Command::NoEnvelope => dst.envelope = false,
                    Command::Gliss(step) => dst.glissade = step,
                }
            }
        }
    }
}

impl FrameRenderer for StpRenderer {
    type Chunk = aym::DataChunk;

    fn model(&self) -> &dyn TrackModel {
        &self.data
    }

    fn synthesize(&mut self, state: &TrackState, chunk: &mut aym::DataChunk) {
        if state.is_line_start() {
            self.apply_line(state, chunk);
        }
        let transposition = self.data.transposition(state.position);
        let default_sample = Sample::default();
        let default_ornament = Ornament::default();
        let mut mixer = 0u8;
        for (chan, dst) in self.channels.iter_mut().enumerate() {
            if !dst.enabled {
                chunk.set(Register::volume(chan), 0);
                mixer |= mute_bits(chan);
                continue;
            }
            let sample = self.data.samples.get(dst.sample).unwrap_or(&default_sample);
            let line = sample.lines.get(dst.pos_in_sample).copied().unwrap_or_default();
            let ornament = self.data.ornaments.get(dst.ornament).unwrap_or(&default_ornament);

            dst.ton_slide += dst.glissade;
            let orn_offset = if dst.envelope { 0 } else { ornament.get(dst.pos_in_ornament) };
            let half_tone = dst.note as i32 + transposition + orn_offset;
            let tone = i32::from(note_period(&SOUNDTRACKER, half_tone)) + dst.ton_slide + line.vibrato;
            chunk.set_tone(chan, tone.clamp(0, 0xFFFF) as u16);

            let level = (i32::from(line.level) - i32::from(dst.volume)).clamp(0, 15) as u8;
            let env = if line.env_mask && dst.envelope { MASK_ENV } else { 0 };
            chunk.set(Register::volume(chan), level | env);
            if line.tone_mask {
                mixer |= MixerFlags::tone(chan).bits();
            }
            if line.noise_mask {
                mixer |= MixerFlags::noise(chan).bits();
            } else {
                chunk.set(Register::ToneN, line.noise);
            }

            dst.pos_in_ornament = ornament.next_pos(dst.pos_in_ornament);
            dst.pos_in_sample += 1;
            if dst.pos_in_sample >= sample.lines.len() {
                match sample.loop_pos {
                    Some(loop_pos) => dst.pos_in_sample = loop_pos,
                    None => dst.enabled = false,
                }
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
    use zxtune_common::{attributes, PlaybackState};
    use zxtune_devices::sound::{BufferReceiver, RenderParameters};

    /// Tempo 2, title "Pro Title", one position of pattern 0: channel A plays
    /// note 0x30 with the one-line looped sample 0, B and C are stopped.
    fn module() -> Vec<u8> {
        let mut data = vec![2u8, 0, 0, 0, 0, 0, 0, 0, 0, 0];
        data.extend_from_slice(ID_SIGNATURE);
        data.extend_from_slice(format!("{:<25}", "Pro Title").as_bytes());
        let patterns = data.len() as u16;
        data.extend_from_slice(&[0u8; PATTERN_ENTRY_SIZE]);
        let ornaments = data.len() as u16;
        let ornament = ornaments + 32;
        for _ in 0..ORNAMENTS_COUNT {
            data.extend_from_slice(&ornament.to_le_bytes());
        }
        data.extend_from_slice(&[0, 1, 0]);
        let samples = data.len() as u16;
        let sample = samples + 30;
        for _ in 0..SAMPLES_COUNT {
            data.extend_from_slice(&sample.to_le_bytes());
        }
        data.extend_from_slice(&[0, 1, 0x8F, 0x00, 0x00, 0x00]);
        let positions = data.len() as u16;
        data.extend_from_slice(&[1, 0, 0, 0]);
        let streams = data.len() as u16;
        data.extend_from_slice(&[0xD0, 0xD0, 0x61, 0x31, PATTERN_END]);
        for (idx, off) in [streams + 2, streams, streams + 1].into_iter().enumerate() {
            let at = usize::from(patterns) + idx * 2;
            data[at..at + 2].copy_from_slice(&off.to_le_bytes());
        }
        data[1..3].copy_from_slice(&positions.to_le_bytes());
        data[3..5].copy_from_slice(&patterns.to_le_bytes());
        data[5..7].copy_from_slice(&ornaments.to_le_bytes());
        data[7..9].copy_from_slice(&samples.to_le_bytes());
        data
    }

    /// One-line module data for renderer tests.
    fn single_line(commands: Vec<Command>, transposition: i32) -> StpData {
        let mut line = Line::new(CHANNELS);
        line.channels[0] = crate::tracking::Chan {
            enabled: Some(true),
            note: Some(10),
            sample: Some(0),
            ornament: Some(0),
            volume: None,
            commands,
        };
        StpData {
            positions: vec![Position {
                pattern: 0,
                transposition,
            }],
            loop_position: 0,
            initial_tempo: 1,
            patterns: vec![vec![line]],
            samples: vec![Sample {
                loop_pos: Some(0),
                lines: vec![SampleLine::from_bytes(&[0x8F, 0x01, 0, 0])],
            }],
            ornaments: vec![Ornament::new(0, vec![12])],
            channels: CHANNELS,
        }
    }

    fn render(data: StpData, frames: usize) -> aym::DataChunk {
        let mut renderer = StpRenderer::new(data);
        let mut chunk = aym::DataChunk::new(0);
        for frame in 0..frames {
            let state = TrackState {
                position: 0,
                pattern: 0,
                line: 0,
                frame,
                tempo: frames,
            };
            chunk = aym::DataChunk::new(0);
            renderer.synthesize(&state, &mut chunk);
        }
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
        assert_eq!(info.get(attributes::TITLE), Some("Pro Title"));
        assert_eq!(info.get(attributes::PROGRAM), Some(PROGRAM));
        assert_eq!(info.statistics.frames, 2);
    }

    #[test]
    fn test_rejects_unaligned_position() {
        let mut data = module();
        let positions = usize::from(u16le_at(&data, 1).unwrap());
        data[positions + 2] = 3;
        assert!(!check(&data));
        let mut data = module();
        data[0] = 0;
        assert!(!check(&data));
    }

    #[test]
    fn test_sample_line_bits() {
        let line = SampleLine::from_bytes(&[0x9A, 0x2B, 0xFE, 0xFF]);
        assert_eq!(line.level, 10);
        assert!(line.tone_mask);
        assert!(line.noise_mask);
        assert!(line.env_mask);
        assert_eq!(line.noise, 0x15);
        assert_eq!(line.vibrato, -2);
    }

    #[test]
    fn test_pattern_commands() {
        let data = [0x82, 0xC4, 0x30, 0xF0, 0xFD, 0xF4, 0x6A, 0x25];
        let mut line = Line::new(CHANNELS);
        let mut cursor = ChannelCursor::default();
        parse_row(&data, &mut cursor, &mut line, 1).unwrap();
        assert_eq!(cursor.offset, data.len());
        assert_eq!(cursor.period, 2);
        let chan = &line.channels[1];
        assert_eq!(chan.note, Some(0x24));
        assert_eq!(chan.sample, Some(9));
        assert_eq!(chan.volume, Some(3));
        assert_eq!(chan.ornament, Some(0));
        assert_eq!(
            chan.commands,
            vec![
                Command::Envelope { shape: 4, period: 0x30 },
                Command::Gliss(0),
                Command::Gliss(-3)
            ]
        );
        assert!(parse_row(&[0x00], &mut ChannelCursor::default(), &mut line, 0).is_err());
    }

    #[test]
    fn test_ornament_and_transposition() {
        let chunk = render(single_line(vec![Command::NoEnvelope], 2), 1);
        assert_eq!(tone(&chunk), SOUNDTRACKER[10 + 2 + 12]);
        assert_eq!(chunk.get(Register::VolumeA), Some(15));
        assert_eq!(chunk.get(Register::ToneN), None);
    }

    #[test]
    fn test_envelope_suppresses_ornament() {
        let chunk = render(single_line(vec![Command::Envelope { shape: 8, period: 0x20 }], 0), 1);
        assert_eq!(tone(&chunk), SOUNDTRACKER[10]);
        assert_eq!(chunk.get(Register::EnvelopeShape), Some(8));
        assert_eq!(chunk.get(Register::ToneELo), Some(0x20));
        assert_eq!(chunk.get(Register::VolumeA), Some(15 | MASK_ENV));
    }

    #[test]
    fn test_glissade_accumulates() {
        let chunk = render(single_line(vec![Command::NoEnvelope, Command::Gliss(-3)], 0), 3);
        assert_eq!(tone(&chunk), SOUNDTRACKER[22] - 9);
    }

    #[test]
    fn test_plays_and_stops() {
        let mut player = create(&module()).unwrap().player;
        let params = RenderParameters::default();
        let mut out = BufferReceiver::default();
        assert_eq!(player.render_frame(&params, &mut out), PlaybackState::Playing);
        assert_eq!(player.render_frame(&params, &mut out), PlaybackState::Playing);
        assert_eq!(player.render_frame(&params, &mut out), PlaybackState::Stopped);
        assert!(out.flushed);
    }
}
