//! Sound Tracker (compiled) modules.
//!
//! Layout: 27-byte header (tempo, positions/ornaments/patterns offsets,
//! 18-byte identifier, size) immediately followed by 99-byte sample records.
//! Positions carry a per-entry transposition; ornaments are 33-byte records;
//! the pattern table holds 7-byte entries up to a 0xFF number.

use log::debug;
use zxtune_devices::aym::{self, MixerFlags, Register, MASK_ENV};

use super::tables::{note_period, SOUNDTRACKER};
use super::{aym_player, module_info, mute_bits, Decoded};
use crate::detector::{module_offsets, PlayerPrefix};
use crate::error::{require, FormatError, Result};
use crate::reader::{trimmed_text, u16le_at, u8_at, ByteReader};
use crate::tracking::{
    decode_pattern, ChannelCursor, FrameRenderer, Line, ModuleData, Ornament, Position, TrackModel, TrackState,
};
use crate::warnings::Warnings;

/// Format identifier.
pub const ID: &str = "STC";
/// Editor name reported when the identifier field is blank.
pub const PROGRAM: &str = "Sound Tracker v1.x";

const HEADER_SIZE: usize = 27;
const SAMPLE_SIZE: usize = 99;
const ORNAMENT_SIZE: usize = 33;
const PATTERN_ENTRY_SIZE: usize = 7;
const OBJECT_LINES: usize = 32;
const MAX_SAMPLES: usize = 16;
const MAX_ORNAMENTS: usize = 16;
const MAX_PATTERNS: usize = 32;
const MAX_MODULE_SIZE: usize = 16384;
const PATTERN_TABLE_END: u8 = 0xFF;
const PATTERN_END: u8 = 0xFF;
const CHANNELS: usize = 3;

const PLAYERS: &[PlayerPrefix] = &[PlayerPrefix {
    signature: "21??c3??c3??f37e32??22??23cd??1a133c32??ed53??cd??ed53??d5cd??ed53??21??cd??eb22??21??22??21??11??01??70edb0e101??afcd??3d32??32??32??3e?32??2322??22??22??cd??fbc9",
    player_size: 0x43c,
}];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Envelope { shape: u8, period: u8 },
    NoEnvelope,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct SampleLine {
    level: u8,
    noise: u8,
    noise_mask: bool,
    envelope_mask: bool,
    effect: i32,
}

impl SampleLine {
    // EEEEaaaa NESnnnnn eeeeeeee
    fn from_bytes(b: [u8; 3]) -> Self {
        let magnitude = i32::from(b[2]) | (i32::from(b[0] & 0xF0) << 4);
        Self {
            level: b[0] & 0x0F,
            noise: b[1] & 0x1F,
            noise_mask: b[1] & 0x80 != 0,
            envelope_mask: b[1] & 0x40 != 0,
            effect: if b[1] & 0x20 != 0 { magnitude } else { -magnitude },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Sample {
    lines: Vec<SampleLine>,
    loop_pos: usize,
    loop_limit: usize,
}

impl Default for Sample {
    fn default() -> Self {
        Self {
            lines: vec![SampleLine::default()],
            loop_pos: 0,
            loop_limit: 0,
        }
    }
}

impl Sample {
    fn parse(record: &[u8]) -> Self {
        let lines: Vec<SampleLine> = record[1..1 + OBJECT_LINES * 3]
            .chunks_exact(3)
            .map(|b| SampleLine::from_bytes([b[0], b[1], b[2]]))
            .collect();
        let loop_pos = usize::from(record[SAMPLE_SIZE - 2]);
        let loop_size = usize::from(record[SAMPLE_SIZE - 1]);
        Self {
            loop_pos: loop_pos.min(lines.len()),
            loop_limit: (loop_pos + loop_size + 1).min(lines.len()),
            lines,
        }
    }

    fn line(&self, pos: usize) -> SampleLine {
        self.lines.get(pos).copied().unwrap_or_default()
    }
}

type StcData = ModuleData<Command, Sample>;

struct Header {
    tempo: u8,
    positions_offset: usize,
    ornaments_offset: usize,
    patterns_offset: usize,
    identifier: String,
}

fn read_header(data: &[u8]) -> Result<Header> {
    let mut reader = ByteReader::new(data);
    let tempo = reader.read_u8()?;
    let positions_offset = usize::from(reader.read_u16le()?);
    let ornaments_offset = usize::from(reader.read_u16le()?);
    let patterns_offset = usize::from(reader.read_u16le()?);
    let identifier = trimmed_text(reader.bytes(18)?);
    Ok(Header {
        tempo,
        positions_offset,
        ornaments_offset,
        patterns_offset,
        identifier,
    })
}

fn check_module(data: &[u8]) -> bool {
    let data = &data[..data.len().min(MAX_MODULE_SIZE)];
    let limit = data.len();
    let Ok(header) = read_header(data) else {
        return false;
    };
    let (pos, orn, pat) = (header.positions_offset, header.ornaments_offset, header.patterns_offset);
    if pos > limit || orn > limit || pat > limit {
        return false;
    }
    if HEADER_SIZE >= pos || pos >= orn || orn >= pat {
        return false;
    }
    let Ok(length) = u8_at(data, pos) else {
        return false;
    };
    if (pos - HEADER_SIZE) % SAMPLE_SIZE != 0
        || pos + 1 + (usize::from(length) + 1) * 2 != orn
        || (pat - orn) % ORNAMENT_SIZE != 0
    {
        return false;
    }
    let mut entry = pat;
    loop {
        let Ok(number) = u8_at(data, entry) else {
            return false;
        };
        if number == PATTERN_TABLE_END {
            return true;
        }
        if number != 0 && usize::from(number) < MAX_PATTERNS {
            for chan in 0..CHANNELS {
                match u16le_at(data, entry + 1 + chan * 2) {
                    Ok(off) if usize::from(off) < limit => {}
                    _ => return false,
                }
            }
        }
        entry += PATTERN_ENTRY_SIZE;
    }
}

/// Quick structural test, allowing a compiled player in front of the module.
pub fn check(data: &[u8]) -> bool {
    module_offsets(data, PLAYERS)
        .into_iter()
        .any(|offset| check_module(&data[offset..]))
}

/// Which sample and ornament slots hold data.
struct RowContext {
    samples: [bool; MAX_SAMPLES],
    ornaments: [bool; MAX_ORNAMENTS],
    warnings: Vec<String>,
}

impl RowContext {
    fn warn(&mut self, chan: usize, msg: &str) {
        self.warnings.push(format!("Channel {chan}: {msg}"));
    }
}

fn parse_row(data: &[u8], cursor: &mut ChannelCursor, line: &mut Line<Command>, chan: usize, ctx: &mut RowContext) -> Result<()> {
    let mut reader = ByteReader::at(data, cursor.offset);
    loop {
        let cmd = reader.read_u8()?;
        let channel = &mut line.channels[chan];
        match cmd {
            0x00..=0x5F => {
                channel.note = Some(usize::from(cmd));
                channel.enabled = Some(true);
                break;
            }
            0x60..=0x6F => {
                let num = usize::from(cmd - 0x60);
                if num != 0 && !ctx.samples[num] {
                    ctx.warn(chan, "invalid sample");
                }
                channel.sample = Some(num);
            }
            0x70..=0x7F => {
                let num = usize::from(cmd - 0x70);
                channel.commands.push(Command::NoEnvelope);
                channel.ornament = Some(num);
                if num != 0 && !ctx.ornaments[num] {
                    ctx.warn(chan, "invalid ornament");
                }
            }
            0x80 => {
                channel.enabled = Some(false);
                break;
            }
            0x81 => break,
            0x82..=0x8E => {
                if channel.commands.iter().any(|c| matches!(c, Command::Envelope { .. })) {
                    ctx.warn(chan, "duplicated envelope");
                }
                channel.ornament = Some(0);
                if cmd == 0x82 {
                    channel.commands.push(Command::NoEnvelope);
                } else {
                    let period = reader.read_u8()?;
                    channel.commands.push(Command::Envelope {
                        shape: cmd - 0x80,
                        period,
                    });
                }
            }
            0x8F..=0xA0 => {
                return Err(FormatError::InvalidData {
                    msg: format!("invalid pattern command 0x{cmd:02x} at 0x{:04x}", reader.position() - 1),
                })
            }
            _ => cursor.period = usize::from(cmd - 0xA1),
        }
    }
    cursor.offset = reader.position();
    Ok(())
}

fn decode(data: &[u8], warnings: &mut Warnings) -> Result<(StcData, Header, usize)> {
    let data = &data[..data.len().min(MAX_MODULE_SIZE)];
    let header = read_header(data)?;
    require(check_module(data), || "inconsistent header offsets".to_string())?;

    let mut samples = vec![Sample::default(); MAX_SAMPLES];
    let mut ctx = RowContext {
        samples: [false; MAX_SAMPLES],
        ornaments: [false; MAX_ORNAMENTS],
        warnings: Vec::new(),
    };
    for record in data[HEADER_SIZE..header.positions_offset].chunks_exact(SAMPLE_SIZE) {
        let num = usize::from(record[0]);
        match samples.get_mut(num) {
            Some(slot) => {
                *slot = Sample::parse(record);
                ctx.samples[num] = true;
            }
            None => warnings.add(format!("invalid sample number {num}")),
        }
    }

    let mut ornaments = vec![Ornament::default(); MAX_ORNAMENTS];
    for record in data[header.ornaments_offset..header.patterns_offset].chunks_exact(ORNAMENT_SIZE) {
        let num = usize::from(record[0]);
        match ornaments.get_mut(num) {
            Some(slot) => {
                *slot = Ornament::new(0, record[1..].iter().map(|&b| i32::from(b as i8)).collect());
                ctx.ornaments[num] = true;
            }
            None => warnings.add(format!("invalid ornament number {num}")),
        }
    }

    let mut patterns = vec![Vec::new(); MAX_PATTERNS];
    let mut end = header.patterns_offset;
    let mut entry = header.patterns_offset;
    loop {
        let number = u8_at(data, entry)?;
        if number == PATTERN_TABLE_END {
            end = end.max(entry + 1);
            break;
        }
        let starts = [
            usize::from(u16le_at(data, entry + 1)?),
            usize::from(u16le_at(data, entry + 3)?),
            usize::from(u16le_at(data, entry + 5)?),
        ];
        entry += PATTERN_ENTRY_SIZE;
        let idx = usize::from(number).wrapping_sub(1);
        if idx >= MAX_PATTERNS - 1 {
            warnings.add(format!("invalid pattern number {number}"));
            continue;
        }
        let mut last_offset = 0;
        let mut scope = warnings.scope(format!("Pattern {idx}"));
        let decoded = decode_pattern(data, &starts, PATTERN_END, &mut scope, |chan, cursor, line| {
            parse_row(data, cursor, line, chan, &mut ctx)?;
            last_offset = last_offset.max(cursor.offset);
            Ok(())
        })?;
        for msg in ctx.warnings.drain(..) {
            scope.add(msg);
        }
        end = end.max(last_offset + 1);
        patterns[idx] = decoded;
    }

    let length = usize::from(data[header.positions_offset]);
    let positions: Vec<Position> = data[header.positions_offset + 1..header.ornaments_offset]
        .chunks_exact(2)
        .filter_map(|entry| {
            let pattern = usize::from(entry[0]).wrapping_sub(1);
            patterns.get(pattern).filter(|p| !p.is_empty()).map(|_| Position {
                pattern,
                transposition: i32::from(entry[1] as i8),
            })
        })
        .collect();
    require(!positions.is_empty(), || "no playable positions".to_string())?;
    if positions.len() != length + 1 {
        warnings.add(format!("{} of {} positions are playable", positions.len(), length + 1));
    }
    if header.tempo == 0 {
        warnings.add("zero tempo");
    }

    let module = StcData {
        positions,
        loop_position: 0,
        initial_tempo: usize::from(header.tempo.max(1)),
        patterns,
        samples,
        ornaments,
        channels: CHANNELS,
    };
    Ok((module, header, end.min(data.len())))
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
            Ok((module, header, size)) => {
                debug!("STC at +{offset}: {} positions", module.positions.len());
                let program = if header.identifier.is_empty() { PROGRAM } else { header.identifier.as_str() };
                let info = module_info(ID, "", "", program, warnings);
                return Ok(Decoded {
                    player: aym_player(info, StcRenderer::new(module)),
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
    note: usize,
    sample: usize,
    ornament: usize,
    pos_in_sample: usize,
    looped_in_sample: bool,
}

struct StcRenderer {
    data: StcData,
    channels: [ChannelState; CHANNELS],
}

impl StcRenderer {
    fn new(data: StcData) -> Self {
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
                if !enabled {
                    dst.pos_in_sample = 0;
                }
            }
            if let Some(note) = src.note {
                dst.note = note;
                dst.pos_in_sample = 0;
                dst.looped_in_sample = false;
            }
            if let Some(sample) = src.sample {
                dst.sample = sample;
            }
            if let Some(ornament) = src.ornament {
                dst.ornament = ornament;
            }
            for cmd in &src.commands {
                match *cmd {
                    Command::Envelope { shape, period } => {
                        chunk.set(Register::EnvelopeShape, shape);
                        chunk.set(Register::ToneELo, period);
                        dst.envelope = true;
                    }
                    Command::NoEnvelope => dst.envelope = false,
                }
            }
        }
    }
}

impl FrameRenderer for StcRenderer {
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
            let line = sample.line(dst.pos_in_sample);
            let ornament = self.data.ornaments.get(dst.ornament).unwrap_or(&default_ornament);

            let half_tone = dst.note as i32 + ornament.get(dst.pos_in_sample) + transposition;
            let tone = (i32::from(note_period(&SOUNDTRACKER, half_tone)) + line.effect).clamp(0, 0xFFFF);
            chunk.set_tone(chan, tone as u16);
            let env = if dst.envelope { MASK_ENV } else { 0 };
            chunk.set(Register::volume(chan), line.level | env);
            if line.envelope_mask {
                mixer |= MixerFlags::tone(chan).bits();
            }
            if line.noise_mask {
                mixer |= MixerFlags::noise(chan).bits();
            } else {
                chunk.set(Register::ToneN, line.noise);
            }

            dst.pos_in_sample += 1;
            let limit = if dst.looped_in_sample { sample.loop_limit } else { sample.lines.len() };
            if dst.pos_in_sample >= limit {
                if sample.loop_pos != 0 && sample.loop_pos < sample.lines.len() {
                    dst.pos_in_sample = sample.loop_pos;
                    dst.looped_in_sample = true;
                } else {
                    dst.enabled = false;
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

    /// Tempo 3, one position of pattern 1 transposed by `transposition`.
    /// Channel A plays note 0x30 with sample 1 (level 15, noise masked,
    /// 32 lines without loop); B and C are stopped.
    fn module(transposition: i8) -> Vec<u8> {
        let mut data = vec![0u8; HEADER_SIZE];
        data[0] = 3;
        data[7..25].copy_from_slice(b"SONG BY ST COMPILE");
        let mut sample = vec![0u8; SAMPLE_SIZE];
        sample[0] = 1;
        for line in sample[1..1 + OBJECT_LINES * 3].chunks_exact_mut(3) {
            line.copy_from_slice(&[0x0F, 0xA0, 0x00]);
        }
        data.extend_from_slice(&sample);
        let positions = data.len() as u16;
        data.extend_from_slice(&[0, 1, transposition as u8]);
        let ornaments = data.len() as u16;
        data.push(0);
        data.extend_from_slice(&[0u8; OBJECT_LINES]);
        let patterns = data.len() as u16;
        let streams = patterns + 8;
        data.push(1);
        for off in [streams + 2, streams, streams + 1] {
            data.extend_from_slice(&off.to_le_bytes());
        }
        data.push(PATTERN_TABLE_END);
        data.extend_from_slice(&[0x80, 0x80]);
        data.extend_from_slice(&[0x61, 0x30, PATTERN_END]);
        data[1..3].copy_from_slice(&positions.to_le_bytes());
        data[3..5].copy_from_slice(&ornaments.to_le_bytes());
        data[5..7].copy_from_slice(&patterns.to_le_bytes());
        data
    }

    fn first_chunk(data: &[u8]) -> aym::DataChunk {
        let mut warnings = Warnings::new();
        let (module, _, _) = decode(data, &mut warnings).unwrap();
        let mut renderer = StcRenderer::new(module);
        let state = TrackState {
            position: 0,
            pattern: 0,
            line: 0,
            frame: 0,
            tempo: 3,
        };
        let mut chunk = aym::DataChunk::new(0);
        renderer.synthesize(&state, &mut chunk);
        chunk
    }

    #[test]
    fn test_check_and_properties() {
        let data = module(0);
        assert!(check(&data));
        let decoded = create(&data).unwrap();
        assert_eq!(decoded.size, data.len());
        let info = decoded.player.information();
        assert_eq!(info.get(attributes::TYPE), Some(ID));
        assert_eq!(info.get(attributes::PROGRAM), Some("SONG BY ST COMPILE"));
        assert_eq!(info.statistics.frames, 3);
        assert_eq!(info.get(attributes::WARNINGS), None);
    }

    #[test]
    fn test_rejects_misaligned_offsets() {
        let mut data = module(0);
        let positions = u16le_at(&data, 1).unwrap();
        data[1..3].copy_from_slice(&(positions + 1).to_le_bytes());
        assert!(!check(&data));
        assert!(!check(&data[..HEADER_SIZE - 1]));
    }

    #[test]
    fn test_sample_line_bits() {
        let line = SampleLine::from_bytes([0x3A, 0x65, 0x10]);
        assert_eq!(line.level, 10);
        assert_eq!(line.noise, 5);
        assert!(line.envelope_mask);
        assert!(!line.noise_mask);
        assert_eq!(line.effect, 0x310);
        assert_eq!(SampleLine::from_bytes([0x10, 0x80, 0x01]).effect, -0x101);
    }

    #[test]
    fn test_pattern_commands() {
        let data = [0xA3, 0x72, 0x85, 0x40, 0x64, 0x10, 0x81];
        let mut ctx = RowContext {
            samples: [false; MAX_SAMPLES],
            ornaments: [false; MAX_ORNAMENTS],
            warnings: Vec::new(),
        };
        ctx.ornaments[2] = true;
        let mut line = Line::new(CHANNELS);
        let mut cursor = ChannelCursor::default();
        parse_row(&data, &mut cursor, &mut line, 2, &mut ctx).unwrap();
        assert_eq!(cursor.offset, 6);
        assert_eq!(cursor.period, 2);
        let chan = &line.channels[2];
        assert_eq!(chan.ornament, Some(0));
        assert_eq!(chan.sample, Some(4));
        assert_eq!(chan.note, Some(0x10));
        assert_eq!(
            chan.commands,
            vec![Command::NoEnvelope, Command::Envelope { shape: 5, period: 0x40 }]
        );
        assert_eq!(ctx.warnings, vec!["Channel 2: invalid sample".to_string()]);
        assert!(parse_row(&[0x90], &mut ChannelCursor::default(), &mut line, 0, &mut ctx).is_err());
    }

    #[test]
    fn test_transposed_tone() {
        let chunk = first_chunk(&module(0));
        assert_eq!(chunk.get(Register::ToneALo), Some((SOUNDTRACKER[0x30] & 0xFF) as u8));
        assert_eq!(chunk.get(Register::VolumeA), Some(15));
        assert_eq!(chunk.get(Register::VolumeB), Some(0));
        let mixer = chunk.get(Register::Mixer).unwrap();
        assert_eq!(mixer, MixerFlags::noise(0).bits() | mute_bits(1) | mute_bits(2));

        let chunk = first_chunk(&module(-12));
        assert_eq!(chunk.get(Register::ToneALo), Some((SOUNDTRACKER[0x30 - 12] & 0xFF) as u8));
        assert_eq!(chunk.get(Register::ToneAHi), Some((SOUNDTRACKER[0x30 - 12] >> 8) as u8));
    }

    #[test]
    fn test_sample_end_disables_channel() {
        let mut warnings = Warnings::new();
        let (module, _, _) = decode(&module(0), &mut warnings).unwrap();
        let mut renderer = StcRenderer::new(module);
        let mut state = TrackState {
            position: 0,
            pattern: 0,
            line: 0,
            frame: 0,
            tempo: 64,
        };
        for frame in 0..OBJECT_LINES {
            state.frame = frame;
            let mut chunk = aym::DataChunk::new(0);
            renderer.synthesize(&state, &mut chunk);
            assert_eq!(chunk.get(Register::VolumeA), Some(15));
        }
        state.frame = OBJECT_LINES;
        let mut chunk = aym::DataChunk::new(0);
        renderer.synthesize(&state, &mut chunk);
        assert_eq!(chunk.get(Register::VolumeA), Some(0));
    }

    #[test]
    fn test_plays_and_stops() {
        let mut player = create(&module(0)).unwrap().player;
        let params = RenderParameters::default();
        let mut out = BufferReceiver::default();
        for _ in 0..3 {
            assert_eq!(player.render_frame(&params, &mut out), PlaybackState::Playing);
        }
        assert_eq!(player.render_frame(&params, &mut out), PlaybackState::Stopped);
        assert!(out.flushed);
    }
}
