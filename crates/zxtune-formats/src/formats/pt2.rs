//! ProTracker 2.x modules.
//!
//! Layout: 132-byte header (tempo, length, loop, 32 sample offsets,
//! 16 ornament offsets, pattern table offset, 30-byte title) followed by the
//! position list terminated with 0xFF. Patterns are triples of channel stream
//! offsets; the table ends at the first triple holding a zero.

use log::debug;
use zxtune_devices::aym::{self, MixerFlags, Register, MASK_ENV};

use super::tables::{note_period, PROTRACKER2};
use super::{aym_player, module_info, Decoded};
use crate::detector::{module_offsets, PlayerPrefix};
use crate::error::{require, FormatError, Result};
use crate::reader::{ensure_range, trimmed_text, ByteReader};
use crate::tracking::{
    decode_pattern, FrameRenderer, Line, ModuleData, Ornament, Position, TrackModel, TrackState,
};
use crate::warnings::Warnings;

/// Format identifier.
pub const ID: &str = "PT2";
/// Editor name reported in module properties.
pub const PROGRAM: &str = "ProTracker v2.x";

const HEADER_SIZE: usize = 132;
const SAMPLES_COUNT: usize = 32;
const ORNAMENTS_COUNT: usize = 16;
const POSITIONS_OFFSET: usize = 131;
const POS_END_MARKER: u8 = 0xFF;
const MAX_PATTERNS: usize = 64;
const CHANNELS: usize = 3;

const PLAYERS: &[PlayerPrefix] = &[
    PlayerPrefix {
        signature: "21??c3??c3+14+322e31",
        player_size: 0xa2f,
    },
    PlayerPrefix {
        signature: "21??1803c3??f3e57e32??32??23237e23",
        player_size: 2629,
    },
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Envelope { shape: u8, period: u16 },
    NoEnvelope,
    Gliss(i32),
    GlissNote { step: i32, target: usize },
    NoGliss,
    NoiseAdd(i32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SampleLine {
    level: u8,
    noise: u8,
    tone_off: bool,
    noise_off: bool,
    vibrato: i32,
}

const SILENT_LINE: SampleLine = SampleLine {
    level: 0,
    noise: 0,
    tone_off: true,
    noise_off: true,
    vibrato: 0,
};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Sample {
    loop_pos: usize,
    lines: Vec<SampleLine>,
}

impl Sample {
    fn line(&self, pos: usize) -> &SampleLine {
        self.lines.get(pos).unwrap_or(&SILENT_LINE)
    }

    fn next_pos(&self, pos: usize) -> usize {
        if pos + 1 >= self.lines.len() {
            self.loop_pos
        } else {
            pos + 1
        }
    }
}

type Pt2Data = ModuleData<Command, Sample>;

struct Header {
    tempo: u8,
    length: u8,
    loop_pos: u8,
    samples: [u16; SAMPLES_COUNT],
    ornaments: [u16; ORNAMENTS_COUNT],
    patterns_offset: usize,
    title: String,
}

fn read_header(data: &[u8]) -> Result<Header> {
    let mut reader = ByteReader::new(data);
    let tempo = reader.read_u8()?;
    let length = reader.read_u8()?;
    let loop_pos = reader.read_u8()?;
    let mut samples = [0u16; SAMPLES_COUNT];
    for off in &mut samples {
        *off = reader.read_u16le()?;
    }
    let mut ornaments = [0u16; ORNAMENTS_COUNT];
    for off in &mut ornaments {
        *off = reader.read_u16le()?;
    }
    let patterns_offset = usize::from(reader.read_u16le()?);
    let title = trimmed_text(reader.bytes(30)?);
    Ok(Header {
        tempo,
        length,
        loop_pos,
        samples,
        ornaments,
        patterns_offset,
        title,
    })
}

/// Object at a nonzero offset must start with `size >= loop`.
fn valid_object(data: &[u8], offset: u16) -> bool {
    let offset = usize::from(offset);
    match (data.get(offset), data.get(offset + 1)) {
        _ if offset == 0 => true,
        (Some(&size), Some(&lp)) => size >= lp,
        _ => false,
    }
}

fn check_module(data: &[u8]) -> bool {
    let Ok(header) = read_header(data) else {
        return false;
    };
    let length = usize::from(header.length);
    if header.tempo < 2 || length < 1 || header.loop_pos >= header.length || HEADER_SIZE + length + 1 > data.len() {
        return false;
    }
    // the end marker must follow exactly `length` positions
    let positions = &data[POSITIONS_OFFSET..POSITIONS_OFFSET + length];
    if positions.contains(&POS_END_MARKER) || data[POSITIONS_OFFSET + length] != POS_END_MARKER {
        return false;
    }
    let low_limit = POSITIONS_OFFSET + length + 1;
    let in_body = |offset: usize| (low_limit..data.len()).contains(&offset);
    if !in_body(header.patterns_offset)
        || !header.samples.iter().all(|&off| valid_object(data, off))
        || !header.ornaments.iter().all(|&off| valid_object(data, off))
    {
        return false;
    }
    let mut reader = ByteReader::at(data, header.patterns_offset);
    let mut patterns = 0;
    loop {
        let Ok(bytes) = reader.bytes(6) else {
            return false;
        };
        let starts: Vec<usize> = bytes
            .chunks_exact(2)
            .map(|w| usize::from(u16::from_le_bytes([w[0], w[1]])))
            .collect();
        if starts.contains(&0) {
            break;
        }
        if patterns == MAX_PATTERNS || !starts.iter().all(|&off| in_body(off)) {
            return false;
        }
        patterns += 1;
    }
    patterns != 0 && positions.iter().all(|&p| usize::from(p) < patterns)
}

/// Quick structural test, allowing a compiled player in front of the module.
pub fn check(data: &[u8]) -> bool {
    module_offsets(data, PLAYERS)
        .into_iter()
        .any(|offset| check_module(&data[offset..]))
}

fn parse_sample(data: &[u8], offset: u16) -> Result<(Sample, usize)> {
    if offset == 0 {
        return Ok((Sample::default(), 0));
    }
    let offset = usize::from(offset);
    let mut reader = ByteReader::at(data, offset);
    let size = usize::from(reader.read_u8()?);
    let loop_pos = usize::from(reader.read_u8()?);
    require(size >= loop_pos, || format!("sample at 0x{offset:04x}: loop {loop_pos} past size {size}"))?;
    let raw = reader.bytes(size * 3)?;
    let lines = raw
        .chunks_exact(3)
        .map(|b| {
            let magnitude = i32::from(b[2]) | (i32::from(b[1] & 0x0F) << 8);
            SampleLine {
                level: b[1] >> 4,
                noise: b[0] >> 3,
                tone_off: b[0] & 0x02 != 0,
                noise_off: b[0] & 0x01 != 0,
                vibrato: if b[0] & 0x04 != 0 { magnitude } else { -magnitude },
            }
        })
        .collect();
    let loop_pos = loop_pos.min(size.saturating_sub(1));
    Ok((Sample { loop_pos, lines }, reader.position()))
}

fn parse_ornament(data: &[u8], offset: u16) -> Result<(Ornament, usize)> {
    if offset == 0 {
        return Ok((Ornament::default(), 0));
    }
    let offset = usize::from(offset);
    let mut reader = ByteReader::at(data, offset);
    let size = usize::from(reader.read_u8()?);
    let loop_pos = usize::from(reader.read_u8()?);
    require(size >= loop_pos, || format!("ornament at 0x{offset:04x}: loop {loop_pos} past size {size}"))?;
    let lines = reader.bytes(size)?.iter().map(|&b| i32::from(b as i8)).collect();
    Ok((Ornament::new(loop_pos, lines), reader.position()))
}

fn parse_row(data: &[u8], offset: &mut usize, period: &mut usize, line: &mut Line<Command>, chan: usize) -> Result<()> {
    let mut reader = ByteReader::at(data, *offset);
    loop {
        let cmd = reader.read_u8()?;
        let channel = &mut line.channels[chan];
        match cmd {
            0xE1..=0xFF => channel.sample = Some(usize::from(cmd - 0xE0)),
            0xE0 => {
                channel.enabled = Some(false);
                break;
            }
            0x80..=0xDF => {
                channel.enabled = Some(true);
                let note = usize::from(cmd - 0x80);
                match channel.find_command(|c| matches!(c, Command::GlissNote { .. })) {
                    Some(Command::GlissNote { target, .. }) => *target = note,
                    _ => channel.note = Some(note),
                }
                break;
            }
            0x7F => channel.commands.push(Command::NoEnvelope),
            0x71..=0x7E => {
                let env_period = reader.read_u16le()?;
                channel.commands.push(Command::Envelope {
                    shape: cmd - 0x70,
                    period: env_period,
                });
            }
            0x70 => break,
            0x60..=0x6F => channel.ornament = Some(usize::from(cmd - 0x60)),
            0x20..=0x5F => *period = usize::from(cmd - 0x20),
            0x10..=0x1F => channel.volume = Some(cmd - 0x10),
            0x0F => line.tempo = Some(usize::from(reader.read_u8()?)),
            0x0E => channel.commands.push(Command::Gliss(i32::from(reader.read_i8()?))),
            0x0D => {
                let step = i32::from(reader.read_i8()?);
                // two more bytes of precomputed delta, ignored
                reader.skip(2)?;
                channel.commands.push(Command::GlissNote { step, target: 0 });
            }
            0x0C => channel.commands.push(Command::NoGliss),
            _ => channel.commands.push(Command::NoiseAdd(i32::from(reader.read_i8()?))),
        }
    }
    *offset = reader.position();
    Ok(())
}

fn decode(data: &[u8], warnings: &mut Warnings) -> Result<(Pt2Data, Header, usize)> {
    require(data.len() >= HEADER_SIZE, || "too small for header".to_string())?;
    let header = read_header(data)?;
    let mut end = HEADER_SIZE;

    let mut samples = Vec::with_capacity(SAMPLES_COUNT);
    for &off in &header.samples {
        let (sample, sample_end) = parse_sample(data, off)?;
        end = end.max(sample_end);
        samples.push(sample);
    }
    let mut ornaments = Vec::with_capacity(ORNAMENTS_COUNT);
    for &off in &header.ornaments {
        let (ornament, orn_end) = parse_ornament(data, off)?;
        end = end.max(orn_end);
        ornaments.push(ornament);
    }

    let length = usize::from(header.length);
    ensure_range(POSITIONS_OFFSET, length + 1, data.len())?;
    let raw_positions = &data[POSITIONS_OFFSET..POSITIONS_OFFSET + length];
    let positions: Vec<Position> = raw_positions
        .iter()
        .take_while(|&&p| p != POS_END_MARKER)
        .map(|&p| Position::new(usize::from(p)))
        .collect();
    require(!positions.is_empty(), || "no positions".to_string())?;
    if positions.len() != length {
        warnings.add(format!("position list ends at {} of declared {length}", positions.len()));
    }
    end = end.max(POSITIONS_OFFSET + length + 1);

    let mut patterns = Vec::new();
    let mut table = ByteReader::at(data, header.patterns_offset);
    loop {
        let starts = [
            usize::from(table.read_u16le()?),
            usize::from(table.read_u16le()?),
            usize::from(table.read_u16le()?),
        ];
        if starts.contains(&0) {
            break;
        }
        if patterns.len() >= MAX_PATTERNS {
            warnings.add(format!("pattern table truncated at {MAX_PATTERNS} entries"));
            break;
        }
        let idx = patterns.len();
        let mut scope = warnings.scope(format!("Pattern {idx}"));
        let pattern = decode_pattern(data, &starts, 0, &mut scope, |chan, cursor, line| {
            parse_row(data, &mut cursor.offset, &mut cursor.period, line, chan)?;
            end = end.max(cursor.offset + 1);
            Ok(())
        })?;
        patterns.push(pattern);
    }
    end = end.max(table.position());

    for (idx, pos) in positions.iter().enumerate() {
        if pos.pattern >= patterns.len() {
            return Err(FormatError::InvalidData {
                msg: format!("position {idx} refers to missing pattern {}", pos.pattern),
            });
        }
    }
    let mut loop_position = usize::from(header.loop_pos);
    if loop_position >= positions.len() {
        warnings.add(format!("loop position {loop_position} out of range"));
        loop_position = 0;
    }
    let module = Pt2Data {
        positions,
        loop_position,
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
                debug!("PT2 at +{offset}: {} positions, {} patterns", module.positions.len(), module.patterns.len());
                let info = module_info(ID, &header.title, "", PROGRAM, warnings);
                return Ok(Decoded {
                    player: aym_player(info, Pt2Renderer::new(module)),
                    size: offset + size,
                });
            }
            Err(err) => last_error = err,
        }
    }
    Err(last_error)
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
    noise_add: i32,
    sliding: i32,
    target_note: Option<usize>,
    glissade: i32,
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
            noise_add: 0,
            sliding: 0,
            target_note: None,
            glissade: 0,
        }
    }
}

/// Channel volume scaled by a sample level, both 0..=15.
fn scaled_volume(volume: u8, level: u8) -> u8 {
    let volume = u32::from(volume);
    (((volume * 17 + u32::from(volume > 7)) * u32::from(level)) >> 8) as u8
}

struct Pt2Renderer {
    data: Pt2Data,
    channels: [ChannelState; CHANNELS],
}

impl Pt2Renderer {
    fn new(data: Pt2Data) -> Self {
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
                    dst.sliding = 0;
                    dst.glissade = 0;
                    dst.target_note = None;
                    dst.pos_in_sample = 0;
                    dst.pos_in_ornament = 0;
                }
            }
            if let Some(note) = src.note {
                dst.note = note;
                dst.pos_in_sample = 0;
                dst.pos_in_ornament = 0;
                dst.sliding = 0;
                dst.glissade = 0;
                dst.target_note = None;
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
                        chunk.set(Register::EnvelopeShape, shape);
                        chunk.set_envelope_period(period);
                        dst.envelope = true;
                    }
                    Command::NoEnvelope => dst.envelope = false,
                    Command::NoiseAdd(add) => dst.noise_add = add,
                    Command::GlissNote { step, target } => {
                        dst.glissade = step;
                        dst.target_note = Some(target);
                    }
                    Command::Gliss(step) => dst.glissade = step,
                    Command::NoGliss => dst.glissade = 0,
                }
            }
        }
    }
}

impl FrameRenderer for Pt2Renderer {
    type Chunk = aym::DataChunk;

    fn model(&self) -> &dyn TrackModel {
        &self.data
    }

    fn synthesize(&mut self, state: &TrackState, chunk: &mut aym::DataChunk) {
        if state.is_line_start() {
            self.apply_line(state, chunk);
        }
        let mut mixer = MixerFlags::empty();
        let default_sample = Sample::default();
        let default_ornament = Ornament::default();
        for (chan, dst) in self.channels.iter_mut().enumerate() {
            if !dst.enabled {
                chunk.set(Register::volume(chan), 0);
                mixer |= MixerFlags::tone(chan) | MixerFlags::noise(chan);
                continue;
            }
            let sample = self.data.samples.get(dst.sample).unwrap_or(&default_sample);
            let line = *sample.line(dst.pos_in_sample);
            let ornament = self.data.ornaments.get(dst.ornament).unwrap_or(&default_ornament);

            let half_tone = dst.note as i32 + ornament.get(dst.pos_in_ornament);
            let base = i32::from(note_period(&PROTRACKER2, half_tone));
            let tone = (base + dst.sliding + line.vibrato).clamp(0, 0xFFFF) as u16;
            if let Some(target) = dst.target_note {
                let next = i32::from(note_period(&PROTRACKER2, dst.note as i32)) + dst.sliding + dst.glissade;
                let limit = i32::from(note_period(&PROTRACKER2, target as i32));
                if (dst.glissade > 0 && next >= limit) || (dst.glissade < 0 && next <= limit) {
                    dst.note = target;
                    dst.target_note = None;
                    dst.sliding = 0;
                    dst.glissade = 0;
                }
            }
            dst.sliding += dst.glissade;
            chunk.set_tone(chan, tone);

            let env = if dst.envelope { MASK_ENV } else { 0 };
            chunk.set(Register::volume(chan), scaled_volume(dst.volume, line.level) | env);
            if line.tone_off {
                mixer |= MixerFlags::tone(chan);
            }
            if line.noise_off {
                mixer |= MixerFlags::noise(chan);
            } else {
                let noise = (i32::from(line.noise) + dst.noise_add).clamp(0, 31);
                chunk.set(Register::ToneN, noise as u8);
            }
            dst.pos_in_sample = sample.next_pos(dst.pos_in_sample);
            dst.pos_in_ornament = ornament.next_pos(dst.pos_in_ornament);
        }
        chunk.set(Register::Mixer, mixer.bits());
    }

    fn reset(&mut self) {
        self.channels = Default::default();
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use zxtune_common::{attributes, PlaybackState};
    use zxtune_devices::sound::{BufferReceiver, RenderParameters};

    /// Module with tempo 4 and a single one-line pattern: C-1 with sample 1 on
    /// channel A, B and C stopped.
    pub(crate) fn single_note_module() -> Vec<u8> {
        let mut data = vec![0u8; HEADER_SIZE];
        data[0] = 4;
        data[1] = 1;
        data[2] = 0;
        data[POSITIONS_OFFSET] = 0;
        data.push(POS_END_MARKER);
        // sample 1: two lines, level 12, tone on, noise off
        let sample_off = data.len() as u16;
        data.extend_from_slice(&[2, 0, 0x05, 0xC0, 0x00, 0x05, 0xC0, 0x00]);
        data[3 + 2..3 + 4].copy_from_slice(&sample_off.to_le_bytes());
        // pattern table
        let table_off = data.len() as u16;
        data[3 + 64 + 32..3 + 64 + 34].copy_from_slice(&table_off.to_le_bytes());
        let chan_a = table_off + 12;
        let chan_b = chan_a + 3;
        let chan_c = chan_b + 2;
        for off in [chan_a, chan_b, chan_c] {
            data.extend_from_slice(&off.to_le_bytes());
        }
        data.extend_from_slice(&[0, 0, 0, 0, 0, 0]);
        data.extend_from_slice(&[0xE1, 0x80, 0x00]);
        data.extend_from_slice(&[0xE0, 0x00]);
        data.extend_from_slice(&[0xE0, 0x00]);
        data[101..107].copy_from_slice(b"Single");
        data
    }

    #[test]
    fn test_check_and_decode_header() {
        let data = single_note_module();
        assert!(check(&data));
        let decoded = create(&data).unwrap();
        let info = decoded.player.information();
        assert_eq!(info.get(attributes::TYPE), Some(ID));
        assert_eq!(info.get(attributes::TITLE), Some("Single"));
        assert_eq!(info.statistics.frames, 4);
        assert_eq!(info.statistics.patterns, 1);
        assert_eq!(decoded.size, data.len());
    }

    #[test]
    fn test_rejects_bad_offsets() {
        let mut data = single_note_module();
        data[3..5].copy_from_slice(&0xFFF0u16.to_le_bytes());
        assert!(!check(&data));
        assert!(!check(&data[..100]));
    }

    #[test]
    fn test_rejects_inconsistent_header() {
        let patch = |idx: usize, value: u8| {
            let mut data = single_note_module();
            data[idx] = value;
            data
        };
        // tempo below 2
        assert!(!check(&patch(0, 1)));
        // loop past the end
        assert!(!check(&patch(2, 5)));
        // empty position list
        assert!(!check(&patch(1, 0)));
        // declared length disagrees with the end marker
        assert!(!check(&patch(1, 2)));
        // position refers to a missing pattern
        assert!(!check(&patch(POSITIONS_OFFSET, 7)));
    }

    #[test]
    fn test_rejects_bad_pattern_table() {
        let data = single_note_module();
        let table = usize::from(u16::from_le_bytes([data[99], data[100]]));

        // table starting with the terminator
        let mut empty = data.clone();
        empty[table..table + 2].copy_from_slice(&[0, 0]);
        assert!(!check(&empty));

        // table inside the position list
        let mut low = data.clone();
        low[99..101].copy_from_slice(&(POSITIONS_OFFSET as u16).to_le_bytes());
        assert!(!check(&low));

        // channel stream outside the data
        let mut outside = data.clone();
        outside[table + 2..table + 4].copy_from_slice(&0xF000u16.to_le_bytes());
        assert!(!check(&outside));
    }

    #[test]
    fn test_pattern_commands() {
        let data = [0xE3, 0x6A, 0x1C, 0x22, 0x0F, 0x05, 0x74, 0x34, 0x12, 0x0D, 0x02, 0, 0, 0x90];
        let mut line = Line::new(CHANNELS);
        let (mut offset, mut period) = (0, 0);
        parse_row(&data, &mut offset, &mut period, &mut line, 1).unwrap();
        assert_eq!(offset, data.len());
        assert_eq!(period, 2);
        assert_eq!(line.tempo, Some(5));
        let chan = &line.channels[1];
        assert_eq!(chan.sample, Some(3));
        assert_eq!(chan.ornament, Some(10));
        assert_eq!(chan.volume, Some(12));
        assert_eq!(chan.enabled, Some(true));
        assert_eq!(chan.note, None);
        assert_eq!(
            chan.commands,
            vec![
                Command::Envelope { shape: 4, period: 0x1234 },
                Command::GlissNote { step: 2, target: 0x10 }
            ]
        );
    }

    #[test]
    fn test_sample_vibrato_sign() {
        let data = [0, 2, 0, 0x04, 0xF1, 0x23, 0x01, 0x01, 0x10];
        let (sample, end) = parse_sample(&data, 1).unwrap();
        assert_eq!(end, data.len());
        assert_eq!(sample.lines[0].vibrato, 0x123);
        assert_eq!(sample.lines[0].level, 15);
        assert_eq!(sample.lines[1].vibrato, -0x110);
        assert!(sample.lines[1].noise_off);
    }

    #[test]
    fn test_scaled_volume() {
        assert_eq!(scaled_volume(15, 12), 12);
        assert_eq!(scaled_volume(0, 15), 0);
        assert_eq!(scaled_volume(8, 15), 8);
    }

    #[test]
    fn test_single_note_holds_tone_and_level() {
        let data = single_note_module();
        let (module, _, _) = decode(&data, &mut Warnings::new()).unwrap();
        let mut renderer = Pt2Renderer::new(module);
        let period = note_period(&PROTRACKER2, 0);
        for frame in 0..4 {
            let state = TrackState {
                position: 0,
                pattern: 0,
                line: 0,
                frame,
                tempo: 4,
            };
            let mut chunk = aym::DataChunk::default();
            renderer.synthesize(&state, &mut chunk);
            assert_eq!(chunk.get(Register::ToneALo), Some((period & 0xFF) as u8), "frame {frame}");
            assert_eq!(chunk.get(Register::ToneAHi), Some((period >> 8) as u8), "frame {frame}");
            // level 12 at the default channel volume 15
            assert_eq!(chunk.get(Register::VolumeA), Some(scaled_volume(15, 12)), "frame {frame}");
            assert_eq!(chunk.get(Register::VolumeB), Some(0));
            assert_eq!(chunk.get(Register::VolumeC), Some(0));
        }
        assert_eq!(scaled_volume(15, 12), 12);
    }

    #[test]
    fn test_renders_and_stops() {
        let data = single_note_module();
        let mut player = create(&data).unwrap().player;
        let params = RenderParameters::default();
        let mut out = BufferReceiver::default();
        for _ in 0..4 {
            assert_eq!(player.render_frame(&params, &mut out), PlaybackState::Playing);
        }
        assert!(!out.flushed);
        assert_eq!(player.render_frame(&params, &mut out), PlaybackState::Stopped);
        assert!(out.flushed);
    }
}
