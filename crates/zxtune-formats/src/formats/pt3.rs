//! ProTracker 3.x and Vortex Tracker II modules.
//!
//! The 202-byte header carries the editor id (its 14th byte is the
//! subversion digit), title, author, note table index, tempo, play order
//! length and loop, the pattern table offset and 32 sample / 16 ornament
//! offsets. The play order follows at 201; entries are pattern index * 3 and
//! the list ends with 0xFF right before the pattern table.

use log::debug;
use zxtune_common::Information;

use super::vortex::{Command, Sample, SampleLine, Tables, VortexData, VortexRenderer, CHANNELS};
use super::{aym_player, module_info, Decoded};
use crate::detector::{module_offsets, PlayerPrefix};
use crate::error::{require, FormatError, Result};
use crate::reader::{peek_u16le, trimmed_text, u16le_at, ByteReader};
use crate::tracking::{decode_pattern, ChannelCursor, Line, Ornament, Pattern, Position};
use crate::warnings::Warnings;

/// Format identifier.
pub const ID: &str = "PT3";

const HEADER_SIZE: usize = 202;
const POSITIONS_OFFSET: usize = 201;
const POS_END_MARKER: u8 = 0xFF;
const SAMPLES_COUNT: usize = 32;
const ORNAMENTS_COUNT: usize = 16;
const MAX_SAMPLE_SIZE: usize = 64;
const MAX_ORNAMENT_SIZE: usize = 64;
const PATTERN_ENTRY_SIZE: usize = 6;

const PLAYERS: &[PlayerPrefix] = &[
    PlayerPrefix {
        signature: "21??18?c3??c3+35+f322??22??22??22??01640009",
        player_size: 0xe21,
    },
    PlayerPrefix {
        signature: "21??18?c3??c3+37+f3ed73??22??22??22??22??01640009",
        player_size: 0x30f,
    },
];

struct Header {
    program: String,
    subversion: u8,
    title: String,
    author: String,
    freq_table: u8,
    tempo: u8,
    length: usize,
    loop_pos: usize,
    patterns_offset: usize,
    samples: [u16; SAMPLES_COUNT],
    ornaments: [u16; ORNAMENTS_COUNT],
}

fn read_header(data: &[u8]) -> Result<Header> {
    let mut reader = ByteReader::new(data);
    let id = reader.bytes(14)?;
    let program = trimmed_text(id);
    let subversion = id[13];
    reader.skip(16)?;
    let title = trimmed_text(reader.bytes(32)?);
    reader.skip(4)?;
    let author = trimmed_text(reader.bytes(32)?);
    reader.skip(1)?;
    let freq_table = reader.read_u8()?;
    let tempo = reader.read_u8()?;
    let length = usize::from(reader.read_u8()?);
    let loop_pos = usize::from(reader.read_u8()?);
    let patterns_offset = usize::from(reader.read_u16le()?);
    let mut samples = [0u16; SAMPLES_COUNT];
    for off in &mut samples {
        *off = reader.read_u16le()?;
    }
    let mut ornaments = [0u16; ORNAMENTS_COUNT];
    for off in &mut ornaments {
        *off = reader.read_u16le()?;
    }
    Ok(Header {
        program,
        subversion,
        title,
        author,
        freq_table,
        tempo,
        length,
        loop_pos,
        patterns_offset,
        samples,
        ornaments,
    })
}

fn check_module(data: &[u8]) -> bool {
    if data.len() < HEADER_SIZE {
        return false;
    }
    let length = usize::from(data[101]);
    let Some(pat_off) = peek_u16le(data, 103).map(usize::from) else {
        return false;
    };
    let Some(first_ornament) = peek_u16le(data, 169).map(usize::from) else {
        return false;
    };
    length != 0
        && pat_off < data.len()
        && POSITIONS_OFFSET + length + 1 == pat_off
        && data[pat_off - 1] == POS_END_MARKER
        && data[POSITIONS_OFFSET..pat_off - 1].iter().all(|p| p % 3 == 0)
        && first_ornament + 3 <= data.len()
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
    let loop_pos = usize::from(reader.read_u8()?);
    let size = usize::from(reader.read_u8()?);
    if size == 0 {
        return Ok((Sample::default(), 0));
    }
    let lines = reader
        .bytes(size * 4)?
        .chunks_exact(4)
        .map(|b| SampleLine::from_bytes([b[0], b[1], b[2], b[3]]))
        .collect();
    Ok((Sample::new(loop_pos, lines), reader.position()))
}

fn safe_ornament() -> Ornament {
    Ornament::new(0, vec![0])
}

fn parse_ornament(data: &[u8], offset: u16) -> Result<(Ornament, usize)> {
    let offset = usize::from(offset);
    if offset == 0 || offset >= data.len() {
        return Ok((safe_ornament(), 0));
    }
    let mut reader = ByteReader::at(data, offset);
    let loop_pos = usize::from(reader.read_u8()?);
    let size = usize::from(reader.read_u8()?);
    if size == 0 {
        return Ok((safe_ornament(), 0));
    }
    let lines = reader.bytes(size)?.iter().map(|&b| i32::from(b as i8)).collect();
    Ok((Ornament::new(loop_pos, lines), reader.position()))
}

/// Command whose parameters follow the row's terminating opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pending {
    Ready(Command),
    Gliss,
    GlissNote { target: usize },
    SampleOffset,
    OrnamentOffset,
    Vibrate,
    SlideEnvelope,
    Tempo,
}

struct RowContext<'a> {
    samples: &'a [Sample],
    ornaments: &'a [Ornament],
    warnings: Vec<String>,
}

impl RowContext<'_> {
    fn warn(&mut self, chan: usize, msg: &str) {
        self.warnings.push(format!("Channel {chan}: {msg}"));
    }

    fn sample_index(&mut self, chan: usize, doubled: u8) -> usize {
        let doubled = usize::from(doubled);
        if doubled < SAMPLES_COUNT * 2 && doubled % 2 == 0 {
            doubled / 2
        } else {
            self.warn(chan, "invalid sample index");
            0
        }
    }

    fn ornament_index(&mut self, chan: usize, num: usize) -> usize {
        if num != 0 && self.ornaments.get(num).map_or(true, |o| o.lines.is_empty()) {
            self.warn(chan, "invalid ornament");
        }
        num
    }
}

fn parse_row(
    data: &[u8],
    cursor: &mut ChannelCursor,
    line: &mut Line<Command>,
    chan: usize,
    ctx: &mut RowContext<'_>,
) -> Result<()> {
    let mut reader = ByteReader::at(data, cursor.offset);
    let mut pending: Vec<Pending> = Vec::new();
    let noise_base_seen = line
        .channels
        .iter()
        .any(|c| c.commands.iter().any(|cmd| matches!(cmd, Command::NoiseBase(_))));
    let channel = &mut line.channels[chan];
    let mut has_envelope = false;
    loop {
        let cmd = reader.read_u8()?;
        match cmd {
            0x01 => pending.push(Pending::Gliss),
            0x02 => pending.push(Pending::GlissNote { target: 0 }),
            0x03 => pending.push(Pending::SampleOffset),
            0x04 => pending.push(Pending::OrnamentOffset),
            0x05 => pending.push(Pending::Vibrate),
            0x08 => pending.push(Pending::SlideEnvelope),
            0x09 => pending.push(Pending::Tempo),
            0x10..=0x1F | 0xB2..=0xBF | 0xF0..=0xFF => {
                let with_envelope = (0x11..=0xBF).contains(&cmd);
                let with_sample = !(0xB2..=0xBF).contains(&cmd);
                if with_envelope {
                    let env_period = reader.read_u16be()?;
                    if has_envelope {
                        ctx.warn(chan, "duplicated envelope");
                    }
                    has_envelope = true;
                    let shape = if cmd >= 0xB2 { cmd - 0xB1 } else { cmd - 0x10 };
                    pending.push(Pending::Ready(Command::Envelope {
                        shape,
                        period: env_period,
                    }));
                } else {
                    pending.push(Pending::Ready(Command::NoEnvelope));
                }
                if cmd >= 0xF0 {
                    channel.ornament = Some(ctx.ornament_index(chan, usize::from(cmd - 0xF0)));
                }
                if with_sample {
                    let doubled = reader.read_u8()?;
                    channel.sample = Some(ctx.sample_index(chan, doubled));
                }
            }
            0x20..=0x3F => {
                if noise_base_seen || pending.iter().any(|p| matches!(p, Pending::Ready(Command::NoiseBase(_)))) {
                    ctx.warn(chan, "duplicated noise base");
                }
                pending.push(Pending::Ready(Command::NoiseBase(cmd - 0x20)));
            }
            0x40..=0x4F => channel.ornament = Some(ctx.ornament_index(chan, usize::from(cmd - 0x40))),
            0x50..=0xAF => {
                let note = usize::from(cmd - 0x50);
                match pending.iter_mut().find(|p| matches!(p, Pending::GlissNote { .. })) {
                    Some(Pending::GlissNote { target }) => *target = note,
                    _ => channel.note = Some(note),
                }
                channel.enabled = Some(true);
                break;
            }
            0xB0 => pending.push(Pending::Ready(Command::NoEnvelope)),
            0xB1 => {
                let skip = usize::from(reader.read_u8()?);
                if skip == 0 {
                    ctx.warn(chan, "zero line skip");
                }
                cursor.period = skip.saturating_sub(1);
            }
            0xC0 => {
                channel.enabled = Some(false);
                break;
            }
            0xC1..=0xCF => channel.volume = Some(cmd - 0xC0),
            0xD0 => break,
            0xD1..=0xEF => channel.sample = Some(usize::from(cmd - 0xD0)),
            _ => ctx.warn(chan, &format!("unknown command 0x{cmd:02x}")),
        }
    }

    let sample_limit = channel
        .sample
        .and_then(|s| ctx.samples.get(s))
        .map_or(MAX_SAMPLE_SIZE, |s| s.lines.len());
    let ornament_limit = channel
        .ornament
        .and_then(|o| ctx.ornaments.get(o))
        .map_or(MAX_ORNAMENT_SIZE, |o| o.lines.len());
    let mut resolved = Vec::with_capacity(pending.len());
    for item in pending.into_iter().rev() {
        let command = match item {
            Pending::Ready(command) => command,
            Pending::Tempo => {
                let tempo = reader.read_u8()?;
                if line.tempo.is_some() {
                    ctx.warn(chan, "duplicated tempo");
                }
                line.tempo = Some(usize::from(tempo));
                Command::Tempo
            }
            Pending::Gliss => Command::Gliss {
                period: usize::from(reader.read_u8()?),
                delta: i32::from(reader.read_i16le()?),
            },
            Pending::SlideEnvelope => Command::SlideEnvelope {
                period: usize::from(reader.read_u8()?),
                delta: i32::from(reader.read_i16le()?),
            },
            Pending::GlissNote { target } => {
                let period = usize::from(reader.read_u8()?);
                // precomputed limit, recalculated at playback
                reader.skip(2)?;
                let delta = i32::from(reader.read_i16le()?);
                Command::GlissNote { period, delta, target }
            }
            Pending::Vibrate => Command::Vibrate {
                on: usize::from(reader.read_u8()?),
                off: usize::from(reader.read_u8()?),
            },
            Pending::SampleOffset => {
                let pos = usize::from(reader.read_u8()?);
                if pos < sample_limit {
                    Command::SampleOffset(pos)
                } else {
                    ctx.warn(chan, "invalid sample offset");
                    Command::SampleOffset(0)
                }
            }
            Pending::OrnamentOffset => {
                let pos = usize::from(reader.read_u8()?);
                if pos < ornament_limit {
                    Command::OrnamentOffset(pos)
                } else {
                    ctx.warn(chan, "invalid ornament offset");
                    Command::OrnamentOffset(0)
                }
            }
        };
        resolved.push(command);
    }
    resolved.reverse();
    line.channels[chan].commands.extend(resolved);
    cursor.offset = reader.position();
    Ok(())
}

/// Decoded module with everything needed to build its renderer.
pub(crate) struct Pt3Module {
    pub info: Information,
    pub renderer: VortexRenderer,
    /// Bytes covered, compiled player included
    pub size: usize,
}

fn decode(data: &[u8], warnings: &mut Warnings) -> Result<(VortexData, Header, usize)> {
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

    let raw_positions = data
        .get(POSITIONS_OFFSET..POSITIONS_OFFSET + header.length)
        .ok_or(FormatError::OutOfRange {
            offset: POSITIONS_OFFSET,
            size: header.length,
        })?;
    let patterns_count = 1 + raw_positions.iter().map(|&p| usize::from(p / 3)).max().unwrap_or(0);
    let mut patterns: Vec<Pattern<Command>> = vec![Vec::new(); patterns_count];
    for (idx, pattern) in patterns.iter_mut().enumerate() {
        let entry = header.patterns_offset + idx * PATTERN_ENTRY_SIZE;
        let starts = [
            usize::from(u16le_at(data, entry)?),
            usize::from(u16le_at(data, entry + 2)?),
            usize::from(u16le_at(data, entry + 4)?),
        ];
        end = end.max(entry + PATTERN_ENTRY_SIZE);
        if starts.contains(&0) {
            break;
        }
        let mut ctx = RowContext {
            samples: &samples,
            ornaments: &ornaments,
            warnings: Vec::new(),
        };
        let mut last_offset = 0;
        let mut scope = warnings.scope(format!("Pattern {idx}"));
        let decoded = decode_pattern(data, &starts, 0, &mut scope, |chan, cursor, line| {
            parse_row(data, cursor, line, chan, &mut ctx)?;
            last_offset = last_offset.max(cursor.offset);
            Ok(())
        })?;
        for msg in ctx.warnings {
            scope.add(msg);
        }
        end = end.max(last_offset + 1);
        *pattern = decoded;
    }

    let positions: Vec<Position> = raw_positions
        .iter()
        .filter(|&&p| p % 3 == 0 && !patterns[usize::from(p / 3)].is_empty())
        .map(|&p| Position::new(usize::from(p / 3)))
        .collect();
    require(!positions.is_empty(), || "no playable positions".to_string())?;
    if positions.len() != header.length {
        warnings.add(format!("{} of {} positions are playable", positions.len(), header.length));
    }
    let mut loop_position = header.loop_pos;
    if loop_position >= positions.len() {
        warnings.add(format!("loop position {loop_position} out of range"));
        loop_position = 0;
    }
    if header.tempo == 0 {
        warnings.add("zero tempo");
    }
    let module = VortexData {
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

/// Decode a module into its renderer, allowing a compiled player in front.
pub(crate) fn decode_module(data: &[u8]) -> Result<Pt3Module> {
    let mut last_error = FormatError::NotRecognized;
    for offset in module_offsets(data, PLAYERS) {
        let body = &data[offset..];
        if !check_module(body) {
            continue;
        }
        let mut warnings = Warnings::new();
        match decode(body, &mut warnings) {
            Ok((module, header, size)) => {
                let version = Tables::version_from(header.subversion);
                debug!(
                    "PT3 v3.{version} at +{offset}: {} positions, {} patterns, note table {}",
                    module.positions.len(),
                    module.patterns.len(),
                    header.freq_table
                );
                let info = module_info(ID, &header.title, &header.author, &header.program, warnings);
                let renderer = VortexRenderer::new(module, Tables::new(version, header.freq_table));
                return Ok(Pt3Module {
                    info,
                    renderer,
                    size: offset + size,
                });
            }
            Err(err) => last_error = err,
        }
    }
    Err(last_error)
}

/// Decode a module, allowing a compiled player in front of it.
pub fn create(data: &[u8]) -> Result<Decoded> {
    let module = decode_module(data)?;
    Ok(Decoded {
        player: aym_player(module.info, module.renderer),
        size: module.size,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use zxtune_common::{attributes, PlaybackState};
    use zxtune_devices::sound::{BufferReceiver, RenderParameters};

    /// Module with `tempo` and one single-line pattern: C-1 with sample 1 on
    /// channel A, B and C switched off.
    pub(crate) fn single_note_module(tempo: u8) -> Vec<u8> {
        let mut data = vec![0u8; HEADER_SIZE];
        data[..14].copy_from_slice(b"ProTracker 3.5");
        data[30..36].copy_from_slice(b"Single");
        data[66..72].copy_from_slice(b"Tester");
        data[100] = tempo;
        data[101] = 1;
        data[POSITIONS_OFFSET] = 0;
        data.push(POS_END_MARKER);
        let table = data.len() as u16;
        data[103..105].copy_from_slice(&table.to_le_bytes());
        let chan_a = table + 6;
        for off in [chan_a, chan_a + 3, chan_a + 4] {
            data.extend_from_slice(&off.to_le_bytes());
        }
        data.extend_from_slice(&[0xD1, 0x50, 0x00]);
        data.push(0xC0);
        data.push(0xC0);
        let sample = data.len() as u16;
        data[107..109].copy_from_slice(&sample.to_le_bytes());
        data.extend_from_slice(&[0, 1, 0x00, 0x8F, 0x00, 0x00]);
        data
    }

    fn context<'a>(samples: &'a [Sample], ornaments: &'a [Ornament]) -> RowContext<'a> {
        RowContext {
            samples,
            ornaments,
            warnings: Vec::new(),
        }
    }

    #[test]
    fn test_check_and_properties() {
        let data = single_note_module(3);
        assert!(check(&data));
        let decoded = create(&data).unwrap();
        assert_eq!(decoded.size, data.len());
        let info = decoded.player.information();
        assert_eq!(info.get(attributes::TYPE), Some(ID));
        assert_eq!(info.get(attributes::TITLE), Some("Single"));
        assert_eq!(info.get(attributes::AUTHOR), Some("Tester"));
        assert_eq!(info.get(attributes::PROGRAM), Some("ProTracker 3.5"));
        assert_eq!(info.get(attributes::WARNINGS), None);
        assert_eq!(info.statistics.frames, 3);
        assert_eq!(info.statistics.channels, 3);
    }

    #[test]
    fn test_check_rejects_misaligned_positions() {
        let mut data = single_note_module(3);
        data[POSITIONS_OFFSET] = 4;
        assert!(!check(&data));
        let mut data = single_note_module(3);
        data[101] = 2;
        assert!(!check(&data));
        assert!(!check(&data[..HEADER_SIZE - 1]));
    }

    #[test]
    fn test_row_parameters_read_in_reverse() {
        let data = [0x01, 0x09, 0xC5, 0xD2, 0x51, 0x06, 0x02, 0x10, 0x00];
        let mut line = Line::new(CHANNELS);
        let mut cursor = ChannelCursor::default();
        let mut ctx = context(&[], &[]);
        parse_row(&data, &mut cursor, &mut line, 0, &mut ctx).unwrap();
        assert_eq!(cursor.offset, data.len());
        assert_eq!(line.tempo, Some(6));
        let chan = &line.channels[0];
        assert_eq!(chan.volume, Some(5));
        assert_eq!(chan.sample, Some(2));
        assert_eq!(chan.note, Some(1));
        assert_eq!(chan.enabled, Some(true));
        assert_eq!(
            chan.commands,
            vec![Command::Gliss { period: 2, delta: 0x10 }, Command::Tempo]
        );
        assert!(ctx.warnings.is_empty());
    }

    #[test]
    fn test_portamento_and_envelope() {
        let data = [0xB3, 0x01, 0x20, 0x02, 0x5C, 0x01, 0xAA, 0xBB, 0x20, 0x00];
        let mut line = Line::new(CHANNELS);
        let mut cursor = ChannelCursor::default();
        let mut ctx = context(&[], &[]);
        parse_row(&data, &mut cursor, &mut line, 1, &mut ctx).unwrap();
        assert_eq!(cursor.offset, data.len());
        let chan = &line.channels[1];
        assert_eq!(chan.note, None);
        assert_eq!(
            chan.commands,
            vec![
                Command::Envelope { shape: 2, period: 0x0120 },
                Command::GlissNote {
                    period: 1,
                    delta: 0x20,
                    target: 12
                }
            ]
        );
    }

    #[test]
    fn test_bad_sample_index_warns() {
        let data = [0x10, 0x03, 0xD0];
        let mut line = Line::new(CHANNELS);
        let mut cursor = ChannelCursor::default();
        let mut ctx = context(&[], &[]);
        parse_row(&data, &mut cursor, &mut line, 0, &mut ctx).unwrap();
        assert_eq!(line.channels[0].sample, Some(0));
        assert_eq!(line.channels[0].commands, vec![Command::NoEnvelope]);
        assert_eq!(ctx.warnings, vec!["Channel 0: invalid sample index".to_string()]);
    }

    #[test]
    fn test_skip_period() {
        let data = [0xB1, 0x04, 0xD0];
        let mut line = Line::new(CHANNELS);
        let mut cursor = ChannelCursor::default();
        let mut ctx = context(&[], &[]);
        parse_row(&data, &mut cursor, &mut line, 2, &mut ctx).unwrap();
        assert_eq!(cursor.period, 3);
        assert!(line.channels[2].is_empty());
    }

    #[test]
    fn test_safe_objects() {
        let data = [0u8; 8];
        let (sample, end) = parse_sample(&data, 0).unwrap();
        assert_eq!(sample.lines.len(), 1);
        assert_eq!(end, 0);
        let (ornament, _) = parse_ornament(&data, 100).unwrap();
        assert_eq!(ornament.lines, vec![0]);
        assert!(parse_sample(&[0, 0, 0, 5], 2).is_err());
    }

    #[test]
    fn test_plays_and_stops() {
        let data = single_note_module(2);
        let mut player = create(&data).unwrap().player;
        let params = RenderParameters::default();
        let mut out = BufferReceiver::default();
        assert_eq!(player.render_frame(&params, &mut out), PlaybackState::Playing);
        assert_eq!(player.render_frame(&params, &mut out), PlaybackState::Playing);
        assert_eq!(player.render_frame(&params, &mut out), PlaybackState::Stopped);
        assert!(out.flushed);
        assert!(out.data.iter().any(|&s| s != 0));
    }
}
