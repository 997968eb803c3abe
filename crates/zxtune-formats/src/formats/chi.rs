//! Chip Tracker modules.
//!
//! Layout: 512-byte header (`CHIPv` signature, version, title, sample
//! descriptors, sample names, 256-entry play order), the used patterns as
//! 512-byte blocks (64 rows of note bytes, then 64 rows of parameter bytes)
//! and the sample data, every sample aligned to 256 bytes.

use log::debug;
use zxtune_devices::dac;

use super::{dac_chip, dac_player, module_info, Decoded, DigitalSample};
use crate::error::{require, FormatError, Result};
use crate::reader::{trimmed_text, u16le_at};
use crate::tracking::{FrameRenderer, Line, ModuleData, Pattern, Position, TrackModel, TrackState};
use crate::warnings::{Scope, Warnings};

/// Format identifier.
pub const ID: &str = "CHI";

/// Recording rate of C-1.
pub const BASE_FREQ: u32 = 8448;

const SIGNATURE: &[u8] = b"CHIPv";
const CHANNELS: usize = 4;
const SAMPLES_COUNT: usize = 16;
const HEADER_SIZE: usize = 512;
const PATTERN_LINES: usize = 64;
const PATTERN_SIZE: usize = 512;
const PARAMS_OFFSET: usize = PATTERN_LINES * CHANNELS;
const SAMPLE_ALIGNMENT: usize = 256;
const MIN_SIZE: usize = HEADER_SIZE + PATTERN_SIZE + SAMPLE_ALIGNMENT;

const VERSION_OFFSET: usize = 5;
const TITLE_OFFSET: usize = 8;
const TITLE_SIZE: usize = 32;
const TEMPO_OFFSET: usize = 40;
const LENGTH_OFFSET: usize = 41;
const LOOP_OFFSET: usize = 42;
const SAMPLES_OFFSET: usize = 43;
const NAMES_OFFSET: usize = 128;
const NAME_SIZE: usize = 8;
const POSITIONS_OFFSET: usize = 256;

const NOTE_EMPTY: u8 = 0;
const NOTE_PAUSE: u8 = 63;
const CMD_SAMPLE_OFFSET: u8 = 0;
const CMD_SLIDE_DOWN: u8 = 1;
const CMD_SLIDE_UP: u8 = 2;
const CMD_SPECIAL: u8 = 3;

/// Sample position unit of the offset command.
const OFFSET_STEP: usize = 512;
/// Sample step of C-1 in the replayer.
const C1_STEP: i32 = 72;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    SampleOffset(usize),
    /// Step added every frame
    Slide(i32),
}

type ChiData = ModuleData<Command, DigitalSample>;

/// Replayer step to Hz, C-1 being 32.7 Hz.
fn step_to_hz(step: i32) -> i32 {
    step * 3270 / (C1_STEP * 100)
}

fn is_text(raw: &[u8]) -> bool {
    raw.iter().all(|b| (0x20..0x80).contains(b))
}

fn positions(data: &[u8]) -> &[u8] {
    let length = usize::from(data[LENGTH_OFFSET]);
    &data[POSITIONS_OFFSET..POSITIONS_OFFSET + length + 1]
}

fn patterns_count(data: &[u8]) -> usize {
    positions(data).iter().max().map_or(0, |&max| usize::from(max) + 1)
}

/// Signature, text fields and pattern area.
pub fn check(data: &[u8]) -> bool {
    if data.len() < MIN_SIZE || !data.starts_with(SIGNATURE) {
        return false;
    }
    let version = &data[VERSION_OFFSET..VERSION_OFFSET + 3];
    if !version[0].is_ascii_digit() || version[1] != b'.' || !version[2].is_ascii_digit() {
        return false;
    }
    if !is_text(&data[TITLE_OFFSET..TITLE_OFFSET + TITLE_SIZE])
        || !(1..=0x0F).contains(&data[TEMPO_OFFSET])
        || !is_text(&data[NAMES_OFFSET..NAMES_OFFSET + SAMPLES_COUNT * NAME_SIZE])
    {
        return false;
    }
    let descriptors_valid = data[SAMPLES_OFFSET..SAMPLES_OFFSET + SAMPLES_COUNT * 4]
        .chunks_exact(2)
        .all(|word| word[1] <= 0xBB);
    descriptors_valid && HEADER_SIZE + patterns_count(data) * PATTERN_SIZE <= data.len()
}

/// Rows of the pattern at `offset` up to the one stopping it on channel D.
fn parse_pattern(data: &[u8], offset: usize, warnings: &mut Scope<'_>) -> Pattern<Command> {
    let block = &data[offset..offset + PATTERN_SIZE];
    let mut pattern = Pattern::new();
    for line_idx in 0..PATTERN_LINES {
        let mut line = Line::new(CHANNELS);
        let mut last = false;
        for chan in 0..CHANNELS {
            let note = block[line_idx * CHANNELS + chan];
            let param = block[PARAMS_OFFSET + line_idx * CHANNELS + chan];
            let (halftones, command) = (note >> 2, note & 3);
            let (sample, parameter) = (param >> 4, param & 0x0F);
            let dst = &mut line.channels[chan];
            match halftones {
                NOTE_EMPTY => {}
                NOTE_PAUSE => dst.enabled = Some(false),
                _ => {
                    dst.enabled = Some(true);
                    dst.note = Some(usize::from(halftones - 1));
                    dst.sample = Some(usize::from(sample));
                }
            }
            match command {
                CMD_SAMPLE_OFFSET if parameter != 0 => {
                    dst.commands.push(Command::SampleOffset(OFFSET_STEP * usize::from(parameter)));
                }
                CMD_SLIDE_DOWN if parameter != 0 => dst.commands.push(Command::Slide(-2 * i32::from(parameter))),
                CMD_SLIDE_UP if parameter != 0 => dst.commands.push(Command::Slide(2 * i32::from(parameter))),
                CMD_SPECIAL => match chan {
                    0 if parameter == 0 => warnings.add(format!("line {line_idx}: zero tempo")),
                    0 => line.tempo = Some(usize::from(parameter)),
                    3 => last = true,
                    _ => warnings.add(format!("line {line_idx}: special command in channel {chan}")),
                },
                _ => {}
            }
        }
        pattern.push(line);
        if last {
            break;
        }
    }
    pattern
}

fn decode(data: &[u8], warnings: &mut Warnings) -> Result<(ChiData, usize)> {
    let order = positions(data);
    let count = patterns_count(data);
    let mut patterns = Vec::with_capacity(count);
    for idx in 0..count {
        let mut scope = warnings.scope(format!("Pattern {idx}"));
        patterns.push(parse_pattern(data, HEADER_SIZE + idx * PATTERN_SIZE, &mut scope));
    }

    let mut start = HEADER_SIZE + count * PATTERN_SIZE;
    let mut samples = vec![DigitalSample::default(); SAMPLES_COUNT];
    for (idx, sample) in samples.iter_mut().enumerate() {
        let descr = SAMPLES_OFFSET + idx * 4;
        let loop_pos = usize::from(u16le_at(data, descr)?);
        let length = usize::from(u16le_at(data, descr + 2)?);
        let size = length.min(data.len().saturating_sub(start));
        if size == 0 {
            continue;
        }
        debug!("CHI sample {idx}: +{start:#x} size {size:#x} loop {loop_pos:#x}");
        *sample = DigitalSample {
            data: data[start..start + size].to_vec(),
            loop_pos,
        };
        start += size.next_multiple_of(SAMPLE_ALIGNMENT);
        if size != length {
            warnings.add(format!("sample {idx} truncated to {size} bytes"));
            break;
        }
    }
    require(samples.iter().any(|s| !s.data.is_empty()), || "no samples".to_string())?;

    let positions: Vec<Position> = order.iter().map(|&p| Position::new(usize::from(p))).collect();
    let mut loop_position = usize::from(data[LOOP_OFFSET]);
    if loop_position >= positions.len() {
        warnings.add(format!("loop position {loop_position} out of range"));
        loop_position = 0;
    }
    let module = ChiData {
        positions,
        loop_position,
        initial_tempo: usize::from(data[TEMPO_OFFSET]),
        patterns,
        samples,
        ornaments: Vec::new(),
        channels: CHANNELS,
    };
    Ok((module, start.min(data.len())))
}

/// Decode a module.
pub fn create(data: &[u8]) -> Result<Decoded> {
    if !check(data) {
        return Err(FormatError::NotRecognized);
    }
    let mut warnings = Warnings::new();
    let (module, size) = decode(data, &mut warnings)?;
    let version = String::from_utf8_lossy(&data[VERSION_OFFSET..VERSION_OFFSET + 3]).into_owned();
    let title = trimmed_text(&data[TITLE_OFFSET..TITLE_OFFSET + TITLE_SIZE]);
    let chip = dac_chip(CHANNELS, &module.samples, BASE_FREQ)?;
    let info = module_info(ID, &title, "", &format!("Chip Tracker v{version}"), warnings);
    Ok(Decoded {
        player: dac_player(info, ChiRenderer::new(module), chip),
        size,
    })
}

#[derive(Debug, Clone, Copy, Default)]
struct Glissade {
    sliding: i32,
    step: i32,
}

struct ChiRenderer {
    data: ChiData,
    gliss: [Glissade; CHANNELS],
}

impl ChiRenderer {
    fn new(data: ChiData) -> Self {
        Self {
            data,
            gliss: Default::default(),
        }
    }
}

impl FrameRenderer for ChiRenderer {
    type Chunk = dac::DataChunk;

    fn model(&self) -> &dyn TrackModel {
        &self.data
    }

    fn synthesize(&mut self, state: &TrackState, chunk: &mut dac::DataChunk) {
        let mut updates: Vec<dac::ChannelData> = (0..CHANNELS).map(dac::ChannelData::new).collect();
        for (gliss, dst) in self.gliss.iter_mut().zip(&mut updates) {
            gliss.sliding += gliss.step;
            if gliss.step != 0 {
                dst.freq_slide_hz = Some(step_to_hz(gliss.sliding));
            }
        }
        if state.is_line_start() {
            self.gliss = Default::default();
            if let Some(line) = self.data.line(state.pattern, state.line) {
                for ((src, dst), gliss) in line.channels.iter().zip(&mut updates).zip(&mut self.gliss) {
                    if src.is_empty() {
                        continue;
                    }
                    if let Some(enabled) = src.enabled {
                        dst.enabled = Some(enabled);
                        if !enabled {
                            dst.pos_in_sample = Some(0);
                        }
                    }
                    if let Some(note) = src.note {
                        dst.note = Some(note);
                        dst.pos_in_sample = Some(0);
                    }
                    if let Some(sample) = src.sample {
                        dst.sample_num = Some(sample);
                        dst.pos_in_sample = Some(0);
                    }
                    dst.freq_slide_hz = Some(0);
                    for cmd in &src.commands {
                        match *cmd {
                            Command::SampleOffset(offset) => dst.pos_in_sample = Some(offset),
                            Command::Slide(step) => gliss.step = step,
                        }
                    }
                }
            }
        }
        chunk.channels.extend(updates.into_iter().filter(dac::ChannelData::has_changes));
    }

    fn reset(&mut self) {
        self.gliss = Default::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zxtune_common::{attributes, PlaybackState};
    use zxtune_devices::sound::{BufferReceiver, RenderParameters};

    fn set_cell(data: &mut [u8], line: usize, chan: usize, note: u8, param: u8) {
        let base = HEADER_SIZE + line * CHANNELS + chan;
        data[base] = note;
        data[base + PARAMS_OFFSET] = param;
    }

    /// Tempo 3, one single-line pattern: channel A plays C-2 with sample 0
    /// sliding up by 6 per frame, channel D stops the pattern.
    fn module() -> Vec<u8> {
        let mut data = vec![0u8; MIN_SIZE];
        data[..8].copy_from_slice(b"CHIPv1.0");
        data[TITLE_OFFSET..TITLE_OFFSET + TITLE_SIZE].copy_from_slice(format!("{:<32}", "CHI song").as_bytes());
        data[TEMPO_OFFSET] = 3;
        data[SAMPLES_OFFSET..SAMPLES_OFFSET + 4].copy_from_slice(&[0x00, 0x01, 0x00, 0x01]);
        data[NAMES_OFFSET..NAMES_OFFSET + SAMPLES_COUNT * NAME_SIZE].fill(b' ');
        set_cell(&mut data, 0, 0, (13 << 2) | CMD_SLIDE_UP, 0x03);
        set_cell(&mut data, 0, 3, CMD_SPECIAL, 0);
        for (idx, byte) in data[HEADER_SIZE + PATTERN_SIZE..].iter_mut().enumerate() {
            *byte = idx as u8;
        }
        data
    }

    fn frame(renderer: &mut ChiRenderer, frame: usize) -> dac::DataChunk {
        let state = TrackState {
            position: 0,
            pattern: 0,
            line: 0,
            frame,
            tempo: 3,
        };
        let mut chunk = dac::DataChunk::default();
        renderer.synthesize(&state, &mut chunk);
        chunk
    }

    #[test]
    fn test_check_and_properties() {
        let data = module();
        assert!(check(&data));
        let decoded = create(&data).unwrap();
        assert_eq!(decoded.size, MIN_SIZE);
        let info = decoded.player.information();
        assert_eq!(info.get(attributes::TYPE), Some(ID));
        assert_eq!(info.get(attributes::TITLE), Some("CHI song"));
        assert_eq!(info.get(attributes::PROGRAM), Some("Chip Tracker v1.0"));
        assert_eq!(info.statistics.frames, 3);
    }

    #[test]
    fn test_rejects_invalid_header() {
        let data = module();
        assert!(!check(&data[..MIN_SIZE - 1]));

        let mut bad = data.clone();
        bad[6] = b'x';
        assert!(!check(&bad), "version");

        let mut bad = data.clone();
        bad[TITLE_OFFSET] = 0;
        assert!(!check(&bad), "title");

        let mut bad = data.clone();
        bad[TEMPO_OFFSET] = 0x10;
        assert!(!check(&bad));

        let mut bad = data;
        bad[POSITIONS_OFFSET] = 1;
        assert!(!check(&bad), "pattern past the end");
    }

    #[test]
    fn test_pattern_cells() {
        let mut data = module();
        set_cell(&mut data, 0, 1, (NOTE_PAUSE << 2) | CMD_SAMPLE_OFFSET, 0x02);
        set_cell(&mut data, 0, 2, (25 << 2) | CMD_SLIDE_DOWN, 0x53);
        set_cell(&mut data, 0, 0, (13 << 2) | CMD_SPECIAL, 0x06);
        let mut warnings = Warnings::new();
        let pattern = parse_pattern(&data, HEADER_SIZE, &mut warnings.scope("Pattern 0"));
        assert!(warnings.is_empty());
        assert_eq!(pattern.len(), 1);
        let line = &pattern[0];
        assert_eq!(line.tempo, Some(6));
        assert_eq!(line.channels[0].note, Some(12));
        assert_eq!(line.channels[1].enabled, Some(false));
        assert_eq!(line.channels[1].commands, vec![Command::SampleOffset(1024)]);
        assert_eq!(line.channels[2].note, Some(24));
        assert_eq!(line.channels[2].sample, Some(5));
        assert_eq!(line.channels[2].commands, vec![Command::Slide(-6)]);
        assert!(line.channels[3].is_empty());
    }

    #[test]
    fn test_pattern_runs_to_end() {
        let mut data = module();
        set_cell(&mut data, 0, 3, 0, 0);
        set_cell(&mut data, 0, 1, CMD_SPECIAL, 0);
        let mut warnings = Warnings::new();
        let pattern = parse_pattern(&data, HEADER_SIZE, &mut warnings.scope("Pattern 0"));
        assert_eq!(pattern.len(), PATTERN_LINES);
        assert_eq!(warnings.entries().len(), 1);
    }

    #[test]
    fn test_sample_layout() {
        let mut data = module();
        data[SAMPLES_OFFSET + 4..SAMPLES_OFFSET + 8].copy_from_slice(&[0x10, 0x00, 0x20, 0x00]);
        data.extend(std::iter::repeat(0x80).take(0x10));
        let mut warnings = Warnings::new();
        let (module, size) = decode(&data, &mut warnings).unwrap();
        assert_eq!(module.samples[0].data.len(), 0x100);
        assert_eq!(module.samples[0].data[5], 5);
        assert_eq!(module.samples[1].data, vec![0x80; 0x10]);
        assert_eq!(module.samples[1].loop_pos, 0x10);
        assert_eq!(size, data.len());
        assert_eq!(warnings.entries().len(), 1, "second sample truncated");
    }

    #[test]
    fn test_slide_accumulates() {
        let data = module();
        let (module, _) = decode(&data, &mut Warnings::new()).unwrap();
        let mut r = ChiRenderer::new(module);
        let first = frame(&mut r, 0);
        assert_eq!(
            first.channels,
            vec![dac::ChannelData {
                enabled: Some(true),
                note: Some(12),
                sample_num: Some(0),
                pos_in_sample: Some(0),
                freq_slide_hz: Some(0),
                ..dac::ChannelData::new(0)
            }]
        );
        assert_eq!(frame(&mut r, 1).channels[0].freq_slide_hz, Some(step_to_hz(6)));
        assert_eq!(frame(&mut r, 2).channels[0].freq_slide_hz, Some(step_to_hz(12)));
        assert_eq!(step_to_hz(72), 32);
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
