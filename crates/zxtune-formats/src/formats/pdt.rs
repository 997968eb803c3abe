//! ProDigi Tracker modules.
//!
//! A fixed 0x4300-byte header (ornaments, title, sample descriptors, play order
//! and 32 patterns of 64 lines) followed by five 16 KiB memory pages holding
//! the samples. Samples address memory at 0xC000 of one of the pages 1, 3, 4,
//! 6 or 7.

use log::debug;
use zxtune_devices::dac;

use super::{dac_chip, dac_player, module_info, Decoded, DigitalSample};
use crate::error::{FormatError, Result};
use crate::reader::{trimmed_text, u16le_at};
use crate::tracking::{FrameRenderer, Line, ModuleData, Ornament, Pattern, Position, TrackModel, TrackState};
use crate::warnings::Warnings;

/// Format identifier.
pub const ID: &str = "PDT";
/// Editor name reported in module properties.
pub const PROGRAM: &str = "ProDigi Tracker v0.0x";

/// Recording rate of C-1.
pub const BASE_FREQ: u32 = 4000;

const CHANNELS: usize = 4;
const ORNAMENTS_COUNT: usize = 11;
const ORNAMENT_SIZE: usize = 16;
const SAMPLES_COUNT: usize = 16;
const SAMPLE_DESCR_SIZE: usize = 16;
const POSITIONS_COUNT: usize = 240;
const PAGES_COUNT: usize = 5;
const PAGE_SIZE: usize = 0x4000;
const PAGES_START: usize = 0xC000;
const PATTERNS_COUNT: usize = 32;
const PATTERN_LINES: usize = 64;
const LINE_SIZE: usize = 2 * CHANNELS;
const PATTERN_SIZE: usize = PATTERN_LINES * LINE_SIZE;

const ORNAMENT_LOOPS_OFFSET: usize = ORNAMENTS_COUNT * ORNAMENT_SIZE;
const TITLE_OFFSET: usize = 204;
const TITLE_SIZE: usize = 32;
const TEMPO_OFFSET: usize = 236;
const START_OFFSET: usize = 237;
const LOOP_OFFSET: usize = 238;
const LENGTH_OFFSET: usize = 239;
const PADDING_OFFSET: usize = 240;
const SAMPLES_OFFSET: usize = 256;
const POSITIONS_OFFSET: usize = 512;
const LAST_DATAS_OFFSET: usize = 752;
const PATTERNS_OFFSET: usize = 768;
const HEADER_SIZE: usize = PATTERNS_OFFSET + PATTERNS_COUNT * PATTERN_SIZE;
const MODULE_SIZE: usize = HEADER_SIZE + PAGES_COUNT * PAGE_SIZE;

const CMD_SPECIAL: u8 = 0;
const CMD_SPEED: u8 = 1;
const PARAM_NONE: u8 = 0;
const PARAM_CONTINUE_SAMPLE: u8 = 12;
const PARAM_END_PATTERN: u8 = 13;
const PARAM_BLOCK_CHANNEL: u8 = 14;
const PARAM_NO_ORNAMENT: u8 = 15;

type PdtData = ModuleData<(), DigitalSample>;

/// Cell of a pattern line.
#[derive(Debug, Clone, Copy)]
struct Note {
    // ccnnnnnn sssspppp
    raw: [u8; 2],
}

impl Note {
    fn halftones(self) -> u8 {
        self.raw[0] & 0x3F
    }

    fn command(self) -> u8 {
        self.raw[0] >> 6
    }

    fn parameter(self) -> u8 {
        self.raw[1] & 0x0F
    }

    fn sample(self) -> usize {
        usize::from(self.raw[1] >> 4)
    }

    fn is_end(self) -> bool {
        self.command() == CMD_SPECIAL && self.parameter() == PARAM_END_PATTERN
    }
}

/// Index of a memory page in the dump following the header.
fn page_order(page: u8) -> Option<usize> {
    match page {
        1 => Some(0),
        3 => Some(1),
        4 => Some(2),
        6 => Some(3),
        7 => Some(4),
        _ => None,
    }
}

struct SampleDescr {
    start: usize,
    size: usize,
    loop_start: usize,
    page: u8,
    padding: u8,
}

fn sample_descr(data: &[u8], idx: usize) -> Result<SampleDescr> {
    let base = SAMPLES_OFFSET + idx * SAMPLE_DESCR_SIZE;
    Ok(SampleDescr {
        start: usize::from(u16le_at(data, base + 8)?),
        size: usize::from(u16le_at(data, base + 10)?),
        loop_start: usize::from(u16le_at(data, base + 12)?),
        page: data[base + 14],
        padding: data[base + 15],
    })
}

fn check_sample(descr: &SampleDescr) -> bool {
    if !matches!(descr.page, 0 | 1 | 3 | 4 | 6 | 7) || descr.padding != 0 || descr.size > 0x40FF {
        return false;
    }
    descr.size <= 1
        || (descr.start >= PAGES_START && descr.start + descr.size <= 0x10000 && page_order(descr.page).is_some())
}

/// Structural test of the fixed header.
pub fn check(data: &[u8]) -> bool {
    if data.len() < MODULE_SIZE {
        return false;
    }
    let (tempo, start, loop_pos, length) = (
        data[TEMPO_OFFSET],
        data[START_OFFSET],
        data[LOOP_OFFSET],
        data[LENGTH_OFFSET],
    );
    if !(3..=0x63).contains(&tempo) || start > 0xEF || loop_pos > 0xEF || !(1..=0xF0).contains(&length) || loop_pos > length {
        return false;
    }
    if data[..ORNAMENT_LOOPS_OFFSET].iter().any(|b| b & 1 != 0) || data[PADDING_OFFSET..SAMPLES_OFFSET].iter().any(|&b| b != 0) {
        return false;
    }
    if data[POSITIONS_OFFSET..POSITIONS_OFFSET + POSITIONS_COUNT]
        .iter()
        .any(|&p| usize::from(p) >= PATTERNS_COUNT)
    {
        return false;
    }
    let last_datas_valid = (0..PAGES_COUNT).all(|page| {
        u16le_at(data, LAST_DATAS_OFFSET + page * 2).map_or(false, |addr| usize::from(addr) >= PAGES_START)
    });
    last_datas_valid && (0..SAMPLES_COUNT).all(|idx| sample_descr(data, idx).map_or(false, |d| check_sample(&d)))
}

fn parse_pattern(data: &[u8], idx: usize, warnings: &mut Warnings) -> Pattern<()> {
    let base = PATTERNS_OFFSET + idx * PATTERN_SIZE;
    let mut pattern = Pattern::new();
    for line_idx in 0..PATTERN_LINES {
        let offset = base + line_idx * LINE_SIZE;
        let notes: Vec<Note> = data[offset..offset + LINE_SIZE]
            .chunks_exact(2)
            .map(|raw| Note { raw: [raw[0], raw[1]] })
            .collect();
        if notes.iter().any(|n| n.is_end()) {
            break;
        }
        let mut line = Line::new(CHANNELS);
        for (chan, note) in notes.into_iter().enumerate() {
            let dst = &mut line.channels[chan];
            let halftones = note.halftones();
            let mut sample = None;
            if halftones != 0 {
                dst.enabled = Some(true);
                dst.note = Some(usize::from(halftones - 1));
                sample = Some(note.sample());
            }
            match (note.command(), note.parameter()) {
                (CMD_SPEED, 0) => warnings.add(format!("Pattern {idx} line {line_idx}: zero tempo")),
                (CMD_SPEED, tempo) => line.tempo = Some(usize::from(tempo)),
                (CMD_SPECIAL, PARAM_NONE) if halftones != 0 => dst.ornament = Some(0),
                (CMD_SPECIAL, PARAM_NONE) => {}
                (CMD_SPECIAL, PARAM_NO_ORNAMENT) => dst.ornament = Some(0),
                (CMD_SPECIAL, PARAM_CONTINUE_SAMPLE) => sample = None,
                (CMD_SPECIAL, PARAM_BLOCK_CHANNEL) => dst.enabled = Some(false),
                (CMD_SPECIAL, ornament) => dst.ornament = Some(usize::from(ornament)),
                _ => {}
            }
            dst.sample = sample;
        }
        pattern.push(line);
    }
    pattern
}

/// Sample trimmed of trailing zeroes; empty when the descriptor points nowhere.
fn parse_sample(data: &[u8], descr: &SampleDescr) -> DigitalSample {
    let Some(order) = page_order(descr.page) else {
        return DigitalSample::default();
    };
    if descr.start < PAGES_START || descr.size == 0 {
        return DigitalSample::default();
    }
    let offset = HEADER_SIZE + PAGE_SIZE * order + (descr.start - PAGES_START);
    let Some(raw) = data.get(offset..offset + descr.size) else {
        return DigitalSample::default();
    };
    let size = raw[1..].iter().rposition(|&b| b != 0).map_or(1, |pos| pos + 2);
    let loop_pos = if descr.loop_start >= descr.start {
        descr.loop_start - descr.start
    } else {
        size
    };
    DigitalSample {
        data: raw[..size].to_vec(),
        loop_pos,
    }
}

fn parse_ornaments(data: &[u8]) -> Vec<Ornament> {
    let mut ornaments = Vec::with_capacity(ORNAMENTS_COUNT + 1);
    ornaments.push(Ornament::default());
    for idx in 0..ORNAMENTS_COUNT {
        let raw = &data[idx * ORNAMENT_SIZE..(idx + 1) * ORNAMENT_SIZE];
        let loop_begin = usize::from(data[ORNAMENT_LOOPS_OFFSET + idx * 2]);
        let loop_end = usize::from(data[ORNAMENT_LOOPS_OFFSET + idx * 2 + 1]).min(ORNAMENT_SIZE);
        let lines = raw[..loop_end].iter().map(|&b| i32::from(b as i8) / 2).collect();
        ornaments.push(Ornament::new(loop_begin, lines));
    }
    ornaments
}

fn decode(data: &[u8], warnings: &mut Warnings) -> Result<(PdtData, String)> {
    let length = usize::from(data[LENGTH_OFFSET]);
    let order = &data[POSITIONS_OFFSET..POSITIONS_OFFSET + length];
    let positions: Vec<Position> = order.iter().map(|&p| Position::new(usize::from(p))).collect();
    let mut loop_position = usize::from(data[LOOP_OFFSET]);
    if loop_position >= positions.len() {
        warnings.add(format!("loop position {loop_position} out of range"));
        loop_position = 0;
    }

    let used = order.iter().copied().max().map_or(0, |max| usize::from(max) + 1);
    let mut patterns = vec![Pattern::new(); used];
    for &idx in order {
        let idx = usize::from(idx);
        if patterns[idx].is_empty() {
            patterns[idx] = parse_pattern(data, idx, warnings);
        }
    }

    let mut samples = Vec::with_capacity(SAMPLES_COUNT);
    for idx in 0..SAMPLES_COUNT {
        let descr = sample_descr(data, idx)?;
        let sample = parse_sample(data, &descr);
        debug!("PDT sample {idx}: {} bytes, loop at {}", sample.data.len(), sample.loop_pos);
        samples.push(sample);
    }

    let module = PdtData {
        positions,
        loop_position,
        initial_tempo: usize::from(data[TEMPO_OFFSET]),
        patterns,
        samples,
        ornaments: parse_ornaments(data),
        channels: CHANNELS,
    };
    Ok((module, trimmed_text(&data[TITLE_OFFSET..TITLE_OFFSET + TITLE_SIZE])))
}

/// Decode a module.
pub fn create(data: &[u8]) -> Result<Decoded> {
    if !check(data) {
        return Err(FormatError::NotRecognized);
    }
    let data = &data[..MODULE_SIZE];
    let mut warnings = Warnings::new();
    let (module, title) = decode(data, &mut warnings)?;
    let chip = dac_chip(CHANNELS, &module.samples, BASE_FREQ)?;
    let info = module_info(ID, &title, "", PROGRAM, warnings);
    Ok(Decoded {
        player: dac_player(info, PdtRenderer::new(module), chip),
        size: MODULE_SIZE,
    })
}

#[derive(Debug, Clone, Copy, Default)]
struct OrnamentState {
    ornament: Option<usize>,
    pos: usize,
}

struct PdtRenderer {
    data: PdtData,
    ornaments: [OrnamentState; CHANNELS],
}

impl PdtRenderer {
    fn new(data: PdtData) -> Self {
        Self {
            data,
            ornaments: Default::default(),
        }
    }

    fn offset(&self, state: OrnamentState) -> i32 {
        state
            .ornament
            .and_then(|idx| self.data.ornaments.get(idx))
            .map_or(0, |orn| orn.get(state.pos))
    }
}

impl FrameRenderer for PdtRenderer {
    type Chunk = dac::DataChunk;

    fn model(&self) -> &dyn TrackModel {
        &self.data
    }

    fn synthesize(&mut self, state: &TrackState, chunk: &mut dac::DataChunk) {
        let line = if state.is_line_start() {
            self.data.line(state.pattern, state.line)
        } else {
            None
        };
        for chan in 0..CHANNELS {
            let mut dst = dac::ChannelData::new(chan);
            let mut orn = self.ornaments[chan];
            let prev_offset = self.offset(orn);
            if let Some(ornament) = orn.ornament.and_then(|idx| self.data.ornaments.get(idx)) {
                orn.pos = ornament.next_pos(orn.pos);
            }
            if let Some(src) = line.and_then(|l| l.channels.get(chan)) {
                if let Some(enabled) = src.enabled {
                    dst.enabled = Some(enabled);
                    if !enabled {
                        dst.pos_in_sample = Some(0);
                    }
                }
                if let Some(note) = src.note {
                    if let Some(ornament) = src.ornament {
                        orn.ornament = Some(if ornament > ORNAMENTS_COUNT { 0 } else { ornament });
                        orn.pos = 0;
                    }
                    dst.sample_num = src.sample;
                    dst.note = Some(note);
                    dst.pos_in_sample = Some(0);
                }
            }
            let new_offset = self.offset(orn);
            if new_offset != prev_offset {
                dst.note_slide = Some(new_offset);
            }
            self.ornaments[chan] = orn;
            if dst.has_changes() {
                chunk.channels.push(dst);
            }
        }
    }

    fn reset(&mut self) {
        self.ornaments = Default::default();
    }
}
