//! PSG register dumps.
//!
//! A 16-byte header (`PSG\x1a`, version, interrupt rate) followed by a stream
//! of `register, value` pairs. 0xFF starts the next frame, `0xFE n` inserts
//! `4 * n` empty frames and 0xFD ends the stream. Decoding stops quietly at
//! the first byte that fits none of these, keeping the frames read so far.

use log::debug;
use zxtune_common::CHANNELS_PER_AYM;
use zxtune_devices::aym::{self, ChunkMask, Register};

use super::{aym_player, module_info, Decoded};
use crate::error::{require, FormatError, Result};
use crate::tracking::{FrameRenderer, TrackModel, TrackState};
use crate::warnings::Warnings;

/// Format identifier.
pub const ID: &str = "PSG";

const SIGNATURE: &[u8] = b"PSG\x1a";
const HEADER_SIZE: usize = 16;
const INT_BEGIN: u8 = 0xFF;
const INT_SKIP: u8 = 0xFE;
const MUS_END: u8 = 0xFD;
const LAST_REGISTER: u8 = 15;

/// Header test.
pub fn check(data: &[u8]) -> bool {
    data.len() > HEADER_SIZE && data.starts_with(SIGNATURE)
}

/// Frames of the dump and the bytes consumed.
fn parse_stream(data: &[u8]) -> (Vec<aym::DataChunk>, usize) {
    // some emulators omit the header tail
    let start = if data.get(4) == Some(&INT_BEGIN) { 4 } else { HEADER_SIZE };
    let mut frames: Vec<aym::DataChunk> = Vec::new();
    let mut pos = start;
    while let Some(&code) = data.get(pos) {
        match code {
            INT_BEGIN => {
                frames.push(aym::DataChunk::default());
                pos += 1;
            }
            INT_SKIP => {
                let Some(&count) = data.get(pos + 1) else {
                    break;
                };
                frames.extend(std::iter::repeat(aym::DataChunk::default()).take(4 * usize::from(count)));
                pos += 2;
            }
            MUS_END => {
                pos += 1;
                break;
            }
            reg if reg <= LAST_REGISTER => {
                let Some(&value) = data.get(pos + 1) else {
                    break;
                };
                // values before the first frame marker have nowhere to go
                if let (Some(frame), Some(reg)) = (frames.last_mut(), Register::from_addr(reg)) {
                    frame.set(reg, value);
                }
                pos += 2;
            }
            _ => break,
        }
    }
    (frames, pos)
}

/// Decode a dump.
pub fn create(data: &[u8]) -> Result<Decoded> {
    if !check(data) {
        return Err(FormatError::NotRecognized);
    }
    let (frames, size) = parse_stream(data);
    require(!frames.is_empty(), || "no frames".to_string())?;
    debug!("PSG: {} frames in {size} bytes", frames.len());
    let info = module_info(ID, "", "", "", Warnings::new());
    Ok(Decoded {
        player: aym_player(info, PsgRenderer::new(frames)),
        size,
    })
}

/// Single pattern of one-frame lines.
struct StreamModel {
    frames: usize,
}

impl TrackModel for StreamModel {
    fn positions_count(&self) -> usize {
        1
    }

    fn position_pattern(&self, _position: usize) -> usize {
        0
    }

    fn loop_position(&self) -> usize {
        0
    }

    fn initial_tempo(&self) -> usize {
        1
    }

    fn pattern_size(&self, _pattern: usize) -> usize {
        self.frames
    }

    fn line_tempo(&self, _pattern: usize, _line: usize) -> Option<usize> {
        None
    }

    fn patterns_count(&self) -> usize {
        1
    }

    fn channels_count(&self) -> usize {
        CHANNELS_PER_AYM
    }
}

/// Replays every frame on top of the registers accumulated so far.
struct PsgRenderer {
    model: StreamModel,
    frames: Vec<aym::DataChunk>,
    registers: aym::DataChunk,
}

impl PsgRenderer {
    fn new(frames: Vec<aym::DataChunk>) -> Self {
        Self {
            model: StreamModel { frames: frames.len() },
            frames,
            registers: aym::DataChunk::default(),
        }
    }
}

impl FrameRenderer for PsgRenderer {
    type Chunk = aym::DataChunk;

    fn model(&self) -> &dyn TrackModel {
        &self.model
    }

    fn synthesize(&mut self, state: &TrackState, chunk: &mut aym::DataChunk) {
        if let Some(frame) = self.frames.get(state.line) {
            for reg in Register::ALL {
                if let Some(value) = frame.get(reg) {
                    self.registers.set(reg, value);
                }
            }
        }
        for reg in Register::ALL {
            if let Some(value) = self.registers.get(reg) {
                chunk.set(reg, value);
            }
        }
        // rewriting the shape restarts the envelope
        self.registers.mask.remove(ChunkMask::of(Register::EnvelopeShape));
    }

    fn reset(&mut self) {
        self.registers = aym::DataChunk::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zxtune_common::PlaybackState;
    use zxtune_devices::sound::{BufferReceiver, RenderParameters};

    fn dump(body: &[u8]) -> Vec<u8> {
        let mut data = b"PSG\x1a\x00\x32".to_vec();
        data.resize(HEADER_SIZE, 0);
        data.extend_from_slice(body);
        data
    }

    #[test]
    fn test_check() {
        assert!(check(&dump(&[INT_BEGIN])));
        assert!(!check(&dump(&[])));
        assert!(!check(b"PSG\x1b0123456789abcdef"));
    }

    #[test]
    fn test_stream_markers() {
        let data = dump(&[INT_BEGIN, 0, 0x10, 7, 0x38, INT_SKIP, 2, INT_BEGIN, 14, 0x55, MUS_END, 0xAA]);
        let (frames, size) = parse_stream(&data);
        assert_eq!(frames.len(), 10);
        assert_eq!(frames[0].get(Register::ToneALo), Some(0x10));
        assert_eq!(frames[0].get(Register::Mixer), Some(0x38));
        assert!(frames[1..].iter().all(|f| f.mask.is_empty()));
        assert_eq!(size, data.len() - 1);
    }

    #[test]
    fn test_truncated_pair_kept_out() {
        let data = dump(&[INT_BEGIN, 8, 0x0F, INT_BEGIN, 9]);
        let (frames, size) = parse_stream(&data);
        assert_eq!(frames.len(), 2);
        assert_eq!(size, data.len() - 1);
        let (_, size) = parse_stream(&dump(&[INT_BEGIN, 0x20, 1]));
        assert_eq!(size, HEADER_SIZE + 1);
    }

    #[test]
    fn test_short_header() {
        let data = b"PSG\x1a\xff\x00\x01\xff\x00\x02\xff\x00\x03\xff\x00\x04".to_vec();
        let (frames, _) = parse_stream(&data);
        assert_eq!(frames.len(), 4);
        assert_eq!(frames[3].get(Register::ToneALo), Some(4));
    }

    #[test]
    fn test_registers_persist_except_shape() {
        let data = dump(&[INT_BEGIN, 8, 0x0F, 13, 0x0E, INT_BEGIN, 0, 0x20]);
        let (frames, _) = parse_stream(&data);
        let mut renderer = PsgRenderer::new(frames);
        let mut first = aym::DataChunk::default();
        renderer.synthesize(&TrackState::default(), &mut first);
        assert_eq!(first.get(Register::EnvelopeShape), Some(0x0E));
        let mut second = aym::DataChunk::default();
        let state = TrackState {
            line: 1,
            ..TrackState::default()
        };
        renderer.synthesize(&state, &mut second);
        assert_eq!(second.get(Register::VolumeA), Some(0x0F));
        assert_eq!(second.get(Register::ToneALo), Some(0x20));
        assert_eq!(second.get(Register::EnvelopeShape), None);
    }

    #[test]
    fn test_plays_every_frame() {
        let decoded = create(&dump(&[INT_BEGIN, 8, 0x0F, INT_SKIP, 1, MUS_END])).unwrap();
        let mut player = decoded.player;
        assert_eq!(player.information().statistics.frames, 5);
        let params = RenderParameters::default();
        let mut out = BufferReceiver::default();
        for _ in 0..5 {
            assert_eq!(player.render_frame(&params, &mut out), PlaybackState::Playing);
        }
        assert_eq!(player.render_frame(&params, &mut out), PlaybackState::Stopped);
    }

    #[test]
    fn test_empty_stream_rejected() {
        assert!(create(&dump(&[MUS_END])).is_err());
    }
}
