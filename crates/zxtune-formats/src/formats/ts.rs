//! TurboSound: two AY modules played on two chips at once.
//!
//! The file is the plain concatenation of both modules followed by a 16-byte
//! footer: `id1[4] size1:u16le id2[4] size2:u16le "02TS"`. Output channels of
//! the second chip follow those of the first one.

use log::debug;
use zxtune_common::{attributes, Information, PlaybackState, Player, CHANNELS_PER_AYM};
use zxtune_devices::sound::{BufferReceiver, ChannelState, Receiver, RenderParameters, Sample};

use super::{pt3, Decoded};
use crate::error::{require, FormatError, Result};
use crate::reader::u16le_at;

/// Format identifier.
pub const ID: &str = "TS";

const FOOTER_SIZE: usize = 16;
const SIGNATURE: &[u8; 4] = b"02TS";

/// Sizes of both parts, `None` unless the footer is consistent.
fn parts(data: &[u8]) -> Option<(usize, usize)> {
    let limit = data.len();
    let footer = data.get(limit.checked_sub(FOOTER_SIZE)?..)?;
    if &footer[12..16] != SIGNATURE {
        return None;
    }
    let size1 = usize::from(u16le_at(footer, 4).ok()?);
    let size2 = usize::from(u16le_at(footer, 10).ok()?);
    (size1 < limit && size2 < limit && size1 + size2 + FOOTER_SIZE == limit).then_some((size1, size2))
}

/// Footer test.
pub fn check(data: &[u8]) -> bool {
    parts(data).is_some()
}

/// Decode both parts as ProTracker 3 modules.
pub fn create(data: &[u8]) -> Result<Decoded> {
    create_with(data, pt3::create)
}

/// Decode both parts with `open`, which must yield players of equal channel count.
pub fn create_with<F>(data: &[u8], open: F) -> Result<Decoded>
where
    F: Fn(&[u8]) -> Result<Decoded>,
{
    let (size1, size2) = parts(data).ok_or(FormatError::NotRecognized)?;
    let first = open(&data[..size1])?.player;
    let second = open(&data[size1..size1 + size2])?.player;
    let (info1, info2) = (first.information(), second.information());
    require(info1.statistics.channels == info2.statistics.channels, || {
        format!(
            "channel count mismatch: {} vs {}",
            info1.statistics.channels, info2.statistics.channels
        )
    })?;
    debug!("TS: {size1} + {size2} bytes");
    Ok(Decoded {
        player: Box::new(TsPlayer::new(first, second)),
        size: data.len(),
    })
}

/// Properties of the first part, with differing titles and authors joined by
/// `/` and the warnings of both parts.
fn merge_information(first: &Information, second: &Information) -> Information {
    let mut merged = first.clone();
    for (key, value) in &second.properties {
        let combined = match merged.get(key) {
            None => value.clone(),
            Some(existing) if existing == value => continue,
            Some(existing) if key == attributes::TITLE || key == attributes::AUTHOR => format!("{existing}/{value}"),
            Some(existing) if key == attributes::WARNINGS => format!("{existing}\n{value}"),
            Some(_) => continue,
        };
        merged.set(key, combined);
    }
    merged.statistics.frames = first.statistics.frames.min(second.statistics.frames);
    merged.push_container(ID);
    merged
}

/// Two players rendered in lockstep, channels concatenated.
pub struct TsPlayer {
    info: Information,
    players: [Box<dyn Player>; 2],
    buffers: [BufferReceiver; 2],
    widths: [usize; 2],
    flushed: bool,
}

impl TsPlayer {
    /// Composite of two players, both positioned at their first frame.
    pub fn new(first: Box<dyn Player>, second: Box<dyn Player>) -> Self {
        let info = merge_information(first.information(), second.information());
        Self {
            info,
            players: [first, second],
            buffers: Default::default(),
            widths: [CHANNELS_PER_AYM; 2],
            flushed: false,
        }
    }

    fn emit(&mut self, receiver: &mut dyn Receiver) {
        for (width, buffer) in self.widths.iter_mut().zip(&self.buffers) {
            if buffer.ticks > 0 {
                *width = buffer.channels;
            }
        }
        let ticks = self.buffers[0].ticks.max(self.buffers[1].ticks);
        let mut frame: Vec<Sample> = Vec::with_capacity(self.widths[0] + self.widths[1]);
        for tick in 0..ticks {
            frame.clear();
            for (width, buffer) in self.widths.iter().zip(&self.buffers) {
                let start = tick * width;
                match buffer.data.get(start..start + width) {
                    Some(samples) => frame.extend_from_slice(samples),
                    None => frame.extend(std::iter::repeat(0).take(*width)),
                }
            }
            receiver.apply_sample(&frame);
        }
    }
}

impl Player for TsPlayer {
    fn information(&self) -> &Information {
        &self.info
    }

    fn render_frame(&mut self, params: &RenderParameters, receiver: &mut dyn Receiver) -> PlaybackState {
        let mut state = PlaybackState::Playing;
        for (player, buffer) in self.players.iter_mut().zip(&mut self.buffers) {
            *buffer = BufferReceiver::default();
            state = state.min(player.render_frame(params, buffer));
        }
        self.emit(receiver);
        if state == PlaybackState::Stopped && !self.flushed {
            receiver.flush();
            self.flushed = true;
        }
        state
    }

    fn reset(&mut self) -> PlaybackState {
        self.flushed = false;
        let [first, second] = &mut self.players;
        first.reset().min(second.reset())
    }

    fn set_position(&mut self, frame: usize) -> PlaybackState {
        self.flushed = false;
        let [first, second] = &mut self.players;
        first.set_position(frame).min(second.set_position(frame))
    }

    fn state(&self) -> PlaybackState {
        self.players[0].state().min(self.players[1].state())
    }

    fn current_frame(&self) -> usize {
        self.players[0].current_frame()
    }

    fn channels_state(&self) -> Vec<ChannelState> {
        let mut result = self.players[0].channels_state();
        result.extend(self.players[1].channels_state());
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formats::pt3::tests::single_note_module;

    fn turbosound(first: &[u8], second: &[u8]) -> Vec<u8> {
        let mut data = first.to_vec();
        data.extend_from_slice(second);
        data.extend_from_slice(b"PT3!");
        data.extend_from_slice(&(first.len() as u16).to_le_bytes());
        data.extend_from_slice(b"PT3!");
        data.extend_from_slice(&(second.len() as u16).to_le_bytes());
        data.extend_from_slice(SIGNATURE);
        data
    }

    #[test]
    fn test_footer_check() {
        let data = turbosound(&single_note_module(2), &single_note_module(3));
        assert!(check(&data));
        assert!(!check(&data[..data.len() - 1]));
        let mut bad = data.clone();
        let len = bad.len();
        bad[len - 12] ^= 1;
        assert!(!check(&bad));
        assert!(!check(b"02TS"));
    }

    #[test]
    fn test_merged_information() {
        let mut second = single_note_module(3);
        second[30..36].copy_from_slice(b"Second");
        let data = turbosound(&single_note_module(2), &second);
        let decoded = create(&data).unwrap();
        assert_eq!(decoded.size, data.len());
        let info = decoded.player.information();
        assert_eq!(info.get(attributes::TITLE), Some("Single/Second"));
        assert_eq!(info.get(attributes::AUTHOR), Some("Tester"));
        assert_eq!(info.get(attributes::CONTAINER), Some(ID));
        assert_eq!(info.statistics.frames, 2);
    }

    #[test]
    fn test_merge_keeps_other_properties() {
        let mut first = Information::with_type("PT3");
        first.set(attributes::PROGRAM, "Vortex Tracker II 1.0");
        first.set(attributes::AUTHOR, "Same");
        first.set(attributes::WARNINGS, "Pattern 0: duplicated tempo");
        let mut second = Information::with_type("PT3");
        second.set(attributes::PROGRAM, "ProTracker 3.5");
        second.set(attributes::AUTHOR, "Same");
        second.set(attributes::WARNINGS, "loop position 4 out of range\nPattern 1: zero line skip");
        second.set(attributes::COMMENT, "second only");

        let merged = merge_information(&first, &second);
        assert_eq!(merged.get(attributes::PROGRAM), Some("Vortex Tracker II 1.0"));
        assert_eq!(merged.get(attributes::AUTHOR), Some("Same"));
        assert_eq!(merged.get(attributes::TYPE), Some("PT3"));
        assert_eq!(merged.get(attributes::COMMENT), Some("second only"));
        assert_eq!(
            merged.warnings().collect::<Vec<_>>(),
            [
                "Pattern 0: duplicated tempo",
                "loop position 4 out of range",
                "Pattern 1: zero line skip"
            ]
        );
    }

    #[test]
    fn test_stops_with_shorter_stream() {
        let data = turbosound(&single_note_module(2), &single_note_module(3));
        let mut player = create(&data).unwrap().player;
        let params = RenderParameters::default();
        let mut out = BufferReceiver::default();
        assert_eq!(player.render_frame(&params, &mut out), PlaybackState::Playing);
        assert_eq!(player.render_frame(&params, &mut out), PlaybackState::Playing);
        assert_eq!(player.render_frame(&params, &mut out), PlaybackState::Stopped);
        assert!(out.flushed);
        assert_eq!(out.channels, 2 * CHANNELS_PER_AYM);
        assert_eq!(player.state(), PlaybackState::Stopped);
        assert_eq!(player.reset(), PlaybackState::Stopped);
        assert_eq!(player.channels_state().len(), 2 * CHANNELS_PER_AYM);
    }
}
