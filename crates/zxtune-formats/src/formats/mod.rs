//! Tracker module decoders.
//!
//! Every decoder exposes `check(&[u8]) -> bool`, a cheap structural test, and
//! `create(&[u8]) -> Result<Decoded>`, the authoritative parse. Data accepted
//! by `check` may still be rejected by `create`.

use zxtune_common::{attributes, Information, Player};
use zxtune_devices::aym::{self, AymChip};
use zxtune_devices::dac::{self, DacChip};

use crate::error::Result;
use crate::tracking::{FrameRenderer, TrackPlayer};
use crate::warnings::Warnings;

pub mod asc;
pub mod chi;
pub mod pdt;
pub mod psg;
pub mod pt2;
pub mod pt3;
pub mod stc;
pub mod stp;
pub mod tables;
pub mod ts;
mod vortex;

/// Successfully decoded module.
pub struct Decoded {
    /// Player positioned at the first frame
    pub player: Box<dyn Player>,
    /// Bytes of the input covered by the module (player code included)
    pub size: usize,
}

impl std::fmt::Debug for Decoded {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Decoded")
            .field("type", &self.player.information().get(attributes::TYPE))
            .field("size", &self.size)
            .finish()
    }
}

/// Information block with the common text properties filled in.
pub(crate) fn module_info(id: &str, title: &str, author: &str, program: &str, warnings: Warnings) -> Information {
    let mut info = Information::with_type(id);
    info.set(attributes::TITLE, title);
    info.set(attributes::AUTHOR, author);
    info.set(attributes::PROGRAM, program);
    if let Some(text) = warnings.into_text() {
        info.set(attributes::WARNINGS, text);
    }
    info
}

/// Player for a renderer driving a single AYM chip.
pub(crate) fn aym_player<R>(info: Information, renderer: R) -> Box<dyn Player>
where
    R: FrameRenderer<Chunk = aym::DataChunk> + 'static,
{
    Box::new(TrackPlayer::new(info, renderer, AymChip::new()))
}

/// Mixer bits disabling tone and noise of `channel`.
pub(crate) fn mute_bits(channel: usize) -> u8 {
    (aym::MixerFlags::tone(channel) | aym::MixerFlags::noise(channel)).bits()
}

/// 8-bit unsigned sample of a digital tracker.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct DigitalSample {
    pub data: Vec<u8>,
    /// Restart offset; `data.len()` or more plays once
    pub loop_pos: usize,
}

/// DAC with `samples` uploaded to slots of the same index.
pub(crate) fn dac_chip(channels: usize, samples: &[DigitalSample], base_freq: u32) -> Result<DacChip> {
    let mut chip = DacChip::new(channels, samples.len(), base_freq);
    for (idx, sample) in samples.iter().enumerate() {
        if !sample.data.is_empty() {
            chip.set_sample(idx, sample.data.clone(), sample.loop_pos)?;
        }
    }
    Ok(chip)
}

/// Player for a renderer driving a DAC.
pub(crate) fn dac_player<R>(info: Information, renderer: R, chip: DacChip) -> Box<dyn Player>
where
    R: FrameRenderer<Chunk = dac::DataChunk> + 'static,
{
    Box::new(TrackPlayer::new(info, renderer, chip))
}
