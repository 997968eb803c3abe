//! AY-3-8910/YM2149 emulation
//!
//! - [`registers`]: register map, write masks and the [`DataChunk`] snapshot
//! - [`envelope`]: the 16 envelope shapes
//! - [`chip`]: the tick-accurate renderer

pub mod chip;
pub mod envelope;
pub mod registers;
mod tables;

pub use chip::AymChip;
pub use envelope::{EnvelopeShape, Overflow};
pub use registers::{ChunkMask, DataChunk, MixerFlags, Register, MASK_ENV, MASK_VOL, REGISTERS_COUNT};
pub use tables::{AY_VOLUME_TABLE, SPECTRUM_TABLE, YM_VOLUME_TABLE};
