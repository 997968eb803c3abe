//! Tracked module representation shared by every tracker format.
//!
//! Decoders turn their byte layouts into [`ModuleData`]; a format-specific
//! [`FrameRenderer`] turns the sequencer position into chip register chunks and
//! [`TrackPlayer`] drives both against a chip emulator.

mod model;
mod pattern;
mod player;
mod sequencer;

pub use model::{Chan, Line, ModuleData, Ornament, Pattern, Position, TrackModel};
pub use pattern::{decode_pattern, ChannelCursor, MAX_PATTERN_LINES};
pub use player::{FrameRenderer, TickChunk, TrackPlayer};
pub use sequencer::{Sequencer, TimeInfo, TrackState};
