//! Common traits and types for ZX Spectrum chiptune players.
//!
//! This crate provides the abstractions shared by every format decoder and
//! container wrapper.
//!
//! # Traits
//!
//! - [`Player`] - Frame-stepping playback interface for any decoded module
//! - [`MetadataFields`] - Metadata access (title, author, duration, etc.)
//!
//! # Example
//!
//! ```ignore
//! use zxtune_common::{Player, PlaybackState};
//! use zxtune_devices::sound::{BufferReceiver, RenderParameters};
//!
//! fn render_all(player: &mut dyn Player) -> BufferReceiver {
//!     let params = RenderParameters::default();
//!     let mut buffer = BufferReceiver::default();
//!     while player.render_frame(&params, &mut buffer) == PlaybackState::Playing {}
//!     buffer
//! }
//! ```

#![warn(missing_docs)]

mod information;
mod player;

pub use information::{attributes, Information, MetadataFields, ModuleStatistics};
pub use player::{PlaybackState, Player};

// ============================================================================
// Common Constants
// ============================================================================

/// PAL frame rate (50 Hz) - the ZX Spectrum interrupt rate.
pub const FRAME_RATE_PAL: u32 = 50;

/// Number of tone channels per AY chip.
pub const CHANNELS_PER_AYM: usize = 3;
