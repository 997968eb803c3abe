//! ZX Spectrum tracker module decoders and containers
//!
//! Turns raw files into frame-stepping [`Player`](zxtune_common::Player)s
//! driving the chip emulators of `zxtune-devices`.
//!
//! # Features
//! - Tracker formats: ProTracker 2 and 3 (Vortex), Sound Tracker, Sound
//!   Tracker Pro, ASC Sound Master, ProDigi Tracker, Chip Tracker
//! - PSG register dumps and TurboSound dual-chip modules
//! - Containers: TR-DOS images, SCL, Hobeta, HRiP and a raw offset scanner
//! - Malformed-but-plausible data produces warnings instead of errors
//! - Module paths with nested subpaths (`disk.trd?tune.C`)
//!
//! # Quick start
//! ```no_run
//! use zxtune_formats::Registry;
//! use zxtune_common::{PlaybackState, Player};
//! use zxtune_devices::sound::{BufferReceiver, RenderParameters};
//!
//! let registry = Registry::default();
//! let mut module = registry.load("music.scl?tune.C")?;
//! let params = RenderParameters::default();
//! let mut out = BufferReceiver::default();
//! while module.render_frame(&params, &mut out) == PlaybackState::Playing {}
//! # Ok::<(), zxtune_formats::FormatError>(())
//! ```

#![warn(missing_docs)]

pub mod binary;
pub mod containers;
pub mod detector;
mod error;
pub mod formats;
pub mod module;
pub mod path;
pub mod reader;
pub mod registry;
pub mod tracking;
pub mod warnings;

pub use binary::Container;
pub use error::{FormatError, Result};
pub use formats::Decoded;
pub use module::Module;
pub use registry::{Capabilities, Description, Descriptor, Handler, Registry};
pub use warnings::Warnings;
