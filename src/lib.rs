//! ZX Spectrum chiptune player
//!
//! Decodes tracker modules for the AY-3-8910/YM2149 and digital sample
//! players of the ZX Spectrum and renders them to PCM.
//!
//! # Features
//! - Tick-accurate AY/YM emulation and a multichannel 8-bit DAC
//! - ProTracker 2/3, Sound Tracker (Pro), ASC, ProDigi, Chip Tracker,
//!   PSG dumps and TurboSound modules
//! - TR-DOS images, SCL, Hobeta and HRiP containers with nested subpaths
//! - WAV export and JSON render configuration
//!
//! # Workspace crates
//! - [`devices`]: chip emulators, render parameters and sample receivers
//! - [`common`]: the [`Player`] trait and module information
//! - [`formats`]: decoders, containers and the format [`Registry`]
//!
//! # Quick start
//! ```no_run
//! use zxtune::{export_to_wav, Registry, RenderParameters};
//!
//! # fn main() -> zxtune::Result<()> {
//! let registry = Registry::default();
//! let mut module = registry.load("disk.trd?tune.C")?;
//! let params = RenderParameters::default();
//! export_to_wav(&mut module, &params, "tune.wav", None)?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod config;
pub mod export;

pub use zxtune_common as common;
pub use zxtune_devices as devices;
pub use zxtune_formats as formats;

pub use config::load_parameters;
pub use export::{export_to_wav, render, WavReceiver};
pub use zxtune_common::{attributes, Information, MetadataFields, PlaybackState, Player};
pub use zxtune_devices::sound::{ChipType, RenderParameters};
pub use zxtune_formats::{FormatError, Module, Registry};

/// Error types for loading, configuring and exporting.
#[derive(thiserror::Error, Debug)]
pub enum ZxtuneError {
    /// Module could not be opened or decoded
    #[error("Format error: {0}")]
    Format(#[from] FormatError),

    /// Error writing audio file
    #[error("Audio file write error: {0}")]
    AudioFileError(String),

    /// IO error from filesystem
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl From<String> for ZxtuneError {
    fn from(msg: String) -> Self {
        ZxtuneError::Other(msg)
    }
}

impl From<&str> for ZxtuneError {
    fn from(msg: &str) -> Self {
        ZxtuneError::Other(msg.to_string())
    }
}

/// Result type for player operations
pub type Result<T> = std::result::Result<T, ZxtuneError>;
