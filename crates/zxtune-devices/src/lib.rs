//! Sound chip emulation for ZX Spectrum chiptunes
//!
//! Software models of the sound hardware targeted by ZX Spectrum trackers. The
//! devices are driven by tick-stamped register chunks produced by a sequencer and
//! push PCM samples into a [`Receiver`](sound::Receiver).
//!
//! # Features
//! - Tick-accurate AY-3-8910/YM2149 emulation: 3 tone generators, 17-bit noise LFSR,
//!   16-shape envelope generator, AY and YM volume curves
//! - Multichannel 8-bit DAC sample player for digital soundtracker formats
//! - Serializable render parameters shared by every device
//! - Live channel analysis for visualizers
//!
//! # Quick start
//! ```no_run
//! use zxtune_devices::aym::{AymChip, DataChunk, Register};
//! use zxtune_devices::sound::{BufferReceiver, RenderParameters};
//! use zxtune_devices::Chip;
//!
//! let params = RenderParameters::default();
//! let mut chip = AymChip::new();
//! let mut chunk = DataChunk::new(params.clocks_per_frame());
//! chunk.set(Register::ToneALo, 0x1C);
//! chunk.set(Register::ToneAHi, 0x01);
//! chunk.set(Register::Mixer, 0x3E);
//! chunk.set(Register::VolumeA, 0x0F);
//!
//! let mut receiver = BufferReceiver::default();
//! chip.render_data(&params, &chunk, &mut receiver);
//! ```

#![warn(missing_docs)]

pub mod aym;
pub mod dac;
pub mod sound;

/// Error types for chip emulator configuration.
///
/// Rendering itself never fails; these errors only surface while a device is
/// being set up (sample uploads, channel layout).
#[derive(thiserror::Error, Debug)]
pub enum DeviceError {
    /// Sample slot outside the configured sample bank
    #[error("sample slot {index} out of range (bank holds {count})")]
    InvalidSample {
        /// Requested slot.
        index: usize,
        /// Number of slots in the bank.
        count: usize,
    },

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl From<String> for DeviceError {
    fn from(msg: String) -> Self {
        DeviceError::Other(msg)
    }
}

impl From<&str> for DeviceError {
    fn from(msg: &str) -> Self {
        DeviceError::Other(msg.to_string())
    }
}

/// Result type for device operations
pub type Result<T> = std::result::Result<T, DeviceError>;

use sound::{ChannelState, Receiver, RenderParameters};

/// Common interface of chip emulators driven by tick-stamped data chunks.
///
/// A chip keeps its oscillator state between calls, so consecutive chunks must be
/// fed in tick order for phase continuity.
pub trait Chip: Send {
    /// Register snapshot type consumed by the chip.
    type Chunk;

    /// Apply `chunk` and render samples up to its tick.
    ///
    /// # Arguments
    /// * `params` - Clock and output rates
    /// * `chunk` - Register updates stamped with the tick they run until
    /// * `dst` - Sink for rendered samples
    fn render_data(&mut self, params: &RenderParameters, chunk: &Self::Chunk, dst: &mut dyn Receiver);

    /// Render a sequence of chunks.
    fn render_stream<'a, I>(&mut self, params: &RenderParameters, chunks: I, dst: &mut dyn Receiver)
    where
        I: IntoIterator<Item = &'a Self::Chunk>,
        Self::Chunk: 'a,
        Self: Sized,
    {
        for chunk in chunks {
            self.render_data(params, chunk, dst);
        }
    }

    /// Return to power-on state.
    fn reset(&mut self);

    /// Live per-channel state for visualization.
    fn get_state(&self) -> Vec<ChannelState>;
}
