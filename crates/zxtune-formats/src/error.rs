//! Error handling for format decoding and container unwrapping.

use thiserror::Error;

/// Convenient result alias for decoding.
pub type Result<T> = std::result::Result<T, FormatError>;

/// Errors that may occur while detecting, decoding or unwrapping modules.
#[derive(Debug, Error)]
pub enum FormatError {
    /// No registered format accepted the data.
    #[error("format not recognized")]
    NotRecognized,
    /// A read ran past the end of the data.
    #[error("unexpected end of data at offset 0x{offset:04x}")]
    UnexpectedEof {
        /// Offset of the failed read.
        offset: usize,
    },
    /// A block does not fit into the data.
    #[error("block 0x{offset:04x}+{size} is out of range")]
    OutOfRange {
        /// Block start.
        offset: usize,
        /// Block size.
        size: usize,
    },
    /// Subpath does not name an entry of the container.
    #[error("no entry '{path}' in container")]
    InvalidPath {
        /// Requested subpath.
        path: String,
    },
    /// Container holds no playable entries.
    #[error("container '{name}' has no playable entries")]
    EmptyContainer {
        /// Container type.
        name: String,
    },
    /// Feature deliberately not implemented (e.g. packed HRIP blocks).
    #[error("unsupported: {what}")]
    Unsupported {
        /// Description of the unsupported feature.
        what: String,
    },
    /// Chip set up with the decoded data failed.
    #[error("device error: {0}")]
    Device(#[from] zxtune_devices::DeviceError),
    /// Filesystem error while loading a module.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// Generic validation error.
    #[error("{msg}")]
    InvalidData {
        /// Human-readable explanation of the validation failure.
        msg: String,
    },
}

impl From<String> for FormatError {
    fn from(s: String) -> Self {
        FormatError::InvalidData { msg: s }
    }
}

impl From<&str> for FormatError {
    fn from(s: &str) -> Self {
        FormatError::InvalidData { msg: s.to_string() }
    }
}

/// Return `Err(InvalidData)` with `msg` unless `cond` holds.
pub(crate) fn require(cond: bool, msg: impl FnOnce() -> String) -> Result<()> {
    if cond {
        Ok(())
    } else {
        Err(FormatError::InvalidData { msg: msg() })
    }
}
