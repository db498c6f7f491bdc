//! Ring codec error types.

use std::io;
use thiserror::Error;

/// Errors that can occur while loading or saving ring files.
#[derive(Debug, Error)]
pub enum RingError {
    /// Valid magic bytes followed by an unknown format version
    #[error("unsupported ring format version: {version}")]
    UnsupportedFormatVersion {
        /// The unsupported version number
        version: u16,
    },

    /// Truncated or malformed header or partition-array bytes
    #[error("corrupt ring data: {reason}")]
    Corrupt {
        /// Description of the problem
        reason: String,
    },

    /// Only rewind-to-start is supported on a ring reader
    #[error("unsupported seek to offset {offset}; only rewind to start is supported")]
    UnsupportedSeek {
        /// The rejected seek target
        offset: u64,
    },

    /// Underlying storage error, propagated unchanged
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl RingError {
    /// Create a corrupt-data error.
    pub fn corrupt(reason: impl Into<String>) -> Self {
        RingError::Corrupt {
            reason: reason.into(),
        }
    }
}

/// Result type for ring codec operations.
pub type RingResult<T> = Result<T, RingError>;
