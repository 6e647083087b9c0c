//! Error types for the tcpmon store.

use std::io;
use std::path::PathBuf;
use tcpmon_codec::Timestamp;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in store, reader and export operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Filesystem error.
    #[error("storage error: {0}")]
    Storage(#[from] tcpmon_storage::StorageError),

    /// Metric payload could not be decoded or rendered.
    #[error("codec error: {0}")]
    Codec(#[from] tcpmon_codec::CodecError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A file does not contain well-formed frames.
    ///
    /// Raised for a header version mismatch and for truncated records in
    /// sealed files. Fatal for the operation on that file.
    #[error("format error: {message}")]
    Format {
        /// Description of the problem.
        message: String,
    },

    /// The export target time lies outside the exported range.
    ///
    /// Expected and non-fatal; callers move on to the next file.
    #[error("time point {target} is not included in [{start}, {end})")]
    TimePointNotIncluded {
        /// The requested target time.
        target: Timestamp,
        /// First timestamp of the range.
        start: Timestamp,
        /// Last timestamp of the range.
        end: Timestamp,
    },

    /// Invalid configuration or on-disk layout.
    #[error("configuration error: {message}")]
    Config {
        /// Description of the problem.
        message: String,
    },

    /// Another writer holds the store directory.
    #[error("store locked: another writer holds {}", path.display())]
    Locked {
        /// The lock file path.
        path: PathBuf,
    },

    /// The store has been closed.
    #[error("store is closed")]
    StoreClosed,

    /// The store stopped accepting writes after a write failure.
    #[error("store halted after write failure: {reason}")]
    StoreHalted {
        /// The failure that halted the store.
        reason: String,
    },

    /// Operation not permitted.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of why the operation is invalid.
        message: String,
    },
}

impl CoreError {
    /// Creates a format error.
    pub fn format(message: impl Into<String>) -> Self {
        Self::Format {
            message: message.into(),
        }
    }

    /// Creates a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Returns true for [`CoreError::TimePointNotIncluded`].
    #[must_use]
    pub fn is_time_point_not_included(&self) -> bool {
        matches!(self, Self::TimePointNotIncluded { .. })
    }

    /// Returns true for [`CoreError::Format`].
    #[must_use]
    pub fn is_format(&self) -> bool {
        matches!(self, Self::Format { .. })
    }
}
