//! Error types for storage operations.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Attempted to read beyond the end of a file.
    #[error("read beyond end of file: offset {offset}, len {len}, size {size}")]
    ReadPastEnd {
        /// The requested read offset.
        offset: u64,
        /// The requested read length.
        len: usize,
        /// The current file size.
        size: u64,
    },

    /// Another handle holds the lock on this path.
    #[error("lock already held: {}", path.display())]
    Locked {
        /// The lock file path.
        path: PathBuf,
    },
}

impl StorageError {
    /// Returns true if this error means the file or directory does not exist.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Io(e) if e.kind() == io::ErrorKind::NotFound)
    }

    /// Creates a not-found error for the given path.
    pub(crate) fn not_found(path: &std::path::Path) -> Self {
        Self::Io(io::Error::new(
            io::ErrorKind::NotFound,
            format!("no such file or directory: {}", path.display()),
        ))
    }
}

impl From<StorageError> for io::Error {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Io(e) => e,
            StorageError::ReadPastEnd { .. } => io::Error::new(io::ErrorKind::UnexpectedEof, err),
            StorageError::Locked { .. } => io::Error::new(io::ErrorKind::WouldBlock, err),
        }
    }
}
