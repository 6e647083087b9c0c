//! Core type definitions for the tcpmon store.

use crate::error::{CoreError, CoreResult};
use std::fmt;

/// Sequence number of a data file.
///
/// File numbers are allocated in increasing order and never reused; the
/// number is encoded in the file name. `FileNo(0)` means "no file yet".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct FileNo(pub u32);

impl FileNo {
    /// Creates a file number.
    #[must_use]
    pub const fn new(no: u32) -> Self {
        Self(no)
    }

    /// Returns the raw value.
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    /// Returns the following file number.
    ///
    /// # Errors
    ///
    /// Returns an error if the sequence space is exhausted.
    pub fn next(self) -> CoreResult<Self> {
        self.0
            .checked_add(1)
            .map(Self)
            .ok_or_else(|| CoreError::invalid_operation("file sequence numbers exhausted"))
    }
}

impl fmt::Display for FileNo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Whether a data file is still appendable or compressed and immutable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FileState {
    /// Plain concatenation of frames; the active file or a leftover.
    Raw,
    /// Compressed, immutable.
    Sealed,
}

impl FileState {
    /// Returns a short lowercase label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Raw => "raw",
            Self::Sealed => "sealed",
        }
    }
}

impl fmt::Display for FileState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Location of one record inside a (decompressed) data file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecordRange {
    /// Offset of the frame header.
    pub header_offset: u64,
    /// Length of the frame header.
    pub header_len: u32,
    /// Offset of the payload.
    pub body_offset: u64,
    /// Length of the payload.
    pub body_len: u32,
}

impl RecordRange {
    /// Returns the offset one past the end of the record.
    #[must_use]
    pub const fn end(&self) -> u64 {
        self.body_offset + self.body_len as u64
    }
}
