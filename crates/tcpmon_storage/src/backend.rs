//! Filesystem capability trait definitions.

use crate::error::StorageResult;
use std::fmt;
use std::io::{self, Read, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::SystemTime;

/// Metadata returned by [`Filesystem::stat`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStat {
    /// File size in bytes.
    pub size: u64,
    /// Last modification time.
    pub modified: SystemTime,
}

/// A file opened for appending.
///
/// Writes go through [`std::io::Write`]. Implementations may buffer;
/// `flush` pushes buffered bytes to the OS and `sync` additionally makes
/// them durable.
pub trait WritableFile: Write + Send {
    /// Flushes buffered data and syncs it to durable storage.
    ///
    /// # Errors
    ///
    /// Returns an error if the flush or sync fails.
    fn sync(&mut self) -> StorageResult<()>;
}

/// A file opened for reading.
///
/// # Invariants
///
/// - `read_at` takes its own offset and never mutates shared state, so a
///   single handle is safe to use from many threads at once
/// - `size` reflects bytes appended by a concurrent writer to the same file
pub trait ReadableFile: Send + Sync {
    /// Reads exactly `len` bytes starting at `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StorageError::ReadPastEnd`] if the range extends
    /// beyond the current size, or an I/O error.
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>>;

    /// Returns the current size of the file in bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the size cannot be determined.
    fn size(&self) -> StorageResult<u64>;
}

/// The narrow set of filesystem operations the data store needs.
///
/// The writer, reclaimer, scanner and packager only touch disk through
/// this trait.
///
/// # Implementors
///
/// - [`super::OsFilesystem`] - Real directories
/// - [`super::InMemoryFilesystem`] - For testing
pub trait Filesystem: Send + Sync + fmt::Debug {
    /// Creates a directory and all missing parents.
    ///
    /// Succeeds if the directory already exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    fn create_dir_all(&self, path: &Path) -> StorageResult<()>;

    /// Creates a file for writing, truncating it if it exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created.
    fn create(&self, path: &Path) -> StorageResult<Box<dyn WritableFile>>;

    /// Opens an existing file for positional reads.
    ///
    /// # Errors
    ///
    /// Returns an error if the file does not exist or cannot be opened.
    fn open(&self, path: &Path) -> StorageResult<Arc<dyn ReadableFile>>;

    /// Lists the file names (not full paths) in a directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be read.
    fn list(&self, dir: &Path) -> StorageResult<Vec<String>>;

    /// Removes a file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file does not exist or cannot be removed.
    fn remove(&self, path: &Path) -> StorageResult<()>;

    /// Returns size and modification time of a file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file does not exist.
    fn stat(&self, path: &Path) -> StorageResult<FileStat>;

    /// Takes an advisory exclusive lock on `path`, creating the lock file.
    ///
    /// The lock is held until the returned [`DirLock`] is dropped.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StorageError::Locked`] if the lock is held elsewhere.
    fn try_lock(&self, path: &Path) -> StorageResult<DirLock>;
}

/// An exclusive lock held until dropped.
pub struct DirLock {
    _guard: Box<dyn Send + Sync>,
}

impl DirLock {
    /// Wraps an implementation-specific guard whose drop releases the lock.
    pub fn new<G: Send + Sync + 'static>(guard: G) -> Self {
        Self {
            _guard: Box::new(guard),
        }
    }
}

impl fmt::Debug for DirLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirLock").finish_non_exhaustive()
    }
}

/// Chunk size used by [`FileReader`] for each positional read.
const READ_CHUNK: usize = 64 * 1024;

/// Sequential [`Read`] adapter over a [`ReadableFile`].
///
/// The reader is bounded to the size observed when it was created (or an
/// explicit limit), so bytes appended afterwards by a writer are not read.
pub struct FileReader {
    file: Arc<dyn ReadableFile>,
    offset: u64,
    end: u64,
}

impl FileReader {
    /// Creates a reader over the whole file as of now.
    ///
    /// # Errors
    ///
    /// Returns an error if the file size cannot be determined.
    pub fn new(file: Arc<dyn ReadableFile>) -> StorageResult<Self> {
        let end = file.size()?;
        Ok(Self::with_limit(file, end))
    }

    /// Creates a reader over the first `len` bytes of the file.
    #[must_use]
    pub fn with_limit(file: Arc<dyn ReadableFile>, len: u64) -> Self {
        Self {
            file,
            offset: 0,
            end: len,
        }
    }

    /// Returns the number of bytes not yet read.
    #[must_use]
    pub fn remaining(&self) -> u64 {
        self.end - self.offset
    }
}

impl Read for FileReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let remaining = self.remaining();
        if remaining == 0 || buf.is_empty() {
            return Ok(0);
        }

        let len = buf.len().min(READ_CHUNK).min(remaining as usize);
        let data = self.file.read_at(self.offset, len)?;
        buf[..data.len()].copy_from_slice(&data);
        self.offset += data.len() as u64;
        Ok(data.len())
    }
}

impl fmt::Debug for FileReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileReader")
            .field("offset", &self.offset)
            .field("end", &self.end)
            .finish_non_exhaustive()
    }
}
