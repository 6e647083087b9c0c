//! Fault injection for store tests.
//!
//! [`FaultyFilesystem`] wraps another filesystem and fails selected
//! operations on demand, so tests can drive the store through failed
//! writes, failed file creation and failed deletion.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use tcpmon_testkit::faulty::FaultyFilesystem;
//!
//! let fs = Arc::new(FaultyFilesystem::new(Arc::new(InMemoryFilesystem::new())));
//! fs.fail_writes_after(10);
//! // the next write crossing 10 bytes is cut short and fails
//! ```

use parking_lot::Mutex;
use std::collections::HashSet;
use std::fmt;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tcpmon_storage::{
    DirLock, FileStat, Filesystem, ReadableFile, StorageError, StorageResult, WritableFile,
};

/// A filesystem wrapper that fails operations on demand.
pub struct FaultyFilesystem {
    inner: Arc<dyn Filesystem>,
    faults: Arc<Faults>,
}

struct Faults {
    write_budget: AtomicU64,
    bytes_written: AtomicU64,
    fail_creates: AtomicBool,
    fail_removes: AtomicBool,
    protected: Mutex<HashSet<PathBuf>>,
    failed_writes: AtomicU64,
}

impl FaultyFilesystem {
    /// Wraps `inner` with no faults armed.
    pub fn new(inner: Arc<dyn Filesystem>) -> Self {
        Self {
            inner,
            faults: Arc::new(Faults {
                write_budget: AtomicU64::new(u64::MAX),
                bytes_written: AtomicU64::new(0),
                fail_creates: AtomicBool::new(false),
                fail_removes: AtomicBool::new(false),
                protected: Mutex::new(HashSet::new()),
                failed_writes: AtomicU64::new(0),
            }),
        }
    }

    /// Lets `bytes` more bytes through, then fails every write.
    ///
    /// A write that crosses the limit is applied partially before failing,
    /// leaving a torn tail the way a full disk does.
    pub fn fail_writes_after(&self, bytes: u64) {
        let written = self.faults.bytes_written.load(Ordering::SeqCst);
        self.faults
            .write_budget
            .store(written.saturating_add(bytes), Ordering::SeqCst);
    }

    /// Sets whether creating files fails.
    pub fn set_fail_creates(&self, fail: bool) {
        self.faults.fail_creates.store(fail, Ordering::SeqCst);
    }

    /// Sets whether every removal fails.
    pub fn set_fail_removes(&self, fail: bool) {
        self.faults.fail_removes.store(fail, Ordering::SeqCst);
    }

    /// Makes removal of `path` fail until [`FaultyFilesystem::reset`].
    pub fn protect(&self, path: impl Into<PathBuf>) {
        self.faults.protected.lock().insert(path.into());
    }

    /// Disarms every fault.
    pub fn reset(&self) {
        self.faults.write_budget.store(u64::MAX, Ordering::SeqCst);
        self.faults.fail_creates.store(false, Ordering::SeqCst);
        self.faults.fail_removes.store(false, Ordering::SeqCst);
        self.faults.protected.lock().clear();
    }

    /// Returns how many writes failed.
    pub fn failed_writes(&self) -> u64 {
        self.faults.failed_writes.load(Ordering::SeqCst)
    }

    /// Returns the total bytes that reached the inner filesystem.
    pub fn bytes_written(&self) -> u64 {
        self.faults.bytes_written.load(Ordering::SeqCst)
    }
}

impl fmt::Debug for FaultyFilesystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FaultyFilesystem")
            .field("inner", &self.inner)
            .field("bytes_written", &self.bytes_written())
            .finish_non_exhaustive()
    }
}

fn injected(what: &str, path: &Path) -> StorageError {
    StorageError::Io(io::Error::new(
        io::ErrorKind::Other,
        format!("injected {what} failure: {}", path.display()),
    ))
}

impl Filesystem for FaultyFilesystem {
    fn create_dir_all(&self, path: &Path) -> StorageResult<()> {
        self.inner.create_dir_all(path)
    }

    fn create(&self, path: &Path) -> StorageResult<Box<dyn WritableFile>> {
        if self.faults.fail_creates.load(Ordering::SeqCst) {
            return Err(injected("create", path));
        }
        let inner = self.inner.create(path)?;
        Ok(Box::new(FaultyFile {
            inner,
            faults: Arc::clone(&self.faults),
        }))
    }

    fn open(&self, path: &Path) -> StorageResult<Arc<dyn ReadableFile>> {
        self.inner.open(path)
    }

    fn list(&self, dir: &Path) -> StorageResult<Vec<String>> {
        self.inner.list(dir)
    }

    fn remove(&self, path: &Path) -> StorageResult<()> {
        if self.faults.fail_removes.load(Ordering::SeqCst)
            || self.faults.protected.lock().contains(path)
        {
            return Err(injected("remove", path));
        }
        self.inner.remove(path)
    }

    fn stat(&self, path: &Path) -> StorageResult<FileStat> {
        self.inner.stat(path)
    }

    fn try_lock(&self, path: &Path) -> StorageResult<DirLock> {
        self.inner.try_lock(path)
    }
}

struct FaultyFile {
    inner: Box<dyn WritableFile>,
    faults: Arc<Faults>,
}

impl Write for FaultyFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let written = self.faults.bytes_written.load(Ordering::SeqCst);
        let budget = self.faults.write_budget.load(Ordering::SeqCst);
        let allowed = budget.saturating_sub(written);

        if allowed == 0 && !buf.is_empty() {
            self.faults.failed_writes.fetch_add(1, Ordering::SeqCst);
            return Err(io::Error::new(io::ErrorKind::Other, "injected write failure"));
        }

        let take = buf.len().min(usize::try_from(allowed).unwrap_or(usize::MAX));
        let n = self.inner.write(&buf[..take])?;
        self.faults
            .bytes_written
            .fetch_add(n as u64, Ordering::SeqCst);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl WritableFile for FaultyFile {
    fn sync(&mut self) -> StorageResult<()> {
        self.inner.sync()
    }
}
