//! OS-backed filesystem.

use crate::backend::{DirLock, FileStat, Filesystem, ReadableFile, WritableFile};
use crate::error::{StorageError, StorageResult};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::sync::Arc;

/// A filesystem backed by the operating system.
///
/// # Durability
///
/// - `flush()` on a writable file pushes buffered data to the OS
/// - `sync()` calls `File::sync_all()` to ensure data is on disk
///
/// # Thread Safety
///
/// Readable handles use positional reads (`pread` on Unix), so a single
/// handle can serve concurrent readers without a lock.
///
/// # Example
///
/// ```no_run
/// use std::io::Write;
/// use std::path::Path;
/// use tcpmon_storage::{Filesystem, OsFilesystem};
///
/// let fs = OsFilesystem::new();
/// let mut file = fs.create(Path::new("data.bin")).unwrap();
/// file.write_all(b"persistent data").unwrap();
/// file.sync().unwrap();
/// ```
#[derive(Debug, Default, Clone, Copy)]
pub struct OsFilesystem;

impl OsFilesystem {
    /// Creates a new OS filesystem handle.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Filesystem for OsFilesystem {
    fn create_dir_all(&self, path: &Path) -> StorageResult<()> {
        fs::create_dir_all(path)?;
        Ok(())
    }

    fn create(&self, path: &Path) -> StorageResult<Box<dyn WritableFile>> {
        let file = File::create(path)?;
        Ok(Box::new(OsWritableFile {
            writer: BufWriter::new(file),
        }))
    }

    fn open(&self, path: &Path) -> StorageResult<Arc<dyn ReadableFile>> {
        let file = File::open(path)?;
        Ok(Arc::new(OsReadableFile::new(file)))
    }

    fn list(&self, dir: &Path) -> StorageResult<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            if let Ok(name) = entry.file_name().into_string() {
                names.push(name);
            }
        }
        Ok(names)
    }

    fn remove(&self, path: &Path) -> StorageResult<()> {
        fs::remove_file(path)?;
        Ok(())
    }

    fn stat(&self, path: &Path) -> StorageResult<FileStat> {
        let metadata = fs::metadata(path)?;
        Ok(FileStat {
            size: metadata.len(),
            modified: metadata.modified()?,
        })
    }

    fn try_lock(&self, path: &Path) -> StorageResult<DirLock> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        if file.try_lock_exclusive().is_err() {
            return Err(StorageError::Locked {
                path: path.to_path_buf(),
            });
        }

        Ok(DirLock::new(OsLockGuard { file }))
    }
}

struct OsWritableFile {
    writer: BufWriter<File>,
}

impl Write for OsWritableFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.writer.write(buf)
    }

    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        self.writer.write_all(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

impl WritableFile for OsWritableFile {
    fn sync(&mut self) -> StorageResult<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_all()?;
        Ok(())
    }
}

struct OsReadableFile {
    #[cfg(unix)]
    file: File,
    #[cfg(not(unix))]
    file: parking_lot::Mutex<File>,
}

impl OsReadableFile {
    #[cfg(unix)]
    fn new(file: File) -> Self {
        Self { file }
    }

    #[cfg(not(unix))]
    fn new(file: File) -> Self {
        Self {
            file: parking_lot::Mutex::new(file),
        }
    }

    #[cfg(unix)]
    fn read_exact_at(&self, buffer: &mut [u8], offset: u64) -> io::Result<()> {
        use std::os::unix::fs::FileExt as _;
        self.file.read_exact_at(buffer, offset)
    }

    // No positional read without a cursor here; serialise seek+read.
    #[cfg(not(unix))]
    fn read_exact_at(&self, buffer: &mut [u8], offset: u64) -> io::Result<()> {
        use std::io::{Read, Seek, SeekFrom};
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(buffer)
    }

    #[cfg(unix)]
    fn len(&self) -> io::Result<u64> {
        Ok(self.file.metadata()?.len())
    }

    #[cfg(not(unix))]
    fn len(&self) -> io::Result<u64> {
        Ok(self.file.lock().metadata()?.len())
    }
}

impl ReadableFile for OsReadableFile {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        let size = self.len()?;
        let end = offset.saturating_add(len as u64);

        if offset > size || end > size {
            return Err(StorageError::ReadPastEnd { offset, len, size });
        }

        if len == 0 {
            return Ok(Vec::new());
        }

        let mut buffer = vec![0u8; len];
        self.read_exact_at(&mut buffer, offset)?;
        Ok(buffer)
    }

    fn size(&self) -> StorageResult<u64> {
        Ok(self.len()?)
    }
}

struct OsLockGuard {
    file: File,
}

impl Drop for OsLockGuard {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}
