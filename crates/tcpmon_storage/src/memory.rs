//! In-memory filesystem for testing.

use crate::backend::{DirLock, FileStat, Filesystem, ReadableFile, WritableFile};
use crate::error::{StorageError, StorageResult};
use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

/// An in-memory filesystem.
///
/// This filesystem keeps every file in memory and is suitable for:
/// - Unit tests
/// - Integration tests
/// - Ephemeral stores that don't need persistence
///
/// Cloning yields another handle to the same tree. Readable handles share
/// the file buffer with the writer, so a reader observes appends made
/// after it was opened, like an OS file would.
///
/// # Example
///
/// ```rust
/// use std::io::Write;
/// use std::path::Path;
/// use tcpmon_storage::{Filesystem, InMemoryFilesystem};
///
/// let fs = InMemoryFilesystem::new();
/// fs.create_dir_all(Path::new("/d")).unwrap();
/// fs.create(Path::new("/d/f")).unwrap().write_all(b"test data").unwrap();
/// assert_eq!(fs.stat(Path::new("/d/f")).unwrap().size, 9);
/// ```
#[derive(Debug, Default, Clone)]
pub struct InMemoryFilesystem {
    state: Arc<RwLock<TreeState>>,
}

#[derive(Debug, Default)]
struct TreeState {
    dirs: HashSet<PathBuf>,
    files: HashMap<PathBuf, Arc<MemoryNode>>,
    locks: HashSet<PathBuf>,
}

#[derive(Debug)]
struct MemoryNode {
    data: RwLock<Vec<u8>>,
    modified: Mutex<SystemTime>,
}

impl MemoryNode {
    fn new(data: Vec<u8>) -> Self {
        Self {
            data: RwLock::new(data),
            modified: Mutex::new(SystemTime::now()),
        }
    }
}

impl InMemoryFilesystem {
    /// Creates a new empty in-memory filesystem.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes a complete file, creating parent directories.
    ///
    /// Useful for seeding test fixtures.
    pub fn write_file(&self, path: &Path, data: &[u8]) {
        let mut state = self.state.write();
        if let Some(parent) = path.parent() {
            insert_dir_chain(&mut state.dirs, parent);
        }
        state
            .files
            .insert(path.to_path_buf(), Arc::new(MemoryNode::new(data.to_vec())));
    }

    /// Returns a copy of a file's contents, if it exists.
    #[must_use]
    pub fn read_file(&self, path: &Path) -> Option<Vec<u8>> {
        let state = self.state.read();
        state.files.get(path).map(|node| node.data.read().clone())
    }

    /// Returns true if a file exists at `path`.
    #[must_use]
    pub fn exists(&self, path: &Path) -> bool {
        self.state.read().files.contains_key(path)
    }

    /// Overrides a file's modification time.
    pub fn set_modified(&self, path: &Path, modified: SystemTime) {
        if let Some(node) = self.state.read().files.get(path) {
            *node.modified.lock() = modified;
        }
    }

    /// Returns the sorted paths of every file.
    #[must_use]
    pub fn paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<_> = self.state.read().files.keys().cloned().collect();
        paths.sort();
        paths
    }
}

fn insert_dir_chain(dirs: &mut HashSet<PathBuf>, path: &Path) {
    for ancestor in path.ancestors() {
        if ancestor.as_os_str().is_empty() {
            continue;
        }
        dirs.insert(ancestor.to_path_buf());
    }
}

impl Filesystem for InMemoryFilesystem {
    fn create_dir_all(&self, path: &Path) -> StorageResult<()> {
        let mut state = self.state.write();
        insert_dir_chain(&mut state.dirs, path);
        Ok(())
    }

    fn create(&self, path: &Path) -> StorageResult<Box<dyn WritableFile>> {
        let mut state = self.state.write();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !state.dirs.contains(parent) {
                return Err(StorageError::not_found(parent));
            }
        }

        let node = Arc::new(MemoryNode::new(Vec::new()));
        state.files.insert(path.to_path_buf(), Arc::clone(&node));
        Ok(Box::new(MemoryWritableFile { node }))
    }

    fn open(&self, path: &Path) -> StorageResult<Arc<dyn ReadableFile>> {
        let state = self.state.read();
        let node = state
            .files
            .get(path)
            .ok_or_else(|| StorageError::not_found(path))?;
        Ok(Arc::new(MemoryReadableFile {
            node: Arc::clone(node),
        }))
    }

    fn list(&self, dir: &Path) -> StorageResult<Vec<String>> {
        let state = self.state.read();
        if !state.dirs.contains(dir) {
            return Err(StorageError::not_found(dir));
        }

        let names = state
            .files
            .keys()
            .filter(|path| path.parent() == Some(dir))
            .filter_map(|path| path.file_name())
            .filter_map(|name| name.to_str().map(str::to_string))
            .collect();
        Ok(names)
    }

    fn remove(&self, path: &Path) -> StorageResult<()> {
        let mut state = self.state.write();
        if state.files.remove(path).is_none() {
            return Err(StorageError::not_found(path));
        }
        Ok(())
    }

    fn stat(&self, path: &Path) -> StorageResult<FileStat> {
        let state = self.state.read();
        let node = state
            .files
            .get(path)
            .ok_or_else(|| StorageError::not_found(path))?;
        let size = node.data.read().len() as u64;
        let modified = *node.modified.lock();
        Ok(FileStat { size, modified })
    }

    fn try_lock(&self, path: &Path) -> StorageResult<DirLock> {
        let mut state = self.state.write();
        if !state.locks.insert(path.to_path_buf()) {
            return Err(StorageError::Locked {
                path: path.to_path_buf(),
            });
        }
        Ok(DirLock::new(MemoryLockGuard {
            state: Arc::clone(&self.state),
            path: path.to_path_buf(),
        }))
    }
}

struct MemoryWritableFile {
    node: Arc<MemoryNode>,
}

impl Write for MemoryWritableFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.node.data.write().extend_from_slice(buf);
        *self.node.modified.lock() = SystemTime::now();
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        // Writes land in the shared buffer immediately
        Ok(())
    }
}

impl WritableFile for MemoryWritableFile {
    fn sync(&mut self) -> StorageResult<()> {
        Ok(())
    }
}

struct MemoryReadableFile {
    node: Arc<MemoryNode>,
}

impl ReadableFile for MemoryReadableFile {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        read_slice(&self.node.data.read(), offset, len)
    }

    fn size(&self) -> StorageResult<u64> {
        Ok(self.node.data.read().len() as u64)
    }
}

struct MemoryLockGuard {
    state: Arc<RwLock<TreeState>>,
    path: PathBuf,
}

impl Drop for MemoryLockGuard {
    fn drop(&mut self) {
        self.state.write().locks.remove(&self.path);
    }
}

/// A read-only file held entirely in memory.
///
/// Used for sealed files, which are decompressed once on open and then
/// served to readers by positional reads.
#[derive(Debug, Clone)]
pub struct BytesFile {
    data: Bytes,
}

impl BytesFile {
    /// Wraps the given bytes.
    #[must_use]
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self { data: data.into() }
    }

    /// Returns the underlying bytes.
    #[must_use]
    pub fn bytes(&self) -> &Bytes {
        &self.data
    }
}

impl ReadableFile for BytesFile {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        read_slice(&self.data, offset, len)
    }

    fn size(&self) -> StorageResult<u64> {
        Ok(self.data.len() as u64)
    }
}

fn read_slice(data: &[u8], offset: u64, len: usize) -> StorageResult<Vec<u8>> {
    let size = data.len() as u64;
    let end = offset.saturating_add(len as u64);

    if offset > size || end > size {
        return Err(StorageError::ReadPastEnd { offset, len, size });
    }

    Ok(data[offset as usize..end as usize].to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fs_with_dir() -> InMemoryFilesystem {
        let fs = InMemoryFilesystem::new();
        fs.create_dir_all(Path::new("/data")).unwrap();
        fs
    }

    #[test]
    fn create_and_read() {
        let fs = fs_with_dir();
        let path = Path::new("/data/a");

        let mut file = fs.create(path).unwrap();
        file.write_all(b"hello world").unwrap();

        let reader = fs.open(path).unwrap();
        assert_eq!(reader.read_at(0, 5).unwrap(), b"hello");
        assert_eq!(reader.size().unwrap(), 11);
    }

    #[test]
    fn create_without_parent_fails() {
        let fs = InMemoryFilesystem::new();
        let result = fs.create(Path::new("/missing/a"));
        assert!(result.err().unwrap().is_not_found());
    }

    #[test]
    fn reader_observes_appends() {
        let fs = fs_with_dir();
        let path = Path::new("/data/active");

        let mut file = fs.create(path).unwrap();
        let reader = fs.open(path).unwrap();
        assert_eq!(reader.size().unwrap(), 0);

        file.write_all(b"abc").unwrap();
        assert_eq!(reader.size().unwrap(), 3);
    }

    #[test]
    fn read_past_end_fails() {
        let fs = fs_with_dir();
        fs.write_file(Path::new("/data/a"), b"hello");

        let reader = fs.open(Path::new("/data/a")).unwrap();
        assert!(matches!(
            reader.read_at(4, 2),
            Err(StorageError::ReadPastEnd { .. })
        ));
    }

    #[test]
    fn list_only_direct_children() {
        let fs = fs_with_dir();
        fs.write_file(Path::new("/data/a"), b"1");
        fs.write_file(Path::new("/data/b"), b"2");
        fs.write_file(Path::new("/data/sub/c"), b"3");

        let mut names = fs.list(Path::new("/data")).unwrap();
        names.sort();
        assert_eq!(names, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn list_missing_dir_fails() {
        let fs = InMemoryFilesystem::new();
        assert!(fs.list(Path::new("/nope")).unwrap_err().is_not_found());
    }

    #[test]
    fn remove_and_stat() {
        let fs = fs_with_dir();
        let path = Path::new("/data/a");
        fs.write_file(path, &[7u8; 10]);

        assert_eq!(fs.stat(path).unwrap().size, 10);
        fs.remove(path).unwrap();
        assert!(!fs.exists(path));
        assert!(fs.remove(path).unwrap_err().is_not_found());
    }

    #[test]
    fn set_modified_is_reported() {
        let fs = fs_with_dir();
        let path = Path::new("/data/a");
        fs.write_file(path, b"x");

        let when = SystemTime::UNIX_EPOCH + std::time::Duration::from_secs(1_000);
        fs.set_modified(path, when);
        assert_eq!(fs.stat(path).unwrap().modified, when);
    }

    #[test]
    fn lock_is_exclusive_until_dropped() {
        let fs = fs_with_dir();
        let lock_path = Path::new("/data/LOCK");

        let lock = fs.try_lock(lock_path).unwrap();
        assert!(matches!(
            fs.try_lock(lock_path),
            Err(StorageError::Locked { .. })
        ));

        drop(lock);
        assert!(fs.try_lock(lock_path).is_ok());
    }

    #[test]
    fn bytes_file_reads() {
        let file = BytesFile::new(b"sealed".to_vec());
        assert_eq!(file.size().unwrap(), 6);
        assert_eq!(file.read_at(2, 4).unwrap(), b"aled");
        assert!(file.read_at(5, 2).is_err());
    }
}
