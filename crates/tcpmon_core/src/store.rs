//! The writer: appends records, rotates, seals and reclaims.

use crate::config::{StoreConfig, WriteFailurePolicy};
use crate::error::{CoreError, CoreResult};
use crate::fileset::{DataFileEntry, FileFilter, FileSet};
use crate::frame::{body_len, encode_header, HEADER_SIZE};
use crate::reader::Reader;
use crate::reclaim::{ReclaimStats, Reclaimer};
use crate::scanner::{complete_len, scan, TailPolicy};
use crate::seal::seal_file;
use crate::stats::{StatsSnapshot, StoreStats};
use crate::types::{FileNo, FileState};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tcpmon_storage::{DirLock, StorageError, WritableFile};
use tracing::{debug, error, info, warn};

/// The single writer of a data directory.
///
/// Records are framed and appended to the active raw file. When the file
/// holds `max_entries_per_file` records it is sealed (zstd-compressed, raw
/// removed), a new active file takes its place and the oldest sealed files
/// are reclaimed until the sealed total fits `max_total_size`.
///
/// All operations serialize on one lock, so a `Store` can be shared
/// between threads. A second `Store` on the same directory fails with
/// [`CoreError::Locked`] while the first is alive.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use tcpmon_core::{Reader, Store, StoreConfig};
/// use tcpmon_storage::InMemoryFilesystem;
///
/// let fs = Arc::new(InMemoryFilesystem::new());
/// let store = Store::open(
///     StoreConfig::new("/data").filesystem(fs.clone()).max_entries_per_file(2),
/// )
/// .unwrap();
///
/// for payload in [&b"a"[..], b"b", b"c"] {
///     store.put(payload).unwrap();
/// }
/// store.close().unwrap();
///
/// let reader = Reader::open(fs, "/data").unwrap();
/// assert_eq!(reader.count().unwrap(), 3);
/// ```
pub struct Store {
    config: StoreConfig,
    files: FileSet,
    reclaimer: Reclaimer,
    state: Mutex<WriterState>,
    stats: StoreStats,
    _lock: DirLock,
}

struct WriterState {
    lifecycle: Lifecycle,
    next_file_no: FileNo,
}

enum Lifecycle {
    Active(ActiveFile),
    Closed,
    Halted(String),
}

struct ActiveFile {
    file_no: FileNo,
    path: PathBuf,
    handle: Box<dyn WritableFile>,
    records: u32,
    /// Bytes of complete records.
    len: u64,
    /// A write failed part-way; the tail after `len` is garbage.
    torn: bool,
}

impl WriterState {
    fn active_mut(&mut self) -> CoreResult<&mut ActiveFile> {
        match &mut self.lifecycle {
            Lifecycle::Active(active) => Ok(active),
            Lifecycle::Closed => Err(CoreError::StoreClosed),
            Lifecycle::Halted(reason) => Err(CoreError::StoreHalted {
                reason: reason.clone(),
            }),
        }
    }
}

impl Store {
    /// Opens the store, creating the base directory if needed.
    ///
    /// Takes the directory lock, seals raw files left by a previous run
    /// (when `recover_stale_files` is set) and starts a new active file
    /// numbered one past the highest existing sequence number.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Config`] for an invalid configuration or an
    /// unparsable data file name, [`CoreError::Locked`] if another writer
    /// holds the directory, or an I/O error.
    pub fn open(config: StoreConfig) -> CoreResult<Self> {
        config.validate()?;

        let fs = Arc::clone(&config.fs);
        fs.create_dir_all(&config.base_dir)?;
        let lock = fs.try_lock(&config.lock_path()).map_err(|e| match e {
            StorageError::Locked { path } => CoreError::Locked { path },
            other => other.into(),
        })?;

        let files = FileSet::new(fs, config.base_dir.clone(), config.naming.clone());
        let stats = StoreStats::new();

        // Taken before recovery, which may delete empty raw files
        let latest = files.latest_file_no()?;
        if config.recover_stale_files {
            recover_stale_files(&files, config.compression_level, &stats)?;
        }

        let file_no = latest.next()?;
        let active = create_active(&files, file_no)?;
        stats.set_active(file_no.as_u32());
        info!(
            dir = %config.base_dir.display(),
            active = %active.path.display(),
            "Opened store"
        );

        let reclaimer = Reclaimer::new(files.clone(), config.max_total_size);
        Ok(Self {
            state: Mutex::new(WriterState {
                lifecycle: Lifecycle::Active(active),
                next_file_no: file_no.next()?,
            }),
            config,
            files,
            reclaimer,
            stats,
            _lock: lock,
        })
    }

    /// Appends one record.
    ///
    /// Rotates once the active file reaches `max_entries_per_file`. Once the
    /// record is written the put succeeds: a rotation that fails afterwards
    /// is logged and retried before the next record is written.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::StoreClosed`] or [`CoreError::StoreHalted`] if
    /// the store no longer accepts writes, the I/O error of a failed write,
    /// or the error of a pending rotation that still fails. In the last case
    /// nothing was written. Under [`WriteFailurePolicy::Halt`] a failed
    /// write halts the store.
    pub fn put(&self, payload: &[u8]) -> CoreResult<()> {
        let header = encode_header(body_len(payload)?);
        let mut state = self.state.lock();

        let active = state.active_mut()?;
        if active.torn || active.records >= self.config.max_entries_per_file {
            self.rotate_locked(&mut state)?;
        }

        let written = {
            let active = state.active_mut()?;
            write_record(active, &header, payload, self.config.sync_on_write).map(|()| {
                active.records += 1;
                active.len += (HEADER_SIZE + payload.len()) as u64;
                active.records
            })
        };

        let records = match written {
            Ok(records) => records,
            Err(e) => return Err(self.write_failed(&mut state, e)),
        };
        self.stats.record_write((HEADER_SIZE + payload.len()) as u64);

        if records >= self.config.max_entries_per_file {
            if let Err(e) = self.rotate_locked(&mut state) {
                warn!(error = %e, "Rotation after write failed; retrying on next put");
            }
        }
        Ok(())
    }

    /// Seals the active file and starts a new one.
    ///
    /// Returns the path of the sealed file. An active file that holds no
    /// records is left alone and its raw path is returned. Callers that
    /// need a consistent snapshot of everything written so far (backups)
    /// rotate first.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is closed or halted, the new file
    /// cannot be created, or sealing fails. If sealing fails the new active
    /// file is kept and the old raw file is left for recovery.
    pub fn rotate(&self) -> CoreResult<PathBuf> {
        let mut state = self.state.lock();
        let active = state.active_mut()?;
        if active.records == 0 && !active.torn {
            debug!(active = %active.path.display(), "Active file is empty; not rotating");
            return Ok(active.path.clone());
        }
        self.rotate_locked(&mut state)
    }

    /// Alias for [`Store::rotate`].
    ///
    /// # Errors
    ///
    /// See [`Store::rotate`].
    pub fn next_file(&self) -> CoreResult<PathBuf> {
        self.rotate()
    }

    /// Flushes and closes the active file.
    ///
    /// The file stays raw; the next `open` seals it. Calling `close` more
    /// than once is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if the final sync fails. The store is closed either
    /// way.
    pub fn close(&self) -> CoreResult<()> {
        let mut state = self.state.lock();
        match std::mem::replace(&mut state.lifecycle, Lifecycle::Closed) {
            Lifecycle::Active(mut active) => {
                active.handle.sync()?;
                info!(active = %active.path.display(), records = active.records, "Closed store");
                Ok(())
            }
            Lifecycle::Closed | Lifecycle::Halted(_) => Ok(()),
        }
    }

    /// Returns true while the store accepts writes.
    #[must_use]
    pub fn is_open(&self) -> bool {
        matches!(self.state.lock().lifecycle, Lifecycle::Active(_))
    }

    /// Returns the total size of sealed files and their paths, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be read.
    pub fn total_sealed_size(&self) -> CoreResult<(u64, Vec<PathBuf>)> {
        self.reclaimer.total_sealed_size()
    }

    /// Runs a reclaim pass now.
    ///
    /// # Errors
    ///
    /// Returns an error if the sealed files cannot be enumerated.
    pub fn reclaim(&self) -> CoreResult<ReclaimStats> {
        let _state = self.state.lock();
        self.reclaim_locked()
    }

    /// Returns the path of the active file, if the store is open.
    #[must_use]
    pub fn active_path(&self) -> Option<PathBuf> {
        match &self.state.lock().lifecycle {
            Lifecycle::Active(active) => Some(active.path.clone()),
            _ => None,
        }
    }

    /// Returns a snapshot of the writer statistics.
    #[must_use]
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Returns the store configuration.
    #[must_use]
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Returns the data file set.
    #[must_use]
    pub fn files(&self) -> &FileSet {
        &self.files
    }

    /// Creates a reader over this store's directory.
    #[must_use]
    pub fn reader(&self) -> Reader {
        Reader::from_file_set(self.files.clone())
    }

    fn rotate_locked(&self, state: &mut WriterState) -> CoreResult<PathBuf> {
        let file_no = state.next_file_no;
        let following = file_no.next()?;
        let fresh = create_active(&self.files, file_no)?;

        let old = match std::mem::replace(&mut state.lifecycle, Lifecycle::Active(fresh)) {
            Lifecycle::Active(old) => old,
            other => {
                state.lifecycle = other;
                return Err(CoreError::invalid_operation("rotate without an active file"));
            }
        };
        state.next_file_no = following;
        self.stats.set_active(file_no.as_u32());
        self.stats.record_rotation();

        let sealed = self.seal_active(old)?;
        info!(sealed = %sealed.display(), active = file_no.as_u32(), "Rotated data file");

        if let Err(e) = self.reclaim_locked() {
            warn!(error = %e, "Reclaim after rotation failed");
        }
        Ok(sealed)
    }

    fn seal_active(&self, mut old: ActiveFile) -> CoreResult<PathBuf> {
        // A torn tail may fail to flush again; only complete records are sealed
        match old.handle.sync() {
            Ok(()) => {}
            Err(e) if old.torn => debug!(error = %e, "Sync of torn file failed"),
            Err(e) => return Err(e.into()),
        }
        drop(old.handle);

        let sealed = self.files.sealed_path(old.file_no);
        seal_file(
            self.files.fs().as_ref(),
            &old.path,
            &sealed,
            self.config.compression_level,
            Some(old.len),
        )?;
        self.stats.record_seal();
        Ok(sealed)
    }

    fn reclaim_locked(&self) -> CoreResult<ReclaimStats> {
        let stats = self.reclaimer.reclaim()?;
        self.stats
            .record_reclaim(stats.deleted.len() as u64, stats.freed());
        Ok(stats)
    }

    fn write_failed(&self, state: &mut WriterState, err: CoreError) -> CoreError {
        self.stats.record_write_failure();
        match self.config.write_failure_policy {
            WriteFailurePolicy::Propagate => {
                if let Lifecycle::Active(active) = &mut state.lifecycle {
                    active.torn = true;
                }
                warn!(error = %err, "Write failed; next put starts a new file");
            }
            WriteFailurePolicy::Halt => {
                error!(error = %err, "Write failed; store halted");
                state.lifecycle = Lifecycle::Halted(err.to_string());
            }
        }
        err
    }
}

impl Drop for Store {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("config", &self.config)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

fn create_active(files: &FileSet, file_no: FileNo) -> CoreResult<ActiveFile> {
    let path = files.raw_path(file_no);
    let handle = files.fs().create(&path)?;
    debug!(path = %path.display(), "Created active file");
    Ok(ActiveFile {
        file_no,
        path,
        handle,
        records: 0,
        len: 0,
        torn: false,
    })
}

fn write_record(
    active: &mut ActiveFile,
    header: &[u8],
    payload: &[u8],
    flush: bool,
) -> CoreResult<()> {
    active.handle.write_all(header)?;
    active.handle.write_all(payload)?;
    if flush {
        active.handle.flush()?;
    }
    Ok(())
}

/// Seals raw files left by a previous run.
///
/// If a sealed file with the same number exists the raw file is
/// authoritative: the seal was interrupted before the raw file was removed.
/// Raw files without a complete record are deleted.
fn recover_stale_files(files: &FileSet, level: i32, stats: &StoreStats) -> CoreResult<()> {
    let entries = files.sorted_files(FileFilter::All)?;
    let sealed: HashSet<FileNo> = entries
        .iter()
        .filter(|e| e.state == FileState::Sealed)
        .map(|e| e.file_no)
        .collect();

    for entry in entries.iter().filter(|e| e.state == FileState::Raw) {
        let has_sealed = sealed.contains(&entry.file_no);
        match recover_one(files, entry, has_sealed, level) {
            Ok(Some(len)) => {
                stats.record_seal();
                info!(path = %entry.path.display(), bytes = len, "Sealed stale data file");
            }
            Ok(None) => {
                info!(path = %entry.path.display(), "Removed empty stale data file");
            }
            Err(e) => {
                warn!(path = %entry.path.display(), error = %e, "Could not recover stale data file");
            }
        }
    }
    Ok(())
}

fn recover_one(
    files: &FileSet,
    entry: &DataFileEntry,
    has_sealed: bool,
    level: i32,
) -> CoreResult<Option<u64>> {
    let fs = files.fs().as_ref();
    let len = {
        let source = fs.open(&entry.path)?;
        complete_len(&scan(source.as_ref(), TailPolicy::Tolerant)?)
    };

    let sealed = files.sealed_path(entry.file_no);
    if has_sealed {
        remove_if_present(files, &sealed)?;
    }
    if len == 0 {
        fs.remove(&entry.path)?;
        return Ok(None);
    }

    seal_file(fs, &entry.path, &sealed, level, Some(len))?;
    Ok(Some(len))
}

fn remove_if_present(files: &FileSet, path: &Path) -> CoreResult<()> {
    match files.fs().remove(path) {
        Ok(()) => Ok(()),
        Err(e) if e.is_not_found() => Ok(()),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::encode_frame;
    use tcpmon_storage::InMemoryFilesystem;

    fn config(fs: &InMemoryFilesystem) -> StoreConfig {
        StoreConfig::new("/data").filesystem(Arc::new(fs.clone()))
    }

    fn names(fs: &InMemoryFilesystem) -> Vec<String> {
        fs.paths()
            .iter()
            .filter_map(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
            .filter(|n| n != "LOCK")
            .collect()
    }

    #[test]
    fn open_creates_first_active_file() {
        let fs = InMemoryFilesystem::new();
        let store = Store::open(config(&fs)).unwrap();

        assert_eq!(store.active_path(), Some(PathBuf::from("/data/tcpmon-dataf-1")));
        assert_eq!(store.stats().active_file_no, 1);
        assert!(store.is_open());
    }

    #[test]
    fn put_appends_frames() {
        let fs = InMemoryFilesystem::new();
        let store = Store::open(config(&fs)).unwrap();
        store.put(b"abc").unwrap();
        store.put(b"").unwrap();

        let mut expected = encode_frame(b"abc").unwrap();
        expected.extend(encode_frame(b"").unwrap());
        assert_eq!(
            fs.read_file(Path::new("/data/tcpmon-dataf-1")).unwrap(),
            expected
        );

        let stats = store.stats();
        assert_eq!(stats.records_written, 2);
        assert_eq!(stats.bytes_written, 15);
    }

    #[test]
    fn rotation_at_threshold() {
        let fs = InMemoryFilesystem::new();
        let store = Store::open(config(&fs).max_entries_per_file(3)).unwrap();
        for i in 0..4u8 {
            store.put(&[i]).unwrap();
        }

        assert_eq!(names(&fs), vec!["tcpmon-dataf-1.zst", "tcpmon-dataf-2"]);
        let stats = store.stats();
        assert_eq!(stats.rotations, 1);
        assert_eq!(stats.seals, 1);
        assert_eq!(stats.active_records, 1);
    }

    #[test]
    fn explicit_rotate_returns_sealed_path() {
        let fs = InMemoryFilesystem::new();
        let store = Store::open(config(&fs)).unwrap();
        store.put(b"x").unwrap();

        let sealed = store.next_file().unwrap();
        assert_eq!(sealed, PathBuf::from("/data/tcpmon-dataf-1.zst"));
        assert!(fs.exists(&sealed));
        assert!(!fs.exists(Path::new("/data/tcpmon-dataf-1")));
        assert_eq!(store.active_path(), Some(PathBuf::from("/data/tcpmon-dataf-2")));
    }

    #[test]
    fn rotate_of_empty_active_file_is_a_no_op() {
        let fs = InMemoryFilesystem::new();
        let store = Store::open(config(&fs)).unwrap();

        let path = store.rotate().unwrap();
        assert_eq!(path, PathBuf::from("/data/tcpmon-dataf-1"));
        assert_eq!(store.rotate().unwrap(), path);
        assert_eq!(names(&fs), vec!["tcpmon-dataf-1"]);
        assert_eq!(store.stats().rotations, 0);
        assert_eq!(store.stats().seals, 0);

        store.put(b"x").unwrap();
        assert_eq!(store.rotate().unwrap(), PathBuf::from("/data/tcpmon-dataf-1.zst"));
    }

    #[test]
    fn full_file_rotates_before_next_write() {
        let fs = InMemoryFilesystem::new();
        let store = Store::open(config(&fs).max_entries_per_file(2)).unwrap();
        store.put(b"a").unwrap();
        store.put(b"b").unwrap();
        assert_eq!(names(&fs), vec!["tcpmon-dataf-1.zst", "tcpmon-dataf-2"]);

        store.put(b"c").unwrap();
        assert_eq!(
            fs.read_file(Path::new("/data/tcpmon-dataf-2")).unwrap(),
            encode_frame(b"c").unwrap()
        );
        assert_eq!(store.stats().rotations, 1);
    }

    #[test]
    fn second_writer_is_locked_out() {
        let fs = InMemoryFilesystem::new();
        let _store = Store::open(config(&fs)).unwrap();

        let err = Store::open(config(&fs)).unwrap_err();
        assert!(matches!(err, CoreError::Locked { .. }));
    }

    #[test]
    fn close_is_idempotent_and_rejects_puts() {
        let fs = InMemoryFilesystem::new();
        let store = Store::open(config(&fs)).unwrap();
        store.close().unwrap();
        store.close().unwrap();

        assert!(matches!(store.put(b"late"), Err(CoreError::StoreClosed)));
        assert!(matches!(store.rotate(), Err(CoreError::StoreClosed)));
        assert!(!store.is_open());
    }

    #[test]
    fn reopen_continues_sequence_and_seals_leftover() {
        let fs = InMemoryFilesystem::new();
        {
            let store = Store::open(config(&fs)).unwrap();
            store.put(b"first run").unwrap();
        }

        let store = Store::open(config(&fs)).unwrap();
        assert_eq!(store.active_path(), Some(PathBuf::from("/data/tcpmon-dataf-2")));
        assert_eq!(names(&fs), vec!["tcpmon-dataf-1.zst", "tcpmon-dataf-2"]);
        assert_eq!(store.stats().seals, 1);
    }

    #[test]
    fn empty_leftover_is_removed_but_number_not_reused() {
        let fs = InMemoryFilesystem::new();
        drop(Store::open(config(&fs)).unwrap());

        let store = Store::open(config(&fs)).unwrap();
        assert_eq!(names(&fs), vec!["tcpmon-dataf-2"]);
        drop(store);
    }

    #[test]
    fn duplicate_raw_and_sealed_pick_next_number() {
        let fs = InMemoryFilesystem::new();
        fs.write_file(Path::new("/data/tcpmon-dataf-1"), b"");
        fs.write_file(Path::new("/data/tcpmon-dataf-1.zst"), b"");

        let store = Store::open(config(&fs)).unwrap();
        assert_eq!(store.active_path(), Some(PathBuf::from("/data/tcpmon-dataf-2")));
    }

    #[test]
    fn stale_file_with_torn_tail_is_trimmed() {
        let fs = InMemoryFilesystem::new();
        let mut data = encode_frame(b"kept").unwrap();
        let kept = data.len();
        data.extend_from_slice(&encode_header(99));
        fs.write_file(Path::new("/data/tcpmon-dataf-4"), &data);

        let store = Store::open(config(&fs)).unwrap();
        let reader = store.reader();
        let files = reader.files().unwrap();
        assert_eq!(files[0].state, FileState::Sealed);
        assert_eq!(reader.scan(&files[0]).unwrap().source_len().unwrap(), kept as u64);
    }

    #[test]
    fn recovery_can_be_disabled() {
        let fs = InMemoryFilesystem::new();
        fs.write_file(Path::new("/data/tcpmon-dataf-1"), &encode_frame(b"a").unwrap());

        let _store = Store::open(config(&fs).recover_stale_files(false)).unwrap();
        assert_eq!(names(&fs), vec!["tcpmon-dataf-1", "tcpmon-dataf-2"]);
    }

    #[test]
    fn rotation_reclaims_over_budget() {
        let fs = InMemoryFilesystem::new();
        let store = Store::open(config(&fs).max_entries_per_file(1).max_total_size(0)).unwrap();
        store.put(b"one").unwrap();
        store.put(b"two").unwrap();

        let (total, sealed) = store.total_sealed_size().unwrap();
        assert_eq!(total, 0);
        assert!(sealed.is_empty());
        assert_eq!(store.stats().reclaimed_files, 2);
        assert_eq!(names(&fs), vec!["tcpmon-dataf-3"]);
    }

    #[test]
    fn invalid_config_rejected() {
        let fs = InMemoryFilesystem::new();
        let err = Store::open(config(&fs).max_entries_per_file(0)).unwrap_err();
        assert!(matches!(err, CoreError::Config { .. }));
    }

    #[test]
    fn store_is_shareable_between_threads() {
        let fs = InMemoryFilesystem::new();
        let store = Arc::new(Store::open(config(&fs).max_entries_per_file(10)).unwrap());

        let handles: Vec<_> = (0..4)
            .map(|t| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for i in 0..25u8 {
                        store.put(&[t, i]).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.stats().records_written, 100);
        assert_eq!(store.stats().rotations, 10);
        assert_eq!(store.reader().count().unwrap(), 100);
    }
}
