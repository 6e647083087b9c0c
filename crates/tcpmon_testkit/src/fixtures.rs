//! Store fixtures and sample data.
//!
//! Provides stores over an in-memory tree or a temporary directory, and
//! helpers for writing sample metrics and hand-built data files.

use chrono::{TimeZone, Utc};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tcpmon_codec::{Metric, NicMetric, Timestamp};
use tcpmon_core::{encode_frame, Reader, Store, StoreConfig};
use tcpmon_storage::{Filesystem, InMemoryFilesystem, OsFilesystem};
use tempfile::TempDir;

/// Base directory used by in-memory fixtures.
pub const MEMORY_DIR: &str = "/var/lib/tcpmon";

/// Returns the UTC time `secs` seconds after the epoch.
pub fn ts(secs: i64) -> Timestamp {
    Utc.timestamp_opt(secs, 0)
        .single()
        .expect("timestamp out of range")
}

/// Builds an interface sample stamped at `secs`.
pub fn sample_metric(secs: i64) -> Metric {
    Metric::Nic(NicMetric {
        timestamp: ts(secs),
        interface: "eth0".into(),
        rx_bytes: secs.unsigned_abs(),
        tx_bytes: secs.unsigned_abs() * 2,
        ..NicMetric::default()
    })
}

/// Encodes [`sample_metric`] as a record payload.
pub fn sample_payload(secs: i64) -> Vec<u8> {
    sample_metric(secs)
        .encode()
        .expect("Failed to encode sample metric")
}

/// Returns a payload of exactly `len` bytes tagged with `index`.
///
/// The payload is not a valid metric; use it where only sizes matter.
pub fn padded_payload(index: usize, len: usize) -> Vec<u8> {
    let mut payload = format!("record-{index}:").into_bytes();
    payload.resize(len, b'.');
    payload
}

/// Writes one sample metric per second in `secs`.
pub fn write_metrics(store: &Store, secs: impl IntoIterator<Item = i64>) {
    for s in secs {
        store
            .put(&sample_payload(s))
            .expect("Failed to write sample metric");
    }
}

/// Concatenates framed payloads into the bytes of a raw data file.
pub fn raw_file_bytes<P: AsRef<[u8]>>(payloads: &[P]) -> Vec<u8> {
    let mut data = Vec::new();
    for payload in payloads {
        data.extend(encode_frame(payload.as_ref()).expect("Failed to frame payload"));
    }
    data
}

/// A store over an in-memory filesystem.
///
/// The filesystem handle is shared with the store, so tests can inspect
/// and tamper with the files it writes.
pub struct MemoryStore {
    /// The store instance.
    pub store: Store,
    /// The filesystem the store writes to.
    pub fs: InMemoryFilesystem,
    /// The store directory.
    pub dir: PathBuf,
}

impl MemoryStore {
    /// Opens a store with the default configuration.
    pub fn new() -> Self {
        Self::with_config(|config| config)
    }

    /// Opens a store that rotates after `entries` records.
    pub fn with_max_entries(entries: u32) -> Self {
        Self::with_config(|config| config.max_entries_per_file(entries))
    }

    /// Opens a store with a customised configuration.
    pub fn with_config(configure: impl FnOnce(StoreConfig) -> StoreConfig) -> Self {
        Self::open_on(InMemoryFilesystem::new(), configure)
    }

    /// Opens a store on an existing filesystem, e.g. one pre-populated with
    /// data files.
    pub fn open_on(
        fs: InMemoryFilesystem,
        configure: impl FnOnce(StoreConfig) -> StoreConfig,
    ) -> Self {
        let dir = PathBuf::from(MEMORY_DIR);
        let config = configure(memory_config(&fs, &dir));
        let store = Store::open(config).expect("Failed to open in-memory store");
        Self { store, fs, dir }
    }

    /// Closes the store and opens it again on the same files.
    pub fn reopen(self, configure: impl FnOnce(StoreConfig) -> StoreConfig) -> Self {
        let Self { store, fs, .. } = self;
        store.close().expect("Failed to close store");
        drop(store);
        Self::open_on(fs, configure)
    }

    /// Returns a fresh reader over the store directory.
    pub fn reader(&self) -> Reader {
        Reader::open(self.shared_fs(), &self.dir).expect("Failed to open reader")
    }

    /// Returns the filesystem as a trait object.
    pub fn shared_fs(&self) -> Arc<dyn Filesystem> {
        Arc::new(self.fs.clone())
    }

    /// Returns the sorted names of the files in the store directory.
    pub fn file_names(&self) -> Vec<String> {
        let mut names = self.fs.list(&self.dir).expect("Failed to list store dir");
        names.sort();
        names
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::ops::Deref for MemoryStore {
    type Target = Store;

    fn deref(&self) -> &Self::Target {
        &self.store
    }
}

/// Returns a configuration for `dir` on the in-memory filesystem `fs`.
pub fn memory_config(fs: &InMemoryFilesystem, dir: &Path) -> StoreConfig {
    StoreConfig::new(dir).filesystem(Arc::new(fs.clone()))
}

/// A store in a temporary directory on disk, removed on drop.
pub struct DiskStore {
    /// The store instance.
    pub store: Store,
    /// The temporary directory (kept alive to prevent cleanup).
    dir: TempDir,
}

impl DiskStore {
    /// Opens a store with the default configuration.
    pub fn new() -> Self {
        Self::with_config(|config| config)
    }

    /// Opens a store with a customised configuration.
    pub fn with_config(configure: impl FnOnce(StoreConfig) -> StoreConfig) -> Self {
        let dir = TempDir::new().expect("Failed to create temp directory");
        let config =
            configure(StoreConfig::new(dir.path()).filesystem(Arc::new(OsFilesystem::new())));
        let store = Store::open(config).expect("Failed to open on-disk store");
        Self { store, dir }
    }

    /// Returns the store directory.
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Returns a fresh reader over the store directory.
    pub fn reader(&self) -> Reader {
        Reader::open(Arc::new(OsFilesystem::new()), self.dir.path())
            .expect("Failed to open reader")
    }
}

impl Default for DiskStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::ops::Deref for DiskStore {
    type Target = Store;

    fn deref(&self) -> &Self::Target {
        &self.store
    }
}
