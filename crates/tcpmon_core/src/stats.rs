//! Store statistics.
//!
//! Counters for monitoring the writer.
//!
//! # Usage
//!
//! ```rust,ignore
//! let store = Store::open(config)?;
//! store.put(&payload)?;
//!
//! let stats = store.stats();
//! println!("Records: {}", stats.records_written);
//! println!("Rotations: {}", stats.rotations);
//! ```

use std::sync::atomic::{AtomicU64, Ordering};

/// Writer statistics.
///
/// All counters are atomic and can be read while writes are in progress.
/// Values are monotonically increasing except for the `active_*` gauges.
#[derive(Debug, Default)]
pub struct StoreStats {
    // Gauges
    active_file_no: AtomicU64,
    active_records: AtomicU64,

    // Write counters
    records_written: AtomicU64,
    bytes_written: AtomicU64,
    write_failures: AtomicU64,

    // Lifecycle counters
    rotations: AtomicU64,
    seals: AtomicU64,
    reclaimed_files: AtomicU64,
    reclaimed_bytes: AtomicU64,
}

impl StoreStats {
    /// Creates a new stats instance.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_write(&self, bytes: u64) {
        self.records_written.fetch_add(1, Ordering::Relaxed);
        self.active_records.fetch_add(1, Ordering::Relaxed);
        self.bytes_written.fetch_add(bytes, Ordering::Relaxed);
    }

    pub(crate) fn record_write_failure(&self) {
        self.write_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_rotation(&self) {
        self.rotations.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_seal(&self) {
        self.seals.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_reclaim(&self, files: u64, bytes: u64) {
        self.reclaimed_files.fetch_add(files, Ordering::Relaxed);
        self.reclaimed_bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Points the gauges at a freshly created active file.
    pub(crate) fn set_active(&self, file_no: u32) {
        self.active_file_no
            .store(u64::from(file_no), Ordering::Relaxed);
        self.active_records.store(0, Ordering::Relaxed);
    }

    /// Returns the sequence number of the active file.
    pub fn active_file_no(&self) -> u64 {
        self.active_file_no.load(Ordering::Relaxed)
    }

    /// Returns the records in the active file.
    pub fn active_records(&self) -> u64 {
        self.active_records.load(Ordering::Relaxed)
    }

    /// Returns the records written since open.
    pub fn records_written(&self) -> u64 {
        self.records_written.load(Ordering::Relaxed)
    }

    /// Returns the frame bytes (headers included) written since open.
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written.load(Ordering::Relaxed)
    }

    /// Returns the number of failed puts.
    pub fn write_failures(&self) -> u64 {
        self.write_failures.load(Ordering::Relaxed)
    }

    /// Returns the number of rotations.
    pub fn rotations(&self) -> u64 {
        self.rotations.load(Ordering::Relaxed)
    }

    /// Returns the number of files sealed, stale recoveries included.
    pub fn seals(&self) -> u64 {
        self.seals.load(Ordering::Relaxed)
    }

    /// Returns the number of sealed files deleted by reclaim.
    pub fn reclaimed_files(&self) -> u64 {
        self.reclaimed_files.load(Ordering::Relaxed)
    }

    /// Returns the bytes freed by reclaim.
    pub fn reclaimed_bytes(&self) -> u64 {
        self.reclaimed_bytes.load(Ordering::Relaxed)
    }

    /// Returns a snapshot of all stats.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            active_file_no: self.active_file_no(),
            active_records: self.active_records(),
            records_written: self.records_written(),
            bytes_written: self.bytes_written(),
            write_failures: self.write_failures(),
            rotations: self.rotations(),
            seals: self.seals(),
            reclaimed_files: self.reclaimed_files(),
            reclaimed_bytes: self.reclaimed_bytes(),
        }
    }
}

/// A point-in-time snapshot of [`StoreStats`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    /// Sequence number of the active file.
    pub active_file_no: u64,
    /// Records in the active file.
    pub active_records: u64,
    /// Records written since open.
    pub records_written: u64,
    /// Frame bytes written since open.
    pub bytes_written: u64,
    /// Failed puts.
    pub write_failures: u64,
    /// Rotations.
    pub rotations: u64,
    /// Files sealed.
    pub seals: u64,
    /// Sealed files deleted by reclaim.
    pub reclaimed_files: u64,
    /// Bytes freed by reclaim.
    pub reclaimed_bytes: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_stats_are_zero() {
        let stats = StoreStats::new();
        assert_eq!(stats.snapshot(), StatsSnapshot::default());
    }

    #[test]
    fn writes_feed_gauge_and_counters() {
        let stats = StoreStats::new();
        stats.set_active(4);
        stats.record_write(106);
        stats.record_write(16);

        assert_eq!(stats.active_file_no(), 4);
        assert_eq!(stats.active_records(), 2);
        assert_eq!(stats.records_written(), 2);
        assert_eq!(stats.bytes_written(), 122);

        stats.set_active(5);
        assert_eq!(stats.active_records(), 0);
        assert_eq!(stats.records_written(), 2);
    }

    #[test]
    fn snapshot() {
        let stats = StoreStats::new();
        stats.record_rotation();
        stats.record_seal();
        stats.record_reclaim(2, 4096);
        stats.record_write_failure();

        let snap = stats.snapshot();
        assert_eq!(snap.rotations, 1);
        assert_eq!(snap.seals, 1);
        assert_eq!(snap.reclaimed_files, 2);
        assert_eq!(snap.reclaimed_bytes, 4096);
        assert_eq!(snap.write_failures, 1);
    }

    #[test]
    fn concurrent_updates() {
        use std::sync::Arc;
        use std::thread;

        let stats = Arc::new(StoreStats::new());
        let mut handles = vec![];

        for _ in 0..8 {
            let s = Arc::clone(&stats);
            handles.push(thread::spawn(move || {
                for _ in 0..100 {
                    s.record_write(10);
                }
            }));
        }

        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(stats.records_written(), 800);
        assert_eq!(stats.bytes_written(), 8000);
    }
}
