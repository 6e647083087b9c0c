//! Store configuration.

use crate::error::{CoreError, CoreResult};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tcpmon_storage::{Filesystem, OsFilesystem};

/// Default file name prefix for data files.
pub const DEFAULT_FILE_PREFIX: &str = "tcpmon-dataf-";

/// Default suffix appended to sealed files.
pub const DEFAULT_SEALED_SUFFIX: &str = ".zst";

/// Name of the writer lock file inside the base directory.
pub const LOCK_FILE_NAME: &str = "LOCK";

/// What the store does after a failed write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WriteFailurePolicy {
    /// Return the error and keep accepting writes.
    #[default]
    Propagate,
    /// Return the error and reject every later write with
    /// [`CoreError::StoreHalted`].
    Halt,
}

/// How data files are named inside the base directory.
///
/// Raw files are `<prefix><n>`, sealed files `<prefix><n><sealed_suffix>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileNaming {
    /// File name prefix.
    pub prefix: String,
    /// Suffix of sealed files.
    pub sealed_suffix: String,
}

impl Default for FileNaming {
    fn default() -> Self {
        Self {
            prefix: DEFAULT_FILE_PREFIX.to_string(),
            sealed_suffix: DEFAULT_SEALED_SUFFIX.to_string(),
        }
    }
}

impl FileNaming {
    /// Creates a naming scheme.
    pub fn new(prefix: impl Into<String>, sealed_suffix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            sealed_suffix: sealed_suffix.into(),
        }
    }

    /// Checks that names can be told apart unambiguously.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Config`] if either part is empty or the suffix
    /// occurs inside the prefix.
    pub fn validate(&self) -> CoreResult<()> {
        if self.prefix.is_empty() {
            return Err(CoreError::config("file prefix must not be empty"));
        }
        if self.sealed_suffix.is_empty() {
            return Err(CoreError::config("sealed suffix must not be empty"));
        }
        if self.prefix.contains(&self.sealed_suffix) {
            return Err(CoreError::config(format!(
                "sealed suffix {:?} must not occur in prefix {:?}",
                self.sealed_suffix, self.prefix
            )));
        }
        Ok(())
    }
}

/// Configuration for opening a [`crate::Store`].
///
/// # Example
///
/// ```rust
/// use tcpmon_core::{StoreConfig, WriteFailurePolicy};
///
/// let config = StoreConfig::new("/var/lib/tcpmon")
///     .max_entries_per_file(5_000)
///     .max_total_size(64 * 1024 * 1024)
///     .write_failure_policy(WriteFailurePolicy::Halt);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Clone)]
pub struct StoreConfig {
    /// Directory holding the data files.
    pub base_dir: PathBuf,

    /// Filesystem the store operates on.
    pub fs: Arc<dyn Filesystem>,

    /// Budget for the total size of sealed files, in bytes.
    pub max_total_size: u64,

    /// Records per file before rotation.
    pub max_entries_per_file: u32,

    /// Data file naming.
    pub naming: FileNaming,

    /// zstd compression level used when sealing.
    pub compression_level: i32,

    /// Whether to flush the active file after every put.
    pub sync_on_write: bool,

    /// Behavior after a failed write.
    pub write_failure_policy: WriteFailurePolicy,

    /// Whether `open` seals raw files left behind by a previous run.
    pub recover_stale_files: bool,
}

impl StoreConfig {
    /// Creates a configuration with default values for `base_dir`.
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            fs: Arc::new(OsFilesystem::new()),
            max_total_size: 512 * 1024 * 1024, // 512 MiB
            max_entries_per_file: 10_000,
            naming: FileNaming::default(),
            compression_level: 3,
            sync_on_write: false,
            write_failure_policy: WriteFailurePolicy::Propagate,
            recover_stale_files: true,
        }
    }

    /// Sets the filesystem.
    #[must_use]
    pub fn filesystem(mut self, fs: Arc<dyn Filesystem>) -> Self {
        self.fs = fs;
        self
    }

    /// Sets the sealed-size budget.
    #[must_use]
    pub const fn max_total_size(mut self, bytes: u64) -> Self {
        self.max_total_size = bytes;
        self
    }

    /// Sets the rotation threshold.
    #[must_use]
    pub const fn max_entries_per_file(mut self, entries: u32) -> Self {
        self.max_entries_per_file = entries;
        self
    }

    /// Sets the data file prefix.
    #[must_use]
    pub fn file_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.naming.prefix = prefix.into();
        self
    }

    /// Sets the sealed file suffix.
    #[must_use]
    pub fn sealed_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.naming.sealed_suffix = suffix.into();
        self
    }

    /// Sets the zstd compression level.
    #[must_use]
    pub const fn compression_level(mut self, level: i32) -> Self {
        self.compression_level = level;
        self
    }

    /// Sets whether every put is flushed.
    #[must_use]
    pub const fn sync_on_write(mut self, value: bool) -> Self {
        self.sync_on_write = value;
        self
    }

    /// Sets the write failure policy.
    #[must_use]
    pub const fn write_failure_policy(mut self, policy: WriteFailurePolicy) -> Self {
        self.write_failure_policy = policy;
        self
    }

    /// Sets whether stale raw files are sealed on open.
    #[must_use]
    pub const fn recover_stale_files(mut self, value: bool) -> Self {
        self.recover_stale_files = value;
        self
    }

    /// Returns the path of the writer lock file.
    #[must_use]
    pub fn lock_path(&self) -> PathBuf {
        self.base_dir.join(LOCK_FILE_NAME)
    }

    /// Returns the base directory.
    #[must_use]
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Checks the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Config`] for a zero rotation threshold or an
    /// ambiguous naming scheme.
    pub fn validate(&self) -> CoreResult<()> {
        if self.max_entries_per_file == 0 {
            return Err(CoreError::config("max_entries_per_file must be at least 1"));
        }
        self.naming.validate()
    }
}

impl fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreConfig")
            .field("base_dir", &self.base_dir)
            .field("fs", &self.fs)
            .field("max_total_size", &self.max_total_size)
            .field("max_entries_per_file", &self.max_entries_per_file)
            .field("naming", &self.naming)
            .field("compression_level", &self.compression_level)
            .field("sync_on_write", &self.sync_on_write)
            .field("write_failure_policy", &self.write_failure_policy)
            .field("recover_stale_files", &self.recover_stale_files)
            .finish()
    }
}
