//! Size-bounded retention.

use crate::error::CoreResult;
use crate::fileset::{FileFilter, FileSet};
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Outcome of one reclaim pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReclaimStats {
    /// Sealed bytes before the pass.
    pub total_before: u64,
    /// Sealed bytes after the pass.
    pub total_after: u64,
    /// Files deleted, oldest first.
    pub deleted: Vec<PathBuf>,
    /// Files whose deletion failed.
    pub failed: Vec<PathBuf>,
}

impl ReclaimStats {
    /// Returns the bytes freed.
    #[must_use]
    pub fn freed(&self) -> u64 {
        self.total_before - self.total_after
    }
}

/// Deletes the oldest sealed files until their total size fits a budget.
///
/// Raw files, the active one included, are never touched.
#[derive(Debug, Clone)]
pub struct Reclaimer {
    files: FileSet,
    max_total_size: u64,
}

impl Reclaimer {
    /// Creates a reclaimer for `files` with a budget of `max_total_size`.
    #[must_use]
    pub fn new(files: FileSet, max_total_size: u64) -> Self {
        Self {
            files,
            max_total_size,
        }
    }

    /// Returns the budget in bytes.
    #[must_use]
    pub fn max_total_size(&self) -> u64 {
        self.max_total_size
    }

    /// Returns the total size of sealed files and their paths, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be listed or a file cannot
    /// be stat'ed.
    pub fn total_sealed_size(&self) -> CoreResult<(u64, Vec<PathBuf>)> {
        let sized = self.sealed_sizes()?;
        let total = sized.iter().map(|(_, size)| size).sum();
        Ok((total, sized.into_iter().map(|(path, _)| path).collect()))
    }

    /// Runs one reclaim pass.
    ///
    /// Deletion failures are logged and recorded in
    /// [`ReclaimStats::failed`]; the pass continues with the next file.
    ///
    /// # Errors
    ///
    /// Returns an error only if the sealed files cannot be enumerated.
    pub fn reclaim(&self) -> CoreResult<ReclaimStats> {
        let sized = self.sealed_sizes()?;
        let total_before: u64 = sized.iter().map(|(_, size)| size).sum();
        let mut stats = ReclaimStats {
            total_before,
            total_after: total_before,
            ..ReclaimStats::default()
        };

        if total_before <= self.max_total_size {
            debug!(total = total_before, budget = self.max_total_size, "Reclaim not needed");
            return Ok(stats);
        }

        for (path, size) in sized {
            if stats.total_after <= self.max_total_size {
                break;
            }
            match self.files.fs().remove(&path) {
                Ok(()) => {
                    stats.total_after -= size;
                    stats.deleted.push(path);
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Failed to delete sealed file");
                    stats.failed.push(path);
                }
            }
        }

        info!(
            deleted = stats.deleted.len(),
            failed = stats.failed.len(),
            total_before = stats.total_before,
            total_after = stats.total_after,
            "Reclaimed sealed files"
        );
        Ok(stats)
    }

    fn sealed_sizes(&self) -> CoreResult<Vec<(PathBuf, u64)>> {
        let mut sized = Vec::new();
        for entry in self.files.sorted_files(FileFilter::Sealed)? {
            match self.files.fs().stat(&entry.path) {
                Ok(stat) => sized.push((entry.path, stat.size)),
                // Removed between listing and stat
                Err(e) if e.is_not_found() => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(sized)
    }
}
