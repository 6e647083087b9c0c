//! Read-only access to a data directory.

use crate::config::FileNaming;
use crate::error::{CoreError, CoreResult};
use crate::export::{ExportOptions, ExportSummary, Exporter};
use crate::fileset::{DataFileEntry, FileFilter, FileSet};
use crate::package::{package, PackageStats};
use crate::scanner::{read_body, scan, TailPolicy};
use crate::seal::open_data_file;
use crate::types::{FileNo, FileState, RecordRange};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tcpmon_codec::Renderer;
use tcpmon_storage::{Filesystem, ReadableFile};
use tracing::debug;

/// A data file opened for reading together with its record ranges.
pub struct ScannedFile {
    entry: DataFileEntry,
    source: Arc<dyn ReadableFile>,
    ranges: Vec<RecordRange>,
}

impl ScannedFile {
    /// Scans an already opened source.
    ///
    /// Raw sources tolerate a partial trailing record; sealed sources do
    /// not.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Format`] if the frames are malformed.
    pub fn from_source(entry: DataFileEntry, source: Arc<dyn ReadableFile>) -> CoreResult<Self> {
        let tail = match entry.state {
            FileState::Raw => TailPolicy::Tolerant,
            FileState::Sealed => TailPolicy::Strict,
        };
        let ranges = scan(source.as_ref(), tail)?;
        debug!(path = %entry.path.display(), records = ranges.len(), "Scanned data file");
        Ok(Self {
            entry,
            source,
            ranges,
        })
    }

    /// Returns the directory entry.
    #[must_use]
    pub fn entry(&self) -> &DataFileEntry {
        &self.entry
    }

    /// Returns the record ranges in file order.
    #[must_use]
    pub fn ranges(&self) -> &[RecordRange] {
        &self.ranges
    }

    /// Returns the number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    /// Returns true if the file holds no complete record.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Returns the size of the (decompressed) frame stream.
    ///
    /// # Errors
    ///
    /// Returns an error if the size cannot be determined.
    pub fn source_len(&self) -> CoreResult<u64> {
        Ok(self.source.size()?)
    }

    /// Reads the payload of one record.
    ///
    /// # Errors
    ///
    /// Returns an error if the range lies outside the file.
    pub fn read_body(&self, range: &RecordRange) -> CoreResult<Vec<u8>> {
        read_body(self.source.as_ref(), range)
    }
}

impl fmt::Debug for ScannedFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScannedFile")
            .field("entry", &self.entry)
            .field("records", &self.ranges.len())
            .finish_non_exhaustive()
    }
}

/// Export outcome for one data file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardSummary {
    /// The exported file.
    pub entry: DataFileEntry,
    /// What was exported from it.
    pub summary: ExportSummary,
}

/// Scan outcome for one data file, as reported by [`Reader::verify`].
#[derive(Debug)]
pub struct FileReport {
    /// The checked file.
    pub entry: DataFileEntry,
    /// Size on disk.
    pub size: u64,
    /// Record count, or why the file could not be read.
    pub records: CoreResult<usize>,
}

impl FileReport {
    /// Returns true if the file scanned cleanly.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.records.is_ok()
    }
}

/// Reads the data files of one directory without taking the writer lock.
///
/// Scans are cached per file path. Sealed files never change; the ranges of
/// a raw file reflect the moment it was first scanned, so readers that need
/// fresher data create a new `Reader`.
pub struct Reader {
    files: FileSet,
    cache: RwLock<HashMap<PathBuf, Arc<ScannedFile>>>,
}

impl Reader {
    /// Opens a reader with the default naming scheme.
    ///
    /// # Errors
    ///
    /// Returns an error if `base_dir` cannot be listed.
    pub fn open(fs: Arc<dyn Filesystem>, base_dir: impl Into<PathBuf>) -> CoreResult<Self> {
        Self::open_with_naming(fs, base_dir, FileNaming::default())
    }

    /// Opens a reader with a custom naming scheme.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Config`] for an invalid naming scheme, or an
    /// error if `base_dir` cannot be listed.
    pub fn open_with_naming(
        fs: Arc<dyn Filesystem>,
        base_dir: impl Into<PathBuf>,
        naming: FileNaming,
    ) -> CoreResult<Self> {
        naming.validate()?;
        let base_dir = base_dir.into();
        fs.list(&base_dir)?;
        Ok(Self::from_file_set(FileSet::new(fs, base_dir, naming)))
    }

    /// Creates a reader over an existing file set.
    #[must_use]
    pub fn from_file_set(files: FileSet) -> Self {
        Self {
            files,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the base directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        self.files.dir()
    }

    /// Lists the data files in sequence order.
    ///
    /// When a raw and a sealed file share a sequence number (an interrupted
    /// seal) only the raw file is returned.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be listed or a data file
    /// name cannot be parsed.
    pub fn files(&self) -> CoreResult<Vec<DataFileEntry>> {
        let mut entries = self.files.sorted_files(FileFilter::All)?;
        // Raw sorts before sealed for equal numbers
        entries.dedup_by_key(|entry| entry.file_no);
        Ok(entries)
    }

    /// Opens and scans one data file, using the cache.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened, or
    /// [`CoreError::Format`] if its frames are malformed.
    pub fn scan(&self, entry: &DataFileEntry) -> CoreResult<Arc<ScannedFile>> {
        if let Some(cached) = self.cache.read().get(&entry.path) {
            return Ok(Arc::clone(cached));
        }

        let source = open_data_file(self.files.fs().as_ref(), entry)?;
        let scanned = Arc::new(ScannedFile::from_source(entry.clone(), source)?);
        self.cache
            .write()
            .insert(entry.path.clone(), Arc::clone(&scanned));
        Ok(scanned)
    }

    /// Returns the total number of records across all files.
    ///
    /// # Errors
    ///
    /// Returns an error if any file cannot be read.
    pub fn count(&self) -> CoreResult<u64> {
        Ok(self
            .scan_all()?
            .iter()
            .map(|file| file.len() as u64)
            .sum())
    }

    /// Visits every payload in sequence order.
    ///
    /// The visitor returns `Ok(false)` to stop early. Returns the number of
    /// payloads visited.
    ///
    /// # Errors
    ///
    /// Returns the first error from reading a file or from the visitor.
    pub fn iterate<F>(&self, mut visit: F) -> CoreResult<u64>
    where
        F: FnMut(FileNo, &[u8]) -> CoreResult<bool>,
    {
        let mut visited = 0;
        for file in self.scan_all()? {
            for range in file.ranges() {
                let body = file.read_body(range)?;
                visited += 1;
                if !visit(file.entry().file_no, &body)? {
                    return Ok(visited);
                }
            }
        }
        Ok(visited)
    }

    /// Exports every file as its own shard.
    ///
    /// With a target time only the files whose range includes it are
    /// exported. With `show_only` every file reports its bounds.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::TimePointNotIncluded`] if a target is set and
    /// no file includes it, or the first read, decode, render or sink
    /// error.
    pub fn export<W: Write + Send>(
        &self,
        sink: &mut W,
        renderer: &dyn Renderer,
        options: &ExportOptions,
    ) -> CoreResult<Vec<ShardSummary>> {
        let exporter = Exporter::new(renderer, options.clone());
        let mut shards = Vec::new();
        let mut miss = None;

        for file in self.scan_all()? {
            if file.is_empty() {
                continue;
            }
            match exporter.export(std::slice::from_ref(&file), &mut *sink) {
                Ok(summary) => shards.push(ShardSummary {
                    entry: file.entry().clone(),
                    summary,
                }),
                Err(e) if e.is_time_point_not_included() => {
                    debug!(path = %file.entry().path.display(), "Target not in file");
                    miss = Some(widen(miss, e));
                }
                Err(e) => return Err(e),
            }
        }

        match miss {
            Some(e) if shards.is_empty() => Err(e),
            _ => Ok(shards),
        }
    }

    /// Writes every data file into a tar archive.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be listed or the archive
    /// cannot be written.
    pub fn package<W: Write>(&self, writer: W) -> CoreResult<PackageStats> {
        package(&self.files, writer)
    }

    /// Scans every file without the cache and reports the result per file.
    ///
    /// # Errors
    ///
    /// Returns an error only if the directory cannot be listed.
    pub fn verify(&self) -> CoreResult<Vec<FileReport>> {
        let fs = self.files.fs().as_ref();
        let mut reports = Vec::new();
        for entry in self.files.sorted_files(FileFilter::All)? {
            let size = fs.stat(&entry.path).map(|stat| stat.size).unwrap_or(0);
            let records = open_data_file(fs, &entry)
                .and_then(|source| ScannedFile::from_source(entry.clone(), source))
                .map(|file| file.len());
            reports.push(FileReport {
                entry,
                size,
                records,
            });
        }
        Ok(reports)
    }

    /// Scans every listed file, skipping files removed since listing.
    fn scan_all(&self) -> CoreResult<Vec<Arc<ScannedFile>>> {
        let mut scanned = Vec::new();
        for entry in self.files()? {
            match self.scan_resolving_seal(&entry) {
                Ok(file) => scanned.push(file),
                Err(CoreError::Storage(e)) if e.is_not_found() => {
                    debug!(path = %entry.path.display(), "Data file vanished; skipping");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(scanned)
    }

    /// Scans `entry`, following a raw file that was sealed after listing.
    fn scan_resolving_seal(&self, entry: &DataFileEntry) -> CoreResult<Arc<ScannedFile>> {
        match self.scan(entry) {
            Err(CoreError::Storage(e)) if e.is_not_found() && entry.state == FileState::Raw => {
                let sealed = DataFileEntry {
                    file_no: entry.file_no,
                    path: self.files.sealed_path(entry.file_no),
                    state: FileState::Sealed,
                };
                self.scan(&sealed)
            }
            other => other,
        }
    }
}

fn widen(previous: Option<CoreError>, next: CoreError) -> CoreError {
    match (previous, next) {
        (
            Some(CoreError::TimePointNotIncluded { start, end, .. }),
            CoreError::TimePointNotIncluded {
                target,
                start: s,
                end: e,
            },
        ) => CoreError::TimePointNotIncluded {
            target,
            start: start.min(s),
            end: end.max(e),
        },
        (_, next) => next,
    }
}

impl fmt::Debug for Reader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reader")
            .field("files", &self.files)
            .field("cached", &self.cache.read().len())
            .finish()
    }
}
