//! Sequenced data file set.
//!
//! Discovers, names and orders the data files of one base directory.

use crate::config::FileNaming;
use crate::error::{CoreError, CoreResult};
use crate::types::{FileNo, FileState};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tcpmon_storage::Filesystem;

/// Which data files a listing returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFilter {
    /// Raw and sealed files.
    All,
    /// Only raw files.
    Raw,
    /// Only sealed files.
    Sealed,
}

impl FileFilter {
    fn accepts(self, state: FileState) -> bool {
        match self {
            Self::All => true,
            Self::Raw => state == FileState::Raw,
            Self::Sealed => state == FileState::Sealed,
        }
    }
}

/// One data file found in the base directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataFileEntry {
    /// Sequence number parsed from the name.
    pub file_no: FileNo,
    /// Full path.
    pub path: PathBuf,
    /// Raw or sealed.
    pub state: FileState,
}

impl DataFileEntry {
    /// Returns the file name component.
    #[must_use]
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// The data files of one directory under one naming scheme.
#[derive(Clone)]
pub struct FileSet {
    fs: Arc<dyn Filesystem>,
    dir: PathBuf,
    naming: FileNaming,
}

impl FileSet {
    /// Creates a file set over `dir`.
    pub fn new(fs: Arc<dyn Filesystem>, dir: impl Into<PathBuf>, naming: FileNaming) -> Self {
        Self {
            fs,
            dir: dir.into(),
            naming,
        }
    }

    /// Returns the filesystem.
    #[must_use]
    pub fn fs(&self) -> &Arc<dyn Filesystem> {
        &self.fs
    }

    /// Returns the base directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns the naming scheme.
    #[must_use]
    pub fn naming(&self) -> &FileNaming {
        &self.naming
    }

    /// Path of the raw file with sequence `file_no`.
    #[must_use]
    pub fn raw_path(&self, file_no: FileNo) -> PathBuf {
        self.dir.join(format!("{}{}", self.naming.prefix, file_no))
    }

    /// Path of the sealed file with sequence `file_no`.
    #[must_use]
    pub fn sealed_path(&self, file_no: FileNo) -> PathBuf {
        self.dir.join(format!(
            "{}{}{}",
            self.naming.prefix, file_no, self.naming.sealed_suffix
        ))
    }

    /// Parses a directory entry name.
    ///
    /// Returns `Ok(None)` for names that do not carry the prefix.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Config`] if a prefixed name has no trailing
    /// sequence number.
    pub fn parse_name(&self, name: &str) -> CoreResult<Option<(FileNo, FileState)>> {
        let Some(tail) = name.strip_prefix(self.naming.prefix.as_str()) else {
            return Ok(None);
        };

        let (tail, state) = match tail.strip_suffix(self.naming.sealed_suffix.as_str()) {
            Some(stripped) => (stripped, FileState::Sealed),
            None => (tail, FileState::Raw),
        };

        let digits = tail.rsplit('-').next().unwrap_or(tail);
        let no = digits.parse::<u32>().map_err(|_| {
            CoreError::config(format!(
                "data file {name:?} in {} has no sequence number",
                self.dir.display()
            ))
        })?;

        Ok(Some((FileNo::new(no), state)))
    }

    /// Lists data files sorted by sequence number, raw before sealed for
    /// equal numbers.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be listed or a data file
    /// name cannot be parsed.
    pub fn sorted_files(&self, filter: FileFilter) -> CoreResult<Vec<DataFileEntry>> {
        let mut entries = Vec::new();
        for name in self.fs.list(&self.dir)? {
            let Some((file_no, state)) = self.parse_name(&name)? else {
                continue;
            };
            if filter.accepts(state) {
                entries.push(DataFileEntry {
                    file_no,
                    path: self.dir.join(&name),
                    state,
                });
            }
        }

        entries.sort_by(|a, b| (a.file_no, a.state).cmp(&(b.file_no, b.state)));
        Ok(entries)
    }

    /// Returns the highest sequence number present, or `FileNo(0)` when the
    /// directory holds no data files.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be listed or a data file
    /// name cannot be parsed.
    pub fn latest_file_no(&self) -> CoreResult<FileNo> {
        Ok(self
            .sorted_files(FileFilter::All)?
            .last()
            .map(|entry| entry.file_no)
            .unwrap_or_default())
    }
}

impl fmt::Debug for FileSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileSet")
            .field("dir", &self.dir)
            .field("naming", &self.naming)
            .finish_non_exhaustive()
    }
}
