//! Tar packaging of a data directory.

use crate::error::{CoreError, CoreResult};
use crate::fileset::{DataFileEntry, FileFilter, FileSet};
use crate::types::FileState;
use std::collections::HashSet;
use std::io::Write;
use std::path::PathBuf;
use std::time::UNIX_EPOCH;
use tcpmon_storage::{FileReader, Filesystem};
use tracing::{debug, info, warn};

/// What a packaging run wrote.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PackageStats {
    /// Archive entries written.
    pub files: usize,
    /// Payload bytes written, headers excluded.
    pub bytes: u64,
}

/// Streams every data file of `files`, raw and sealed, into a tar archive.
///
/// Entries are written in sequence order with their size and modification
/// time and mode `0644`. A raw file is cut at the size observed when its
/// entry starts. A raw file sealed since listing is packaged under its
/// sealed name instead. Files deleted while packaging (reclaimed) are
/// skipped.
///
/// # Errors
///
/// Returns an error if the directory cannot be listed or the archive cannot
/// be written.
pub fn package<W: Write>(files: &FileSet, writer: W) -> CoreResult<PackageStats> {
    let mut builder = tar::Builder::new(writer);
    let mut stats = PackageStats::default();

    let entries = files.sorted_files(FileFilter::All)?;
    let listed: HashSet<PathBuf> = entries.iter().map(|e| e.path.clone()).collect();

    for entry in &entries {
        let appended = match append_entry(&mut builder, files.fs().as_ref(), entry) {
            Err(CoreError::Storage(e)) if e.is_not_found() && entry.state == FileState::Raw => {
                let sealed = DataFileEntry {
                    file_no: entry.file_no,
                    path: files.sealed_path(entry.file_no),
                    state: FileState::Sealed,
                };
                if listed.contains(&sealed.path) {
                    debug!(path = %entry.path.display(), "Raw file sealed; sealed entry follows");
                    continue;
                }
                debug!(path = %sealed.path.display(), "Raw file sealed while packaging");
                append_entry(&mut builder, files.fs().as_ref(), &sealed)
            }
            other => other,
        };

        match appended {
            Ok(size) => {
                stats.files += 1;
                stats.bytes += size;
            }
            Err(CoreError::Storage(e)) if e.is_not_found() => {
                warn!(path = %entry.path.display(), "Data file vanished while packaging");
            }
            Err(e) => return Err(e),
        }
    }

    let mut writer = builder.into_inner()?;
    writer.flush()?;
    info!(files = stats.files, bytes = stats.bytes, "Packaged data files");
    Ok(stats)
}

fn append_entry<W: Write>(
    builder: &mut tar::Builder<W>,
    fs: &dyn Filesystem,
    entry: &DataFileEntry,
) -> CoreResult<u64> {
    let stat = fs.stat(&entry.path)?;
    let source = fs.open(&entry.path)?;

    let mut header = tar::Header::new_gnu();
    header.set_entry_type(tar::EntryType::Regular);
    header.set_size(stat.size);
    header.set_mode(0o644);
    header.set_mtime(
        stat.modified
            .duration_since(UNIX_EPOCH)
            .map_or(0, |elapsed| elapsed.as_secs()),
    );

    builder.append_data(
        &mut header,
        entry.file_name(),
        FileReader::with_limit(source, stat.size),
    )?;
    Ok(stat.size)
}
