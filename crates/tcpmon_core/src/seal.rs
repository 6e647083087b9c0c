//! Sealing raw files and opening data files for reading.

use crate::error::{CoreError, CoreResult};
use crate::fileset::DataFileEntry;
use crate::types::FileState;
use std::path::Path;
use std::sync::Arc;
use tcpmon_storage::{BytesFile, FileReader, Filesystem, ReadableFile};
use tracing::{debug, warn};

/// Compresses `raw` into `sealed` and removes `raw`.
///
/// When `limit` is set only the first `limit` bytes of the raw file are
/// sealed. Returns the size of the sealed file.
///
/// # Errors
///
/// Returns an error if reading, compressing, syncing or removing fails.
/// A partially written sealed file is removed; the raw file is kept.
pub fn seal_file(
    fs: &dyn Filesystem,
    raw: &Path,
    sealed: &Path,
    level: i32,
    limit: Option<u64>,
) -> CoreResult<u64> {
    let source = fs.open(raw)?;
    let reader = match limit {
        Some(len) => FileReader::with_limit(source, len),
        None => FileReader::new(source)?,
    };

    if let Err(e) = compress(fs, reader, sealed, level) {
        if let Err(cleanup) = fs.remove(sealed) {
            if !cleanup.is_not_found() {
                warn!(path = %sealed.display(), error = %cleanup, "Failed to remove partial sealed file");
            }
        }
        return Err(e);
    }

    fs.remove(raw)?;
    let size = fs.stat(sealed)?.size;
    debug!(raw = %raw.display(), sealed = %sealed.display(), size, "Sealed data file");
    Ok(size)
}

fn compress(fs: &dyn Filesystem, reader: FileReader, sealed: &Path, level: i32) -> CoreResult<()> {
    let mut out = fs.create(sealed)?;
    zstd::stream::copy_encode(reader, &mut out, level)?;
    out.sync()?;
    Ok(())
}

/// Opens a data file for positional reads.
///
/// Raw files are read in place. Sealed files are decompressed once into
/// memory, so both yield the same frame stream.
///
/// # Errors
///
/// Returns an error if the file cannot be opened, or
/// [`CoreError::Format`] if a sealed file does not decompress.
pub fn open_data_file(
    fs: &dyn Filesystem,
    entry: &DataFileEntry,
) -> CoreResult<Arc<dyn ReadableFile>> {
    let source = fs.open(&entry.path)?;
    match entry.state {
        FileState::Raw => Ok(source),
        FileState::Sealed => {
            let data = zstd::stream::decode_all(FileReader::new(source)?).map_err(|e| {
                CoreError::format(format!("cannot decompress {}: {e}", entry.path.display()))
            })?;
            Ok(Arc::new(BytesFile::new(data)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::encode_frame;
    use crate::types::FileNo;
    use std::path::PathBuf;
    use tcpmon_storage::InMemoryFilesystem;

    fn seeded(data: &[u8]) -> InMemoryFilesystem {
        let fs = InMemoryFilesystem::new();
        fs.write_file(Path::new("/d/f-1"), data);
        fs
    }

    fn sealed_entry() -> DataFileEntry {
        DataFileEntry {
            file_no: FileNo(1),
            path: PathBuf::from("/d/f-1.zst"),
            state: FileState::Sealed,
        }
    }

    #[test]
    fn seal_replaces_raw_with_compressed() {
        let data = encode_frame(&[42u8; 4096]).unwrap();
        let fs = seeded(&data);

        let size = seal_file(&fs, Path::new("/d/f-1"), Path::new("/d/f-1.zst"), 3, None).unwrap();
        assert!(!fs.exists(Path::new("/d/f-1")));
        assert!(size > 0 && size < data.len() as u64);

        let source = open_data_file(&fs, &sealed_entry()).unwrap();
        assert_eq!(source.read_at(0, data.len()).unwrap(), data);
    }

    #[test]
    fn seal_with_limit_drops_tail() {
        let mut data = encode_frame(b"whole").unwrap();
        let keep = data.len() as u64;
        data.extend_from_slice(&[0xDE, 0xAD, 0x09]);
        let fs = seeded(&data);

        seal_file(&fs, Path::new("/d/f-1"), Path::new("/d/f-1.zst"), 1, Some(keep)).unwrap();

        let source = open_data_file(&fs, &sealed_entry()).unwrap();
        assert_eq!(source.size().unwrap(), keep);
    }

    #[test]
    fn garbage_sealed_file_is_format_error() {
        let fs = InMemoryFilesystem::new();
        fs.write_file(Path::new("/d/f-1.zst"), b"definitely not zstd");

        let err = open_data_file(&fs, &sealed_entry()).err().unwrap();
        assert!(err.is_format());
    }

    #[test]
    fn raw_file_is_read_in_place() {
        let fs = seeded(b"raw bytes");
        let entry = DataFileEntry {
            file_no: FileNo(1),
            path: PathBuf::from("/d/f-1"),
            state: FileState::Raw,
        };
        let source = open_data_file(&fs, &entry).unwrap();
        assert_eq!(source.read_at(4, 5).unwrap(), b"bytes");
    }
}
