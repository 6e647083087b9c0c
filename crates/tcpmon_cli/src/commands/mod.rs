//! CLI command implementations.

pub mod backup;
pub mod export;
pub mod inspect;
pub mod reclaim;
pub mod verify;

use std::path::Path;
use std::sync::Arc;
use tcpmon_core::{Reader, StoreConfig};
use tcpmon_storage::OsFilesystem;

/// Opens a reader on a data directory on the local filesystem.
pub fn open_reader(dir: &Path) -> Result<Reader, Box<dyn std::error::Error>> {
    Reader::open(Arc::new(OsFilesystem::new()), dir)
        .map_err(|e| format!("cannot read data directory {}: {e}", dir.display()).into())
}

/// Returns the store configuration for a data directory.
pub fn store_config(dir: &Path) -> StoreConfig {
    StoreConfig::new(dir)
}

/// Formats a byte count for humans.
pub fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.1} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}
