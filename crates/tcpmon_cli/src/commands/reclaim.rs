//! Reclaim command implementation.

use super::format_size;
use std::path::Path;
use std::sync::Arc;
use tcpmon_core::{FileNaming, FileSet, Reclaimer};
use tcpmon_storage::OsFilesystem;

/// Deletes the oldest sealed files until their total fits `max_size`.
///
/// With `dry_run` only the current total is reported.
pub fn run(dir: &Path, max_size: u64, dry_run: bool) -> Result<(), Box<dyn std::error::Error>> {
    let files = FileSet::new(Arc::new(OsFilesystem::new()), dir, FileNaming::default());
    let reclaimer = Reclaimer::new(files, max_size);

    if dry_run {
        let (total, paths) = reclaimer.total_sealed_size()?;
        println!(
            "{} sealed files, {} (budget {})",
            paths.len(),
            format_size(total),
            format_size(max_size)
        );
        return Ok(());
    }

    let stats = reclaimer.reclaim()?;
    println!("Reclaim complete");
    println!("  Before:  {}", format_size(stats.total_before));
    println!("  After:   {}", format_size(stats.total_after));
    println!("  Deleted: {}", stats.deleted.len());
    for path in &stats.failed {
        println!("  FAILED:  {:?}", path);
    }

    if !stats.failed.is_empty() {
        return Err(format!("{} files could not be deleted", stats.failed.len()).into());
    }
    Ok(())
}
