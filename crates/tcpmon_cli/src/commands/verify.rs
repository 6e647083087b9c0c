//! Verify command implementation.

use super::open_reader;
use std::path::Path;

/// Runs the verify command.
///
/// Every data file is decompressed if sealed and scanned frame by frame.
/// Fails if any file is unreadable.
pub fn run(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    println!("Verifying data directory at {:?}", path);
    println!();

    let reports = open_reader(path)?.verify()?;
    let mut failed = 0usize;
    let mut records = 0usize;

    for report in &reports {
        match &report.records {
            Ok(n) => {
                records += n;
                println!("  ok      {} ({} records)", report.entry.file_name(), n);
            }
            Err(e) => {
                failed += 1;
                println!("  FAILED  {}: {}", report.entry.file_name(), e);
            }
        }
    }

    println!();
    println!(
        "{} files checked, {} failed, {} records",
        reports.len(),
        failed,
        records
    );

    if failed > 0 {
        return Err(format!("{} data files failed verification", failed).into());
    }
    Ok(())
}
