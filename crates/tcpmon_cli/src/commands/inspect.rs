//! Inspect and count commands.

use super::{format_size, open_reader};
use serde::Serialize;
use std::path::Path;
use tcpmon_core::FileState;

/// Data directory inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Directory path.
    pub path: String,
    /// Per-file details in sequence order.
    pub files: Vec<FileInfo>,
    /// Total size of sealed files.
    pub sealed_size: u64,
    /// Total size of raw files.
    pub raw_size: u64,
    /// Records across readable files.
    pub records: usize,
}

/// Details of one data file.
#[derive(Debug, Serialize)]
pub struct FileInfo {
    /// File name.
    pub name: String,
    /// Sequence number.
    pub sequence: u32,
    /// `raw` or `sealed`.
    pub state: &'static str,
    /// Size on disk.
    pub size: u64,
    /// Record count, if the file is readable.
    pub records: Option<usize>,
    /// Why the file is unreadable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Runs the inspect command.
pub fn run(path: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let reader = open_reader(path)?;

    let mut result = InspectResult {
        path: path.display().to_string(),
        files: Vec::new(),
        sealed_size: 0,
        raw_size: 0,
        records: 0,
    };

    for report in reader.verify()? {
        match report.entry.state {
            FileState::Raw => result.raw_size += report.size,
            FileState::Sealed => result.sealed_size += report.size,
        }
        let (records, error) = match &report.records {
            Ok(n) => {
                result.records += n;
                (Some(*n), None)
            }
            Err(e) => (None, Some(e.to_string())),
        };
        result.files.push(FileInfo {
            name: report.entry.file_name(),
            sequence: report.entry.file_no.as_u32(),
            state: report.entry.state.as_str(),
            size: report.size,
            records,
            error,
        });
    }

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&result)?),
        _ => print_text_output(&result),
    }

    Ok(())
}

/// Runs the count command.
pub fn count(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let reader = open_reader(path)?;
    println!("{}", reader.count()?);
    Ok(())
}

fn print_text_output(result: &InspectResult) {
    println!("tcpmon Data Directory");
    println!("=====================");
    println!();
    println!("Path: {}", result.path);
    println!();
    println!("Files:");
    for file in &result.files {
        let records = file
            .records
            .map_or_else(|| "?".to_string(), |n| n.to_string());
        println!(
            "  {:<28} {:<6} {:>10}  {:>8} records",
            file.name,
            file.state,
            format_size(file.size),
            records
        );
        if let Some(error) = &file.error {
            println!("    ERROR: {}", error);
        }
    }
    println!();
    println!("Storage:");
    println!("  Sealed: {}", format_size(result.sealed_size));
    println!("  Raw:    {}", format_size(result.raw_size));
    println!();
    println!("Records: {}", result.records);
}
