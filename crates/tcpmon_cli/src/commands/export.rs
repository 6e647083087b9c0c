//! Export command implementation.

use super::open_reader;
use chrono::{DateTime, Utc};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tcpmon_codec::{JsonLines, LineProtocol, Renderer, Timestamp};
use tcpmon_core::ExportOptions;
use tracing::info;

/// Export command arguments.
#[derive(Debug)]
pub struct ExportArgs {
    /// Only export files whose range includes this time (RFC 3339).
    pub target: Option<String>,
    /// Print the time range of each file instead of exporting.
    pub show_only: bool,
    /// Host tag; defaults to `$HOSTNAME`.
    pub host: Option<String>,
    /// Output file; defaults to stdout.
    pub output: Option<PathBuf>,
    /// Worker threads.
    pub workers: Option<usize>,
    /// `line` or `json`.
    pub format: String,
}

/// Runs the export command.
pub fn run(path: &Path, args: ExportArgs) -> Result<(), Box<dyn std::error::Error>> {
    let reader = open_reader(path)?;

    let mut options = ExportOptions::new()
        .show_only(args.show_only)
        .hostname(args.host.unwrap_or_else(default_hostname));
    if let Some(target) = &args.target {
        options = options.target(parse_target(target)?);
    }
    if let Some(workers) = args.workers {
        options = options.workers(workers);
    }

    let renderer = renderer_for(&args.format)?;
    let mut sink: Box<dyn Write + Send> = match &args.output {
        Some(file) => Box::new(BufWriter::new(File::create(file)?)),
        None => Box::new(BufWriter::new(io::stdout())),
    };

    let shards = reader.export(&mut sink, renderer.as_ref(), &options)?;
    sink.flush()?;

    if args.show_only {
        for shard in &shards {
            if let (Some(start), Some(end)) = (shard.summary.start, shard.summary.end) {
                println!("{}  {}  {}", shard.entry.file_name(), start, end);
            }
        }
    } else {
        let records: u64 = shards.iter().map(|s| s.summary.records).sum();
        info!(files = shards.len(), records, "Export complete");
    }
    Ok(())
}

/// Parses an RFC 3339 target time.
pub fn parse_target(raw: &str) -> Result<Timestamp, Box<dyn std::error::Error>> {
    let parsed = DateTime::parse_from_rfc3339(raw)
        .map_err(|e| format!("invalid target time {raw:?}: {e}"))?;
    Ok(parsed.with_timezone(&Utc))
}

fn renderer_for(format: &str) -> Result<Box<dyn Renderer>, Box<dyn std::error::Error>> {
    match format {
        "line" => Ok(Box::new(LineProtocol)),
        "json" => Ok(Box::new(JsonLines)),
        other => Err(format!("unknown export format {other:?} (expected line or json)").into()),
    }
}

fn default_hostname() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn target_accepts_offsets() {
        let ts = parse_target("2024-03-01T12:00:00+02:00").unwrap();
        assert_eq!(ts, Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap());
    }

    #[test]
    fn target_rejects_garbage() {
        assert!(parse_target("yesterday").is_err());
    }

    #[test]
    fn unknown_format_rejected() {
        assert!(renderer_for("csv").is_err());
        assert!(renderer_for("json").is_ok());
    }
}
