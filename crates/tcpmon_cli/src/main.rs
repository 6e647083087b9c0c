//! tcpmon CLI
//!
//! Command-line tools for tcpmon data directories.
//!
//! # Commands
//!
//! - `inspect` - List data files with sizes and record counts
//! - `verify` - Scan every data file and report format errors
//! - `count` - Print the total record count
//! - `export` - Render records as line protocol or JSON
//! - `package` - Write a tar backup of the data files
//! - `seal` - Seal the active file
//! - `reclaim` - Delete the oldest sealed files down to a size budget

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// tcpmon data directory tools.
#[derive(Parser)]
#[command(name = "tcpmon")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the data directory
    #[arg(global = true, short, long)]
    dir: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List data files with sizes and record counts
    Inspect {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Scan every data file and report format errors
    Verify,

    /// Print the total record count
    Count,

    /// Render records to stdout or a file
    Export {
        /// Only export files whose time range includes this RFC 3339 time
        #[arg(short, long)]
        target: Option<String>,

        /// Print each file's time range instead of exporting
        #[arg(short, long)]
        show_only: bool,

        /// Host tag (defaults to $HOSTNAME)
        #[arg(long)]
        host: Option<String>,

        /// Output file (defaults to stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Number of worker threads
        #[arg(short, long)]
        workers: Option<usize>,

        /// Output format (line, json)
        #[arg(short, long, default_value = "line")]
        format: String,
    },

    /// Write a tar archive of all data files
    Package {
        /// Archive path
        #[arg(short, long)]
        output: PathBuf,

        /// Do not seal the active file first
        #[arg(long)]
        no_seal: bool,
    },

    /// Seal the active file
    Seal,

    /// Delete the oldest sealed files until they fit a size budget
    Reclaim {
        /// Budget in bytes
        #[arg(short, long)]
        max_size: u64,

        /// Dry run - only report the current size
        #[arg(long)]
        dry_run: bool,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging; RUST_LOG takes precedence
    let level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Inspect { format } => {
            let dir = cli.dir.ok_or("Data directory required for inspect")?;
            commands::inspect::run(&dir, &format)?;
        }
        Commands::Verify => {
            let dir = cli.dir.ok_or("Data directory required for verify")?;
            commands::verify::run(&dir)?;
        }
        Commands::Count => {
            let dir = cli.dir.ok_or("Data directory required for count")?;
            commands::inspect::count(&dir)?;
        }
        Commands::Export {
            target,
            show_only,
            host,
            output,
            workers,
            format,
        } => {
            let dir = cli.dir.ok_or("Data directory required for export")?;
            commands::export::run(
                &dir,
                commands::export::ExportArgs {
                    target,
                    show_only,
                    host,
                    output,
                    workers,
                    format,
                },
            )?;
        }
        Commands::Package { output, no_seal } => {
            let dir = cli.dir.ok_or("Data directory required for package")?;
            commands::backup::package(&dir, &output, no_seal)?;
        }
        Commands::Seal => {
            let dir = cli.dir.ok_or("Data directory required for seal")?;
            commands::backup::seal(&dir)?;
        }
        Commands::Reclaim { max_size, dry_run } => {
            let dir = cli.dir.ok_or("Data directory required for reclaim")?;
            commands::reclaim::run(&dir, max_size, dry_run)?;
        }
        Commands::Version => {
            println!("tcpmon CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("Frame format {:#06x}", tcpmon_core::FORMAT_VERSION);
        }
    }

    Ok(())
}
