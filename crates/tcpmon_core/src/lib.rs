//! # tcpmon Core
//!
//! Embedded log-structured metric store for tcpmon.
//!
//! This crate provides:
//! - A frame codec for the append-only record format
//! - Sequenced data file discovery and naming
//! - The single writer with rotation, zstd sealing and stale file recovery
//! - Size-bounded retention of sealed files
//! - A range scanner and a concurrent, cancellable exporter
//! - Tar packaging for backups
//!
//! ## On-disk layout
//!
//! ```text
//! <base_dir>/
//! ├── LOCK                  # held by the writer
//! ├── tcpmon-dataf-1.zst    # sealed: zstd of the raw frame stream
//! ├── tcpmon-dataf-2.zst
//! └── tcpmon-dataf-3        # raw: the active file
//! ```
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use tcpmon_core::{ExportOptions, Reader, Store, StoreConfig};
//! use tcpmon_codec::{LineProtocol, Metric, NicMetric};
//! use tcpmon_storage::InMemoryFilesystem;
//!
//! let fs = Arc::new(InMemoryFilesystem::new());
//! let store = Store::open(StoreConfig::new("/data").filesystem(fs.clone())).unwrap();
//!
//! let metric = Metric::from(NicMetric {
//!     interface: "eth0".into(),
//!     ..NicMetric::default()
//! });
//! store.put(&metric.encode().unwrap()).unwrap();
//! store.rotate().unwrap();
//!
//! let reader = Reader::open(fs, "/data").unwrap();
//! let mut out = Vec::new();
//! reader
//!     .export(&mut out, &LineProtocol, &ExportOptions::new().hostname("web-1"))
//!     .unwrap();
//! assert!(String::from_utf8(out).unwrap().starts_with("nic,host=web-1"));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod error;
mod export;
mod fileset;
mod frame;
mod package;
mod reader;
mod reclaim;
mod scanner;
mod seal;
mod stats;
mod store;
mod types;

pub use config::{
    FileNaming, StoreConfig, WriteFailurePolicy, DEFAULT_FILE_PREFIX, DEFAULT_SEALED_SUFFIX,
    LOCK_FILE_NAME,
};
pub use error::{CoreError, CoreResult};
pub use export::{ExportOptions, ExportSummary, Exporter, DEFAULT_QUEUE_CAPACITY};
pub use fileset::{DataFileEntry, FileFilter, FileSet};
pub use frame::{decode_header, encode_frame, encode_header, FORMAT_VERSION, HEADER_SIZE};
pub use package::{package, PackageStats};
pub use reader::{FileReport, Reader, ScannedFile, ShardSummary};
pub use reclaim::{ReclaimStats, Reclaimer};
pub use scanner::{complete_len, read_body, scan, TailPolicy};
pub use seal::{open_data_file, seal_file};
pub use stats::{StatsSnapshot, StoreStats};
pub use store::Store;
pub use types::{FileNo, FileState, RecordRange};
