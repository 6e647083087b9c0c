//! # tcpmon Storage
//!
//! Filesystem capability layer for the tcpmon data store.
//!
//! The store never calls `std::fs` directly. Every file operation it needs
//! (create, open, list, remove, stat, lock) goes through the [`Filesystem`]
//! trait so that the writer, reclaimer and reader can run against a real
//! directory or against an in-memory tree in tests.
//!
//! ## Design Principles
//!
//! - Files are opaque byte streams; no knowledge of frames or sealing
//! - Readable handles support positional reads through `&self`, so one
//!   handle can be shared by many reader threads
//! - Implementations must be `Send + Sync`
//!
//! ## Available Implementations
//!
//! - [`OsFilesystem`] - Backed by the operating system
//! - [`InMemoryFilesystem`] - For testing and ephemeral stores
//!
//! ## Example
//!
//! ```rust
//! use std::io::Write;
//! use std::path::Path;
//! use tcpmon_storage::{Filesystem, InMemoryFilesystem};
//!
//! let fs = InMemoryFilesystem::new();
//! fs.create_dir_all(Path::new("/data")).unwrap();
//!
//! let mut file = fs.create(Path::new("/data/a")).unwrap();
//! file.write_all(b"hello world").unwrap();
//!
//! let reader = fs.open(Path::new("/data/a")).unwrap();
//! assert_eq!(reader.read_at(6, 5).unwrap(), b"world");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;

pub use backend::{DirLock, FileReader, FileStat, Filesystem, ReadableFile, WritableFile};
pub use error::{StorageError, StorageResult};
pub use file::OsFilesystem;
pub use memory::{BytesFile, InMemoryFilesystem};
