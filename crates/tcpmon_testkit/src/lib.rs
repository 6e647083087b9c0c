//! # tcpmon Testkit
//!
//! Test utilities for the tcpmon data store.
//!
//! This crate provides:
//! - Store fixtures over an in-memory or temporary on-disk directory
//! - Sample metrics and hand-built data files
//! - Property-based generators for metrics and record payloads
//! - A fault-injecting filesystem for write, create and remove failures
//!
//! ## Usage
//!
//! ```rust,ignore
//! use tcpmon_testkit::prelude::*;
//!
//! #[test]
//! fn rotates_after_three_records() {
//!     let fixture = MemoryStore::with_max_entries(3);
//!     write_metrics(&fixture.store, 0..10);
//!     assert_eq!(fixture.reader().count().unwrap(), 10);
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod faulty;
pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::faulty::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
}

pub use faulty::*;
pub use fixtures::*;
pub use generators::*;
