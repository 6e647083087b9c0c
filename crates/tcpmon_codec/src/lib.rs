//! # tcpmon Codec
//!
//! Encoding and rendering of the metric payloads stored by tcpmon.
//!
//! Collectors sample sockets (`ss`), interfaces (`ifconfig`) and protocol
//! counters (`/proc/net/netstat`) and hand the store an opaque byte payload.
//! This crate defines what that payload is: a CBOR-encoded [`Metric`],
//! a tagged union with one variant per collector.
//!
//! On the export side, [`Renderer`] implementations turn a decoded metric
//! into output lines tagged with the originating host.
//!
//! ## Usage
//!
//! ```
//! use chrono::{TimeZone, Utc};
//! use tcpmon_codec::{LineProtocol, Metric, NicMetric, Renderer};
//!
//! let metric = Metric::Nic(NicMetric {
//!     timestamp: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
//!     interface: "eth0".into(),
//!     ..NicMetric::default()
//! });
//!
//! let bytes = metric.encode().unwrap();
//! let decoded = Metric::decode(&bytes).unwrap();
//! assert_eq!(decoded, metric);
//!
//! let line = LineProtocol.render(&decoded, "web-1").unwrap();
//! assert!(line.starts_with("nic,host=web-1,interface=eth0 "));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod metric;
mod render;

pub use error::{CodecError, CodecResult};
pub use metric::{Metric, MetricKind, NetstatMetric, NicMetric, TcpMetric, Timestamp};
pub use render::{JsonLines, LineProtocol, Renderer};
