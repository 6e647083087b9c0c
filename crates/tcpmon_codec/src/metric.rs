//! Metric payload types.

use crate::error::{CodecError, CodecResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Sample time carried by every metric.
pub type Timestamp = DateTime<Utc>;

/// One socket sampled from `ss`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TcpMetric {
    /// When the sample was taken.
    pub timestamp: Timestamp,
    /// Local address and port.
    pub local: String,
    /// Peer address and port.
    pub peer: String,
    /// Socket state (`ESTAB`, `TIME-WAIT`, ...).
    pub state: String,
    /// Bytes in the receive queue.
    pub recv_q: u64,
    /// Bytes in the send queue.
    pub send_q: u64,
    /// Smoothed round-trip time in milliseconds.
    pub rtt_ms: f64,
    /// Retransmitted segments.
    pub retrans: u64,
    /// Congestion window in segments.
    pub cwnd: u64,
    /// Bytes acknowledged by the peer.
    pub bytes_acked: u64,
    /// Bytes received from the peer.
    pub bytes_received: u64,
}

/// Counters for one network interface sampled from `ifconfig`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NicMetric {
    /// When the sample was taken.
    pub timestamp: Timestamp,
    /// Interface name.
    pub interface: String,
    /// Received bytes.
    pub rx_bytes: u64,
    /// Transmitted bytes.
    pub tx_bytes: u64,
    /// Received packets.
    pub rx_packets: u64,
    /// Transmitted packets.
    pub tx_packets: u64,
    /// Receive errors.
    pub rx_errors: u64,
    /// Transmit errors.
    pub tx_errors: u64,
    /// Dropped inbound packets.
    pub rx_dropped: u64,
    /// Dropped outbound packets.
    pub tx_dropped: u64,
}

/// Protocol counters sampled from `/proc/net/netstat` and `/proc/net/snmp`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetstatMetric {
    /// When the sample was taken.
    pub timestamp: Timestamp,
    /// Counters keyed as `<Section>.<Name>`, e.g. `TcpExt.ListenOverflows`.
    pub counters: BTreeMap<String, i64>,
}

/// Which collector produced a metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricKind {
    /// Socket statistics.
    Tcp,
    /// Interface statistics.
    Nic,
    /// Protocol counters.
    Netstat,
}

impl MetricKind {
    /// Returns the measurement name used when rendering.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Tcp => "tcp",
            Self::Nic => "nic",
            Self::Netstat => "netstat",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A decoded metric payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Metric {
    /// Socket statistics.
    Tcp(TcpMetric),
    /// Interface statistics.
    Nic(NicMetric),
    /// Protocol counters.
    Netstat(NetstatMetric),
}

impl Metric {
    /// Returns the collector kind.
    #[must_use]
    pub fn kind(&self) -> MetricKind {
        match self {
            Self::Tcp(_) => MetricKind::Tcp,
            Self::Nic(_) => MetricKind::Nic,
            Self::Netstat(_) => MetricKind::Netstat,
        }
    }

    /// Returns the sample time.
    #[must_use]
    pub fn timestamp(&self) -> Timestamp {
        match self {
            Self::Tcp(m) => m.timestamp,
            Self::Nic(m) => m.timestamp,
            Self::Netstat(m) => m.timestamp,
        }
    }

    /// Encodes the metric as CBOR.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn encode(&self) -> CodecResult<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(self, &mut buf)
            .map_err(|e| CodecError::encoding_failed(e.to_string()))?;
        Ok(buf)
    }

    /// Decodes a metric from CBOR bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes are not a CBOR-encoded metric.
    pub fn decode(bytes: &[u8]) -> CodecResult<Self> {
        ciborium::from_reader(bytes).map_err(|e| CodecError::decoding_failed(e.to_string()))
    }
}

impl From<TcpMetric> for Metric {
    fn from(m: TcpMetric) -> Self {
        Self::Tcp(m)
    }
}

impl From<NicMetric> for Metric {
    fn from(m: NicMetric) -> Self {
        Self::Nic(m)
    }
}

impl From<NetstatMetric> for Metric {
    fn from(m: NetstatMetric) -> Self {
        Self::Netstat(m)
    }
}
