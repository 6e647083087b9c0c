//! Property-based test generators using proptest.
//!
//! Provides strategies for metrics, payloads and timestamp sequences.

use chrono::{TimeZone, Utc};
use proptest::prelude::*;
use std::collections::BTreeMap;
use tcpmon_codec::{Metric, NetstatMetric, NicMetric, TcpMetric, Timestamp};

/// Seconds between 2001 and 2100, well inside the renderable range.
const MIN_SECS: i64 = 1_000_000_000;
const MAX_SECS: i64 = 4_102_444_800;

/// Strategy for sample timestamps with nanosecond precision.
pub fn timestamp_strategy() -> impl Strategy<Value = Timestamp> {
    (MIN_SECS..MAX_SECS, 0u32..1_000_000_000).prop_map(|(secs, nanos)| {
        Utc.timestamp_opt(secs, nanos)
            .single()
            .expect("timestamp in range")
    })
}

/// Strategy for `host:port` style addresses.
pub fn address_strategy() -> impl Strategy<Value = String> {
    (any::<[u8; 4]>(), any::<u16>())
        .prop_map(|([a, b, c, d], port)| format!("{a}.{b}.{c}.{d}:{port}"))
}

/// Strategy for socket samples.
pub fn tcp_metric_strategy() -> impl Strategy<Value = TcpMetric> {
    (
        timestamp_strategy(),
        address_strategy(),
        address_strategy(),
        prop::sample::select(vec!["ESTAB", "SYN-SENT", "TIME-WAIT", "CLOSE-WAIT"]),
        any::<[u32; 6]>(),
        0.0f64..10_000.0,
    )
        .prop_map(|(timestamp, local, peer, state, counters, rtt_ms)| {
            let [recv_q, send_q, retrans, cwnd, bytes_acked, bytes_received] = counters;
            TcpMetric {
                timestamp,
                local,
                peer,
                state: state.to_string(),
                recv_q: recv_q.into(),
                send_q: send_q.into(),
                rtt_ms,
                retrans: retrans.into(),
                cwnd: cwnd.into(),
                bytes_acked: bytes_acked.into(),
                bytes_received: bytes_received.into(),
            }
        })
}

/// Strategy for interface samples.
pub fn nic_metric_strategy() -> impl Strategy<Value = NicMetric> {
    (
        timestamp_strategy(),
        prop::string::string_regex("(eth|ens|wlan|lo)[0-9]{0,2}").expect("Invalid regex"),
        any::<[u64; 8]>(),
    )
        .prop_map(|(timestamp, interface, c)| NicMetric {
            timestamp,
            interface,
            rx_bytes: c[0],
            tx_bytes: c[1],
            rx_packets: c[2],
            tx_packets: c[3],
            rx_errors: c[4],
            tx_errors: c[5],
            rx_dropped: c[6],
            tx_dropped: c[7],
        })
}

/// Strategy for protocol counter samples.
pub fn netstat_metric_strategy() -> impl Strategy<Value = NetstatMetric> {
    (
        timestamp_strategy(),
        prop::collection::btree_map(
            prop::string::string_regex("(Tcp|TcpExt|Udp|Ip)\\.[A-Z][A-Za-z]{2,16}")
                .expect("Invalid regex"),
            any::<i64>(),
            0..12,
        ),
    )
        .prop_map(|(timestamp, counters): (Timestamp, BTreeMap<String, i64>)| NetstatMetric {
            timestamp,
            counters,
        })
}

/// Strategy for metrics of any kind.
pub fn metric_strategy() -> impl Strategy<Value = Metric> {
    prop_oneof![
        tcp_metric_strategy().prop_map(Metric::Tcp),
        nic_metric_strategy().prop_map(Metric::Nic),
        netstat_metric_strategy().prop_map(Metric::Netstat),
    ]
}

/// Strategy for opaque record payloads, including empty ones.
pub fn payload_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..512)
}

/// Strategy for a batch of payloads.
pub fn payload_batch_strategy(max: usize) -> impl Strategy<Value = Vec<Vec<u8>>> {
    prop::collection::vec(payload_strategy(), 0..max)
}

/// Strategy for a batch of interface samples with increasing timestamps,
/// one second apart starting at a random time.
pub fn ordered_metrics_strategy(max: usize) -> impl Strategy<Value = Vec<Metric>> {
    (MIN_SECS..MIN_SECS * 2, 1..max).prop_map(|(start, len)| {
        (0..len as i64)
            .map(|i| {
                Metric::Nic(NicMetric {
                    timestamp: Utc
                        .timestamp_opt(start + i, 0)
                        .single()
                        .expect("timestamp in range"),
                    interface: "eth0".into(),
                    rx_bytes: i.unsigned_abs(),
                    ..NicMetric::default()
                })
            })
            .collect()
    })
}
