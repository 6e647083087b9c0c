//! Rendering decoded metrics for export.

use crate::error::{CodecError, CodecResult};
use crate::metric::{Metric, NetstatMetric, NicMetric, TcpMetric, Timestamp};
use serde::Serialize;
use std::fmt::Write as _;

/// Turns a decoded metric into output text.
///
/// The returned string holds zero or more complete lines, each terminated
/// by `\n`. Implementations must be shareable across export workers.
pub trait Renderer: Send + Sync {
    /// Renders `metric`, tagging it with `hostname`.
    ///
    /// # Errors
    ///
    /// Returns an error if the metric cannot be represented.
    fn render(&self, metric: &Metric, hostname: &str) -> CodecResult<String>;
}

/// InfluxDB line protocol.
///
/// ```text
/// <measurement>,host=<host>,<tags> <fields> <unix-nanos>
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct LineProtocol;

impl Renderer for LineProtocol {
    fn render(&self, metric: &Metric, hostname: &str) -> CodecResult<String> {
        let nanos = unix_nanos(metric.timestamp())?;
        let mut line = String::with_capacity(160);
        line.push_str(metric.kind().as_str());
        push_tag(&mut line, "host", hostname);

        match metric {
            Metric::Tcp(m) => render_tcp(&mut line, m),
            Metric::Nic(m) => render_nic(&mut line, m),
            Metric::Netstat(m) => {
                if m.counters.is_empty() {
                    return Ok(String::new());
                }
                render_netstat(&mut line, m);
            }
        }

        let _ = writeln!(line, " {nanos}");
        Ok(line)
    }
}

fn render_tcp(line: &mut String, m: &TcpMetric) {
    push_tag(line, "local", &m.local);
    push_tag(line, "peer", &m.peer);
    push_tag(line, "state", &m.state);
    let _ = write!(line, " recv_q={}i,send_q={}i", m.recv_q, m.send_q);
    // NaN and infinity have no line protocol spelling
    if m.rtt_ms.is_finite() {
        let _ = write!(line, ",rtt_ms={}", m.rtt_ms);
    }
    let _ = write!(
        line,
        ",retrans={}i,cwnd={}i,bytes_acked={}i,bytes_received={}i",
        m.retrans, m.cwnd, m.bytes_acked, m.bytes_received
    );
}

fn render_nic(line: &mut String, m: &NicMetric) {
    push_tag(line, "interface", &m.interface);
    let _ = write!(
        line,
        " rx_bytes={}i,tx_bytes={}i,rx_packets={}i,tx_packets={}i,rx_errors={}i,tx_errors={}i,rx_dropped={}i,tx_dropped={}i",
        m.rx_bytes,
        m.tx_bytes,
        m.rx_packets,
        m.tx_packets,
        m.rx_errors,
        m.tx_errors,
        m.rx_dropped,
        m.tx_dropped
    );
}

fn render_netstat(line: &mut String, m: &NetstatMetric) {
    let mut sep = ' ';
    for (name, value) in &m.counters {
        line.push(sep);
        push_escaped(line, name);
        let _ = write!(line, "={value}i");
        sep = ',';
    }
}

fn push_tag(line: &mut String, key: &str, value: &str) {
    if value.is_empty() {
        return;
    }
    line.push(',');
    line.push_str(key);
    line.push('=');
    push_escaped(line, value);
}

/// Escapes commas, spaces and equals signs in tag keys, tag values and
/// field keys.
fn push_escaped(line: &mut String, raw: &str) {
    for c in raw.chars() {
        if matches!(c, ',' | ' ' | '=') {
            line.push('\\');
        }
        line.push(c);
    }
}

fn unix_nanos(ts: Timestamp) -> CodecResult<i64> {
    ts.timestamp_nanos_opt()
        .ok_or_else(|| CodecError::render_failed(format!("timestamp {ts} out of range")))
}

/// One JSON object per line with the host attached.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonLines;

#[derive(Serialize)]
struct HostTagged<'a> {
    host: &'a str,
    kind: &'static str,
    #[serde(flatten)]
    metric: &'a Metric,
}

impl Renderer for JsonLines {
    fn render(&self, metric: &Metric, hostname: &str) -> CodecResult<String> {
        let tagged = HostTagged {
            host: hostname,
            kind: metric.kind().as_str(),
            metric,
        };
        let mut line = serde_json::to_string(&tagged)
            .map_err(|e| CodecError::render_failed(e.to_string()))?;
        line.push('\n');
        Ok(line)
    }
}
