//! Network front-ends
//!
//! UDP and TCP share one ingestion contract: bytes off the wire are split
//! into lines, each line parses independently, and accepted samples are
//! appended to whatever aggregator the shared `WindowHandle` holds at that
//! instant. A bad line is logged and skipped; it never aborts its packet,
//! its connection, or the listener.

mod tcp;
mod udp;

pub use tcp::TcpCollector;
pub use udp::UdpCollector;

use memchr::memchr_iter;
use tracing::warn;

use crate::aggregator::WindowHandle;
use crate::metric::Sample;
use crate::parser::parse_line;
use crate::stats::DaemonStats;

/// Split a packet into newline-separated lines and append every sample
/// that parses. The whole packet lands in one window: a single lock
/// acquisition covers the batch.
pub(crate) fn ingest_packet(data: &[u8], window: &WindowHandle, stats: &DaemonStats) {
    let mut samples = Vec::new();
    let mut start = 0;
    for newline in memchr_iter(b'\n', data) {
        if let Some(sample) = parse_wire_line(&data[start..newline], stats) {
            samples.push(sample);
        }
        start = newline + 1;
    }
    if start < data.len() {
        if let Some(sample) = parse_wire_line(&data[start..], stats) {
            samples.push(sample);
        }
    }

    if !samples.is_empty() {
        window.append(samples);
    }
}

/// Parse one raw line, counting and logging rejects. Blank lines are
/// ignored without counting.
pub(crate) fn parse_wire_line(raw: &[u8], stats: &DaemonStats) -> Option<Sample> {
    let raw = match raw.last() {
        Some(b'\r') => &raw[..raw.len() - 1],
        _ => raw,
    };
    if raw.is_empty() {
        return None;
    }

    let text = match std::str::from_utf8(raw) {
        Ok(text) => text,
        Err(_) => {
            stats.record_rejected();
            warn!("dropped non-utf8 metric line");
            return None;
        }
    };

    match parse_line(text) {
        Ok(sample) => {
            stats.record_accepted(1);
            Some(sample)
        }
        Err(e) => {
            stats.record_rejected();
            warn!(line = %text, error = %e, "dropped unparsable metric line");
            None
        }
    }
}
