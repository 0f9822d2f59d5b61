//! Daemon self-telemetry counters
//!
//! Lightweight atomics about the daemon itself: ingestion acceptance,
//! flush activity, dropped batches. Failures in the pipeline surface only
//! through logs and these counters.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Default)]
pub struct DaemonStats {
    lines_accepted: AtomicU64,
    lines_rejected: AtomicU64,
    windows_flushed: AtomicU64,
    points_emitted: AtomicU64,
    batches_dropped: AtomicU64,
}

impl DaemonStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_accepted(&self, n: u64) {
        self.lines_accepted.fetch_add(n, Ordering::Relaxed);
    }

    pub fn record_rejected(&self) {
        self.lines_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_flush(&self, points: u64) {
        self.windows_flushed.fetch_add(1, Ordering::Relaxed);
        self.points_emitted.fetch_add(points, Ordering::Relaxed);
    }

    pub fn record_dropped_batch(&self) {
        self.batches_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn lines_accepted(&self) -> u64 {
        self.lines_accepted.load(Ordering::Relaxed)
    }

    pub fn lines_rejected(&self) -> u64 {
        self.lines_rejected.load(Ordering::Relaxed)
    }

    pub fn windows_flushed(&self) -> u64 {
        self.windows_flushed.load(Ordering::Relaxed)
    }

    pub fn points_emitted(&self) -> u64 {
        self.points_emitted.load(Ordering::Relaxed)
    }

    pub fn batches_dropped(&self) -> u64 {
        self.batches_dropped.load(Ordering::Relaxed)
    }
}

/// Shared handle passed to collectors and the flusher
pub type SharedStats = Arc<DaemonStats>;

pub fn shared_stats() -> SharedStats {
    Arc::new(DaemonStats::new())
}
