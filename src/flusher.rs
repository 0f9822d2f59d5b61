//! Flush scheduler
//!
//! Owns the repeating flush timer and the active-window swap. Per tick, a
//! fresh aggregator replaces the shared one and the detached window is
//! handed to its own worker task, so folding and store writes never block
//! the ingestion path. Successive window flushes may complete out of
//! order; each window folds exactly once.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::sync::Notify;
use tracing::{debug, error, info};

use crate::aggregator::{Aggregator, WindowHandle};
use crate::metric::FoldSettings;
use crate::sink::Sink;
use crate::stats::SharedStats;

pub struct Flusher {
    window: WindowHandle,
    sink: Arc<dyn Sink>,
    settings: FoldSettings,
    interval: Duration,
    stats: SharedStats,
    shutdown: Arc<Notify>,
}

/// Handle for stopping the flush scheduler
pub struct FlusherHandle {
    shutdown: Arc<Notify>,
}

impl FlusherHandle {
    /// Stop the timer. The current buffer is drained with one final flush;
    /// in-flight workers finish, no new windows start.
    pub fn shutdown(&self) {
        self.shutdown.notify_one();
    }
}

impl Flusher {
    pub fn new(
        window: WindowHandle,
        sink: Arc<dyn Sink>,
        settings: FoldSettings,
        interval: Duration,
        stats: SharedStats,
    ) -> (Self, FlusherHandle) {
        let shutdown = Arc::new(Notify::new());
        let handle = FlusherHandle {
            shutdown: shutdown.clone(),
        };
        let flusher = Flusher {
            window,
            sink,
            settings,
            interval,
            stats,
            shutdown,
        };
        (flusher, handle)
    }

    pub async fn run(self) {
        let mut tick = tokio::time::interval(self.interval);
        // The first tick completes immediately; consume it so the first
        // window gets a full interval.
        tick.tick().await;

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    let detached = self.window.swap(Aggregator::new(self.settings));
                    let sink = self.sink.clone();
                    let stats = self.stats.clone();
                    tokio::spawn(async move {
                        flush_window(detached, sink, stats).await;
                    });
                }
                _ = self.shutdown.notified() => {
                    let detached = self.window.swap(Aggregator::new(self.settings));
                    flush_window(detached, self.sink.clone(), self.stats.clone()).await;
                    info!("flush scheduler stopped");
                    break;
                }
            }
        }
    }
}

/// Fold one detached window and deliver its points. Nothing here may
/// propagate: a panicking fold or a dead store only costs this window's
/// output.
pub async fn flush_window(window: Aggregator, sink: Arc<dyn Sink>, stats: SharedStats) {
    let now = epoch_secs();
    let samples = window.len();

    let points = match catch_unwind(AssertUnwindSafe(|| window.fold(now))) {
        Ok(points) => points,
        Err(_) => {
            error!(samples, "fold panicked; discarding window output");
            return;
        }
    };

    if points.is_empty() {
        stats.record_flush(0);
        debug!("empty window, nothing to forward");
        return;
    }

    match sink.deliver(&points).await {
        Ok(()) => {
            stats.record_flush(points.len() as u64);
            debug!(samples, points = points.len(), "window flushed");
        }
        Err(e) => {
            stats.record_dropped_batch();
            error!(points = points.len(), error = %e, "window delivery failed; batch dropped");
        }
    }
}

fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
