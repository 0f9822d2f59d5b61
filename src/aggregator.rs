//! Per-window sample buffer and the shared active-window handle
//!
//! An `Aggregator` buffers every sample accepted during one flush window.
//! Folding consumes it, so a window can never fold twice. The
//! `WindowHandle` is the single piece of state shared between the
//! ingestion tasks and the flush scheduler; its lock is held only for an
//! append or a buffer swap, never for a fold.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::metric::{
    fold_counters, fold_keyvalues, fold_timers, FoldSettings, MetricKind, Point, Sample,
};

/// Append-only sample buffer for exactly one flush window
pub struct Aggregator {
    samples: Vec<Sample>,
    settings: FoldSettings,
}

impl Aggregator {
    pub fn new(settings: FoldSettings) -> Self {
        Aggregator {
            samples: Vec::new(),
            settings,
        }
    }

    /// Append a batch of samples to the buffer.
    pub fn add_metrics<I>(&mut self, samples: I)
    where
        I: IntoIterator<Item = Sample>,
    {
        self.samples.extend(samples);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Reduce the whole buffer to output points, partitioned by kind and
    /// folded with the settings captured at construction. Consumes the
    /// window: each buffer folds at most once.
    pub fn fold(self, now: u64) -> Vec<Point> {
        let mut counters = Vec::new();
        let mut timers = Vec::new();
        let mut keyvalues = Vec::new();
        for sample in self.samples {
            match sample.kind {
                MetricKind::Counter => counters.push(sample),
                MetricKind::Timer => timers.push(sample),
                MetricKind::KeyValue => keyvalues.push(sample),
            }
        }

        let mut points = fold_counters(&counters, now);
        points.extend(fold_timers(&timers, now, self.settings.timer_percentile));
        points.extend(fold_keyvalues(&keyvalues, now));
        points
    }
}

/// Cloneable handle to the currently active window.
///
/// Collectors append to whatever aggregator the handle holds at that
/// instant; the flush scheduler swaps in a fresh one per tick. The swap is
/// a single `mem::replace` under the lock, so every append lands strictly
/// before or strictly after it.
#[derive(Clone)]
pub struct WindowHandle {
    slot: Arc<Mutex<Aggregator>>,
}

impl WindowHandle {
    pub fn new(settings: FoldSettings) -> Self {
        WindowHandle {
            slot: Arc::new(Mutex::new(Aggregator::new(settings))),
        }
    }

    /// Append samples to the active window.
    pub fn append<I>(&self, samples: I)
    where
        I: IntoIterator<Item = Sample>,
    {
        self.slot.lock().add_metrics(samples);
    }

    /// Replace the active window with `fresh`, returning the detached
    /// window for folding.
    pub fn swap(&self, fresh: Aggregator) -> Aggregator {
        std::mem::replace(&mut *self.slot.lock(), fresh)
    }

    /// Number of samples buffered in the active window.
    pub fn pending(&self) -> usize {
        self.slot.lock().len()
    }
}
