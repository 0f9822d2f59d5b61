//! Metric records and per-kind fold algorithms
//!
//! A window's samples reduce to summary points once, at flush time:
//!
//! - **Counter**: per-key sum of `value * sample_rate`
//! - **Timer**: per-key order statistics over the sorted values, plus the
//!   same statistics over a centered inner percentile window
//! - **KeyValue**: pass-through, one point per sample at its own timestamp
//!
//! Folds are pure over `(samples, reference timestamp, settings)`: they do
//! not mutate their inputs and treat the sample list as complete.

use ahash::AHashMap;

/// Closed set of wire metric kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricKind {
    Counter,
    Timer,
    KeyValue,
}

/// One parsed wire sample. Immutable after parsing; owned by exactly one
/// window's aggregator.
///
/// `flag` is kind-specific: the sample rate for counters, a timestamp
/// override for key/value pairs, unused for timers.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub key: String,
    pub value: f64,
    pub kind: MetricKind,
    pub flag: Option<f64>,
}

/// One folded output point, ready for the downstream store
#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    pub name: String,
    pub value: f64,
    pub timestamp: u64,
}

/// Per-kind settings applied uniformly to every fold of one window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FoldSettings {
    pub timer_percentile: u8,
}

impl Default for FoldSettings {
    fn default() -> Self {
        FoldSettings {
            timer_percentile: 90,
        }
    }
}

/// Sum counters per key. The sample rate multiplies the value, so an
/// under-sampled count is scaled down, not extrapolated up.
pub fn fold_counters(samples: &[Sample], now: u64) -> Vec<Point> {
    let mut sums: AHashMap<&str, f64> = AHashMap::new();
    for sample in samples {
        let rate = sample.flag.unwrap_or(1.0);
        *sums.entry(sample.key.as_str()).or_insert(0.0) += sample.value * rate;
    }

    sums.into_iter()
        .map(|(key, value)| Point {
            name: format!("counts.{}", key),
            value,
            timestamp: now,
        })
        .collect()
}

/// Fold timers per key into twelve points: six statistics over the full
/// sorted value list and the same six over the inner percentile window.
pub fn fold_timers(samples: &[Sample], now: u64, percentile: u8) -> Vec<Point> {
    let mut series: AHashMap<&str, Vec<f64>> = AHashMap::new();
    for sample in samples {
        series
            .entry(sample.key.as_str())
            .or_default()
            .push(sample.value);
    }

    let mut points = Vec::with_capacity(series.len() * 12);
    for (key, mut values) in series {
        values.sort_by(f64::total_cmp);
        let count = values.len();
        let sum: f64 = values.iter().sum();
        let mean = sum / count as f64;
        let lower = values[0];
        let upper = values[count - 1];
        let stdev = sample_stdev(&values, mean);

        let windowed = if count == 1 {
            // A single sample is its own window
            WindowedStats {
                sum,
                mean,
                lower,
                upper,
                count: 1,
                stdev: 0.0,
            }
        } else {
            let inner_count = count * percentile as usize / 100;
            let lower_idx = (count - inner_count) / 2;
            let upper_idx = lower_idx + inner_count;
            let slice = &values[lower_idx..upper_idx];
            let w_sum: f64 = slice.iter().sum();
            let w_mean = if inner_count == 0 {
                w_sum
            } else {
                w_sum / inner_count as f64
            };
            WindowedStats {
                sum: w_sum,
                mean: w_mean,
                lower: values[lower_idx],
                // upper_idx == count only at percentile 100; clamp to the max
                upper: values[upper_idx.min(count - 1)],
                count: inner_count,
                stdev: sample_stdev(slice, w_mean),
            }
        };

        let mut push = |suffix: String, value: f64| {
            points.push(Point {
                name: format!("timers.{}.{}", key, suffix),
                value,
                timestamp: now,
            });
        };
        push("sum".to_string(), sum);
        push("mean".to_string(), mean);
        push("lower".to_string(), lower);
        push("upper".to_string(), upper);
        push("count".to_string(), count as f64);
        push("stdev".to_string(), stdev);
        push(format!("sum_{}", percentile), windowed.sum);
        push(format!("mean_{}", percentile), windowed.mean);
        push(format!("lower_{}", percentile), windowed.lower);
        push(format!("upper_{}", percentile), windowed.upper);
        push(format!("count_{}", percentile), windowed.count as f64);
        push(format!("stdev_{}", percentile), windowed.stdev);
    }
    points
}

/// Key/value samples are never aggregated: one point per sample, at the
/// sample's own captured timestamp when present.
pub fn fold_keyvalues(samples: &[Sample], now: u64) -> Vec<Point> {
    samples
        .iter()
        .map(|sample| Point {
            name: format!("kv.{}", sample.key),
            value: sample.value,
            timestamp: sample.flag.map(|f| f as u64).unwrap_or(now),
        })
        .collect()
}

struct WindowedStats {
    sum: f64,
    mean: f64,
    lower: f64,
    upper: f64,
    count: usize,
    stdev: f64,
}

// Sample standard deviation: N-1 divisor, 0 below two values.
fn sample_stdev(values: &[f64], mean: f64) -> f64 {
    let n = values.len();
    if n < 2 {
        return 0.0;
    }
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
    variance.sqrt()
}
