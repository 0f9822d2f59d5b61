//! Downstream store forwarding
//!
//! `GraphiteSink` keeps one long-lived plaintext connection to the
//! downstream collector and writes each window's folded points as a single
//! batch: `<prefix>.<name> <value> <timestamp>\n` per point. Concurrent
//! deliveries (overlapping windows when flushing is slower than the
//! interval) serialize on the connection lock rather than interleaving
//! writes. A failed write drops the connection and retries with a fresh
//! one up to a bounded attempt count; exhausting the budget drops the
//! batch. There is no re-queue.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::{debug, error, warn};

use crate::metric::Point;

/// Error type for batch delivery
#[derive(Debug)]
pub enum SinkError {
    /// Every attempt in the retry budget failed; the batch was dropped
    Exhausted { attempts: u32 },
    /// The sink refused the batch outright
    Rejected(String),
}

impl std::fmt::Display for SinkError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SinkError::Exhausted { attempts } => {
                write!(f, "delivery failed after {} attempts", attempts)
            }
            SinkError::Rejected(reason) => write!(f, "delivery rejected: {}", reason),
        }
    }
}

impl std::error::Error for SinkError {}

/// Forwarding target for folded output points
pub trait Sink: Send + Sync + 'static {
    /// Deliver one window's batch. Implementations must serialize
    /// concurrent calls.
    fn deliver<'a>(
        &'a self,
        batch: &'a [Point],
    ) -> Pin<Box<dyn Future<Output = Result<(), SinkError>> + Send + 'a>>;
}

/// Persistent, auto-reconnecting Graphite-protocol store connection
pub struct GraphiteSink {
    addr: String,
    prefix: String,
    max_attempts: u32,
    conn: Mutex<Option<TcpStream>>,
    failed_attempts: AtomicU64,
}

impl GraphiteSink {
    pub fn new(addr: impl Into<String>, prefix: impl Into<String>, max_attempts: u32) -> Self {
        GraphiteSink {
            addr: addr.into(),
            prefix: prefix.into(),
            max_attempts: max_attempts.max(1),
            conn: Mutex::new(None),
            failed_attempts: AtomicU64::new(0),
        }
    }

    /// Total connect/write attempts that have failed since startup.
    pub fn failed_attempts(&self) -> u64 {
        self.failed_attempts.load(Ordering::Relaxed)
    }

    fn record_failure(&self) {
        self.failed_attempts.fetch_add(1, Ordering::Relaxed);
    }
}

impl Sink for GraphiteSink {
    fn deliver<'a>(
        &'a self,
        batch: &'a [Point],
    ) -> Pin<Box<dyn Future<Output = Result<(), SinkError>> + Send + 'a>> {
        Box::pin(async move {
            let payload = render_batch(&self.prefix, batch);

            // One lock around the whole batch: overlapping flushes
            // serialize instead of interleaving lines.
            let mut conn = self.conn.lock().await;
            for attempt in 1..=self.max_attempts {
                if conn.is_none() {
                    match TcpStream::connect(&self.addr).await {
                        Ok(stream) => *conn = Some(stream),
                        Err(e) => {
                            self.record_failure();
                            warn!(
                                attempt,
                                addr = %self.addr,
                                error = %e,
                                "store connection failed"
                            );
                            continue;
                        }
                    }
                }
                let stream = match conn.as_mut() {
                    Some(stream) => stream,
                    None => continue,
                };

                match write_payload(stream, payload.as_bytes()).await {
                    Ok(()) => {
                        debug!(points = batch.len(), bytes = payload.len(), "batch forwarded");
                        return Ok(());
                    }
                    Err(e) => {
                        self.record_failure();
                        warn!(attempt, error = %e, "store write failed; reconnecting");
                        *conn = None;
                    }
                }
            }

            error!(
                attempts = self.max_attempts,
                points = batch.len(),
                "store unreachable; dropping batch"
            );
            Err(SinkError::Exhausted {
                attempts: self.max_attempts,
            })
        })
    }
}

async fn write_payload(stream: &mut TcpStream, payload: &[u8]) -> std::io::Result<()> {
    stream.write_all(payload).await?;
    stream.flush().await
}

fn render_batch(prefix: &str, batch: &[Point]) -> String {
    let mut out = String::with_capacity(batch.len() * 48);
    for point in batch {
        out.push_str(prefix);
        out.push('.');
        out.push_str(&point.name);
        out.push(' ');
        out.push_str(&render_value(point.value));
        out.push(' ');
        out.push_str(&point.timestamp.to_string());
        out.push('\n');
    }
    out
}

// Integral values render without a fractional part.
fn render_value(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}

/// In-memory sink for tests: captures every delivered batch and counts
/// deliveries.
#[derive(Default)]
pub struct RecordingSink {
    batches: parking_lot::Mutex<Vec<Vec<Point>>>,
    deliveries: AtomicU64,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deliveries(&self) -> u64 {
        self.deliveries.load(Ordering::SeqCst)
    }

    pub fn batches(&self) -> Vec<Vec<Point>> {
        self.batches.lock().clone()
    }

    /// All captured points across batches, flattened.
    pub fn points(&self) -> Vec<Point> {
        self.batches.lock().iter().flatten().cloned().collect()
    }

    pub fn points_named(&self, name: &str) -> Vec<Point> {
        self.points().into_iter().filter(|p| p.name == name).collect()
    }
}

impl Sink for RecordingSink {
    fn deliver<'a>(
        &'a self,
        batch: &'a [Point],
    ) -> Pin<Box<dyn Future<Output = Result<(), SinkError>> + Send + 'a>> {
        Box::pin(async move {
            self.deliveries.fetch_add(1, Ordering::SeqCst);
            self.batches.lock().push(batch.to_vec());
            Ok(())
        })
    }
}
