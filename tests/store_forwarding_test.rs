//! Store Forwarding Tests
//!
//! The Graphite sink must serialize each batch as one write on a
//! persistent connection, reconnect on failure, and give up after the
//! bounded attempt budget with the batch dropped, never re-queued.

use std::sync::Arc;

use tokio::io::AsyncReadExt;
use tokio::net::TcpListener;

use metricd::aggregator::Aggregator;
use metricd::flusher::flush_window;
use metricd::metric::{FoldSettings, MetricKind, Point, Sample};
use metricd::sink::{GraphiteSink, Sink, SinkError};
use metricd::stats::shared_stats;

fn pt(name: &str, value: f64, timestamp: u64) -> Point {
    Point {
        name: name.to_string(),
        value,
        timestamp,
    }
}

#[tokio::test]
async fn test_batch_serialized_as_single_write() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let expected = "stats.counts.foo 3 1700000000\nstats.timers.bar.mean 15.5 1700000000\n";
    let reader = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut buf = vec![0u8; expected.len()];
        stream.read_exact(&mut buf).await.unwrap();
        String::from_utf8(buf).unwrap()
    });

    let sink = GraphiteSink::new(addr.to_string(), "stats", 3);
    let batch = vec![
        pt("counts.foo", 3.0, 1700000000),
        pt("timers.bar.mean", 15.5, 1700000000),
    ];
    sink.deliver(&batch).await.unwrap();

    assert_eq!(reader.await.unwrap(), expected);
    assert_eq!(sink.failed_attempts(), 0);
}

#[tokio::test]
async fn test_connection_persists_across_batches() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let first = "stats.a 1 10\n";
    let second = "stats.b 2 20\n";
    let reader = tokio::spawn(async move {
        // One accept serves both deliveries.
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut buf = vec![0u8; first.len() + second.len()];
        stream.read_exact(&mut buf).await.unwrap();
        String::from_utf8(buf).unwrap()
    });

    let sink = GraphiteSink::new(addr.to_string(), "stats", 3);
    sink.deliver(&[pt("a", 1.0, 10)]).await.unwrap();
    sink.deliver(&[pt("b", 2.0, 20)]).await.unwrap();

    assert_eq!(reader.await.unwrap(), format!("{}{}", first, second));
}

#[tokio::test]
async fn test_retry_budget_exhausts_then_drops() {
    // Reserve a port, then close it so every connect is refused.
    let reserved = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = reserved.local_addr().unwrap();
    drop(reserved);

    let sink = GraphiteSink::new(addr.to_string(), "stats", 4);
    let err = sink.deliver(&[pt("a", 1.0, 0)]).await.unwrap_err();

    match err {
        SinkError::Exhausted { attempts } => assert_eq!(attempts, 4),
        other => panic!("unexpected error: {}", other),
    }
    assert_eq!(sink.failed_attempts(), 4);
}

/// Sink double that refuses every batch.
struct RejectingSink;

impl Sink for RejectingSink {
    fn deliver<'a>(
        &'a self,
        _batch: &'a [Point],
    ) -> std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<(), SinkError>> + Send + 'a>,
    > {
        Box::pin(async { Err(SinkError::Rejected("down for the test".to_string())) })
    }
}

#[tokio::test]
async fn test_failed_delivery_drops_batch_without_requeue() {
    let stats = shared_stats();
    let sink = Arc::new(RejectingSink);

    let mut window = Aggregator::new(FoldSettings::default());
    window.add_metrics(vec![Sample {
        key: "x".to_string(),
        value: 1.0,
        kind: MetricKind::Counter,
        flag: None,
    }]);

    flush_window(window, sink, stats.clone()).await;

    assert_eq!(stats.batches_dropped(), 1);
    assert_eq!(stats.windows_flushed(), 0);
}
