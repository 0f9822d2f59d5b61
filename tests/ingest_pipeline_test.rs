//! End-to-End Ingestion Pipeline Tests
//!
//! Drives the real network front-ends: wire bytes in over UDP/TCP, a
//! window swap, a fold, and a recording sink on the far side.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::io::AsyncWriteExt;

use metricd::aggregator::{Aggregator, WindowHandle};
use metricd::collector::{TcpCollector, UdpCollector};
use metricd::flusher::{flush_window, Flusher};
use metricd::liveness::LivenessResponder;
use metricd::metric::FoldSettings;
use metricd::sink::RecordingSink;
use metricd::stats::{shared_stats, SharedStats};

/// Poll until the active window holds at least `n` samples.
async fn wait_for_pending(window: &WindowHandle, n: usize) {
    for _ in 0..200 {
        if window.pending() >= n {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!(
        "timed out waiting for {} samples, have {}",
        n,
        window.pending()
    );
}

async fn fold_active(window: &WindowHandle, stats: &SharedStats) -> Arc<RecordingSink> {
    let sink = Arc::new(RecordingSink::new());
    let detached = window.swap(Aggregator::new(FoldSettings::default()));
    flush_window(detached, sink.clone(), stats.clone()).await;
    sink
}

#[tokio::test]
async fn test_udp_datagram_with_mixed_lines() {
    let window = WindowHandle::new(FoldSettings::default());
    let stats = shared_stats();

    let udp = UdpCollector::bind("127.0.0.1:0", window.clone(), stats.clone())
        .await
        .unwrap();
    let addr = udp.local_addr().unwrap();
    tokio::spawn(udp.run());

    let client = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
    client
        .send_to(b"foo:1|c\nthis is garbage\nfoo:2|c\nbar:10|ms\n\n", addr)
        .await
        .unwrap();

    wait_for_pending(&window, 3).await;
    assert_eq!(stats.lines_accepted(), 3);
    assert_eq!(stats.lines_rejected(), 1);

    let sink = fold_active(&window, &stats).await;
    assert_eq!(sink.points_named("counts.foo")[0].value, 3.0);
    assert_eq!(sink.points_named("timers.bar.count")[0].value, 1.0);
}

#[tokio::test]
async fn test_tcp_line_stream() {
    let window = WindowHandle::new(FoldSettings::default());
    let stats = shared_stats();

    let tcp = TcpCollector::bind(
        "127.0.0.1:0",
        window.clone(),
        stats.clone(),
        Duration::from_secs(5),
    )
    .await
    .unwrap();
    let addr = tcp.local_addr().unwrap();
    tokio::spawn(tcp.run());

    let mut client = tokio::net::TcpStream::connect(addr).await.unwrap();
    client
        .write_all(b"baz:5|kv|@1000\nnot-a-line\nreq:3|c|@0.5\n")
        .await
        .unwrap();
    client.shutdown().await.unwrap();

    wait_for_pending(&window, 2).await;
    assert_eq!(stats.lines_rejected(), 1);

    let sink = fold_active(&window, &stats).await;
    let kv = sink.points_named("kv.baz");
    assert_eq!(kv[0].value, 5.0);
    assert_eq!(kv[0].timestamp, 1000);
    assert_eq!(sink.points_named("counts.req")[0].value, 1.5);
}

#[tokio::test]
async fn test_tcp_bad_connection_does_not_stop_listener() {
    let window = WindowHandle::new(FoldSettings::default());
    let stats = shared_stats();

    let tcp = TcpCollector::bind(
        "127.0.0.1:0",
        window.clone(),
        stats.clone(),
        Duration::from_secs(5),
    )
    .await
    .unwrap();
    let addr = tcp.local_addr().unwrap();
    tokio::spawn(tcp.run());

    // First peer sends an oversized line and gets its connection dropped.
    let mut bad = tokio::net::TcpStream::connect(addr).await.unwrap();
    let oversized = vec![b'x'; 10_000];
    bad.write_all(&oversized).await.unwrap();
    bad.write_all(b"\n").await.unwrap();
    drop(bad);

    // The listener must still serve the next peer.
    let mut good = tokio::net::TcpStream::connect(addr).await.unwrap();
    good.write_all(b"ok:1|c\n").await.unwrap();
    good.shutdown().await.unwrap();

    wait_for_pending(&window, 1).await;
    assert_eq!(stats.lines_accepted(), 1);
}

#[tokio::test]
async fn test_flusher_driven_pipeline() {
    let window = WindowHandle::new(FoldSettings::default());
    let stats = shared_stats();
    let sink = Arc::new(RecordingSink::new());

    let udp = UdpCollector::bind("127.0.0.1:0", window.clone(), stats.clone())
        .await
        .unwrap();
    let addr = udp.local_addr().unwrap();
    tokio::spawn(udp.run());

    let (flusher, handle) = Flusher::new(
        window.clone(),
        sink.clone(),
        FoldSettings::default(),
        Duration::from_millis(100),
        stats.clone(),
    );
    let flush_task = tokio::spawn(flusher.run());

    let client = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
    client.send_to(b"hits:7|c\n", addr).await.unwrap();

    wait_for_pending(&window, 1).await;
    tokio::time::sleep(Duration::from_millis(250)).await;

    handle.shutdown();
    flush_task.await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let hits = sink.points_named("counts.hits");
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].value, 7.0);
    assert!(stats.windows_flushed() >= 1);
}

#[tokio::test]
async fn test_liveness_responder_replies_yes() {
    let liveness = LivenessResponder::bind("127.0.0.1:0").await.unwrap();
    let addr = liveness.local_addr().unwrap();
    tokio::spawn(liveness.run());

    let mut client = tokio::net::TcpStream::connect(addr).await.unwrap();
    client.write_all(b"anything at all").await.unwrap();

    let mut reply = [0u8; 3];
    client.read_exact(&mut reply).await.unwrap();
    assert_eq!(&reply, b"YES");
}
