use std::net::SocketAddr;
use std::time::Duration;

use futures::StreamExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_util::codec::{FramedRead, LinesCodec};
use tracing::{debug, error, info, warn};

use super::parse_wire_line;
use crate::aggregator::WindowHandle;
use crate::stats::SharedStats;

const MAX_LINE_LEN: usize = 8192;

/// TCP ingestion front-end: one handling task per connection, each read as
/// a line stream until EOF, an error, or an idle timeout.
pub struct TcpCollector {
    listener: TcpListener,
    window: WindowHandle,
    stats: SharedStats,
    read_timeout: Duration,
}

impl TcpCollector {
    pub async fn bind(
        addr: &str,
        window: WindowHandle,
        stats: SharedStats,
        read_timeout: Duration,
    ) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        info!("tcp collector listening on {}", listener.local_addr()?);
        Ok(TcpCollector {
            listener,
            window,
            stats,
            read_timeout,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub async fn run(self) {
        loop {
            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    let handler = ConnectionHandler {
                        stream,
                        peer: addr.to_string(),
                        window: self.window.clone(),
                        stats: self.stats.clone(),
                        read_timeout: self.read_timeout,
                    };
                    tokio::spawn(handler.run());
                }
                Err(e) => {
                    error!("failed to accept metrics connection: {}", e);
                }
            }
        }
    }
}

struct ConnectionHandler {
    stream: TcpStream,
    peer: String,
    window: WindowHandle,
    stats: SharedStats,
    read_timeout: Duration,
}

impl ConnectionHandler {
    async fn run(self) {
        debug!("metrics client connected: {}", self.peer);

        let mut lines = FramedRead::new(
            self.stream,
            LinesCodec::new_with_max_length(MAX_LINE_LEN),
        );
        loop {
            match timeout(self.read_timeout, lines.next()).await {
                Err(_) => {
                    info!("idle metrics connection timed out: {}", self.peer);
                    break;
                }
                Ok(None) => {
                    debug!("metrics client disconnected: {}", self.peer);
                    break;
                }
                Ok(Some(Ok(line))) => {
                    if let Some(sample) = parse_wire_line(line.as_bytes(), &self.stats) {
                        self.window.append([sample]);
                    }
                }
                Ok(Some(Err(e))) => {
                    warn!("error reading from {}: {}", self.peer, e);
                    break;
                }
            }
        }
    }
}
