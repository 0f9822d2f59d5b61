use std::net::SocketAddr;

use bytes::BytesMut;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tracing::{debug, info, warn};

use super::ingest_packet;
use crate::aggregator::WindowHandle;
use crate::stats::SharedStats;

// Largest possible UDP payload; a datagram may carry many lines.
const MAX_DATAGRAM: usize = 65535;

// Kernel receive buffer, tried largest-first to absorb bursts.
const RECV_BUFFER_SIZES: &[usize] = &[
    16 * 1024 * 1024,
    8 * 1024 * 1024,
    4 * 1024 * 1024,
    1024 * 1024,
    256 * 1024,
    64 * 1024,
];

/// UDP ingestion front-end: one socket, each datagram split into lines and
/// appended to the active window as a batch.
pub struct UdpCollector {
    socket: UdpSocket,
    window: WindowHandle,
    stats: SharedStats,
}

impl UdpCollector {
    pub async fn bind(
        addr: &str,
        window: WindowHandle,
        stats: SharedStats,
    ) -> std::io::Result<Self> {
        let addr: SocketAddr = addr
            .parse()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;

        let socket = Socket::new(Domain::for_address(addr), Type::DGRAM, Some(Protocol::UDP))?;
        let mut sized = None;
        for &size in RECV_BUFFER_SIZES {
            if socket.set_recv_buffer_size(size).is_ok() {
                sized = Some(size);
                break;
            }
        }
        match sized {
            Some(size) => debug!(size, "udp receive buffer sized"),
            None => warn!("could not enlarge udp receive buffer"),
        }
        socket.set_nonblocking(true)?;
        socket.bind(&addr.into())?;

        let socket = UdpSocket::from_std(socket.into())?;
        info!("udp collector listening on {}", socket.local_addr()?);
        Ok(UdpCollector {
            socket,
            window,
            stats,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    pub async fn run(self) {
        let mut buf = BytesMut::zeroed(MAX_DATAGRAM);
        loop {
            match self.socket.recv_from(&mut buf).await {
                Ok((n, _peer)) => {
                    ingest_packet(&buf[..n], &self.window, &self.stats);
                }
                Err(e) => {
                    warn!("udp receive error: {}", e);
                }
            }
        }
    }
}
