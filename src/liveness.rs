use std::net::SocketAddr;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info};

/// Aliveness responder: any bytes received elicit the literal reply `YES`.
pub struct LivenessResponder {
    listener: TcpListener,
}

impl LivenessResponder {
    pub async fn bind(addr: &str) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        info!("liveness responder listening on {}", listener.local_addr()?);
        Ok(LivenessResponder { listener })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub async fn run(self) {
        loop {
            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    debug!("liveness check from {}", addr);
                    tokio::spawn(respond(stream));
                }
                Err(e) => {
                    error!("failed to accept liveness connection: {}", e);
                }
            }
        }
    }
}

async fn respond(mut stream: TcpStream) {
    let mut buf = [0u8; 512];
    loop {
        match stream.read(&mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                if stream.write_all(b"YES").await.is_err() {
                    break;
                }
            }
            Err(_) => break,
        }
    }
}
