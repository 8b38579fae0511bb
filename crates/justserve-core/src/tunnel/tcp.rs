//! Raw TCP forwarder.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};

/// Pause after a failed accept before trying again.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(50);

/// Accepts connections on an ephemeral port and pipes each one to
/// `localhost:<target_port>`.
#[derive(Debug)]
pub struct TcpForwarder {
    local_addr: SocketAddr,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl TcpForwarder {
    /// Bind `bind` and start forwarding to `target_port`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BindFailed`] if the listener cannot be bound.
    pub async fn start(bind: SocketAddr, target_port: u16) -> Result<Self> {
        let listener = TcpListener::bind(bind)
            .await
            .map_err(|e| Error::BindFailed {
                addr: bind,
                reason: e.to_string(),
            })?;
        let local_addr = listener.local_addr()?;
        let cancel = CancellationToken::new();

        let handle = tokio::spawn(accept_loop(listener, target_port, cancel.clone()));
        tracing::info!("Forwarding {} to localhost:{}", local_addr, target_port);

        Ok(Self {
            local_addr,
            cancel,
            handle,
        })
    }

    /// Address inbound peers connect to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting and close the listener.
    ///
    /// Connections already being piped run until either side closes.
    pub async fn stop(self) {
        self.cancel.cancel();
        if let Err(e) = self.handle.await {
            tracing::warn!("Forwarder task ended abnormally: {}", e);
        }
        tracing::info!("Stopped forwarding {}", self.local_addr);
    }
}

async fn accept_loop(listener: TcpListener, target_port: u16, cancel: CancellationToken) {
    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((inbound, peer)) => {
                    tracing::debug!("Forwarding connection from {}", peer);
                    tokio::spawn(pipe(inbound, target_port));
                }
                Err(e) => {
                    tracing::warn!("Accept failed: {}", e);
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
            },
        }
    }
}

async fn pipe(mut inbound: TcpStream, target_port: u16) {
    let mut outbound = match TcpStream::connect(("localhost", target_port)).await {
        Ok(stream) => stream,
        Err(e) => {
            tracing::warn!("Failed to reach localhost:{}: {}", target_port, e);
            return;
        }
    };

    match tokio::io::copy_bidirectional(&mut inbound, &mut outbound).await {
        Ok((up, down)) => tracing::debug!("Connection closed ({} bytes up, {} down)", up, down),
        Err(e) => tracing::debug!("Connection ended: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    use super::*;

    async fn echo_server() -> (u16, JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let handle = tokio::spawn(async move {
            loop {
                let Ok((mut stream, _)) = listener.accept().await else {
                    break;
                };
                tokio::spawn(async move {
                    let (mut reader, mut writer) = stream.split();
                    let _ = tokio::io::copy(&mut reader, &mut writer).await;
                });
            }
        });
        (port, handle)
    }

    #[tokio::test]
    async fn test_forwards_bytes_both_ways() {
        let (port, echo) = echo_server().await;
        let forwarder = TcpForwarder::start("127.0.0.1:0".parse().unwrap(), port)
            .await
            .unwrap();

        let mut first = TcpStream::connect(forwarder.local_addr()).await.unwrap();
        let mut second = TcpStream::connect(forwarder.local_addr()).await.unwrap();

        first.write_all(b"ping").await.unwrap();
        second.write_all(b"pong!").await.unwrap();

        let mut buf = [0u8; 4];
        first.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");

        let mut buf = [0u8; 5];
        second.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"pong!");

        drop(first);
        second.write_all(b"more").await.unwrap();
        let mut buf = [0u8; 4];
        second.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"more");

        forwarder.stop().await;
        echo.abort();
    }

    #[tokio::test]
    async fn test_stop_closes_listener() {
        let (port, echo) = echo_server().await;
        let forwarder = TcpForwarder::start("127.0.0.1:0".parse().unwrap(), port)
            .await
            .unwrap();
        let addr = forwarder.local_addr();

        forwarder.stop().await;
        assert!(TcpStream::connect(addr).await.is_err());
        echo.abort();
    }
}
