//! LAN discovery over UDP broadcast.
//!
//! A sender advertises its session as a short text frame:
//!
//! ```text
//! JUSTSERVE_P2P:<code>:<url>:<port>
//! ```
//!
//! Because the URL itself contains colons, a receiver rebuilds it from the
//! third through fifth colon-separated fields. Delivery is best effort: a
//! lost frame is simply repeated on the next tick.

use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::code::TransferCode;
use crate::error::{Error, Result};
use crate::DISCOVERY_MAGIC;

/// Largest frame we expect to receive.
const MAX_FRAME_LEN: usize = 1024;

/// One advertised session as seen by a receiver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Advertisement {
    /// Session code
    pub code: String,
    /// Base URL of the sender's session server
    pub url: String,
}

impl Advertisement {
    /// Create an advertisement for `code` served at `url`.
    pub fn new(code: &TransferCode, url: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            url: url.into(),
        }
    }

    /// Encode as a broadcast frame.
    ///
    /// The port of `url` is repeated as a trailing field.
    pub fn to_frame(&self) -> String {
        let port = self.url.rsplit(':').next().unwrap_or_default();
        format!("{DISCOVERY_MAGIC}:{}:{}:{port}", self.code, self.url)
    }

    /// Decode a received frame. Returns `None` for anything that is not a
    /// well-formed advertisement.
    pub fn parse(frame: &str) -> Option<Self> {
        let fields: Vec<&str> = frame.trim_end().split(':').collect();
        if fields.len() < 4 || fields[0] != DISCOVERY_MAGIC {
            return None;
        }

        let code = TransferCode::parse(fields[1]).ok()?;
        let url = fields[2..fields.len().min(5)].join(":");

        Some(Self {
            code: code.to_string(),
            url,
        })
    }
}

/// Periodically broadcasts one advertisement.
#[derive(Debug)]
pub struct Advertiser {
    socket: Arc<UdpSocket>,
    target: SocketAddr,
}

impl Advertiser {
    /// Open a broadcast-capable socket aimed at `target`.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BroadcastFailed`] if the socket cannot be set up.
    pub fn new(target: SocketAddr) -> Result<Self> {
        let socket = broadcast_socket().map_err(|e| Error::BroadcastFailed(e.to_string()))?;
        Ok(Self {
            socket: Arc::new(socket),
            target,
        })
    }

    /// Resolve the destination from an optional configured address.
    ///
    /// Defaults to the limited broadcast address.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if `address` is not an IP address.
    pub fn target(address: Option<&str>, port: u16) -> Result<SocketAddr> {
        let ip = match address {
            Some(addr) => addr.parse::<IpAddr>().map_err(|e| Error::InvalidConfig {
                key: "p2p.broadcast_address".to_string(),
                reason: e.to_string(),
            })?,
            None => IpAddr::V4(Ipv4Addr::BROADCAST),
        };
        Ok(SocketAddr::new(ip, port))
    }

    /// Send `ad` every `interval` until `cancel` fires or `still_current`
    /// returns false.
    ///
    /// A send error ends the loop quietly.
    pub fn spawn<F>(
        self,
        ad: &Advertisement,
        interval: Duration,
        cancel: CancellationToken,
        still_current: F,
    ) -> JoinHandle<()>
    where
        F: Fn() -> bool + Send + 'static,
    {
        let frame = ad.to_frame();
        let code = ad.code.clone();

        tokio::spawn(async move {
            tracing::debug!("Advertising session {} to {}", code, self.target);

            loop {
                if cancel.is_cancelled() || !still_current() {
                    break;
                }

                if let Err(e) = self.socket.send_to(frame.as_bytes(), self.target).await {
                    tracing::debug!("Discovery broadcast stopped: {}", e);
                    break;
                }

                tokio::select! {
                    () = tokio::time::sleep(interval) => {}
                    () = cancel.cancelled() => break,
                }
            }

            tracing::debug!("Stopped advertising session {}", code);
        })
    }
}

fn broadcast_socket() -> std::io::Result<UdpSocket> {
    let socket = socket2::Socket::new(
        socket2::Domain::IPV4,
        socket2::Type::DGRAM,
        Some(socket2::Protocol::UDP),
    )?;

    socket.set_broadcast(true)?;
    socket.set_reuse_address(true)?;

    let addr = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0);
    socket.bind(&addr.into())?;
    socket.set_nonblocking(true)?;

    let std_socket: std::net::UdpSocket = socket.into();
    UdpSocket::from_std(std_socket)
}

fn listener_socket(port: u16) -> std::io::Result<UdpSocket> {
    let socket = socket2::Socket::new(
        socket2::Domain::IPV4,
        socket2::Type::DGRAM,
        Some(socket2::Protocol::UDP),
    )?;

    socket.set_reuse_address(true)?;

    #[cfg(all(unix, not(any(target_os = "solaris", target_os = "illumos"))))]
    socket.set_reuse_port(true)?;

    let addr = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port);
    socket.bind(&addr.into())?;
    socket.set_nonblocking(true)?;

    let std_socket: std::net::UdpSocket = socket.into();
    UdpSocket::from_std(std_socket)
}

/// Collect advertisements on `port` for `window`.
///
/// Frames are deduplicated by code, keeping the first one seen. Foreign or
/// malformed datagrams are ignored.
///
/// # Errors
///
/// Returns [`Error::BroadcastFailed`] if the port cannot be bound.
pub async fn listen(port: u16, window: Duration) -> Result<Vec<Advertisement>> {
    let socket = listener_socket(port).map_err(|e| {
        Error::BroadcastFailed(format!("failed to listen for broadcasts on {port}: {e}"))
    })?;

    let deadline = Instant::now() + window;
    let mut seen = HashSet::new();
    let mut peers = Vec::new();
    let mut buf = [0u8; MAX_FRAME_LEN];

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break;
        }

        match tokio::time::timeout(remaining, socket.recv_from(&mut buf)).await {
            Ok(Ok((len, source))) => {
                let Ok(frame) = std::str::from_utf8(&buf[..len]) else {
                    continue;
                };
                if let Some(ad) = Advertisement::parse(frame) {
                    if seen.insert(ad.code.clone()) {
                        tracing::debug!("Discovered session {} from {}", ad.code, source);
                        peers.push(ad);
                    }
                }
            }
            Ok(Err(e)) => {
                tracing::debug!("Discovery receive failed: {}", e);
                break;
            }
            Err(_) => break,
        }
    }

    Ok(peers)
}
