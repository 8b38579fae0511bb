//! Tunnel and proxy adapter.
//!
//! Makes a locally bound port reachable from elsewhere, in one of two
//! styles:
//!
//! - [`Protocol::Http`]: a relay agent publishes a public HTTPS URL that
//!   lands on a local reverse proxy, which forwards to `localhost:<port>`.
//! - [`Protocol::Tcp`]: an ephemeral listener on every interface pipes raw
//!   bytes to `localhost:<port>`, advertised as `tcp://<lan-ip>:<port>`.
//!
//! Only one tunnel runs at a time.

pub mod proxy;
pub mod relay;
pub mod tcp;

use std::fmt;
use std::net::{Ipv4Addr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::background::BackgroundServer;
use crate::config::TunnelConfig;
use crate::error::{Error, Result};
use crate::net;

use relay::RelayAgent;
use tcp::TcpForwarder;

/// How long the local proxy may drain on stop.
const PROXY_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

/// Tunnel style.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Protocol {
    /// Public HTTP relay in front of a reverse proxy
    #[default]
    Http,
    /// Raw TCP forwarder on the LAN
    Tcp,
}

impl FromStr for Protocol {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "http" => Ok(Self::Http),
            "tcp" => Ok(Self::Tcp),
            other => Err(Error::InvalidConfig {
                key: "protocol".to_string(),
                reason: format!("expected 'http' or 'tcp', got '{other}'"),
            }),
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Http => f.write_str("http"),
            Self::Tcp => f.write_str("tcp"),
        }
    }
}

enum ActiveTunnel {
    Http {
        proxy: BackgroundServer,
        agent: RelayAgent,
    },
    Tcp(TcpForwarder),
}

impl ActiveTunnel {
    async fn stop(self) {
        match self {
            Self::Http { proxy, agent } => {
                agent.shutdown().await;
                proxy.shutdown(PROXY_SHUTDOWN_TIMEOUT).await;
            }
            Self::Tcp(forwarder) => forwarder.stop().await,
        }
    }
}

/// Owns the one tunnel that may run at a time.
pub struct TunnelManager {
    config: TunnelConfig,
    active: Mutex<Option<ActiveTunnel>>,
}

impl TunnelManager {
    /// Create a manager with no running tunnel.
    pub fn new(config: TunnelConfig) -> Self {
        Self {
            config,
            active: Mutex::new(None),
        }
    }

    /// Stop any running tunnel, then expose `port` in the given style.
    ///
    /// Returns the URL peers should use. `token` is only used by the
    /// HTTP style.
    ///
    /// # Errors
    ///
    /// Returns an error if the proxy, forwarder or relay agent cannot be
    /// started. Nothing is left running in that case.
    pub async fn start(&self, protocol: Protocol, port: u16, token: &str) -> Result<String> {
        let mut active = self.active.lock().await;
        if let Some(previous) = active.take() {
            previous.stop().await;
        }

        let (tunnel, url) = match protocol {
            Protocol::Http => self.start_http(port, token).await?,
            Protocol::Tcp => {
                let forwarder =
                    TcpForwarder::start(SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)), port)
                        .await?;
                let url = format!(
                    "tcp://{}:{}",
                    net::preferred_local_ip(),
                    forwarder.local_addr().port()
                );
                (ActiveTunnel::Tcp(forwarder), url)
            }
        };

        tracing::info!("Tunnel ({}) for port {} is at {}", protocol, port, url);
        *active = Some(tunnel);
        Ok(url)
    }

    async fn start_http(&self, port: u16, token: &str) -> Result<(ActiveTunnel, String)> {
        if token.trim().is_empty() {
            return Err(Error::TunnelFailed(
                "an auth token is required for HTTP tunnels".to_string(),
            ));
        }

        let bind = SocketAddr::from((Ipv4Addr::LOCALHOST, 0));
        let listener = TcpListener::bind(bind)
            .await
            .map_err(|e| Error::BindFailed {
                addr: bind,
                reason: e.to_string(),
            })?;
        let proxy = BackgroundServer::spawn(
            listener,
            proxy::router(port),
            CancellationToken::new(),
            |e| tracing::error!("Tunnel proxy stopped: {}", e),
        )?;

        match RelayAgent::start(&self.config, token, proxy.local_addr().port()).await {
            Ok(agent) => {
                let url = agent.public_url().to_string();
                Ok((ActiveTunnel::Http { proxy, agent }, url))
            }
            Err(e) => {
                proxy.shutdown(PROXY_SHUTDOWN_TIMEOUT).await;
                Err(e)
            }
        }
    }

    /// Stop the running tunnel, if any.
    pub async fn stop(&self) {
        if let Some(tunnel) = self.active.lock().await.take() {
            tunnel.stop().await;
        }
    }

    /// Whether a tunnel is running.
    pub async fn is_active(&self) -> bool {
        self.active.lock().await.is_some()
    }
}
