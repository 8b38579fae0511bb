//! Caller-facing facade.
//!
//! [`App`] bundles every manager behind the small set of calls a GUI or
//! CLI front end needs. Arguments arrive the way a form would send them
//! (ports as strings, empty strings for "not set").

use std::net::{Ipv4Addr, SocketAddr};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::net;
use crate::notify::Notifier;
use crate::p2p::discovery::Advertisement;
use crate::p2p::{SessionManager, TransferSession};
use crate::server::{ServeConfig, ServerManager};
use crate::tunnel::{Protocol, TunnelManager};
use crate::update::{UpdateChecker, UpdateInfo};

/// Everything a front end can ask the core to do.
pub struct App {
    config: Config,
    server: ServerManager,
    tunnel: TunnelManager,
    p2p: SessionManager,
}

impl App {
    /// Build an app around `config`, reporting background events to
    /// `notifier`.
    pub fn new(config: Config, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            server: ServerManager::new(Arc::clone(&notifier), config.server.shutdown_timeout),
            tunnel: TunnelManager::new(config.tunnel.clone()),
            p2p: SessionManager::new(config.p2p.clone(), notifier),
            config,
        }
    }

    /// Active configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Serve `path` on every interface.
    ///
    /// An empty `port` uses the configured default, and a leading `:` is
    /// accepted. An empty `password` disables authentication.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidPort`] for a non-numeric port
    /// - [`Error::CannotAccessPath`] if `path` cannot be stat'ed
    /// - [`Error::BindFailed`] if the port is taken
    pub async fn start_local_server(
        &self,
        path: impl AsRef<Path>,
        port: &str,
        password: &str,
        allow_upload: bool,
    ) -> Result<String> {
        let port = parse_port(port, self.config.server.port)?;
        let config = ServeConfig::new(path, Some(password.to_string()), allow_upload)?;

        let bound = self
            .server
            .start(SocketAddr::from((Ipv4Addr::UNSPECIFIED, port)), config)
            .await?;
        Ok(format!("http://{}:{}", net::preferred_local_ip(), bound.port()))
    }

    /// Serve `path` on loopback and publish it through an HTTP tunnel.
    ///
    /// # Errors
    ///
    /// Any error from serving or from the tunnel. A failed tunnel stops the
    /// server again.
    pub async fn start_public_server(
        &self,
        path: impl AsRef<Path>,
        token: &str,
        password: &str,
        allow_upload: bool,
    ) -> Result<String> {
        let config = ServeConfig::new(path, Some(password.to_string()), allow_upload)?;
        let bound = self
            .server
            .start(SocketAddr::from((Ipv4Addr::LOCALHOST, 0)), config)
            .await?;

        match self.tunnel.start(Protocol::Http, bound.port(), token).await {
            Ok(url) => Ok(url),
            Err(e) => {
                self.server.stop().await;
                Err(e)
            }
        }
    }

    /// Expose an existing local service on `port`.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidPort`] for a non-numeric port
    /// - [`Error::InvalidConfig`] for an unknown protocol
    /// - any tunnel start failure
    pub async fn start_proxy(&self, token: &str, port: &str, protocol: &str) -> Result<String> {
        let port = parse_port(port, self.config.server.port)?;
        let protocol = if protocol.trim().is_empty() {
            Protocol::default()
        } else {
            protocol.parse()?
        };
        self.tunnel.start(protocol, port, token).await
    }

    /// Stop the tunnel, then the file server.
    pub async fn stop_server(&self) {
        self.tunnel.stop().await;
        self.server.stop().await;
    }

    /// Non-loopback IPv4 addresses of this machine.
    pub fn local_ips(&self) -> Vec<String> {
        net::local_ips()
    }

    /// Start sending `path` to a peer. See [`SessionManager::start_send`].
    ///
    /// # Errors
    ///
    /// See [`SessionManager::start_send`].
    pub async fn start_p2p_send(&self, path: impl AsRef<Path>) -> Result<TransferSession> {
        self.p2p.start_send(path).await
    }

    /// Listen for advertised sessions for `timeout_secs` (0 for the
    /// configured default).
    ///
    /// # Errors
    ///
    /// See [`SessionManager::discover_peers`].
    pub async fn discover_p2p_peers(&self, timeout_secs: u64) -> Result<Vec<Advertisement>> {
        self.p2p
            .discover_peers(Duration::from_secs(timeout_secs))
            .await
    }

    /// Fetch a peer's session metadata.
    ///
    /// # Errors
    ///
    /// See [`SessionManager::connect_to_peer`].
    pub async fn connect_to_p2p_peer(&self, address: &str) -> Result<serde_json::Value> {
        self.p2p.connect_to_peer(address).await
    }

    /// Stop the active P2P session.
    pub async fn stop_p2p_transfer(&self) {
        self.p2p.stop_transfer().await;
    }

    /// Snapshot of the active P2P session.
    pub fn p2p_status(&self) -> Option<TransferSession> {
        self.p2p.status()
    }

    /// Check GitHub for a newer release.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UpdateCheckFailed`] on network or API failure.
    pub async fn check_update(&self) -> Result<UpdateInfo> {
        UpdateChecker::new(&self.config.update).check().await
    }

    /// Version of this build.
    pub fn version(&self) -> &'static str {
        crate::VERSION
    }

    /// Stop everything that is running.
    pub async fn shutdown(&self) {
        self.stop_server().await;
        self.p2p.stop_transfer().await;
    }
}

/// Parse a user-typed port. Empty means `default`.
fn parse_port(input: &str, default: u16) -> Result<u16> {
    let trimmed = input.trim();
    let trimmed = trimmed.strip_prefix(':').unwrap_or(trimmed);
    if trimmed.is_empty() {
        return Ok(default);
    }
    trimmed
        .parse()
        .map_err(|_| Error::InvalidPort(input.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::NullNotifier;

    #[test]
    fn test_parse_port() {
        assert_eq!(parse_port("", 8080).unwrap(), 8080);
        assert_eq!(parse_port(":9000", 8080).unwrap(), 9000);
        assert_eq!(parse_port(" 3000 ", 8080).unwrap(), 3000);
        assert!(matches!(parse_port("abc", 8080), Err(Error::InvalidPort(_))));
        assert!(parse_port("70000", 8080).is_err());
    }

    #[tokio::test]
    async fn test_local_server_url() {
        let dir = tempfile::TempDir::new().unwrap();
        let app = App::new(Config::default(), Arc::new(NullNotifier));

        let free = std::net::TcpListener::bind("0.0.0.0:0").unwrap();
        let port = free.local_addr().unwrap().port();
        drop(free);

        let url = app
            .start_local_server(dir.path(), &port.to_string(), "", false)
            .await
            .unwrap();
        assert!(url.starts_with("http://"));
        assert!(url.ends_with(&format!(":{port}")));

        let body = reqwest::get(format!("http://127.0.0.1:{port}/"))
            .await
            .unwrap()
            .text()
            .await
            .unwrap();
        assert!(body.contains("<html"));

        app.stop_server().await;
    }

    #[tokio::test]
    async fn test_public_server_failure_stops_local_server() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut config = Config::default();
        config.tunnel.agent = "justserve-no-such-relay-agent".to_string();
        let app = App::new(config, Arc::new(NullNotifier));

        let err = app
            .start_public_server(dir.path(), "token", "", false)
            .await
            .unwrap_err();
        assert_eq!(err.code(), Some("E005"));
        assert!(app.server.local_addr().await.is_none());
    }

    #[tokio::test]
    async fn test_proxy_rejects_unknown_protocol() {
        let app = App::new(Config::default(), Arc::new(NullNotifier));
        assert!(app.start_proxy("", "8080", "udp").await.is_err());
        assert!(matches!(
            app.start_proxy("", "port", "tcp").await,
            Err(Error::InvalidPort(_))
        ));
    }
}
