//! File transfer handler.
//!
//! Serves one root, either a single file or a directory tree, over HTTP.
//!
//! ## Routes
//!
//! | Request | Directory mode | Single-file mode |
//! |---------|----------------|------------------|
//! | `GET /` | listing | landing page |
//! | `GET /index.html` | static file | landing page |
//! | `GET /<name>` | listing, static file | the file, only when `<name>` matches |
//! | `GET /<dir>/?download=zip` | streamed ZIP | 404 |
//! | `POST /<any>` (multipart `file`) | upload into the root, if enabled | 405 |
//!
//! With a password configured every route first requires HTTP Basic
//! credentials.
//!
//! ## Example
//!
//! ```rust,ignore
//! use justserve_core::server::{ServeConfig, ServerManager};
//!
//! let manager = ServerManager::new(Arc::new(NullNotifier), Duration::from_secs(1));
//! let config = ServeConfig::new("./share", Some("secret".into()), true)?;
//! let addr = manager.start("0.0.0.0:8080".parse()?, config).await?;
//! ```

pub mod auth;
pub mod error;
pub mod handler;
pub mod pages;
pub mod paths;

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use axum::{extract::DefaultBodyLimit, middleware, Router};
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tower_http::limit::RequestBodyLimitLayer;

use crate::background::BackgroundServer;
use crate::error::{Error, Result};
use crate::notify::{Event, Notifier};

/// What one running file server serves. Fixed for the server's lifetime.
#[derive(Debug, Clone)]
pub struct ServeConfig {
    root: PathBuf,
    file_name: String,
    is_single_file: bool,
    password: Option<String>,
    allow_upload: bool,
}

impl ServeConfig {
    /// Stat `root` once and fix the serving mode.
    ///
    /// An empty password disables authentication.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CannotAccessPath`] if `root` cannot be stat'ed.
    pub fn new(
        root: impl AsRef<Path>,
        password: Option<String>,
        allow_upload: bool,
    ) -> Result<Self> {
        let root = root.as_ref();
        let metadata = std::fs::metadata(root).map_err(|e| Error::CannotAccessPath {
            path: root.display().to_string(),
            reason: e.to_string(),
        })?;

        let root = root.canonicalize().unwrap_or_else(|_| root.to_path_buf());
        let file_name = root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        Ok(Self {
            root,
            file_name,
            is_single_file: !metadata.is_dir(),
            password: password.filter(|p| !p.is_empty()),
            allow_upload,
        })
    }

    /// The served file or directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Base name of the root.
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Whether exactly one file is served.
    pub fn is_single_file(&self) -> bool {
        self.is_single_file
    }

    /// Whether Basic authentication is required.
    pub fn requires_auth(&self) -> bool {
        self.password.is_some()
    }

    /// Whether uploads are accepted. Never true in single-file mode.
    pub fn allow_upload(&self) -> bool {
        self.allow_upload && !self.is_single_file
    }
}

/// Build the router for one file server.
pub fn router(config: ServeConfig) -> Router {
    let password = config.password.clone();
    let limit = usize::try_from(crate::MAX_UPLOAD_BYTES).unwrap_or(usize::MAX);

    let router = Router::new()
        .fallback(handler::handle)
        .with_state(Arc::new(config))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(limit));

    match password {
        Some(password) => router.layer(middleware::from_fn_with_state(
            Arc::<str>::from(password),
            auth::require_password,
        )),
        None => router,
    }
}

/// Owns the one main file server that may run at a time.
pub struct ServerManager {
    active: Mutex<Option<BackgroundServer>>,
    notifier: Arc<dyn Notifier>,
    shutdown_timeout: Duration,
}

impl ServerManager {
    /// Create a manager that reports serve failures to `notifier`.
    pub fn new(notifier: Arc<dyn Notifier>, shutdown_timeout: Duration) -> Self {
        Self {
            active: Mutex::new(None),
            notifier,
            shutdown_timeout,
        }
    }

    /// Stop any running server, then serve `config` on `addr`.
    ///
    /// Returns the bound address, which differs from `addr` when port 0
    /// was requested.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BindFailed`] if the listener cannot be bound.
    pub async fn start(&self, addr: SocketAddr, config: ServeConfig) -> Result<SocketAddr> {
        let mut active = self.active.lock().await;
        if let Some(previous) = active.take() {
            previous.shutdown(self.shutdown_timeout).await;
        }

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| Error::BindFailed {
                addr,
                reason: e.to_string(),
            })?;

        let root = config.root().display().to_string();
        let notifier = Arc::clone(&self.notifier);
        let server = BackgroundServer::spawn(
            listener,
            router(config),
            CancellationToken::new(),
            move |e| notifier.notify(Event::ServerError(e.to_string())),
        )?;

        let bound = server.local_addr();
        tracing::info!("Serving {} on {}", root, bound);
        *active = Some(server);
        Ok(bound)
    }

    /// Stop the running server, if any.
    pub async fn stop(&self) {
        if let Some(server) = self.active.lock().await.take() {
            let addr = server.local_addr();
            server.shutdown(self.shutdown_timeout).await;
            tracing::info!("Stopped server on {}", addr);
        }
    }

    /// Address of the running server.
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        self.active.lock().await.as_ref().map(BackgroundServer::local_addr)
    }
}
