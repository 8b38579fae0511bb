//! P2P session manager.
//!
//! A sender starts one session for a file or folder. The session gets a
//! six-digit code, its own HTTP server on an ephemeral port, and an
//! advertiser that broadcasts the code and URL on the LAN. A receiver
//! listens for advertisements, then talks HTTP to the advertised URL.
//!
//! ## Session Lifecycle
//!
//! ```text
//! absent ──start_send──> waiting ──download──> transferring ──> completed
//!    ^                                              │
//!    │                                              └──────────> error
//!    └──────────── stop_transfer / start_send ─────────────────────┘
//! ```
//!
//! At most one session exists. Starting a new one stops the previous one
//! first, releasing its port and stopping its advertiser.
//!
//! ## Example
//!
//! ```rust,ignore
//! use justserve_core::p2p::SessionManager;
//!
//! let manager = SessionManager::new(config.p2p.clone(), notifier);
//! let session = manager.start_send("./photos").await?;
//! println!("Code: {}  URL: {}", session.code, session.url);
//! ```

pub mod discovery;
pub mod progress;
mod routes;

use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::background::BackgroundServer;
use crate::code::TransferCode;
use crate::config::P2pConfig;
use crate::error::{Error, Result};
use crate::notify::{Event, Notifier};
use crate::{archive, net};

use discovery::{Advertisement, Advertiser};

/// Bound on a peer metadata request.
const PEER_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Status of the active session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferStatus {
    /// Advertised, nobody has downloaded yet
    Waiting,
    /// A download is streaming
    Transferring,
    /// The last download finished
    Completed,
    /// The last download was cut short
    Error,
}

/// Snapshot of the active session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferSession {
    /// Six-digit session code
    pub code: String,
    /// Base URL of the session server
    pub url: String,
    /// Path being sent
    pub file_path: PathBuf,
    /// Base name of the path
    pub file_name: String,
    /// File size, or total size of the files under a folder
    pub file_size: u64,
    /// Whether a folder is sent (as a ZIP)
    pub is_dir: bool,
    /// Current status
    pub status: TransferStatus,
    /// Bytes written by the current download
    pub bytes_transferred: u64,
}

/// Public metadata served at `/p2p/info`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferInfo {
    /// Base name of the sent path
    pub file_name: String,
    /// Payload size
    pub file_size: u64,
    /// Whether the payload is a ZIP of a folder
    pub is_dir: bool,
    /// Session code
    pub code: String,
}

impl From<&TransferSession> for TransferInfo {
    fn from(session: &TransferSession) -> Self {
        Self {
            file_name: session.file_name.clone(),
            file_size: session.file_size,
            is_dir: session.is_dir,
            code: session.code.clone(),
        }
    }
}

/// Session state plus the ids that decide who may still update it.
#[derive(Debug)]
struct Current {
    id: Uuid,
    download: u64,
    session: TransferSession,
}

struct Shared {
    state: std::sync::Mutex<Option<Current>>,
    notifier: Arc<dyn Notifier>,
}

impl Shared {
    fn snapshot(&self) -> Option<TransferSession> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|c| c.session.clone())
    }

    /// Apply `f` if `id` is still the active session.
    fn update<F>(&self, id: Uuid, f: F) -> Option<TransferSession>
    where
        F: FnOnce(&mut Current) -> bool,
    {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let current = state.as_mut().filter(|c| c.id == id)?;
        f(current).then(|| current.session.clone())
    }

    fn clear(&self) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

/// What the routes and the advertiser know about their session.
#[derive(Clone)]
pub(crate) struct SessionHandle {
    id: Uuid,
    meta: Arc<TransferSession>,
    shared: Arc<Shared>,
}

impl SessionHandle {
    /// Immutable metadata captured at start.
    pub(crate) fn meta(&self) -> &TransferSession {
        &self.meta
    }

    pub(crate) fn is_current(&self) -> bool {
        self.shared
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|c| c.id == self.id)
    }

    /// Start a download: reset the counter and move to `transferring`.
    ///
    /// Returns the download number that later updates must present.
    pub(crate) fn begin_download(&self) -> u64 {
        let mut number = 0;
        let snapshot = self.shared.update(self.id, |c| {
            c.download += 1;
            number = c.download;
            c.session.status = TransferStatus::Transferring;
            c.session.bytes_transferred = 0;
            true
        });

        if let Some(session) = snapshot {
            tracing::info!("Peer started downloading session {}", session.code);
            self.shared.notifier.notify(Event::P2pStatus(session));
        }
        number
    }

    /// Record `written` bytes for `download`, if it is still the latest one.
    pub(crate) fn progress(&self, download: u64, written: u64) {
        let snapshot = self.shared.update(self.id, |c| {
            if c.download != download {
                return false;
            }
            c.session.bytes_transferred = written;
            true
        });

        if let Some(session) = snapshot {
            self.shared.notifier.notify(Event::P2pProgress(session));
        }
    }

    /// Settle `download` as completed or failed.
    pub(crate) fn finish(&self, download: u64, result: &std::io::Result<()>) {
        let status = if result.is_ok() {
            TransferStatus::Completed
        } else {
            TransferStatus::Error
        };

        let snapshot = self.shared.update(self.id, |c| {
            if c.download != download {
                return false;
            }
            c.session.status = status;
            true
        });

        let Some(session) = snapshot else {
            return;
        };

        match result {
            Ok(()) => tracing::info!(
                "Session {} delivered {} bytes",
                session.code,
                session.bytes_transferred
            ),
            Err(e) => {
                tracing::warn!("Session {} download aborted: {}", session.code, e);
                self.shared
                    .notifier
                    .notify(Event::P2pError(format!("transfer aborted: {e}")));
            }
        }
        self.shared.notifier.notify(Event::P2pStatus(session));
    }
}

struct Running {
    server: BackgroundServer,
    cancel: CancellationToken,
    advertiser: Option<JoinHandle<()>>,
}

/// Owns the single P2P session.
pub struct SessionManager {
    config: P2pConfig,
    shared: Arc<Shared>,
    running: tokio::sync::Mutex<Option<Running>>,
}

impl SessionManager {
    /// Create a manager with no active session.
    pub fn new(config: P2pConfig, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            config,
            shared: Arc::new(Shared {
                state: std::sync::Mutex::new(None),
                notifier,
            }),
            running: tokio::sync::Mutex::new(None),
        }
    }

    /// Stop any active session, then start sending `path`.
    ///
    /// Returns the new session in `waiting`.
    ///
    /// # Errors
    ///
    /// - [`Error::CannotAccessPath`] if `path` cannot be stat'ed
    /// - [`Error::BindFailed`] if no ephemeral port can be bound
    /// - [`Error::InvalidConfig`] if the broadcast address is malformed
    pub async fn start_send(&self, path: impl AsRef<Path>) -> Result<TransferSession> {
        let path = path.as_ref();
        let mut running = self.running.lock().await;
        self.stop_locked(&mut running).await;

        let target = Advertiser::target(
            self.config.broadcast_address.as_deref(),
            self.config.discovery_port,
        )?;

        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|e| Error::CannotAccessPath {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;
        let is_dir = metadata.is_dir();
        let file_size = if is_dir {
            let dir = path.to_path_buf();
            tokio::task::spawn_blocking(move || archive::dir_size(&dir))
                .await
                .map_err(|e| Error::Internal(format!("size task failed: {e}")))?
        } else {
            metadata.len()
        };

        let bind_addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0));
        let listener = TcpListener::bind(bind_addr)
            .await
            .map_err(|e| Error::BindFailed {
                addr: bind_addr,
                reason: e.to_string(),
            })?;
        let port = listener.local_addr()?.port();

        let code = TransferCode::generate();
        let session = TransferSession {
            code: code.to_string(),
            url: format!("http://{}:{port}", net::preferred_local_ip()),
            file_path: path.to_path_buf(),
            file_name: display_name(path),
            file_size,
            is_dir,
            status: TransferStatus::Waiting,
            bytes_transferred: 0,
        };

        let id = Uuid::new_v4();
        *self.shared.state.lock().unwrap_or_else(PoisonError::into_inner) = Some(Current {
            id,
            download: 0,
            session: session.clone(),
        });

        let handle = SessionHandle {
            id,
            meta: Arc::new(session.clone()),
            shared: Arc::clone(&self.shared),
        };

        let cancel = CancellationToken::new();
        let notifier = Arc::clone(&self.shared.notifier);
        let server = match BackgroundServer::spawn(
            listener,
            routes::router(handle.clone()),
            cancel.clone(),
            move |e| notifier.notify(Event::P2pError(e.to_string())),
        ) {
            Ok(server) => server,
            Err(e) => {
                self.shared.clear();
                return Err(e.into());
            }
        };

        let ad = Advertisement::new(&code, session.url.clone());
        let advertiser = match Advertiser::new(target) {
            Ok(advertiser) => Some(advertiser.spawn(
                &ad,
                self.config.broadcast_interval,
                cancel.clone(),
                move || handle.is_current(),
            )),
            Err(e) => {
                tracing::warn!("Session {} will not be discoverable: {}", code, e);
                None
            }
        };

        *running = Some(Running {
            server,
            cancel,
            advertiser,
        });

        tracing::info!(
            "Sending {} as session {} at {}",
            session.file_path.display(),
            session.code,
            session.url
        );
        Ok(session)
    }

    /// Stop the active session. Does nothing when none is active.
    pub async fn stop_transfer(&self) {
        let mut running = self.running.lock().await;
        self.stop_locked(&mut running).await;
    }

    async fn stop_locked(&self, running: &mut Option<Running>) {
        let Some(run) = running.take() else {
            return;
        };

        run.cancel.cancel();
        self.shared.clear();

        let addr = run.server.local_addr();
        run.server.shutdown(self.config.shutdown_timeout).await;
        if let Some(advertiser) = run.advertiser {
            advertiser.abort();
        }
        tracing::info!("Stopped P2P session on {}", addr);
    }

    /// Snapshot of the active session.
    pub fn status(&self) -> Option<TransferSession> {
        self.shared.snapshot()
    }

    /// The active session as JSON, or `None` when absent.
    pub fn status_json(&self) -> Option<String> {
        self.status()
            .and_then(|session| serde_json::to_string(&session).ok())
    }

    /// Listen for advertised sessions.
    ///
    /// A zero `window` falls back to the configured discovery timeout.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BroadcastFailed`] if the discovery port cannot be
    /// bound.
    pub async fn discover_peers(&self, window: Duration) -> Result<Vec<Advertisement>> {
        let window = if window.is_zero() {
            self.config.discovery_timeout
        } else {
            window
        };
        discovery::listen(self.config.discovery_port, window).await
    }

    /// Fetch the metadata of the session served at `address`.
    ///
    /// Returns the decoded JSON unchanged. Nothing is downloaded.
    ///
    /// # Errors
    ///
    /// - [`Error::PeerUnreachable`] if the request fails
    /// - [`Error::InvalidPeerResponse`] if the body is not JSON
    pub async fn connect_to_peer(&self, address: &str) -> Result<serde_json::Value> {
        let base = address.trim().trim_end_matches('/');
        let url = if base.contains("://") {
            format!("{base}/p2p/info")
        } else {
            format!("http://{base}/p2p/info")
        };

        let client = reqwest::Client::builder()
            .timeout(PEER_REQUEST_TIMEOUT)
            .build()
            .map_err(|e| Error::Internal(format!("failed to create HTTP client: {e}")))?;

        let response = client
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::PeerUnreachable(format!("{base}: {e}")))?;

        response
            .json::<serde_json::Value>()
            .await
            .map_err(|e| Error::InvalidPeerResponse(e.to_string()))
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .or_else(|| {
            path.canonicalize()
                .ok()?
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
        })
        .unwrap_or_else(|| path.display().to_string())
}
