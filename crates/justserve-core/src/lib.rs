//! # JustServe Core Library
//!
//! `justserve-core` turns a local file or folder into a temporarily
//! reachable HTTP resource and runs ad-hoc LAN transfers between two
//! machines using short numeric codes.
//!
//! ## Features
//!
//! - **File server**: listing, streamed ZIP export, uploads and Basic auth
//! - **Tunnels**: public HTTP relay with a local reverse proxy, or a raw TCP forwarder
//! - **P2P send**: one active session at a time, advertised over UDP broadcast
//!
//! ## Modules
//!
//! - [`app`] - Caller-facing facade bundling every manager
//! - [`archive`] - Streaming ZIP generation
//! - [`code`] - Transfer code generation and validation
//! - [`config`] - Configuration management
//! - [`net`] - Local address resolution
//! - [`notify`] - Asynchronous event sink
//! - [`p2p`] - P2P session manager and discovery
//! - [`server`] - File transfer handler
//! - [`tunnel`] - Tunnel and proxy adapter
//! - [`update`] - Release update check
//!
//! ## Example
//!
//! ```rust,ignore
//! use justserve_core::app::App;
//!
//! let app = App::new(Config::load()?, Arc::new(NullNotifier));
//! let url = app.start_local_server("./public", "8080", "", false).await?;
//! println!("Serving at {url}");
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::cast_precision_loss)]

pub mod app;
pub mod archive;
pub mod code;
pub mod config;
pub mod error;
pub mod net;
pub mod notify;
pub mod p2p;
pub mod server;
pub mod tunnel;
pub mod update;

mod background;
mod crypto;

pub use error::{Error, Result};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default port for the local file server
pub const DEFAULT_SERVER_PORT: u16 = 8080;

/// Well-known UDP port for P2P discovery broadcasts
pub const DEFAULT_DISCOVERY_PORT: u16 = 41234;

/// Hard cap on the decoded size of an upload request (10 GiB)
pub const MAX_UPLOAD_BYTES: u64 = 10 << 30;

/// Magic prefix of a discovery frame
pub const DISCOVERY_MAGIC: &str = "JUSTSERVE_P2P";
