//! CLI command definitions and handlers.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};

use justserve_core::app::App;
use justserve_core::notify::{Event, Notifier};

pub mod check_update;
pub mod completions;
pub mod config;
pub mod connect;
pub mod discover;
pub mod ips;
pub mod proxy;
pub mod public;
pub mod send;
pub mod serve;

/// Environment variable holding the relay agent auth token.
const TOKEN_ENV: &str = "NGROK_AUTHTOKEN";

/// Load configuration with graceful fallback to defaults.
///
/// If the config file doesn't exist or can't be parsed, it falls back to defaults.
pub fn load_config() -> justserve_core::config::Config {
    justserve_core::config::Config::load().unwrap_or_else(|e| {
        tracing::warn!("Ignoring config file: {e}");
        justserve_core::config::Config::default()
    })
}

/// Build an app that reports background failures to the log.
pub fn build_app() -> App {
    App::new(load_config(), Arc::new(log_notifier()))
}

/// A notifier that logs failures and ignores progress.
fn log_notifier() -> impl Notifier + 'static {
    |event: Event| match event {
        Event::ServerError(msg) => tracing::error!("Server stopped: {msg}"),
        Event::P2pError(msg) => tracing::error!("Transfer failed: {msg}"),
        Event::P2pStatus(_) | Event::P2pProgress(_) => {}
    }
}

/// Print the suggestion attached to a core error, if any.
pub fn show_suggestion(err: &justserve_core::Error) {
    if let Some(suggestion) = err.suggestion() {
        eprintln!();
        eprintln!("Suggestion:");
        for line in suggestion.lines() {
            eprintln!("  {line}");
        }
        eprintln!();
    }
}

/// Block until the user presses Ctrl-C.
pub async fn wait_for_ctrl_c() -> Result<()> {
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")
}

/// JustServe - instant file serving, public tunnels and LAN transfers
#[derive(Parser)]
#[command(name = "justserve")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand)]
pub enum Command {
    /// Serve a file or folder on the local network
    Serve(ServeArgs),

    /// Serve a file or folder through a public HTTP tunnel
    Public(PublicArgs),

    /// Expose an already running local service through a tunnel
    Proxy(ProxyArgs),

    /// Offer a file or folder to a peer on the LAN
    Send(SendArgs),

    /// Listen for P2P sessions advertised on the LAN
    Discover(DiscoverArgs),

    /// Show what a peer is offering
    Connect(ConnectArgs),

    /// List this machine's LAN addresses
    Ips(IpsArgs),

    /// Check GitHub for a newer release
    CheckUpdate(CheckUpdateArgs),

    /// Manage configuration
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

/// Arguments for the serve command
#[derive(Parser)]
pub struct ServeArgs {
    /// File or folder to serve
    pub path: PathBuf,

    /// Port to listen on (defaults to the configured port)
    #[arg(short, long)]
    pub port: Option<String>,

    /// Require this password via HTTP Basic auth
    #[arg(long, env = "JUSTSERVE_PASSWORD")]
    pub password: Option<String>,

    /// Allow browsers to upload files into the served folder
    #[arg(short, long)]
    pub upload: bool,

    /// Print a QR code of the URL
    #[arg(long)]
    pub qr: bool,
}

/// Arguments for the public command
#[derive(Parser)]
pub struct PublicArgs {
    /// File or folder to serve
    pub path: PathBuf,

    /// Relay agent auth token
    #[arg(long, env = TOKEN_ENV, hide_env_values = true)]
    pub token: String,

    /// Require this password via HTTP Basic auth
    #[arg(long, env = "JUSTSERVE_PASSWORD")]
    pub password: Option<String>,

    /// Allow browsers to upload files into the served folder
    #[arg(short, long)]
    pub upload: bool,

    /// Print a QR code of the URL
    #[arg(long)]
    pub qr: bool,
}

/// Arguments for the proxy command
#[derive(Parser)]
pub struct ProxyArgs {
    /// Local port to expose
    #[arg(short, long)]
    pub port: String,

    /// Tunnel protocol
    #[arg(long, value_enum, default_value_t = ProtocolArg::Http)]
    pub protocol: ProtocolArg,

    /// Relay agent auth token (HTTP only)
    #[arg(long, env = TOKEN_ENV, hide_env_values = true)]
    pub token: Option<String>,
}

/// Tunnel protocols accepted on the command line
#[derive(Clone, Copy, ValueEnum, Debug, PartialEq, Eq)]
pub enum ProtocolArg {
    /// Public HTTP URL through the relay agent
    Http,
    /// Raw TCP forwarder
    Tcp,
}

impl ProtocolArg {
    /// Name understood by [`App::start_proxy`].
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Tcp => "tcp",
        }
    }
}

/// Arguments for the send command
#[derive(Parser)]
pub struct SendArgs {
    /// File or folder to send
    pub path: PathBuf,

    /// Print a QR code of the download URL
    #[arg(long)]
    pub qr: bool,

    /// Output events as JSON lines
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the discover command
#[derive(Parser)]
pub struct DiscoverArgs {
    /// Seconds to listen (defaults to the configured window)
    #[arg(short, long)]
    pub timeout: Option<u64>,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the connect command
#[derive(Parser)]
pub struct ConnectArgs {
    /// Peer address, e.g. 192.168.1.20:51234 or http://192.168.1.20:51234
    pub address: String,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the ips command
#[derive(Parser)]
pub struct IpsArgs {
    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the check-update command
#[derive(Parser)]
pub struct CheckUpdateArgs {
    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the config command
#[derive(Parser)]
pub struct ConfigArgs {
    /// Config subcommand
    #[command(subcommand)]
    pub action: ConfigAction,
}

/// Config subcommands
#[derive(Subcommand, Clone, Copy)]
pub enum ConfigAction {
    /// Show the active configuration
    Show,

    /// Show the configuration file path
    Path,

    /// Reset to defaults
    Reset,
}

/// Arguments for the completions command
#[derive(Parser)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: ShellType,
}

/// Supported shell types for completions
#[derive(Clone, Copy, ValueEnum, Debug)]
pub enum ShellType {
    /// Bash shell
    Bash,
    /// Zsh shell
    Zsh,
    /// Fish shell
    Fish,
    /// PowerShell
    #[value(name = "powershell")]
    PowerShell,
    /// Elvish shell
    Elvish,
}
