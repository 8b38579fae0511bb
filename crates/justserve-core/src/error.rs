//! Error types for JustServe.
//!
//! This module provides a unified error type for all JustServe operations,
//! with specific error variants for different failure modes.

use std::io;
use std::net::SocketAddr;

use thiserror::Error;

/// A specialized `Result` type for JustServe operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The main error type for JustServe.
#[derive(Error, Debug)]
pub enum Error {
    /// Path to serve or send cannot be accessed (E001)
    #[error("cannot access path '{path}': {reason}")]
    CannotAccessPath {
        /// The path that was requested
        path: String,
        /// Underlying reason
        reason: String,
    },

    /// Port string is not a valid TCP port (E002)
    #[error("invalid port '{0}'")]
    InvalidPort(String),

    /// Listener could not be bound (E003)
    #[error("failed to bind {addr}: {reason}")]
    BindFailed {
        /// Address we tried to bind
        addr: SocketAddr,
        /// Underlying reason
        reason: String,
    },

    /// Peer did not answer (E004)
    #[error("peer unreachable at {0}")]
    PeerUnreachable(String),

    /// Peer answered with something that is not session metadata
    #[error("invalid response from peer: {0}")]
    InvalidPeerResponse(String),

    /// Invalid transfer code format
    #[error("invalid code format: {0}")]
    InvalidCodeFormat(String),

    /// Relay agent executable not found (E005)
    #[error("relay agent '{0}' not found in PATH")]
    RelayAgentMissing(String),

    /// Relay agent never reported a public URL (E006)
    #[error("relay agent did not report a public URL within {0} seconds")]
    RelayTimeout(u64),

    /// Tunnel setup or operation failed
    #[error("tunnel error: {0}")]
    TunnelFailed(String),

    /// Unable to broadcast on network
    #[error("unable to broadcast on network: {0}")]
    BroadcastFailed(String),

    /// Update check failed
    #[error("failed to check for updates: {0}")]
    UpdateCheckFailed(String),

    /// Configuration file error
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// Invalid configuration value
    #[error("invalid configuration value for '{key}': {reason}")]
    InvalidConfig {
        /// Configuration key
        key: String,
        /// Reason for invalidity
        reason: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Internal error (should not happen)
    #[error("internal error: {0}")]
    Internal(String),

    /// Operation timeout
    #[error("operation timed out after {0} seconds")]
    Timeout(u64),
}

impl Error {
    /// Returns the error code associated with this error, if any.
    ///
    /// Error codes follow the pattern EXXX where XXX is a 3-digit number.
    #[must_use]
    pub const fn code(&self) -> Option<&'static str> {
        match self {
            Self::CannotAccessPath { .. } => Some("E001"),
            Self::InvalidPort(_) => Some("E002"),
            Self::BindFailed { .. } => Some("E003"),
            Self::PeerUnreachable(_) => Some("E004"),
            Self::RelayAgentMissing(_) => Some("E005"),
            Self::RelayTimeout(_) => Some("E006"),
            _ => None,
        }
    }

    /// Returns whether this error is recoverable (can be retried).
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::PeerUnreachable(_)
                | Self::RelayTimeout(_)
                | Self::Timeout(_)
                | Self::UpdateCheckFailed(_)
        )
    }

    /// Returns a helpful suggestion for resolving the error, if applicable.
    #[must_use]
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            Self::RelayAgentMissing(_) => Some(
                "Install ngrok from https://ngrok.com/download\n\
                 Or point [tunnel] agent in the config file at your relay binary",
            ),
            Self::RelayTimeout(_) => Some(
                "Check that the auth token is valid and that no other relay agent\n\
                 is already running on this machine",
            ),
            Self::BindFailed { .. } => {
                Some("The port may already be in use. Try a different port.")
            }
            Self::UpdateCheckFailed(_) => Some(
                "Check your internet connection and try again.\n\
                 You can also manually check: https://github.com/thirawat27/JustServe/releases",
            ),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
