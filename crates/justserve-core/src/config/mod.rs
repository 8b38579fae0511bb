//! Configuration management for JustServe.
//!
//! This module handles loading, saving, and validating JustServe configuration.
//!
//! ## Configuration File Locations
//!
//! | Platform | Path |
//! |----------|------|
//! | Linux | `~/.config/justserve/config.toml` |
//! | macOS | `~/Library/Application Support/com.justserve.JustServe/config.toml` |
//! | Windows | `%APPDATA%\JustServe\JustServe\config\config.toml` |
//!
//! ## Example
//!
//! ```rust,ignore
//! use justserve_core::config::Config;
//!
//! let config = Config::load()?;
//! println!("Discovery port: {}", config.p2p.discovery_port);
//! ```

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Main configuration struct for JustServe.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Local file server settings
    pub server: ServerConfig,
    /// P2P transfer settings
    pub p2p: P2pConfig,
    /// Tunnel settings
    pub tunnel: TunnelConfig,
    /// Update check settings
    pub update: UpdateConfig,
}

/// Local file server options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Port used when the caller does not pass one
    pub port: u16,
    /// Accept uploads unless the caller says otherwise
    pub allow_upload: bool,
    /// How long graceful shutdown may take before connections are dropped
    #[serde(with = "humantime_serde")]
    pub shutdown_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: crate::DEFAULT_SERVER_PORT,
            allow_upload: false,
            shutdown_timeout: Duration::from_secs(1),
        }
    }
}

/// P2P session options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct P2pConfig {
    /// Discovery port (UDP)
    pub discovery_port: u16,
    /// Time between two advertisement frames
    #[serde(with = "humantime_serde")]
    pub broadcast_interval: Duration,
    /// Listen window used when the caller passes no timeout
    #[serde(with = "humantime_serde")]
    pub discovery_timeout: Duration,
    /// Bound on graceful shutdown of the session server
    #[serde(with = "humantime_serde")]
    pub shutdown_timeout: Duration,
    /// Advertisement destination, defaults to the limited broadcast address
    pub broadcast_address: Option<String>,
}

impl Default for P2pConfig {
    fn default() -> Self {
        Self {
            discovery_port: crate::DEFAULT_DISCOVERY_PORT,
            broadcast_interval: Duration::from_secs(2),
            discovery_timeout: Duration::from_secs(10),
            shutdown_timeout: Duration::from_secs(2),
            broadcast_address: None,
        }
    }
}

/// Tunnel relay options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TunnelConfig {
    /// Relay agent executable
    pub agent: String,
    /// Local inspection API of the relay agent
    pub inspect_url: String,
    /// How long to wait for the agent to report its public URL
    #[serde(with = "humantime_serde")]
    pub startup_timeout: Duration,
}

impl Default for TunnelConfig {
    fn default() -> Self {
        Self {
            agent: "ngrok".to_string(),
            inspect_url: "http://127.0.0.1:4040/api/tunnels".to_string(),
            startup_timeout: Duration::from_secs(15),
        }
    }
}

/// Update check options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdateConfig {
    /// `owner/name` of the release repository
    pub repository: String,
    /// Base URL of the releases API
    pub api_base: String,
}

impl Default for UpdateConfig {
    fn default() -> Self {
        Self {
            repository: "thirawat27/JustServe".to_string(),
            api_base: "https://api.github.com".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    ///
    /// If the configuration file doesn't exist, returns the default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration file exists but cannot be read or parsed.
    pub fn load() -> Result<Self> {
        let path = Self::config_path();
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path)
            .map_err(|e| Error::ConfigError(format!("Failed to read config: {e}")))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| Error::ConfigError(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to the default location.
    ///
    /// Creates the configuration directory if it doesn't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be written.
    pub fn save(&self) -> Result<()> {
        let path = Self::config_path();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                Error::ConfigError(format!("Failed to create config directory: {e}"))
            })?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::ConfigError(format!("Failed to serialize config: {e}")))?;

        std::fs::write(&path, content)
            .map_err(|e| Error::ConfigError(format!("Failed to write config: {e}")))
    }

    /// Reject values that would make a manager spin or never start.
    pub fn validate(&self) -> Result<()> {
        let checks = [
            ("p2p.broadcast_interval", self.p2p.broadcast_interval),
            ("p2p.discovery_timeout", self.p2p.discovery_timeout),
            ("tunnel.startup_timeout", self.tunnel.startup_timeout),
        ];
        for (key, value) in checks {
            if value.is_zero() {
                return Err(Error::InvalidConfig {
                    key: key.to_string(),
                    reason: "must be greater than zero".to_string(),
                });
            }
        }

        if self.p2p.discovery_port == 0 {
            return Err(Error::InvalidConfig {
                key: "p2p.discovery_port".to_string(),
                reason: "a fixed port is required for peers to find each other".to_string(),
            });
        }

        if !self.update.repository.contains('/') {
            return Err(Error::InvalidConfig {
                key: "update.repository".to_string(),
                reason: "expected owner/name".to_string(),
            });
        }

        Ok(())
    }

    /// Get the default configuration directory path.
    #[must_use]
    pub fn config_dir() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "justserve", "JustServe")
            .map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Get the full path to the configuration file.
    #[must_use]
    pub fn config_path() -> PathBuf {
        Self::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("config.toml")
    }
}

mod humantime_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if duration.subsec_millis() == 0 {
            serializer.serialize_str(&format!("{}s", duration.as_secs()))
        } else {
            serializer.serialize_str(&format!("{}ms", duration.as_millis()))
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.strip_suffix("ms")
            .map(|millis| {
                millis
                    .parse()
                    .map(Duration::from_millis)
                    .map_err(serde::de::Error::custom)
            })
            .or_else(|| {
                s.strip_suffix('s').map(|secs| {
                    secs.parse()
                        .map(Duration::from_secs)
                        .map_err(serde::de::Error::custom)
                })
            })
            .or_else(|| {
                s.strip_suffix('m').map(|mins| {
                    mins.parse::<u64>()
                        .map(|m| Duration::from_secs(m * 60))
                        .map_err(serde::de::Error::custom)
                })
            })
            .unwrap_or_else(|| Err(serde::de::Error::custom("invalid duration format")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_config_default() {
        let config = Config::default();

        assert_eq!(config.server.port, 8080);
        assert!(!config.server.allow_upload);
        assert_eq!(config.p2p.discovery_port, 41234);
        assert_eq!(config.p2p.broadcast_interval, Duration::from_secs(2));
        assert_eq!(config.p2p.discovery_timeout, Duration::from_secs(10));
        assert_eq!(config.p2p.shutdown_timeout, Duration::from_secs(2));
        assert_eq!(config.tunnel.agent, "ngrok");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");

        let mut original = Config::default();
        original.server.port = 9090;
        original.p2p.broadcast_interval = Duration::from_millis(250);
        original.tunnel.agent = "/opt/ngrok/ngrok".to_string();

        let content = toml::to_string_pretty(&original).expect("serialize");
        std::fs::write(&config_path, &content).expect("write");

        let loaded_content = std::fs::read_to_string(&config_path).expect("read");
        let loaded: Config = toml::from_str(&loaded_content).expect("parse");

        assert_eq!(loaded.server.port, 9090);
        assert_eq!(loaded.p2p.broadcast_interval, Duration::from_millis(250));
        assert_eq!(loaded.tunnel.agent, "/opt/ngrok/ngrok");
    }

    #[test]
    fn test_config_serialization_sections() {
        let toml_str = toml::to_string_pretty(&Config::default()).expect("serialize");
        for section in ["[server]", "[p2p]", "[tunnel]", "[update]"] {
            assert!(toml_str.contains(section), "missing {section}");
        }
        assert!(toml_str.contains("broadcast_interval = \"2s\""));
    }

    #[test]
    fn test_config_deserialization_partial() {
        let partial_toml = r#"
[p2p]
discovery_port = 50000
discovery_timeout = "1m"
"#;

        let config: Config = toml::from_str(partial_toml).expect("parse partial config");

        assert_eq!(config.p2p.discovery_port, 50000);
        assert_eq!(config.p2p.discovery_timeout, Duration::from_secs(60));
        assert_eq!(config.p2p.broadcast_interval, Duration::from_secs(2));
        assert_eq!(config.server.port, 8080);
    }

    #[test]
    fn test_invalid_duration_rejected() {
        let bad = "[p2p]\nbroadcast_interval = \"soon\"\n";
        assert!(toml::from_str::<Config>(bad).is_err());
    }

    #[test]
    fn test_validate_rejects_zero_interval() {
        let mut config = Config::default();
        config.p2p.broadcast_interval = Duration::ZERO;

        match config.validate() {
            Err(Error::InvalidConfig { key, .. }) => assert_eq!(key, "p2p.broadcast_interval"),
            other => panic!("expected InvalidConfig, got {other:?}"),
        }
    }

    #[test]
    fn test_validate_rejects_bad_repository() {
        let mut config = Config::default();
        config.update.repository = "JustServe".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_path() {
        let path = Config::config_path();
        assert!(path.ends_with("config.toml"));
    }
}
