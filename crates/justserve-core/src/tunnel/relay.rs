//! Relay agent process management.
//!
//! The agent (ngrok by default) opens the public endpoint and forwards it
//! to our local reverse proxy. Its public URL is read from the agent's
//! local inspection API.

use std::process::Stdio;
use std::time::Duration;

use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, Command};

use crate::config::TunnelConfig;
use crate::error::{Error, Result};

const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Environment variable the agent reads its auth token from.
pub const TOKEN_ENV: &str = "NGROK_AUTHTOKEN";

#[derive(Debug, Deserialize)]
struct TunnelList {
    #[serde(default)]
    tunnels: Vec<TunnelEntry>,
}

#[derive(Debug, Deserialize)]
struct TunnelEntry {
    public_url: String,
    #[serde(default)]
    config: Option<TunnelTarget>,
}

#[derive(Debug, Deserialize)]
struct TunnelTarget {
    #[serde(default)]
    addr: String,
}

/// A running relay agent and the public URL it reported.
#[derive(Debug)]
pub struct RelayAgent {
    process: Child,
    public_url: String,
}

impl RelayAgent {
    /// Spawn the agent for `local_port` and wait for its public URL.
    ///
    /// # Errors
    ///
    /// - [`Error::RelayAgentMissing`] if the agent binary is not installed
    /// - [`Error::RelayTimeout`] if no URL shows up within the startup timeout
    /// - [`Error::TunnelFailed`] if the agent exits early
    pub async fn start(config: &TunnelConfig, token: &str, local_port: u16) -> Result<Self> {
        let mut child = Command::new(&config.agent)
            .args(["http", &format!("http://127.0.0.1:{local_port}")])
            .env(TOKEN_ENV, token)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    Error::RelayAgentMissing(config.agent.clone())
                } else {
                    Error::TunnelFailed(format!("failed to start {}: {e}", config.agent))
                }
            })?;

        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(log_stderr(config.agent.clone(), stderr));
        }

        let waited = tokio::time::timeout(
            config.startup_timeout,
            wait_for_url(&config.inspect_url, local_port, &mut child),
        )
        .await;

        let failure = match waited {
            Ok(Ok(public_url)) => {
                tracing::info!("Relay agent is up at {}", public_url);
                return Ok(Self {
                    process: child,
                    public_url,
                });
            }
            Ok(Err(e)) => e,
            Err(_) => Error::RelayTimeout(config.startup_timeout.as_secs()),
        };

        if let Err(e) = child.kill().await {
            tracing::warn!("Failed to kill relay agent after startup failure: {}", e);
        }
        Err(failure)
    }

    /// Public URL of the tunnel.
    pub fn public_url(&self) -> &str {
        &self.public_url
    }

    /// Kill the agent and reap it.
    pub async fn shutdown(mut self) {
        if let Err(e) = self.process.kill().await {
            tracing::warn!("Failed to stop relay agent: {}", e);
            return;
        }
        tracing::info!("Relay agent stopped");
    }
}

async fn wait_for_url(inspect_url: &str, local_port: u16, child: &mut Child) -> Result<String> {
    let client = reqwest::Client::new();

    loop {
        if let Some(status) = child
            .try_wait()
            .map_err(|e| Error::TunnelFailed(e.to_string()))?
        {
            return Err(Error::TunnelFailed(format!(
                "relay agent exited before reporting a URL ({status})"
            )));
        }

        // the inspection API refuses connections until the agent is ready
        if let Ok(response) = client.get(inspect_url).send().await {
            if let Ok(list) = response.json::<TunnelList>().await {
                if let Some(url) = pick_public_url(&list, local_port) {
                    return Ok(url);
                }
            }
        }

        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

/// Our tunnel's URL, preferring `https`. Tunnels of other agents sharing
/// the inspection API are skipped.
fn pick_public_url(list: &TunnelList, local_port: u16) -> Option<String> {
    let suffix = format!(":{local_port}");
    let ours: Vec<&TunnelEntry> = list
        .tunnels
        .iter()
        .filter(|t| !t.public_url.is_empty())
        .filter(|t| t.config.as_ref().is_none_or(|c| c.addr.ends_with(&suffix)))
        .collect();

    ours.iter()
        .find(|t| t.public_url.starts_with("https://"))
        .or_else(|| ours.first())
        .map(|t| t.public_url.clone())
}

async fn log_stderr(agent: String, stderr: ChildStderr) {
    let mut lines = BufReader::new(stderr).lines();

    while let Some(line) = lines.next_line().await.ok().flatten() {
        let lower = line.to_lowercase();
        if lower.contains("err") || lower.contains("fatal") {
            tracing::error!("{} stderr: {}", agent, line);
        } else {
            tracing::debug!("{} stderr: {}", agent, line);
        }
    }
}
