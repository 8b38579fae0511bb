//! Version checking against GitHub releases.

use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;

use super::{compare_versions, select_asset, ReleaseAsset, UpdateInfo};
use crate::config::UpdateConfig;
use crate::error::{Error, Result};

const REQUEST_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Deserialize)]
struct Release {
    tag_name: String,
    #[serde(default)]
    body: Option<String>,
    #[serde(default)]
    assets: Vec<ReleaseAsset>,
}

/// Queries the latest release of the configured repository.
pub struct UpdateChecker {
    client: Client,
    release_url: String,
    current: String,
}

impl UpdateChecker {
    /// Create a checker comparing against the library version.
    #[must_use]
    pub fn new(config: &UpdateConfig) -> Self {
        Self::with_current(config, crate::VERSION)
    }

    /// Create a checker comparing against `current`.
    #[must_use]
    pub fn with_current(config: &UpdateConfig, current: &str) -> Self {
        Self {
            client: Client::new(),
            release_url: format!(
                "{}/repos/{}/releases/latest",
                config.api_base.trim_end_matches('/'),
                config.repository
            ),
            current: current.to_string(),
        }
    }

    /// Check for a newer release for this platform.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UpdateCheckFailed`] if the request fails, the API
    /// answers with a non-success status, or the body cannot be parsed.
    pub async fn check(&self) -> Result<UpdateInfo> {
        let response = self
            .client
            .get(&self.release_url)
            .header(reqwest::header::ACCEPT, "application/vnd.github+json")
            .header(
                reqwest::header::USER_AGENT,
                concat!("justserve/", env!("CARGO_PKG_VERSION")),
            )
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .send()
            .await
            .map_err(|e| Error::UpdateCheckFailed(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Error::UpdateCheckFailed(format!(
                "GitHub API returned status: {}",
                response.status()
            )));
        }

        let release: Release = response
            .json()
            .await
            .map_err(|e| Error::UpdateCheckFailed(format!("invalid release response: {e}")))?;

        Ok(self.evaluate(release, std::env::consts::OS))
    }

    fn evaluate(&self, release: Release, os: &str) -> UpdateInfo {
        if !compare_versions(&release.tag_name, &self.current) {
            tracing::debug!("{} is up to date (latest {})", self.current, release.tag_name);
            return UpdateInfo::default();
        }

        match select_asset(&release.assets, os) {
            Some(download_url) => {
                tracing::info!("Update available: {} -> {}", self.current, release.tag_name);
                UpdateInfo {
                    available: true,
                    version: release.tag_name,
                    download_url,
                    body: release.body.unwrap_or_default(),
                }
            }
            None => {
                tracing::warn!("Release {} has no downloadable assets", release.tag_name);
                UpdateInfo::default()
            }
        }
    }
}
