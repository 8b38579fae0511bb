//! Update functionality for JustServe.
//!
//! Checks the latest GitHub release against the running version and picks
//! the download for this platform. Replacing the binary is left to the
//! caller.

pub mod version_check;

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

pub use version_check::UpdateChecker;

/// Result of an update check.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateInfo {
    /// Whether a newer release exists with a usable download
    pub available: bool,
    /// Tag of the latest release
    pub version: String,
    /// Download URL of the asset for this platform
    pub download_url: String,
    /// Release notes
    pub body: String,
}

/// A downloadable file attached to a release.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ReleaseAsset {
    /// File name of the asset
    pub name: String,
    /// Direct download URL
    pub browser_download_url: String,
}

/// Whether `candidate` is a strictly newer version than `current`.
///
/// A leading `v` is ignored, missing components count as zero, and so do
/// components that are not numbers.
///
/// ```
/// use justserve_core::update::compare_versions;
///
/// assert!(compare_versions("v1.2.0", "1.1.9"));
/// assert!(!compare_versions("1.0.0", "1.0.0"));
/// assert!(compare_versions("v2", "1.9.9"));
/// ```
pub fn compare_versions(candidate: &str, current: &str) -> bool {
    version_cmp(candidate, current) == Ordering::Greater
}

fn version_cmp(a: &str, b: &str) -> Ordering {
    let a = components(a);
    let b = components(b);
    let len = a.len().max(b.len());

    (0..len)
        .map(|i| {
            let x = a.get(i).copied().unwrap_or(0);
            let y = b.get(i).copied().unwrap_or(0);
            x.cmp(&y)
        })
        .find(|ord| ord.is_ne())
        .unwrap_or(Ordering::Equal)
}

fn components(version: &str) -> Vec<u64> {
    let version = version.trim();
    let version = version
        .strip_prefix('v')
        .or_else(|| version.strip_prefix('V'))
        .unwrap_or(version);

    version
        .split('.')
        .map(|part| part.parse().unwrap_or(0))
        .collect()
}

/// Keywords identifying a release asset for `os` (as in
/// `std::env::consts::OS`).
fn os_keywords(os: &str) -> &'static [&'static str] {
    match os {
        "windows" => &["windows", ".exe"],
        "macos" => &["darwin", "macos"],
        "linux" => &["linux"],
        _ => &[],
    }
}

/// Pick the download URL for `os`.
///
/// The first asset whose lowercase name contains one of the platform
/// keywords wins. Without a match the first asset is used.
pub fn select_asset(assets: &[ReleaseAsset], os: &str) -> Option<String> {
    let keywords = os_keywords(os);

    assets
        .iter()
        .find(|asset| {
            let name = asset.name.to_lowercase();
            keywords.iter().any(|k| name.contains(k))
        })
        .or_else(|| assets.first())
        .map(|asset| asset.browser_download_url.clone())
}
