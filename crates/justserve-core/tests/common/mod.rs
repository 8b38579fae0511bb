//! Common test utilities for `JustServe` integration tests.
//!
//! This module provides shared functionality for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;
use std::time::Duration;

use justserve_core::config::P2pConfig;
use justserve_core::notify::NullNotifier;
use justserve_core::server::{ServeConfig, ServerManager};

/// Base UDP port for discovery tests, incremented per test.
static TEST_PORT_COUNTER: AtomicU16 = AtomicU16::new(47600);

/// Create a temporary directory for test files.
pub fn create_temp_dir() -> tempfile::TempDir {
    tempfile::tempdir().expect("Failed to create temp directory")
}

/// Create a test file with the given content.
pub fn create_test_file(dir: &Path, name: &str, content: &[u8]) -> PathBuf {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("Failed to create parent directories");
    }
    std::fs::write(&path, content).expect("Failed to write test file");
    path
}

/// Generate random bytes for testing.
pub fn random_bytes(size: usize) -> Vec<u8> {
    use rand::RngCore;
    let mut bytes = vec![0u8; size];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes
}

/// Create a test directory structure with multiple files.
pub fn create_test_directory(base: &Path, name: &str) -> PathBuf {
    let dir = base.join(name);
    std::fs::create_dir_all(&dir).expect("Failed to create test directory");

    create_test_file(&dir, "file1.txt", b"Hello, JustServe!");
    create_test_file(&dir, "file2.txt", b"Second test file content");
    create_test_file(&dir, "subdir/nested.txt", b"Nested file in subdirectory");
    std::fs::create_dir_all(dir.join("empty")).expect("Failed to create empty directory");

    dir
}

/// Get a unique discovery port for a test.
pub fn get_test_port() -> u16 {
    TEST_PORT_COUNTER.fetch_add(1, Ordering::SeqCst)
}

/// P2P settings that advertise over loopback on a private port.
pub fn loopback_p2p_config() -> P2pConfig {
    P2pConfig {
        discovery_port: get_test_port(),
        broadcast_interval: Duration::from_millis(100),
        broadcast_address: Some("127.0.0.1".to_string()),
        ..P2pConfig::default()
    }
}

/// Start a file server on loopback. Returns the manager and base URL.
pub async fn start_file_server(
    root: &Path,
    password: Option<&str>,
    allow_upload: bool,
) -> (ServerManager, String) {
    let manager = ServerManager::new(Arc::new(NullNotifier), Duration::from_secs(1));
    let config = ServeConfig::new(root, password.map(String::from), allow_upload)
        .expect("Failed to build serve config");
    let addr: SocketAddr = manager
        .start("127.0.0.1:0".parse().unwrap(), config)
        .await
        .expect("Failed to start file server");
    (manager, format!("http://{addr}"))
}

/// A client that reports redirects instead of following them.
pub fn no_redirect_client() -> reqwest::Client {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .expect("Failed to build client")
}

/// Build a multipart body carrying one file field.
///
/// Returns the content type and the body.
pub fn multipart_body(field: &str, file_name: &str, content: &[u8]) -> (String, Vec<u8>) {
    let boundary = "justserve-test-boundary";
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"{field}\"; filename=\"{file_name}\"\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
    body.extend_from_slice(content);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());

    (format!("multipart/form-data; boundary={boundary}"), body)
}

/// Port of an `http://host:port` URL.
pub fn url_port(url: &str) -> u16 {
    url.rsplit(':')
        .next()
        .and_then(|p| p.parse().ok())
        .expect("URL has no port")
}
