//! Integration tests for P2P sessions and discovery.

mod common;

use std::io::{Cursor, Read};
use std::sync::Arc;
use std::time::Duration;

use justserve_core::config::P2pConfig;
use justserve_core::notify::{ChannelNotifier, Event, NullNotifier};
use justserve_core::p2p::discovery;
use justserve_core::p2p::{SessionManager, TransferStatus};
use justserve_core::Error;
use reqwest::{header, StatusCode};

use common::{
    create_temp_dir, create_test_directory, create_test_file, loopback_p2p_config, random_bytes,
    url_port,
};

fn manager(config: P2pConfig) -> SessionManager {
    SessionManager::new(config, Arc::new(NullNotifier))
}

fn local_base(url: &str) -> String {
    format!("http://127.0.0.1:{}", url_port(url))
}

async fn wait_for_status(manager: &SessionManager, status: TransferStatus) {
    for _ in 0..100 {
        if manager.status().is_some_and(|s| s.status == status) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("session never reached {status:?}: {:?}", manager.status());
}

#[tokio::test]
async fn test_file_session_lifecycle() {
    let temp = create_temp_dir();
    let content = random_bytes(512 * 1024);
    let file = create_test_file(temp.path(), "movie.mp4", &content);
    let manager = manager(loopback_p2p_config());

    let session = manager.start_send(&file).await.unwrap();
    assert_eq!(session.status, TransferStatus::Waiting);
    assert_eq!(session.file_name, "movie.mp4");
    assert_eq!(session.file_size, content.len() as u64);
    assert!(!session.is_dir);

    let json: serde_json::Value =
        serde_json::from_str(&manager.status_json().unwrap()).unwrap();
    assert_eq!(json["code"], session.code.as_str());
    assert_eq!(json["status"], "waiting");

    let base = local_base(&session.url);
    let response = reqwest::get(format!("{base}/p2p/download")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "application/octet-stream"
    );
    assert_eq!(
        response.headers()[header::CONTENT_LENGTH],
        content.len().to_string().as_str()
    );
    let disposition = response.headers()[header::CONTENT_DISPOSITION].to_str().unwrap();
    assert!(disposition.contains("movie.mp4"));

    let bytes = response.bytes().await.unwrap();
    assert_eq!(bytes.as_ref(), content.as_slice());

    wait_for_status(&manager, TransferStatus::Completed).await;
    assert_eq!(
        manager.status().unwrap().bytes_transferred,
        content.len() as u64
    );

    manager.stop_transfer().await;
    assert!(manager.status().is_none());
    assert!(manager.status_json().is_none());
    assert!(tokio::net::TcpStream::connect(("127.0.0.1", url_port(&session.url)))
        .await
        .is_err());
}

#[tokio::test]
async fn test_head_download_leaves_session_waiting() {
    let temp = create_temp_dir();
    let content = random_bytes(4 * 1024 * 1024);
    let file = create_test_file(temp.path(), "big.iso", &content);
    let dir = create_test_directory(temp.path(), "photos");
    let client = reqwest::Client::new();

    for (path, content_type) in [
        (&file, "application/octet-stream"),
        (&dir, "application/zip"),
    ] {
        let manager = manager(loopback_p2p_config());
        let session = manager.start_send(path).await.unwrap();
        let url = format!("{}/p2p/download", local_base(&session.url));

        let response = client.head(&url).send().await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], content_type);
        assert!(response.headers().contains_key(header::CONTENT_DISPOSITION));

        tokio::time::sleep(Duration::from_millis(300)).await;
        let status = manager.status().unwrap();
        assert_eq!(status.status, TransferStatus::Waiting);
        assert_eq!(status.bytes_transferred, 0);

        let response = client.get(&url).send().await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        response.bytes().await.unwrap();
        wait_for_status(&manager, TransferStatus::Completed).await;

        manager.stop_transfer().await;
    }
}

#[tokio::test]
async fn test_info_and_landing_routes() {
    let temp = create_temp_dir();
    let dir = create_test_directory(temp.path(), "photos");
    let manager = manager(loopback_p2p_config());
    let session = manager.start_send(&dir).await.unwrap();
    let base = local_base(&session.url);

    let response = reqwest::get(format!("{base}/p2p/info")).await.unwrap();
    assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
    let info: serde_json::Value = response.json().await.unwrap();
    assert_eq!(
        info,
        serde_json::json!({
            "fileName": "photos",
            "fileSize": session.file_size,
            "isDir": true,
            "code": session.code,
        })
    );

    let page = reqwest::get(format!("{base}/")).await.unwrap().text().await.unwrap();
    assert!(page.contains(&session.code));
    assert!(page.contains("Folder (ZIP)"));
    assert!(page.contains("/p2p/download"));

    let response = reqwest::get(format!("{base}/elsewhere")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    manager.stop_transfer().await;
}

#[tokio::test]
async fn test_directory_download_streams_zip() {
    let temp = create_temp_dir();
    let dir = create_test_directory(temp.path(), "photos");
    let (notifier, mut events) = ChannelNotifier::new();
    let manager = SessionManager::new(loopback_p2p_config(), Arc::new(notifier));

    let session = manager.start_send(&dir).await.unwrap();
    assert!(session.is_dir);
    assert_eq!(
        session.file_size,
        (b"Hello, JustServe!".len()
            + b"Second test file content".len()
            + b"Nested file in subdirectory".len()) as u64
    );

    let response = reqwest::get(format!("{}/p2p/download", local_base(&session.url)))
        .await
        .unwrap();
    assert_eq!(response.headers()[header::CONTENT_TYPE], "application/zip");
    assert!(response.headers().get(header::CONTENT_LENGTH).is_none());
    assert!(response.headers()[header::CONTENT_DISPOSITION]
        .to_str()
        .unwrap()
        .contains("photos.zip"));

    let bytes = response.bytes().await.unwrap();
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes.to_vec())).unwrap();
    let mut nested = String::new();
    archive
        .by_name("subdir/nested.txt")
        .unwrap()
        .read_to_string(&mut nested)
        .unwrap();
    assert_eq!(nested, "Nested file in subdirectory");
    assert_eq!(archive.len(), 3);

    wait_for_status(&manager, TransferStatus::Completed).await;
    assert_eq!(
        manager.status().unwrap().bytes_transferred,
        bytes.len() as u64
    );

    let mut statuses = Vec::new();
    let mut last_progress = 0;
    while statuses.last() != Some(&TransferStatus::Completed) {
        let event = tokio::time::timeout(Duration::from_secs(2), events.recv())
            .await
            .expect("missing completion event")
            .expect("notifier dropped");
        match event {
            Event::P2pStatus(s) => statuses.push(s.status),
            Event::P2pProgress(s) => {
                assert!(s.bytes_transferred >= last_progress);
                last_progress = s.bytes_transferred;
            }
            other => panic!("unexpected event {other:?}"),
        }
    }
    assert_eq!(
        statuses,
        vec![TransferStatus::Transferring, TransferStatus::Completed]
    );
    assert_eq!(last_progress, bytes.len() as u64);

    manager.stop_transfer().await;
}

#[tokio::test]
async fn test_new_session_supersedes_old() {
    let temp = create_temp_dir();
    let first_file = create_test_file(temp.path(), "one.txt", b"one");
    let second_file = create_test_file(temp.path(), "two.txt", b"two");
    let manager = manager(loopback_p2p_config());

    let first = manager.start_send(&first_file).await.unwrap();
    let second = manager.start_send(&second_file).await.unwrap();

    let current = manager.status().unwrap();
    assert_eq!(current.code, second.code);
    assert_eq!(current.file_name, "two.txt");

    if url_port(&first.url) != url_port(&second.url) {
        assert!(tokio::net::TcpStream::connect(("127.0.0.1", url_port(&first.url)))
            .await
            .is_err());
    }

    let body = reqwest::get(format!("{}/p2p/download", local_base(&second.url)))
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert_eq!(body, "two");

    manager.stop_transfer().await;
}

#[tokio::test]
async fn test_concurrent_starts_leave_one_session() {
    let temp = create_temp_dir();
    let file = create_test_file(temp.path(), "a.txt", b"a");
    let manager = Arc::new(manager(loopback_p2p_config()));

    let tasks: Vec<_> = (0..4)
        .map(|_| {
            let manager = Arc::clone(&manager);
            let file = file.clone();
            tokio::spawn(async move { manager.start_send(&file).await.unwrap() })
        })
        .collect();

    let mut sessions = Vec::new();
    for task in tasks {
        sessions.push(task.await.unwrap());
    }

    let current = manager.status().unwrap();
    let live: Vec<_> = sessions.iter().filter(|s| s.code == current.code).collect();
    assert!(!live.is_empty());

    for session in &sessions {
        let reachable = tokio::net::TcpStream::connect(("127.0.0.1", url_port(&session.url)))
            .await
            .is_ok();
        assert_eq!(reachable, url_port(&session.url) == url_port(&current.url));
    }

    manager.stop_transfer().await;
}

#[tokio::test]
async fn test_connect_to_peer() {
    let temp = create_temp_dir();
    let file = create_test_file(temp.path(), "notes.txt", b"hello");
    let sender = manager(loopback_p2p_config());
    let receiver = manager(loopback_p2p_config());

    let session = sender.start_send(&file).await.unwrap();
    let info = receiver
        .connect_to_peer(&format!("{}/", local_base(&session.url)))
        .await
        .unwrap();
    assert_eq!(info["fileName"], "notes.txt");
    assert_eq!(info["code"], session.code.as_str());
    assert_eq!(info["fileSize"], 5);

    let port = url_port(&session.url);
    let info = receiver
        .connect_to_peer(&format!("127.0.0.1:{port}"))
        .await
        .unwrap();
    assert_eq!(info["isDir"], false);

    sender.stop_transfer().await;
    let err = receiver
        .connect_to_peer(&format!("http://127.0.0.1:{port}"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::PeerUnreachable(_)));
}

#[tokio::test]
async fn test_discovery_sees_only_live_sessions() {
    let temp = create_temp_dir();
    let file = create_test_file(temp.path(), "a.txt", b"a");
    let config = loopback_p2p_config();
    let port = config.discovery_port;
    let interval = config.broadcast_interval;
    let sender = manager(config.clone());
    let receiver = manager(config);

    let listening = tokio::spawn(async move {
        receiver.discover_peers(Duration::from_millis(800)).await
    });
    tokio::time::sleep(Duration::from_millis(100)).await;
    let session = sender.start_send(&file).await.unwrap();

    let peers = listening.await.unwrap().unwrap();
    assert_eq!(peers.len(), 1);
    assert_eq!(peers[0].code, session.code);
    assert_eq!(peers[0].url, session.url);

    sender.stop_transfer().await;
    tokio::time::sleep(interval * 2).await;

    let peers = discovery::listen(port, Duration::from_millis(400)).await.unwrap();
    assert!(peers.is_empty());
}

#[tokio::test]
async fn test_missing_path() {
    let temp = create_temp_dir();
    let err = manager(loopback_p2p_config())
        .start_send(temp.path().join("gone"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::CannotAccessPath { .. }));
}

#[tokio::test]
#[ignore = "requires a network that delivers limited broadcast to this host"]
async fn test_discovery_over_real_broadcast() {
    let temp = create_temp_dir();
    let file = create_test_file(temp.path(), "a.txt", b"a");
    let config = P2pConfig {
        discovery_port: common::get_test_port(),
        broadcast_interval: Duration::from_millis(200),
        ..P2pConfig::default()
    };
    let sender = manager(config.clone());
    let receiver = manager(config);

    let listening =
        tokio::spawn(async move { receiver.discover_peers(Duration::from_secs(2)).await });
    let session = sender.start_send(&file).await.unwrap();

    let peers = listening.await.unwrap().unwrap();
    assert!(peers.iter().any(|p| p.code == session.code));
    sender.stop_transfer().await;
}
