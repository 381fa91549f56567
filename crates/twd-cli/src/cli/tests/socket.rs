//! Control socket round trip against an in-memory watcher, and status output.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use twd_core::catalog::CurlCatalogClient;
use twd_core::config::TwdConfig;
use twd_core::control::{ControlRequest, ControlResponse};
use twd_core::notify::StatusSnapshot;
use twd_core::registry::ThreadRecord;
use twd_core::store::MemoryKvStore;
use twd_core::transfer::CurlTransferManager;
use twd_core::{Collaborators, Watcher};

use crate::cli::commands::status::render;
use crate::cli::control_socket::{send_request, spawn_control_listener};

fn watcher(dir: &std::path::Path) -> Watcher {
    Watcher::new(
        TwdConfig::default(),
        Collaborators {
            catalog: Arc::new(CurlCatalogClient::new(Duration::from_secs(1))),
            transfers: Arc::new(CurlTransferManager::new(dir, Duration::from_secs(1))),
            store: Arc::new(MemoryKvStore::new()),
        },
    )
}

#[tokio::test]
async fn requests_round_trip_over_the_socket() {
    let tmp = tempfile::tempdir().unwrap();
    let w = watcher(tmp.path());
    w.initialize().await.unwrap();
    let path = tmp.path().join("run/control.sock");
    let server = spawn_control_listener(w, &path).unwrap();

    match send_request(&path, &ControlRequest::GetLastSearchParams).await.unwrap() {
        ControlResponse::SearchParams { params } => {
            assert_eq!(params.download_path, "twd_downloads")
        }
        other => panic!("unexpected response {:?}", other),
    }
    match send_request(&path, &ControlRequest::Toggle { id: 5 }).await.unwrap() {
        ControlResponse::Error { message } => assert!(message.contains("not found")),
        other => panic!("unexpected response {:?}", other),
    }

    // Garbage gets an error line, and the connection stays usable.
    let stream = tokio::net::UnixStream::connect(&path).await.unwrap();
    let (read, mut write) = stream.into_split();
    write.write_all(b"not json\n{\"type\":\"get_status\"}\n").await.unwrap();
    let mut lines = BufReader::new(read).lines();
    let first: serde_json::Value =
        serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
    assert_eq!(first["type"], "error");
    let second: serde_json::Value =
        serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
    assert_eq!(second["type"], "status");

    server.abort();
}

#[tokio::test]
async fn missing_socket_means_daemon_not_running() {
    let tmp = tempfile::tempdir().unwrap();
    let err = send_request(&tmp.path().join("nope.sock"), &ControlRequest::Stop)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("not running"));
}

#[test]
fn status_table_lists_threads() {
    let status = StatusSnapshot {
        is_running: true,
        threads: vec![ThreadRecord {
            id: 99,
            board: "wg".into(),
            title: "Walls".into(),
            time: 0,
            url: String::new(),
            active: false,
            closed: false,
            error: true,
            total_children: 4,
            downloaded_count: 1,
            skipped: vec!["a.jpg".into()],
        }],
        tracked_downloads: 12,
        next_tick_ms: None,
    };
    let out = render(&status);
    assert!(out.starts_with("running: yes  tracked downloads: 12\n"));
    let row = out.lines().last().unwrap();
    assert!(row.starts_with("99"));
    assert!(row.contains("error"));
    assert!(row.contains("1/4"));
    assert!(row.ends_with("Walls"));

    let empty = StatusSnapshot {
        is_running: false,
        threads: Vec::new(),
        tracked_downloads: 0,
        next_tick_ms: None,
    };
    assert!(render(&empty).contains("No watched threads."));
}
