//! `twd run` – host the watcher until Ctrl-C.

use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;
use twd_core::catalog::CurlCatalogClient;
use twd_core::config::TwdConfig;
use twd_core::control::default_control_socket_path;
use twd_core::store::SqliteKvStore;
use twd_core::transfer::CurlTransferManager;
use twd_core::{Collaborators, Watcher};

use crate::cli::control_socket;
use crate::cli::observer::ConsoleObserver;

pub async fn run_daemon(cfg: TwdConfig, download_dir: PathBuf) -> Result<()> {
    let store = SqliteKvStore::open_default().await?;
    let transfers = CurlTransferManager::new(&download_dir, cfg.transfer_timeout());
    let watcher = Watcher::new(
        cfg,
        Collaborators {
            catalog: Arc::new(CurlCatalogClient::default()),
            transfers: Arc::new(transfers),
            store: Arc::new(store),
        },
    );
    watcher.attach_observer(Arc::new(ConsoleObserver));
    watcher.initialize().await?;

    let tasks = watcher.spawn_background();
    let socket_path = default_control_socket_path()?;
    let listener = control_socket::spawn_control_listener(watcher.clone(), &socket_path)?;
    tracing::debug!(path = %socket_path.display(), "control socket listening");
    println!(
        "twd running; downloads go below {} (Ctrl-C to quit)",
        download_dir.display()
    );

    tokio::signal::ctrl_c().await?;

    tracing::info!("shutting down");
    let cancelled = watcher.shutdown().await;
    tracing::debug!(cancelled, "in-flight transfers cancelled");
    tasks.shutdown();
    listener.abort();
    if let Err(e) = std::fs::remove_file(&socket_path) {
        tracing::debug!(path = %socket_path.display(), "remove control socket: {}", e);
    }
    println!("twd stopped");
    Ok(())
}
