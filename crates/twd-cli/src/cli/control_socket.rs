//! Control socket: server (during `twd run`) and client (every other command).
//! Protocol: one JSON [`ControlRequest`] per line, answered by one JSON
//! [`ControlResponse`] line.

use anyhow::{anyhow, bail, Context, Result};
use std::path::Path;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use twd_core::control::{ControlRequest, ControlResponse};
use twd_core::Watcher;

/// Spawns a task that listens on `path` and answers each request line with
/// `watcher.handle`. Malformed lines get an error response.
pub fn spawn_control_listener(
    watcher: Watcher,
    path: impl AsRef<Path>,
) -> Result<tokio::task::JoinHandle<()>> {
    let path = path.as_ref().to_path_buf();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let _ = std::fs::remove_file(&path);
    let listener = UnixListener::bind(&path)
        .with_context(|| format!("bind control socket {}", path.display()))?;

    let handle = tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((stream, _)) => {
                    let watcher = watcher.clone();
                    tokio::spawn(async move {
                        if let Err(e) = serve(watcher, stream).await {
                            tracing::debug!("control connection: {:#}", e);
                        }
                    });
                }
                Err(e) => tracing::debug!("control socket accept: {}", e),
            }
        }
    });
    Ok(handle)
}

async fn serve(watcher: Watcher, stream: UnixStream) -> Result<()> {
    let (read, mut write) = stream.into_split();
    let mut lines = BufReader::new(read).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let resp = match serde_json::from_str::<ControlRequest>(line) {
            Ok(req) => watcher.handle(req).await,
            Err(e) => ControlResponse::Error {
                message: format!("bad request: {}", e),
            },
        };
        let mut out = serde_json::to_string(&resp)?;
        out.push('\n');
        write.write_all(out.as_bytes()).await?;
    }
    Ok(())
}

/// Sends one request and waits for its response. Fails if no daemon is
/// listening at `socket_path`.
pub async fn send_request(socket_path: &Path, req: &ControlRequest) -> Result<ControlResponse> {
    if !socket_path.exists() {
        bail!(
            "twd is not running (no control socket at {}); start it with `twd run`",
            socket_path.display()
        );
    }
    let stream = UnixStream::connect(socket_path)
        .await
        .with_context(|| format!("connect to {}", socket_path.display()))?;
    let (read, mut write) = stream.into_split();

    let mut msg = serde_json::to_string(req)?;
    msg.push('\n');
    write.write_all(msg.as_bytes()).await?;

    let line = BufReader::new(read)
        .lines()
        .next_line()
        .await?
        .ok_or_else(|| anyhow!("daemon closed the connection without answering"))?;
    Ok(serde_json::from_str(&line)?)
}
