//! `twd status` – show watched threads and progress.

use anyhow::{bail, Result};
use twd_core::control::{default_control_socket_path, ControlRequest, ControlResponse};
use twd_core::notify::StatusSnapshot;
use twd_core::registry::ThreadRecord;

use crate::cli::control_socket;

pub async fn run_status() -> Result<()> {
    let path = default_control_socket_path()?;
    match control_socket::send_request(&path, &ControlRequest::GetStatus).await? {
        ControlResponse::Status { status } => print!("{}", render(&status)),
        ControlResponse::Error { message } => bail!("{}", message),
        other => bail!("unexpected response: {:?}", other),
    }
    Ok(())
}

fn state_label(t: &ThreadRecord) -> &'static str {
    if t.closed {
        "closed"
    } else if t.error {
        "error"
    } else if t.active {
        "active"
    } else {
        "paused"
    }
}

pub(crate) fn render(status: &StatusSnapshot) -> String {
    let mut out = format!(
        "running: {}  tracked downloads: {}\n",
        if status.is_running { "yes" } else { "no" },
        status.tracked_downloads
    );
    if status.threads.is_empty() {
        out.push_str("No watched threads.\n");
        return out;
    }
    out.push_str(&format!(
        "{:<10} {:<6} {:<8} {:<9} {}\n",
        "ID", "BOARD", "STATE", "PROGRESS", "TITLE"
    ));
    for t in &status.threads {
        out.push_str(&format!(
            "{:<10} {:<6} {:<8} {:<9} {}\n",
            t.id,
            t.board,
            state_label(t),
            format!("{}/{}", t.downloaded_count, t.total_children),
            t.title
        ));
    }
    out
}
