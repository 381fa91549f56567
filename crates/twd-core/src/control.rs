//! Command surface: one JSON request, one JSON response.
//!
//! Front ends (the CLI control socket, tests) decode a [`ControlRequest`] and
//! hand it to [`Watcher::handle`]. `start` and `resume_all` answer once their
//! admission/reconciliation step is done; downloads continue in the
//! background.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::discovery::SearchParams;
use crate::notify::StatusSnapshot;
use crate::registry::ThreadId;
use crate::watcher::Watcher;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlRequest {
    Start {
        board: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        search_term: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        thread_id: Option<ThreadId>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        download_path: Option<String>,
    },
    Stop,
    ResumeAll,
    Toggle { id: ThreadId },
    Close { id: ThreadId },
    Remove { id: ThreadId },
    ForgetHistory { id: ThreadId },
    ForgetAllHistory,
    GetStatus,
    GetLastSearchParams,
    SyncCounts,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlResponse {
    Ack {
        success: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    Status {
        status: StatusSnapshot,
    },
    SearchParams {
        params: SearchParams,
    },
    Error {
        message: String,
    },
}

impl ControlResponse {
    fn ok() -> Self {
        ControlResponse::Ack {
            success: true,
            message: None,
        }
    }

    fn ack(success: bool, message: impl Into<String>) -> Self {
        ControlResponse::Ack {
            success,
            message: Some(message.into()),
        }
    }
}

/// Default path for the control socket (same XDG state dir as the DB).
pub fn default_control_socket_path() -> std::io::Result<PathBuf> {
    let dir = xdg::BaseDirectories::with_prefix("twd")?.get_state_home();
    Ok(dir.join("control.sock"))
}

impl Watcher {
    /// Executes one command.
    pub async fn handle(&self, req: ControlRequest) -> ControlResponse {
        tracing::debug!(?req, "control request");
        match req {
            ControlRequest::Start {
                board,
                search_term,
                thread_id,
                download_path,
            } => match self
                .start(
                    &board,
                    search_term.as_deref(),
                    thread_id,
                    download_path.as_deref(),
                )
                .await
            {
                Ok(()) => ControlResponse::ok(),
                Err(e) => ControlResponse::Error {
                    message: e.to_string(),
                },
            },
            ControlRequest::Stop => {
                self.stop().await;
                ControlResponse::ok()
            }
            ControlRequest::ResumeAll => {
                let resumed = self.resume_all().await;
                ControlResponse::Ack {
                    success: resumed,
                    message: None,
                }
            }
            ControlRequest::Toggle { id } => match self.toggle(id).await {
                Ok(true) => ControlResponse::ack(true, format!("thread {} active", id)),
                Ok(false) => ControlResponse::ack(true, format!("thread {} inactive", id)),
                Err(e) => ControlResponse::Error {
                    message: e.to_string(),
                },
            },
            ControlRequest::Close { id } => self.close(id).await.into(),
            ControlRequest::Remove { id } => self.remove(id).await.into(),
            ControlRequest::ForgetHistory { id } => self.forget_history(id).await.into(),
            ControlRequest::ForgetAllHistory => {
                self.forget_all_history().await;
                ControlResponse::ok()
            }
            ControlRequest::GetStatus => ControlResponse::Status {
                status: self.status(),
            },
            ControlRequest::GetLastSearchParams => ControlResponse::SearchParams {
                params: self.last_search_params(),
            },
            ControlRequest::SyncCounts => {
                let changed = self.sync_counts().await;
                ControlResponse::ack(true, format!("{} threads updated", changed))
            }
        }
    }
}

impl From<Result<(), crate::WatchError>> for ControlResponse {
    fn from(r: Result<(), crate::WatchError>) -> Self {
        match r {
            Ok(()) => ControlResponse::ok(),
            Err(e) => ControlResponse::Error {
                message: e.to_string(),
            },
        }
    }
}
