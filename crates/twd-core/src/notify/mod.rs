//! Observer side channel: log lines and coalesced status snapshots.
//!
//! Nothing here is a correctness dependency. Observer failures are swallowed
//! and snapshot pushes are debounced.

mod debounce;
mod notifier;

pub use debounce::Debouncer;
pub use notifier::Notifier;

use serde::{Deserialize, Serialize};

use crate::registry::ThreadRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Success,
    Warning,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Success => "success",
            LogLevel::Warning => "warning",
            LogLevel::Error => "error",
        }
    }
}

/// Full state pushed to observers and returned by `get_status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub is_running: bool,
    pub threads: Vec<ThreadRecord>,
    /// History ledger size.
    pub tracked_downloads: usize,
    /// Unix ms of the next scheduled tick, if the loop is running.
    pub next_tick_ms: Option<i64>,
}

/// Receiver of log lines and snapshots (a console, a socket client, a test).
pub trait Observer: Send + Sync {
    fn log_line(&self, level: LogLevel, message: &str) -> anyhow::Result<()>;
    fn snapshot(&self, status: &StatusSnapshot) -> anyhow::Result<()>;
}
