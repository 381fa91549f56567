//! Prints watcher log lines to the daemon's stdout.

use anyhow::Result;
use std::io::Write;
use twd_core::notify::{LogLevel, Observer, StatusSnapshot};

pub struct ConsoleObserver;

impl Observer for ConsoleObserver {
    fn log_line(&self, level: LogLevel, message: &str) -> Result<()> {
        if level == LogLevel::Debug {
            return Ok(());
        }
        let mut out = std::io::stdout().lock();
        writeln!(out, "[{}] {}", level.as_str(), message)?;
        Ok(())
    }

    fn snapshot(&self, status: &StatusSnapshot) -> Result<()> {
        tracing::trace!(
            threads = status.threads.len(),
            running = status.is_running,
            "status snapshot"
        );
        Ok(())
    }
}
