//! Logging setup for the daemon and the CLI.
//!
//! Lines go to `twd.log` in the XDG state dir (`~/.local/state/twd/`). If the
//! file cannot be opened the caller falls back to [`init_logging_stderr`].
//! `RUST_LOG` overrides the default filter.

use anyhow::{Context, Result};
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "info,twd=debug,twd_core=debug";
const LOG_FILE: &str = "twd.log";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Location of the log file. Creates the state directory if needed.
pub fn log_file_path() -> Result<PathBuf> {
    let dir = xdg::BaseDirectories::with_prefix("twd")?.get_state_home();
    fs::create_dir_all(&dir).with_context(|| format!("create log dir {}", dir.display()))?;
    Ok(dir.join(LOG_FILE))
}

fn open_append(path: &Path) -> Result<File> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("open log file {}", path.display()))
}

/// Installs the global subscriber writing to the log file. Returns the file
/// path. Fails if the file cannot be opened or a subscriber is already set.
pub fn init_logging() -> Result<PathBuf> {
    let path = log_file_path()?;
    let file = open_append(&path)?;

    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!("install subscriber: {}", e))?;

    tracing::info!("twd logging initialized at {}", path.display());
    Ok(path)
}

/// Stderr-only logging, for when [`init_logging`] fails.
pub fn init_logging_stderr() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(std::io::stderr)
        .try_init();
}
