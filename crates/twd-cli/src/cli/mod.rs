//! CLI for the TWD thread watcher.
//!
//! `twd run` hosts the watcher; every other command is a request sent to the
//! running daemon over its control socket.

mod commands;
mod control_socket;
mod observer;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use twd_core::config;
use twd_core::control::ControlRequest;

use commands::{run_daemon, run_request, run_status};

/// Top-level CLI for the TWD thread watcher.
#[derive(Debug, Parser)]
#[command(name = "twd")]
#[command(about = "TWD: watch board threads and download every image once", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Run the watcher daemon until Ctrl-C.
    Run {
        /// Directory downloads are written below (default: config, then current directory).
        #[arg(long, value_name = "DIR")]
        download_dir: Option<PathBuf>,
    },

    /// Start watching threads on a board, by catalog search or by thread id.
    Start {
        /// Board short name, e.g. "wg".
        board: String,

        /// Case-insensitive regex matched against thread subjects and bodies.
        #[arg(
            long,
            value_name = "REGEX",
            conflicts_with = "thread_id",
            required_unless_present = "thread_id"
        )]
        search: Option<String>,

        /// Watch this one thread instead of searching the catalog.
        #[arg(long, value_name = "ID")]
        thread_id: Option<u64>,

        /// Folder below the download directory.
        #[arg(long, value_name = "PATH")]
        dest: Option<String>,
    },

    /// Pause every active thread.
    Stop,

    /// Resume paused threads up to the concurrency cap.
    ResumeAll,

    /// Pause an active thread or resume a paused one.
    Toggle {
        /// Thread number.
        id: u64,
    },

    /// Mark a thread closed; it will not be watched again.
    Close {
        /// Thread number.
        id: u64,
    },

    /// Drop a thread from the watch list (its download history is kept).
    Remove {
        /// Thread number.
        id: u64,
    },

    /// Forget which images of a thread were downloaded.
    Forget {
        /// Thread number.
        id: u64,
    },

    /// Forget the whole download history.
    ForgetAll,

    /// Show watched threads and progress.
    Status,

    /// Show the last search parameters.
    LastSearch,

    /// Rebuild per-thread counts from the download history.
    SyncCounts,
}

impl CliCommand {
    /// The control request this command sends to the daemon. `None` for
    /// commands that run locally.
    pub fn into_request(self) -> Option<ControlRequest> {
        let req = match self {
            CliCommand::Run { .. } => return None,
            CliCommand::Start {
                board,
                search,
                thread_id,
                dest,
            } => ControlRequest::Start {
                board,
                search_term: search,
                thread_id,
                download_path: dest,
            },
            CliCommand::Stop => ControlRequest::Stop,
            CliCommand::ResumeAll => ControlRequest::ResumeAll,
            CliCommand::Toggle { id } => ControlRequest::Toggle { id },
            CliCommand::Close { id } => ControlRequest::Close { id },
            CliCommand::Remove { id } => ControlRequest::Remove { id },
            CliCommand::Forget { id } => ControlRequest::ForgetHistory { id },
            CliCommand::ForgetAll => ControlRequest::ForgetAllHistory,
            CliCommand::Status => ControlRequest::GetStatus,
            CliCommand::LastSearch => ControlRequest::GetLastSearchParams,
            CliCommand::SyncCounts => ControlRequest::SyncCounts,
        };
        Some(req)
    }

    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();
        let cfg = config::load_or_init()?;
        tracing::debug!("loaded config: {:?}", cfg);

        match cli.command {
            CliCommand::Run { download_dir } => {
                let download_dir = match download_dir.or_else(|| cfg.download_dir.clone()) {
                    Some(dir) => dir,
                    None => std::env::current_dir()?,
                };
                run_daemon(cfg, download_dir).await?;
            }
            CliCommand::Status => run_status().await?,
            command => {
                if let Some(req) = command.into_request() {
                    run_request(req).await?;
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests;
