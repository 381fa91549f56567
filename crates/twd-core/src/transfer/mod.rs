//! Transfer manager: the byte-moving collaborator.
//!
//! A transfer is started with [`TransferManager::begin`] and reports its fate
//! asynchronously on a broadcast channel. Subscribe before calling `begin` so
//! no event for the new id can be missed.

mod curl_manager;
mod fetch;
mod search;
mod uniquify;

pub use curl_manager::CurlTransferManager;
pub use uniquify::numbered_name;

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::broadcast;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TransferId(pub u64);

impl std::fmt::Display for TransferId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What to do when the destination already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollisionPolicy {
    /// Write to `stem (n).ext` with the first free `n`.
    Uniquify,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferEvent {
    /// Destination chosen; `path` is relative to the download directory and
    /// reflects any collision rename.
    Created { id: TransferId, path: String },
    Complete { id: TransferId },
    Interrupted { id: TransferId, reason: String },
}

impl TransferEvent {
    pub fn id(&self) -> TransferId {
        match self {
            TransferEvent::Created { id, .. }
            | TransferEvent::Complete { id }
            | TransferEvent::Interrupted { id, .. } => *id,
        }
    }
}

#[derive(Debug, Error)]
pub enum TransferError {
    #[error("could not start transfer: {0}")]
    Begin(String),
    #[error("unknown transfer {0}")]
    Unknown(TransferId),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[async_trait]
pub trait TransferManager: Send + Sync {
    async fn begin(
        &self,
        url: &str,
        relative_path: &str,
        policy: CollisionPolicy,
    ) -> Result<TransferId, TransferError>;

    fn subscribe(&self) -> broadcast::Receiver<TransferEvent>;

    /// Stops an in-flight transfer; it will report `Interrupted`.
    /// Has no effect on a finished transfer.
    async fn cancel(&self, id: TransferId) -> Result<(), TransferError>;

    /// Forgets the transfer and removes any partial artifact.
    async fn erase(&self, id: TransferId) -> Result<(), TransferError>;

    /// Relative paths of completed files matching `pattern`, at most `limit`.
    async fn search(&self, pattern: &Regex, limit: usize) -> Vec<String>;
}
