//! Error taxonomy for the watcher core.
//!
//! None of these are process-fatal: callers log them with context and move on
//! (pause the one thread, skip the one child, abort the one discovery pass).

use thiserror::Error;

use crate::registry::ThreadId;
use crate::retry::FetchError;

#[derive(Debug, Error)]
pub enum WatchError {
    /// Network or HTTP failure that survived the retry budget.
    #[error("fetch failed: {0}")]
    TransientFetch(String),
    /// Child transfer interrupted or timed out on every attempt.
    #[error("transfer failed: {0}")]
    TransferFailure(String),
    /// Catalog or thread document had an unexpected shape.
    #[error("malformed upstream data: {0}")]
    MalformedUpstreamData(String),
    /// Discovery filter is not a valid regular expression.
    #[error("invalid filter pattern {pattern:?}: {reason}")]
    InvalidFilterPattern { pattern: String, reason: String },
    /// Persisted state could not be interpreted.
    #[error("state corruption in {field}: {reason}")]
    StateCorruption { field: String, reason: String },
    /// No watched thread with this id.
    #[error("thread {0} not found")]
    NotFound(ThreadId),
    /// The start request named neither a search term nor a thread id.
    #[error("start requires a search term or a thread id")]
    MissingTarget,
    /// Key-value store failure.
    #[error("store: {0}")]
    Store(#[from] anyhow::Error),
}

impl From<FetchError> for WatchError {
    fn from(e: FetchError) -> Self {
        match e {
            FetchError::Malformed(reason) => WatchError::MalformedUpstreamData(reason),
            other => WatchError::TransientFetch(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_fetch_maps_to_malformed_upstream() {
        let e: WatchError = FetchError::Malformed("posts missing".into()).into();
        assert!(matches!(e, WatchError::MalformedUpstreamData(_)));
    }

    #[test]
    fn http_fetch_maps_to_transient() {
        let e: WatchError = FetchError::Http(503).into();
        assert!(matches!(e, WatchError::TransientFetch(ref s) if s.contains("503")));
    }
}
