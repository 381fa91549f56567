//! Fetch error type returned by catalog clients and the retry loop.

use thiserror::Error;

/// Failure of a single JSON fetch. HTTP-level and parse-level failures are
/// kept apart so callers can tell a dead server from a changed payload.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Response had a non-2xx status.
    #[error("HTTP {0}")]
    Http(u32),
    /// Connection, DNS, timeout or other transport failure.
    #[error("transport: {0}")]
    Transport(String),
    /// Body was not the JSON shape we expected.
    #[error("malformed payload: {0}")]
    Malformed(String),
    /// The process is shutting down; no further attempts are made.
    #[error("process stopped during fetch")]
    Stopped,
}

impl From<curl::Error> for FetchError {
    fn from(e: curl::Error) -> Self {
        FetchError::Transport(e.to_string())
    }
}

impl From<serde_json::Error> for FetchError {
    fn from(e: serde_json::Error) -> Self {
        FetchError::Malformed(e.to_string())
    }
}
