//! Retry and backoff policy.
//!
//! Shared by catalog/thread fetches and by the per-image transfer loop so both
//! use the same attempt budget and linear backoff.

mod error;
mod policy;
mod run;

pub use error::FetchError;
pub use policy::{RetryDecision, RetryPolicy};
pub use run::run_with_retry;
