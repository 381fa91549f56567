//! Async retry loop: run an operation until success, the budget runs out, or
//! the process starts shutting down.

use std::future::Future;

use super::error::FetchError;
use super::policy::{RetryDecision, RetryPolicy};

/// Runs `op` until it succeeds or the retry policy says to stop. Sleeps for
/// the backoff between attempts. `should_abort` is consulted before every
/// attempt and after every wait; when it returns true the loop ends with
/// [`FetchError::Stopped`]. The last attempt's error is returned on exhaustion.
pub async fn run_with_retry<T, A, F, Fut>(
    policy: &RetryPolicy,
    label: &str,
    should_abort: A,
    mut op: F,
) -> Result<T, FetchError>
where
    A: Fn() -> bool,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, FetchError>>,
{
    let mut attempt = 1u32;
    loop {
        if should_abort() {
            return Err(FetchError::Stopped);
        }
        match op().await {
            Ok(v) => return Ok(v),
            Err(e) => {
                tracing::warn!(
                    attempt,
                    max_attempts = policy.max_attempts,
                    "fetch failed for {}: {}",
                    label,
                    e
                );
                match policy.decide(attempt) {
                    RetryDecision::NoRetry => {
                        tracing::error!("max retries reached for {}, giving up fetch", label);
                        return Err(e);
                    }
                    RetryDecision::RetryAfter(d) => {
                        tokio::time::sleep(d).await;
                        attempt += 1;
                    }
                }
            }
        }
    }
}
