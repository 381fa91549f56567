//! Upstream fetches with the shared retry budget.

use serde_json::Value;

use crate::catalog::ThreadSnapshot;
use crate::retry::{run_with_retry, FetchError};
use crate::watcher::Watcher;

impl Watcher {
    /// GET `url` as JSON, retried per the configured policy. Gives up early
    /// with [`FetchError::Stopped`] once shutdown has begun.
    pub(crate) async fn fetch_json(&self, url: &str) -> Result<Value, FetchError> {
        let catalog = self.inner.catalog.as_ref();
        run_with_retry(
            &self.inner.retry,
            url,
            || self.shutting_down(),
            || async move { catalog.get_json(url).await },
        )
        .await
    }

    /// Fetches and parses a thread document. A malformed document counts as
    /// a failed attempt.
    pub(crate) async fn fetch_thread(&self, url: &str) -> Result<ThreadSnapshot, FetchError> {
        let catalog = self.inner.catalog.as_ref();
        run_with_retry(
            &self.inner.retry,
            url,
            || self.shutting_down(),
            || async move {
                let v = catalog.get_json(url).await?;
                ThreadSnapshot::from_json(&v)
            },
        )
        .await
    }
}
