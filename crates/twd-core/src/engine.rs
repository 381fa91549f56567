//! Download engine: materialize one child image exactly once.

use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;

use crate::locks::lock_key;
use crate::registry::ThreadId;
use crate::retry::RetryDecision;
use crate::transfer::{CollisionPolicy, TransferEvent, TransferId};
use crate::url_model::{child_path, filename_from_url_path, parse_duplicate_path, DEFAULT_FILENAME};
use crate::watcher::Watcher;

/// Result of [`Watcher::materialize`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MaterializeOutcome {
    /// The child is present (now or from before).
    pub succeeded: bool,
    /// This call moved the bytes.
    pub newly_downloaded: bool,
}

impl MaterializeOutcome {
    const FAILED: Self = Self {
        succeeded: false,
        newly_downloaded: false,
    };
    const ALREADY_DONE: Self = Self {
        succeeded: true,
        newly_downloaded: false,
    };
    const DOWNLOADED: Self = Self {
        succeeded: true,
        newly_downloaded: true,
    };
}

enum AttemptError {
    Begin(String),
    Interrupted(String),
    TimedOut,
}

impl std::fmt::Display for AttemptError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AttemptError::Begin(e) => write!(f, "download initiation failed: {}", e),
            AttemptError::Interrupted(reason) => write!(f, "download interrupted: {}", reason),
            AttemptError::TimedOut => write!(f, "download timed out"),
        }
    }
}

/// Waits for the terminal event of `id`.
async fn wait_for_outcome(
    rx: &mut broadcast::Receiver<TransferEvent>,
    id: TransferId,
) -> Result<(), AttemptError> {
    loop {
        match rx.recv().await {
            Ok(TransferEvent::Complete { id: done }) if done == id => return Ok(()),
            Ok(TransferEvent::Interrupted { id: done, reason }) if done == id => {
                return Err(AttemptError::Interrupted(reason))
            }
            Ok(_) => {}
            Err(RecvError::Lagged(n)) => {
                tracing::warn!(transfer = %id, skipped = n, "transfer event receiver lagged");
            }
            Err(RecvError::Closed) => {
                return Err(AttemptError::Interrupted("event channel closed".into()))
            }
        }
    }
}

impl Watcher {
    /// True while the process runs and the thread is still active.
    pub(crate) fn may_continue(&self, thread_id: ThreadId) -> bool {
        self.is_running() && !self.shutting_down() && self.thread_active(thread_id)
    }

    /// Downloads `url` for `thread_id` under the attribution `label`, unless
    /// the ledger or the thread's skip set says it is already done.
    pub async fn materialize(
        &self,
        url: &str,
        thread_id: ThreadId,
        label: Option<&str>,
    ) -> MaterializeOutcome {
        if !self.inner.registry.contains(thread_id) {
            self.inner
                .notifier
                .error(&format!("Thread {} not found for {}", thread_id, url));
            return MaterializeOutcome::FAILED;
        }

        let raw_name = filename_from_url_path(url).unwrap_or_else(|| DEFAULT_FILENAME.to_string());
        let path = child_path(&self.download_root(), thread_id, label, &raw_name);
        let filename = path.rsplit('/').next().unwrap_or(DEFAULT_FILENAME).to_string();
        let key = lock_key(thread_id, &filename);

        let _lock = self.inner.locks.acquire(&key).await;

        // Some(newly_marked) when the child is already done.
        let in_ledger = self.inner.ledger.contains(&path);
        let known = self.inner.registry.update(thread_id, |t| {
            if t.is_skipped(&filename) {
                Some(false)
            } else if in_ledger {
                t.mark_skipped(&filename);
                Some(true)
            } else {
                None
            }
        });
        match known {
            None => return MaterializeOutcome::FAILED,
            Some(Some(newly_marked)) => {
                if newly_marked {
                    self.persist_threads().await;
                }
                return MaterializeOutcome::ALREADY_DONE;
            }
            Some(None) => {}
        }

        if !self.thread_active(thread_id) {
            return MaterializeOutcome::FAILED;
        }

        let policy = &self.inner.retry;
        let mut attempt = 1u32;
        loop {
            if !self.may_continue(thread_id) {
                tracing::debug!(thread_id, %filename, "process or thread stopped before download attempt");
                return MaterializeOutcome::FAILED;
            }
            if self.inner.ledger.contains(&path) {
                self.mark_done(thread_id, &filename).await;
                return MaterializeOutcome::ALREADY_DONE;
            }

            match self.attempt_transfer(url, &path, &key, thread_id).await {
                Ok(()) => {
                    let evicted = self.inner.ledger.record(&path, thread_id);
                    for old in evicted {
                        self.inner.notifier.info(&format!(
                            "Removed oldest entry ({}) from download history to maintain size limit",
                            old
                        ));
                    }
                    self.inner.registry.update(thread_id, |t| t.mark_skipped(&filename));
                    self.persist_history().await;
                    self.persist_threads().await;
                    self.inner.notifier.success(&format!(
                        "Successfully downloaded {} to {} for thread {}",
                        filename, path, thread_id
                    ));
                    return MaterializeOutcome::DOWNLOADED;
                }
                Err(e) => {
                    self.inner.notifier.warn(&format!(
                        "Download attempt {}/{} failed for {}: {}",
                        attempt, policy.max_attempts, url, e
                    ));
                }
            }

            match policy.decide(attempt) {
                RetryDecision::NoRetry => {
                    self.inner.notifier.error(&format!(
                        "Max retries reached for {}, marking as failed for this run",
                        url
                    ));
                    return MaterializeOutcome::FAILED;
                }
                RetryDecision::RetryAfter(wait) => {
                    tokio::time::sleep(wait).await;
                    if !self.may_continue(thread_id) {
                        self.inner.notifier.warn(&format!(
                            "Stopping retries for {} as thread {} or process became inactive during wait",
                            filename, thread_id
                        ));
                        return MaterializeOutcome::FAILED;
                    }
                    attempt += 1;
                }
            }
        }
    }

    async fn mark_done(&self, thread_id: ThreadId, filename: &str) {
        if self
            .inner
            .registry
            .update(thread_id, |t| t.mark_skipped(filename))
            .unwrap_or(false)
        {
            self.persist_threads().await;
        }
    }

    /// One transfer attempt, bounded by the transfer timeout. The attempt is
    /// registered for forcible cancellation while it runs.
    async fn attempt_transfer(
        &self,
        url: &str,
        path: &str,
        key: &str,
        thread_id: ThreadId,
    ) -> Result<(), AttemptError> {
        let transfers = &self.inner.transfers;
        let mut rx = transfers.subscribe();
        let id = transfers
            .begin(url, path, CollisionPolicy::Uniquify)
            .await
            .map_err(|e| AttemptError::Begin(e.to_string()))?;
        self.inner.active.register_transfer(key, thread_id, id);

        let timeout = self.inner.cfg.transfer_timeout();
        let result = match tokio::time::timeout(timeout, wait_for_outcome(&mut rx, id)).await {
            Ok(r) => r,
            Err(_) => {
                self.inner.notifier.warn(&format!(
                    "Download timed out for {} (ID: {}) after {}ms",
                    path,
                    id,
                    timeout.as_millis()
                ));
                if let Err(e) = transfers.cancel(id).await {
                    tracing::debug!(transfer = %id, "cancel after timeout failed: {}", e);
                }
                Err(AttemptError::TimedOut)
            }
        };
        self.inner.active.unregister_transfer(key);
        if result.is_err() {
            if let Err(e) = transfers.erase(id).await {
                tracing::debug!(transfer = %id, "erase after failed attempt: {}", e);
            }
        }
        result
    }

    pub(crate) fn spawn_duplicate_watcher(&self) -> JoinHandle<()> {
        let w = self.clone();
        let mut rx = self.inner.transfers.subscribe();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(TransferEvent::Created { id, path }) => {
                        w.reconcile_duplicate(id, &path).await;
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(n)) => {
                        tracing::warn!(skipped = n, "duplicate watcher lagged behind transfer events");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }

    /// Cancels a collision-renamed transfer whose canonical file is already
    /// in the ledger and marks the canonical name skipped. Returns whether
    /// the transfer was reconciled.
    pub async fn reconcile_duplicate(&self, id: TransferId, path: &str) -> bool {
        let Some(dup) = parse_duplicate_path(path) else {
            return false;
        };
        if !self.inner.ledger.contains(&dup.canonical_path) {
            return false;
        }
        let n = &self.inner.notifier;
        n.warn(&format!(
            "Duplicate download detected: {} (canonical {} already downloaded). Cancelling.",
            path, dup.canonical_path
        ));
        if let Err(e) = self.inner.transfers.cancel(id).await {
            n.error(&format!("Error cancelling duplicate download {}: {}", id, e));
            return false;
        }
        if let Err(e) = self.inner.transfers.erase(id).await {
            tracing::debug!(transfer = %id, "erase of duplicate failed: {}", e);
        }

        if self
            .inner
            .registry
            .update(dup.thread_id, |t| t.mark_skipped(&dup.base_filename))
            .unwrap_or(false)
        {
            n.info(&format!(
                "Marked {} as skipped for thread {} after duplicate cleanup",
                dup.base_filename, dup.thread_id
            ));
            self.persist_threads().await;
        }
        true
    }
}
