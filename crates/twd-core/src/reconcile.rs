//! Reconciliation: rebuild thread progress from the history ledger.

use std::sync::atomic::Ordering;
use std::sync::PoisonError;

use tokio::time::Instant;

use crate::registry::ThreadId;
use crate::retry::FetchError;
use crate::watcher::Watcher;

/// Clears the resume re-entrancy flag on every exit path.
struct ResumeGuard<'a>(&'a Watcher);

impl Drop for ResumeGuard<'_> {
    fn drop(&mut self) {
        self.0.inner.resume.in_progress.store(false, Ordering::SeqCst);
    }
}

impl Watcher {
    /// Re-syncs every active, non-errored, open thread against upstream and
    /// the ledger, then hands off to the scheduler.
    pub async fn resume_active(&self) {
        let n = &self.inner.notifier;
        if !self.is_running() {
            n.info("Resume: not running, skipping.");
            return;
        }
        let ids: Vec<ThreadId> = self
            .inner
            .registry
            .all()
            .into_iter()
            .filter(|t| t.is_active_eligible())
            .map(|t| t.id)
            .collect();
        if ids.is_empty() {
            n.info("Resume: no active, non-error, non-closed threads to process.");
            return;
        }

        n.info(&format!("Resume: checking state for {} active threads...", ids.len()));
        for id in ids {
            self.reconcile_thread(id).await;
        }
        n.info("Resume: finished state sync.");
        self.request_refresh();
        self.kick();
    }

    async fn reconcile_thread(&self, id: ThreadId) {
        let n = &self.inner.notifier;
        let Some(thread) = self.inner.registry.find(id) else {
            return;
        };
        if !thread.is_active_eligible() {
            return;
        }
        tracing::debug!(thread_id = id, "syncing thread state");

        let snapshot = match self.fetch_thread(&thread.url).await {
            Ok(s) => s,
            Err(FetchError::Stopped) => return,
            Err(e) => {
                n.error(&format!(
                    "Failed to sync state for thread \"{}\" ({}) on resume: {}",
                    thread.title, id, e
                ));
                self.inner.registry.update(id, |t| t.fail());
                self.persist_threads().await;
                return;
            }
        };

        if snapshot.is_closed_or_archived() {
            n.info(&format!(
                "Thread \"{}\" ({}) resume check: Thread now {}. Closing locally.",
                thread.title,
                id,
                snapshot.terminal_state()
            ));
            self.inner.registry.update(id, |t| t.close());
            self.inner.timers.clear(id);
            self.persist_threads().await;
            return;
        }

        let total = snapshot.total_children();
        let rebuilt = self.inner.ledger.entries_for_thread(id);
        let Some((old_count, old_size, count, size)) = self.inner.registry.update(id, |t| {
            let old = (t.downloaded_count(), t.skipped().len());
            t.set_total_children(total);
            t.replace_skipped(rebuilt);
            t.error = false;
            (old.0, old.1, t.downloaded_count(), t.skipped().len())
        }) else {
            return;
        };
        if old_count != count || old_size != size {
            n.info(&format!(
                "Synced state for thread \"{}\" ({}): Count {} -> {}, Skipped Set Size {} -> {}, Total Images: {}",
                thread.title, id, old_count, count, old_size, size, total
            ));
        }
        self.persist_threads().await;

        if total > 0 && count >= total {
            self.inner.timers.start_if_absent(id);
        } else {
            self.inner.timers.clear(id);
        }
    }

    /// Bulk resume: activates paused, eligible threads up to the free
    /// capacity, then reconciles. Throttled by a cooldown and a re-entrancy
    /// flag. Returns whether any thread was activated.
    pub async fn resume_all(&self) -> bool {
        let n = &self.inner.notifier;
        let resume = &self.inner.resume;
        {
            let mut last = resume.last.lock().unwrap_or_else(PoisonError::into_inner);
            let cooling = last.is_some_and(|t| t.elapsed() < self.inner.cfg.resume_cooldown());
            if cooling || resume.in_progress.swap(true, Ordering::SeqCst) {
                n.debug("Resume all throttled.");
                return false;
            }
            *last = Some(Instant::now());
        }
        let _guard = ResumeGuard(self);

        let registry = &self.inner.registry;
        let paused: Vec<ThreadId> = registry
            .all()
            .into_iter()
            .filter(|t| !t.active && !t.error && !t.closed)
            .map(|t| t.id)
            .collect();
        let active = registry.active_eligible_count();
        let cap = self.inner.cfg.max_concurrent;

        if paused.is_empty() {
            n.info("Resume All: No paused, non-error, non-closed threads to resume.");
            self.set_running(active > 0);
            self.persist_running().await;
            return false;
        }

        let mut slots = cap.saturating_sub(active);
        n.info(&format!("Attempting to resume up to {} threads initially...", slots));
        self.set_running(true);
        self.persist_running().await;

        let mut resumed = 0usize;
        for id in paused {
            if slots == 0 {
                n.info(&format!(
                    "Resume All: Reached max concurrent threads ({}). Remaining threads kept paused.",
                    cap
                ));
                break;
            }
            let title = registry.update(id, |t| {
                t.active = true;
                t.error = false;
                t.title.clone()
            });
            if let Some(title) = title {
                n.info(&format!("Resuming thread \"{}\" ({})", title, id));
                resumed += 1;
                slots -= 1;
            }
        }

        if resumed > 0 {
            self.persist_threads().await;
            n.info(&format!(
                "Resumed {} threads. Triggering sync and processing...",
                resumed
            ));
            self.resume_active().await;
        } else {
            n.info("Resume All: No threads were actually resumed (limit reached or none eligible).");
        }
        self.request_refresh();
        resumed > 0
    }

    /// Rebuilds every thread's skip set as the union of the ledger-derived
    /// names and the current set. Returns how many threads changed.
    pub async fn sync_counts(&self) -> usize {
        let n = &self.inner.notifier;
        let mut changed = Vec::new();
        for thread in self.inner.registry.all() {
            let from_ledger = self.inner.ledger.entries_for_thread(thread.id);
            let before = (thread.downloaded_count(), thread.skipped().len());
            let after = self.inner.registry.update(thread.id, |t| {
                t.merge_skipped(from_ledger);
                (t.downloaded_count(), t.skipped().len())
            });
            if let Some(after) = after.filter(|a| *a != before) {
                changed.push(format!(
                    "Manual Sync: Thread \"{}\" ({}) count {}->{}, skipped {}->{} (Total: {})",
                    thread.title,
                    thread.id,
                    before.0,
                    after.0,
                    before.1,
                    after.1,
                    thread.total_children()
                ));
            }
        }
        if changed.is_empty() {
            n.info("Manual Sync: No count discrepancies found.");
        } else {
            for line in &changed {
                n.info(line);
            }
            self.persist_threads().await;
        }
        changed.len()
    }
}
