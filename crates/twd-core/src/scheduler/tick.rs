use tokio::task::JoinSet;

use super::choose::{pick_eligible, timer_candidates};
use crate::registry::ThreadId;
use crate::retry::FetchError;
use crate::watcher::Watcher;

impl Watcher {
    /// One scheduling pass. Never fails: per-thread faults are logged and the
    /// pass completes.
    pub async fn tick(&self) {
        let n = &self.inner.notifier;
        if !self.is_initialized() {
            n.info("Scheduler: waiting for initialization.");
            return;
        }
        let registry = &self.inner.registry;
        let cap = self.inner.cfg.max_concurrent;

        let threshold = self.inner.cfg.stuck_threshold();
        for id in timer_candidates(&registry.all(), &self.inner.timers) {
            if self.inner.timers.is_expired(id, threshold) {
                self.check_expired(id).await;
            }
        }

        let slots = cap.saturating_sub(self.inner.active.processing_count());
        if slots == 0 {
            tracing::debug!(cap, "all processing slots busy");
            return;
        }

        let active = &self.inner.active;
        let picked = pick_eligible(&registry.all(), |id| active.is_processing(id), slots);
        let mut set = JoinSet::new();
        for id in picked {
            let Some(guard) = active.try_begin_processing(id, cap) else {
                continue;
            };
            let w = self.clone();
            set.spawn(async move { w.process_thread(guard).await });
        }
        while let Some(res) = set.join_next().await {
            if let Err(e) = res {
                n.error(&format!("Unhandled error during thread processing: {}", e));
            }
        }

        if registry.active_eligible_count() < cap && self.is_running() {
            self.check_for_new_threads().await;
        }

        let running = self.rederive_running().await;
        if !running && !registry.is_empty() {
            n.info("All watched threads are now inactive, paused, closed, or errored.");
        }
        self.request_refresh();
    }

    /// Stuck timer expired: re-fetch and decide between close and reopen.
    async fn check_expired(&self, id: ThreadId) {
        let n = &self.inner.notifier;
        let Some(thread) = self.inner.registry.find(id) else {
            self.inner.timers.clear(id);
            return;
        };
        n.info(&format!(
            "Thread \"{}\" ({}) timer expired. Checking for new images...",
            thread.title, id
        ));

        match self.fetch_thread(&thread.url).await {
            Ok(snap) if snap.is_closed_or_archived() => {
                n.info(&format!(
                    "Thread \"{}\" ({}) timer check: Thread now {} upstream. Closing locally.",
                    thread.title,
                    id,
                    snap.terminal_state()
                ));
                self.inner.registry.update(id, |t| t.close());
            }
            Ok(snap) if snap.total_children() > thread.total_children() => {
                let total = snap.total_children();
                n.info(&format!(
                    "Thread \"{}\" ({}) timer check: Found new images ({} -> {}). Re-activating processing.",
                    thread.title,
                    id,
                    thread.total_children(),
                    total
                ));
                self.inner.registry.update(id, |t| {
                    t.set_total_children(total);
                    t.active = true;
                    t.error = false;
                });
            }
            Ok(_) => {
                n.info(&format!(
                    "Thread \"{}\" ({}) timer check: No new images found. Closing thread locally.",
                    thread.title, id
                ));
                self.inner.registry.update(id, |t| {
                    t.closed = true;
                    t.active = false;
                });
            }
            Err(FetchError::Stopped) => return,
            Err(e) => {
                n.error(&format!(
                    "Failed to re-check thread \"{}\" ({}) state during timer check: {}. Closing thread.",
                    thread.title, id, e
                ));
                self.inner.registry.update(id, |t| {
                    t.closed = true;
                    t.active = false;
                    t.error = true;
                });
            }
        }
        self.inner.timers.clear(id);
        self.persist_threads().await;
        self.check_for_new_threads().await;
    }
}
