//! Per-thread processing: refresh the thread, then walk its children.

use crate::registry::{ProcessingGuard, ThreadId};
use crate::retry::FetchError;
use crate::watcher::Watcher;

impl Watcher {
    /// Processes one thread while holding its mid-processing marker. The
    /// marker is released before any follow-up discovery pass.
    pub(crate) async fn process_thread(&self, guard: ProcessingGuard) {
        let id = guard.thread_id();
        self.process_thread_inner(id).await;
        drop(guard);
        if !self.thread_active(id) && self.is_running() {
            self.check_for_new_threads().await;
        }
    }

    async fn process_thread_inner(&self, id: ThreadId) {
        let n = &self.inner.notifier;
        let Some(thread) = self.inner.registry.find(id) else {
            return;
        };

        let snapshot = match self.fetch_thread(&thread.url).await {
            Ok(s) => s,
            Err(FetchError::Stopped) => return,
            Err(e) => {
                n.error(&format!(
                    "Error processing thread \"{}\" ({}): {}. Thread paused.",
                    thread.title, id, e
                ));
                self.inner.registry.update(id, |t| t.fail());
                self.persist_threads().await;
                return;
            }
        };

        if snapshot.is_closed_or_archived() {
            n.info(&format!(
                "Thread \"{}\" ({}) is marked {} upstream. Closing locally.",
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
        let Some((before, done)) = self.inner.registry.update(id, |t| {
            t.error = false;
            let before = t.downloaded_count();
            t.set_total_children(total);
            (before, t.downloaded_count())
        }) else {
            return;
        };
        if before != done {
            n.info(&format!(
                "Syncing count for thread \"{}\" ({}): {} -> {}",
                thread.title, id, before, done
            ));
        }

        if done < total {
            self.inner.timers.clear(id);
        } else if total > 0 {
            if self.inner.timers.start_if_absent(id) {
                n.info(&format!(
                    "Thread \"{}\" ({}) appears complete ({}/{}). Starting potential close timer.",
                    thread.title, id, done, total
                ));
            }
        } else {
            self.inner.timers.clear(id);
        }
        self.persist_threads().await;

        if total == 0 {
            n.info(&format!("No images found in thread \"{}\" ({}).", thread.title, id));
            return;
        }
        if done >= total {
            return;
        }

        let pause = self.inner.cfg.post_download_pause();
        let mut newly = 0usize;
        for child in &snapshot.children {
            if !self.may_continue(id) {
                n.warn(&format!(
                    "Stopping image processing loop for thread \"{}\" ({}): Thread/Process inactive.",
                    thread.title, id
                ));
                break;
            }
            let filename = child.filename();
            if self
                .inner
                .registry
                .find(id)
                .is_some_and(|t| t.is_skipped(&filename))
            {
                continue;
            }
            let url = child.url(&self.inner.cfg.media_base, &thread.board);
            let outcome = self.materialize(&url, id, child.name.as_deref()).await;
            if outcome.newly_downloaded {
                newly += 1;
                if !pause.is_zero() {
                    tokio::time::sleep(pause).await;
                }
            }
        }

        let Some(after) = self.inner.registry.find(id) else {
            return;
        };
        n.info(&format!(
            "Finished processing run for thread \"{}\" ({}). {} new images downloaded. Current state: {}",
            thread.title,
            id,
            newly,
            after.progress_label()
        ));
        if after.active && after.is_complete() {
            self.inner.timers.restart(id);
        }
    }
}
