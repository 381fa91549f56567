//! The scheduler loop: fixed period plus coalesced kicks.

use std::sync::atomic::Ordering;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::history::unix_millis;
use crate::watcher::Watcher;

impl Watcher {
    fn note_next_tick(&self, after: Duration) {
        let at = unix_millis() + after.as_millis() as i64;
        self.inner.next_tick_ms.store(at, Ordering::SeqCst);
    }

    /// Spawns the loop. Each tick runs as its own task so a slow batch never
    /// delays the period; the processing markers keep overlapping ticks safe.
    pub(crate) fn spawn_scheduler(&self) -> JoinHandle<()> {
        let w = self.clone();
        tokio::spawn(async move {
            let period = w.inner.cfg.tick_interval();
            let first = w.inner.cfg.initial_tick_delay();
            let mut interval = interval_at(Instant::now() + first, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            w.note_next_tick(first);
            tracing::info!(period_secs = period.as_secs(), "scheduler started");

            loop {
                tokio::select! {
                    _ = interval.tick() => w.note_next_tick(period),
                    _ = w.inner.kick.notified() => {}
                }
                if w.shutting_down() {
                    break;
                }
                let t = w.clone();
                tokio::spawn(async move { t.tick().await });
            }
            w.inner.next_tick_ms.store(0, Ordering::SeqCst);
            tracing::info!("scheduler stopped");
        })
    }
}
