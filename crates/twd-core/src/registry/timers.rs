//! Stuck timers: when a thread first looked complete.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::time::Instant;

use super::thread::ThreadId;

#[derive(Debug, Default)]
pub struct StuckTimers {
    started: Mutex<HashMap<ThreadId, Instant>>,
}

impl StuckTimers {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ThreadId, Instant>> {
        self.started.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Starts the timer unless already running. Returns true if started.
    pub fn start_if_absent(&self, id: ThreadId) -> bool {
        let mut map = self.lock();
        if map.contains_key(&id) {
            return false;
        }
        map.insert(id, Instant::now());
        true
    }

    /// Starts or resets the timer to now.
    pub fn restart(&self, id: ThreadId) {
        self.lock().insert(id, Instant::now());
    }

    /// Sets an explicit start instant.
    pub fn set(&self, id: ThreadId, at: Instant) {
        self.lock().insert(id, at);
    }

    pub fn clear(&self, id: ThreadId) {
        self.lock().remove(&id);
    }

    pub fn clear_all(&self) {
        self.lock().clear();
    }

    pub fn contains(&self, id: ThreadId) -> bool {
        self.lock().contains_key(&id)
    }

    /// True if the timer is running and at least `threshold` has passed.
    pub fn is_expired(&self, id: ThreadId, threshold: Duration) -> bool {
        self.lock()
            .get(&id)
            .is_some_and(|start| start.elapsed() >= threshold)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn expires_after_threshold() {
        let timers = StuckTimers::new();
        assert!(timers.start_if_absent(1));
        assert!(!timers.start_if_absent(1));
        assert!(!timers.is_expired(1, Duration::from_secs(300)));
        tokio::time::advance(Duration::from_secs(301)).await;
        assert!(timers.is_expired(1, Duration::from_secs(300)));
        timers.clear(1);
        assert!(!timers.contains(1));
        assert!(!timers.is_expired(1, Duration::from_secs(300)));
    }

    #[tokio::test(start_paused = true)]
    async fn restart_resets_start() {
        let timers = StuckTimers::new();
        timers.restart(2);
        tokio::time::advance(Duration::from_secs(200)).await;
        timers.restart(2);
        tokio::time::advance(Duration::from_secs(200)).await;
        assert!(!timers.is_expired(2, Duration::from_secs(300)));
    }
}
