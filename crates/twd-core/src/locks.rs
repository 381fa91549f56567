//! Per-child download locks.
//!
//! Keyed by `"{thread_id}-{filename}"`. Concurrent attempts at the same child
//! serialize on a real `tokio::sync::Mutex`; the table entry is pruned when
//! the last holder releases and nobody else is waiting.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

type LockTable = HashMap<String, Arc<AsyncMutex<()>>>;

/// Key for a child's lock.
pub fn lock_key(thread_id: u64, filename: &str) -> String {
    format!("{}-{}", thread_id, filename)
}

#[derive(Debug, Default)]
pub struct DownloadLocks {
    table: Arc<Mutex<LockTable>>,
}

impl DownloadLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self) -> MutexGuard<'_, LockTable> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Waits until `key` is free and returns a guard that holds it.
    pub async fn acquire(&self, key: &str) -> DownloadLockGuard {
        let lock = {
            let mut table = self.table();
            Arc::clone(
                table
                    .entry(key.to_string())
                    .or_insert_with(|| Arc::new(AsyncMutex::new(()))),
            )
        };
        let guard = lock.lock_owned().await;
        DownloadLockGuard {
            table: Arc::clone(&self.table),
            key: key.to_string(),
            guard: Some(guard),
        }
    }

    /// Number of keys with a live holder or waiter.
    pub fn len(&self) -> usize {
        self.table().len()
    }

    pub fn is_empty(&self) -> bool {
        self.table().is_empty()
    }
}

/// Releases the child lock when dropped.
pub struct DownloadLockGuard {
    table: Arc<Mutex<LockTable>>,
    key: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl DownloadLockGuard {
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Drop for DownloadLockGuard {
    fn drop(&mut self) {
        // Release first so the waiter count below does not include us.
        drop(self.guard.take());
        let mut table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(lock) = table.get(&self.key) {
            // Only the table itself references the mutex: no holder, no waiter.
            if Arc::strong_count(lock) == 1 {
                table.remove(&self.key);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn guard_releases_and_prunes() {
        let locks = DownloadLocks::new();
        {
            let g = locks.acquire(&lock_key(1, "a.jpg")).await;
            assert_eq!(g.key(), "1-a.jpg");
            assert_eq!(locks.len(), 1);
        }
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn one_holder_per_key() {
        let locks = Arc::new(DownloadLocks::new());
        let inside = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let mut set = tokio::task::JoinSet::new();
        for _ in 0..8 {
            let locks = Arc::clone(&locks);
            let inside = Arc::clone(&inside);
            let max_seen = Arc::clone(&max_seen);
            set.spawn(async move {
                let _g = locks.acquire("7-x.png").await;
                let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                max_seen.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                inside.fetch_sub(1, Ordering::SeqCst);
            });
        }
        while set.join_next().await.is_some() {}
        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn different_keys_do_not_block() {
        let locks = DownloadLocks::new();
        let _a = locks.acquire("1-a.jpg").await;
        let b = tokio::time::timeout(Duration::from_millis(100), locks.acquire("1-b.jpg")).await;
        assert!(b.is_ok());
    }
}
