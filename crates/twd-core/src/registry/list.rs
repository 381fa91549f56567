use std::sync::{Mutex, MutexGuard, PoisonError};

use serde_json::Value;

use super::record::ThreadRecord;
use super::thread::{ThreadId, WatchedThread};

/// Outcome of [`ThreadRegistry::admit_active`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Added,
    Duplicate,
    Full,
}

/// Ordered list of watched threads. Order is admission order and is the
/// scheduler's tie-break.
#[derive(Debug, Default)]
pub struct ThreadRegistry {
    threads: Mutex<Vec<WatchedThread>>,
}

impl ThreadRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<WatchedThread>> {
        self.threads.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replaces the whole list (used on load), collapsing duplicate ids.
    pub fn replace_all(&self, threads: Vec<WatchedThread>) {
        *self.lock() = threads;
        self.dedup();
    }

    /// Appends `thread` unless its id is already present. A duplicate is
    /// refused and logged; the existing entry wins.
    pub fn add(&self, thread: WatchedThread) -> bool {
        let mut threads = self.lock();
        if threads.iter().any(|t| t.id == thread.id) {
            tracing::warn!(
                thread_id = thread.id,
                "refusing duplicate thread entry ({})",
                thread.title
            );
            return false;
        }
        threads.push(thread);
        true
    }

    /// Appends `thread` as active if fewer than `cap` threads are active and
    /// eligible. Count and insert happen under one lock so concurrent
    /// admissions cannot overshoot the cap.
    pub fn admit_active(&self, mut thread: WatchedThread, cap: usize) -> Admission {
        let mut threads = self.lock();
        if threads.iter().any(|t| t.id == thread.id) {
            tracing::warn!(
                thread_id = thread.id,
                "refusing duplicate thread entry ({})",
                thread.title
            );
            return Admission::Duplicate;
        }
        if threads.iter().filter(|t| t.is_active_eligible()).count() >= cap {
            return Admission::Full;
        }
        thread.active = true;
        threads.push(thread);
        Admission::Added
    }

    pub fn remove(&self, id: ThreadId) -> Option<WatchedThread> {
        let mut threads = self.lock();
        let idx = threads.iter().position(|t| t.id == id)?;
        Some(threads.remove(idx))
    }

    pub fn find(&self, id: ThreadId) -> Option<WatchedThread> {
        self.lock().iter().find(|t| t.id == id).cloned()
    }

    pub fn contains(&self, id: ThreadId) -> bool {
        self.lock().iter().any(|t| t.id == id)
    }

    pub fn all(&self) -> Vec<WatchedThread> {
        self.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Runs `f` on the thread under the registry lock. `None` if not found.
    pub fn update<R>(&self, id: ThreadId, f: impl FnOnce(&mut WatchedThread) -> R) -> Option<R> {
        let mut threads = self.lock();
        threads.iter_mut().find(|t| t.id == id).map(f)
    }

    /// Runs `f` on every thread under one lock.
    pub fn update_all(&self, mut f: impl FnMut(&mut WatchedThread)) {
        for t in self.lock().iter_mut() {
            f(t);
        }
    }

    /// Collapses duplicate ids, keeping the first. Returns how many were removed.
    pub fn dedup(&self) -> usize {
        let mut threads = self.lock();
        let mut seen = std::collections::HashSet::new();
        let before = threads.len();
        threads.retain(|t| {
            let first = seen.insert(t.id);
            if !first {
                tracing::warn!(
                    thread_id = t.id,
                    "removed duplicate thread entry ({}) during deduplication",
                    t.title
                );
            }
            first
        });
        before - threads.len()
    }

    /// Threads that are active, not errored and not closed.
    pub fn active_eligible_count(&self) -> usize {
        self.lock().iter().filter(|t| t.is_active_eligible()).count()
    }

    /// Derived global run flag: some thread is active and not closed.
    pub fn any_running(&self) -> bool {
        self.lock().iter().any(WatchedThread::is_running)
    }

    pub fn records(&self) -> Vec<ThreadRecord> {
        self.lock().iter().map(ThreadRecord::from).collect()
    }

    pub fn to_persisted(&self) -> Value {
        serde_json::to_value(self.records()).unwrap_or(Value::Array(Vec::new()))
    }
}
