//! In-flight work: per-thread processing markers and per-child transfer ids.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::thread::ThreadId;
use crate::transfer::TransferId;

#[derive(Debug, Default)]
struct Inner {
    processing: HashSet<ThreadId>,
    /// lock key -> (owning thread, transfer)
    transfers: HashMap<String, (ThreadId, TransferId)>,
}

#[derive(Debug, Default, Clone)]
pub struct ActiveAttempts {
    inner: Arc<Mutex<Inner>>,
}

fn lock(inner: &Mutex<Inner>) -> MutexGuard<'_, Inner> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ActiveAttempts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `id` as mid-processing if it is not already and fewer than `cap`
    /// threads are. The check and the insert happen under one lock, so the
    /// cap holds across overlapping ticks.
    pub fn try_begin_processing(&self, id: ThreadId, cap: usize) -> Option<ProcessingGuard> {
        let mut inner = lock(&self.inner);
        if inner.processing.contains(&id) || inner.processing.len() >= cap {
            return None;
        }
        inner.processing.insert(id);
        Some(ProcessingGuard {
            inner: Arc::clone(&self.inner),
            id,
        })
    }

    pub fn is_processing(&self, id: ThreadId) -> bool {
        lock(&self.inner).processing.contains(&id)
    }

    pub fn processing_count(&self) -> usize {
        lock(&self.inner).processing.len()
    }

    pub fn register_transfer(&self, key: &str, thread_id: ThreadId, transfer: TransferId) {
        lock(&self.inner)
            .transfers
            .insert(key.to_string(), (thread_id, transfer));
    }

    pub fn unregister_transfer(&self, key: &str) {
        lock(&self.inner).transfers.remove(key);
    }

    /// Removes and returns every tracked transfer owned by `thread_id`.
    pub fn take_transfers_for(&self, thread_id: ThreadId) -> Vec<TransferId> {
        let mut inner = lock(&self.inner);
        let mut taken = Vec::new();
        inner.transfers.retain(|_, (owner, id)| {
            if *owner == thread_id {
                taken.push(*id);
                false
            } else {
                true
            }
        });
        taken
    }

    pub fn take_all_transfers(&self) -> Vec<TransferId> {
        lock(&self.inner)
            .transfers
            .drain()
            .map(|(_, (_, id))| id)
            .collect()
    }

    pub fn transfer_count(&self) -> usize {
        lock(&self.inner).transfers.len()
    }
}

/// Clears the processing marker when dropped.
#[derive(Debug)]
pub struct ProcessingGuard {
    inner: Arc<Mutex<Inner>>,
    id: ThreadId,
}

impl ProcessingGuard {
    pub fn thread_id(&self) -> ThreadId {
        self.id
    }
}

impl Drop for ProcessingGuard {
    fn drop(&mut self) {
        lock(&self.inner).processing.remove(&self.id);
    }
}
