use std::collections::{BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use super::{unix_millis, HistoryEntry};

/// Capped map from child path to [`HistoryEntry`].
///
/// All read-modify-write sequences (insert plus eviction) run under one lock,
/// so concurrent thread tasks never lose updates.
#[derive(Debug)]
pub struct HistoryLedger {
    entries: Mutex<HashMap<String, HistoryEntry>>,
    capacity: usize,
}

impl HistoryLedger {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    pub(crate) fn from_entries(entries: HashMap<String, HistoryEntry>, capacity: usize) -> Self {
        let ledger = Self {
            entries: Mutex::new(entries),
            capacity: capacity.max(1),
        };
        {
            let mut map = ledger.lock();
            evict_over_capacity(&mut map, ledger.capacity);
        }
        ledger
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, HistoryEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Swaps in the entries of `other` (used when loading persisted state).
    pub fn replace_with(&self, other: HistoryLedger) {
        let entries = other
            .entries
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner);
        let mut map = self.lock();
        *map = entries;
        evict_over_capacity(&mut map, self.capacity);
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Records `path` as materialized now. Returns the paths evicted to stay
    /// within capacity.
    pub fn record(&self, path: &str, thread_id: u64) -> Vec<String> {
        self.record_at(path, thread_id, unix_millis())
    }

    /// Like [`record`](Self::record) with an explicit timestamp.
    pub fn record_at(&self, path: &str, thread_id: u64, timestamp: i64) -> Vec<String> {
        let mut map = self.lock();
        map.insert(
            path.to_string(),
            HistoryEntry {
                timestamp,
                thread_id,
            },
        );
        evict_over_capacity(&mut map, self.capacity)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.lock().contains_key(path)
    }

    pub fn get(&self, path: &str) -> Option<HistoryEntry> {
        self.lock().get(path).copied()
    }

    /// Final path segment of every entry owned by `thread_id`.
    pub fn entries_for_thread(&self, thread_id: u64) -> BTreeSet<String> {
        self.lock()
            .iter()
            .filter(|(_, e)| e.thread_id == thread_id)
            .filter_map(|(path, _)| path.rsplit('/').next())
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Drops entries older than `max_age`. Returns how many were removed.
    pub fn purge_expired(&self, max_age: Duration) -> usize {
        let cutoff = unix_millis().saturating_sub(max_age.as_millis() as i64);
        self.purge_older_than(cutoff)
    }

    pub fn purge_older_than(&self, cutoff_ms: i64) -> usize {
        let mut map = self.lock();
        let before = map.len();
        map.retain(|_, e| e.timestamp >= cutoff_ms);
        before - map.len()
    }

    pub fn clear_thread(&self, thread_id: u64) -> usize {
        let mut map = self.lock();
        let before = map.len();
        map.retain(|_, e| e.thread_id != thread_id);
        before - map.len()
    }

    pub fn clear_all(&self) -> usize {
        let mut map = self.lock();
        let n = map.len();
        map.clear();
        n
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub(crate) fn snapshot(&self) -> Vec<(String, HistoryEntry)> {
        let mut v: Vec<_> = self
            .lock()
            .iter()
            .map(|(k, e)| (k.clone(), *e))
            .collect();
        v.sort_by(|a, b| a.1.timestamp.cmp(&b.1.timestamp).then_with(|| a.0.cmp(&b.0)));
        v
    }
}

/// Removes oldest entries (ties broken by path) until within capacity.
fn evict_over_capacity(map: &mut HashMap<String, HistoryEntry>, capacity: usize) -> Vec<String> {
    let mut evicted = Vec::new();
    while map.len() > capacity {
        let oldest = map
            .iter()
            .min_by(|a, b| a.1.timestamp.cmp(&b.1.timestamp).then_with(|| a.0.cmp(b.0)))
            .map(|(k, _)| k.clone());
        match oldest {
            Some(k) => {
                map.remove(&k);
                evicted.push(k);
            }
            None => break,
        }
    }
    evicted
}
