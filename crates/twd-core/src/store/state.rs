//! Typed load/save of the watcher state over a [`KvStore`].
//!
//! Loading never fails on bad data: each field of the wrong shape is reset to
//! a safe default and the repair is reported back to the caller.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use serde_json::Value;

use super::KvStore;
use crate::discovery::SearchParams;
use crate::history::HistoryLedger;
use crate::registry::{decode_threads, ThreadRegistry, WatchedThread};

pub const KEY_WATCHED_THREADS: &str = "watched_threads";
pub const KEY_SEARCH_PARAMS: &str = "search_params";
pub const KEY_HISTORY: &str = "history";
pub const KEY_IS_RUNNING: &str = "is_running";

pub struct LoadedState {
    pub threads: Vec<WatchedThread>,
    pub search_params: SearchParams,
    pub history: HistoryLedger,
    /// Run flag as stored; may disagree with the threads.
    pub is_running: bool,
    /// One line per repaired field or dropped entry.
    pub repairs: Vec<String>,
}

pub async fn load_state(kv: &dyn KvStore, history_capacity: usize) -> Result<LoadedState> {
    let mut values = kv
        .get(&[
            KEY_WATCHED_THREADS,
            KEY_SEARCH_PARAMS,
            KEY_HISTORY,
            KEY_IS_RUNNING,
        ])
        .await?;
    let mut take = |key: &str| values.remove(key).unwrap_or(Value::Null);

    let (threads, mut repairs) = decode_threads(&take(KEY_WATCHED_THREADS));

    let (search_params, params_repairs) = SearchParams::decode(&take(KEY_SEARCH_PARAMS));
    repairs.extend(params_repairs);

    let (history, dropped) = HistoryLedger::from_persisted(&take(KEY_HISTORY), history_capacity);
    if dropped > 0 {
        repairs.push(format!("dropped {} invalid history entries", dropped));
    }

    let is_running = match take(KEY_IS_RUNNING) {
        Value::Null => false,
        Value::Bool(b) => b,
        other => {
            repairs.push(format!("invalid is_running {}, resetting", other));
            false
        }
    };

    Ok(LoadedState {
        threads,
        search_params,
        history,
        is_running,
        repairs,
    })
}

/// Writes watcher state fields to the backing store.
#[derive(Clone)]
pub struct StateStore {
    kv: Arc<dyn KvStore>,
}

impl StateStore {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    pub fn kv(&self) -> &dyn KvStore {
        self.kv.as_ref()
    }

    async fn set_one(&self, key: &str, value: Value) -> Result<()> {
        let mut m = HashMap::with_capacity(1);
        m.insert(key.to_string(), value);
        self.kv.set(m).await
    }

    pub async fn save_threads(&self, registry: &ThreadRegistry) -> Result<()> {
        self.set_one(KEY_WATCHED_THREADS, registry.to_persisted()).await
    }

    pub async fn save_history(&self, history: &HistoryLedger) -> Result<()> {
        self.set_one(KEY_HISTORY, history.to_persisted()).await
    }

    pub async fn save_search_params(&self, params: &SearchParams) -> Result<()> {
        self.set_one(KEY_SEARCH_PARAMS, serde_json::to_value(params)?)
            .await
    }

    pub async fn save_running(&self, running: bool) -> Result<()> {
        self.set_one(KEY_IS_RUNNING, Value::Bool(running)).await
    }

    pub async fn remove_history(&self) -> Result<()> {
        self.kv.remove(&[KEY_HISTORY]).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryKvStore;
    use serde_json::json;

    #[tokio::test]
    async fn empty_store_loads_defaults() {
        let kv = MemoryKvStore::new();
        let s = load_state(&kv, 100).await.unwrap();
        assert!(s.threads.is_empty());
        assert!(s.history.is_empty());
        assert!(!s.is_running);
        assert_eq!(s.search_params, SearchParams::default());
        assert!(s.repairs.is_empty());
    }

    #[tokio::test]
    async fn corrupted_fields_are_reset() {
        let kv = MemoryKvStore::with_entries([
            (KEY_WATCHED_THREADS.to_string(), json!("garbage")),
            (KEY_SEARCH_PARAMS.to_string(), json!(12)),
            (KEY_HISTORY.to_string(), json!([["d/1/A/a.jpg", {"timestamp": 1}]])),
            (KEY_IS_RUNNING.to_string(), json!("yes")),
        ]);
        let s = load_state(&kv, 100).await.unwrap();
        assert!(s.threads.is_empty());
        assert!(s.history.is_empty());
        assert!(!s.is_running);
        assert_eq!(s.search_params, SearchParams::default());
        assert_eq!(s.repairs.len(), 4);
    }

    #[tokio::test]
    async fn save_then_load() {
        let kv = Arc::new(MemoryKvStore::new());
        let store = StateStore::new(kv.clone());

        let registry = ThreadRegistry::new();
        let mut t = WatchedThread::new(7, "wg", "Walls", 1, "u");
        t.active = true;
        t.set_total_children(2);
        t.mark_skipped("a.jpg");
        registry.add(t.clone());
        let history = HistoryLedger::new(10);
        history.record("twd_downloads/7/Anonymous/a.jpg", 7);
        let params = SearchParams {
            board: "wg".into(),
            search_term: "walls".into(),
            download_path: "pics".into(),
        };

        store.save_threads(&registry).await.unwrap();
        store.save_history(&history).await.unwrap();
        store.save_search_params(&params).await.unwrap();
        store.save_running(true).await.unwrap();

        let s = load_state(kv.as_ref(), 10).await.unwrap();
        assert_eq!(s.threads, vec![t]);
        assert_eq!(s.search_params, params);
        assert!(s.history.contains("twd_downloads/7/Anonymous/a.jpg"));
        assert!(s.is_running);
        assert!(s.repairs.is_empty());

        store.remove_history().await.unwrap();
        assert!(kv.peek(KEY_HISTORY).is_none());
    }
}
