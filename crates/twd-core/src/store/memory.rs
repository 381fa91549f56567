use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

use super::KvStore;

/// In-memory [`KvStore`].
#[derive(Debug, Default)]
pub struct MemoryKvStore {
    map: Mutex<HashMap<String, Value>>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-filled with `entries`.
    pub fn with_entries<I: IntoIterator<Item = (String, Value)>>(entries: I) -> Self {
        Self {
            map: Mutex::new(entries.into_iter().collect()),
        }
    }

    /// Current value for `key`, if any.
    pub fn peek(&self, key: &str) -> Option<Value> {
        self.map
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }
}

#[async_trait]
impl KvStore for MemoryKvStore {
    async fn get(&self, keys: &[&str]) -> Result<HashMap<String, Value>> {
        let map = self.map.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(keys
            .iter()
            .filter_map(|k| map.get(*k).map(|v| (k.to_string(), v.clone())))
            .collect())
    }

    async fn set(&self, entries: HashMap<String, Value>) -> Result<()> {
        self.map
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(entries);
        Ok(())
    }

    async fn remove(&self, keys: &[&str]) -> Result<()> {
        let mut map = self.map.lock().unwrap_or_else(PoisonError::into_inner);
        for k in keys {
            map.remove(*k);
        }
        Ok(())
    }
}
