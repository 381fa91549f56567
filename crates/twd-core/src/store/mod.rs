//! Key-value persistence for the registry, search params, history and run flag.
//!
//! Values are JSON. [`SqliteKvStore`] keeps them in a single SQLite table under
//! the XDG state directory; [`MemoryKvStore`] is the in-process variant.

mod memory;
mod sqlite;
mod state;

pub use memory::MemoryKvStore;
pub use sqlite::SqliteKvStore;
pub use state::{
    load_state, LoadedState, StateStore, KEY_HISTORY, KEY_IS_RUNNING, KEY_SEARCH_PARAMS,
    KEY_WATCHED_THREADS,
};

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

#[async_trait]
pub trait KvStore: Send + Sync {
    /// Values for the keys that exist; missing keys are absent from the map.
    async fn get(&self, keys: &[&str]) -> Result<HashMap<String, Value>>;
    /// Writes all entries atomically.
    async fn set(&self, entries: HashMap<String, Value>) -> Result<()>;
    async fn remove(&self, keys: &[&str]) -> Result<()>;
}
