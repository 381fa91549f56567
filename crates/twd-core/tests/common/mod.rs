#![allow(dead_code)]

pub mod fakes;
pub mod http_server;

use std::sync::Arc;

use serde_json::{json, Value};
use twd_core::config::TwdConfig;
use twd_core::store::MemoryKvStore;
use twd_core::{Collaborators, Watcher};

use fakes::{FakeCatalog, FakeTransfers};

pub const API: &str = "http://api.test";
pub const MEDIA: &str = "http://media.test";

/// Config with no waits except where a test opts back in.
pub fn fast_config() -> TwdConfig {
    TwdConfig {
        api_base: API.to_string(),
        media_base: MEDIA.to_string(),
        post_download_pause_ms: 0,
        ui_debounce_ms: 10,
        resume_cooldown_ms: 2000,
        retry: Some(twd_core::config::RetryConfig {
            max_attempts: 3,
            base_delay_ms: 1500,
        }),
        ..TwdConfig::default()
    }
}

pub struct Harness {
    pub watcher: Watcher,
    pub catalog: Arc<FakeCatalog>,
    pub transfers: Arc<FakeTransfers>,
    pub store: Arc<MemoryKvStore>,
}

impl Harness {
    pub fn new(cfg: TwdConfig) -> Self {
        Self::with_store(cfg, MemoryKvStore::new())
    }

    pub fn with_store(cfg: TwdConfig, store: MemoryKvStore) -> Self {
        let catalog = Arc::new(FakeCatalog::new());
        let transfers = Arc::new(FakeTransfers::new());
        let store = Arc::new(store);
        let watcher = Watcher::new(
            cfg,
            Collaborators {
                catalog: catalog.clone(),
                transfers: transfers.clone(),
                store: store.clone(),
            },
        );
        Self {
            watcher,
            catalog,
            transfers,
            store,
        }
    }

    /// Initialized watcher over an empty store.
    pub async fn ready(cfg: TwdConfig) -> Self {
        let h = Self::new(cfg);
        h.watcher.initialize().await.unwrap();
        h
    }
}

pub fn thread_url(board: &str, id: u64) -> String {
    format!("{}/{}/thread/{}.json", API, board, id)
}

pub fn catalog_url(board: &str) -> String {
    format!("{}/{}/catalog.json", API, board)
}

/// Thread document with `images` image posts (tim = id * 1000 + i).
pub fn thread_doc(id: u64, images: usize) -> Value {
    let mut posts = vec![json!({"no": id, "sub": format!("Thread {}", id), "time": 1_700_000_000})];
    for i in 0..images {
        posts.push(json!({
            "no": id + 1 + i as u64,
            "tim": id * 1000 + i as u64,
            "ext": ".jpg",
            "name": "Anonymous"
        }));
    }
    json!({ "posts": posts })
}

pub fn closed_thread_doc(id: u64, images: usize) -> Value {
    let mut doc = thread_doc(id, images);
    doc["posts"][0]["closed"] = json!(1);
    doc
}

pub fn unix_now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_secs() as i64
}
