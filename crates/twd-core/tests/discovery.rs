//! Catalog discovery and add-by-id admission.

mod common;

use common::{catalog_url, closed_thread_doc, fast_config, thread_doc, thread_url, unix_now, Harness};
use serde_json::json;
use twd_core::config::TwdConfig;
use twd_core::registry::WatchedThread;
use twd_core::store::KEY_SEARCH_PARAMS;
use twd_core::WatchError;

fn catalog(now: i64) -> serde_json::Value {
    json!([
        {"page": 1, "threads": [
            {"no": 101, "time": now - 3 * 3600, "sub": "Walls general", "com": ""},
            {"no": 102, "time": now - 3600, "com": "post your WALLS"},
            {"no": 103, "time": now - 8 * 24 * 3600, "sub": "old walls"},
            {"no": 104, "time": now - 60, "sub": "cats"}
        ]},
        {"page": 2, "threads": [
            {"no": 105, "time": now - 2 * 3600, "sub": "more walls"},
            {"no": "bad"},
            {"no": 106, "time": now - 600, "sub": "walls already watched"}
        ]},
        {"page": 3}
    ])
}

#[tokio::test]
async fn fresh_discovery_admits_matches_newest_first() {
    let h = Harness::ready(fast_config()).await;
    h.watcher.set_running(true);
    h.watcher
        .registry()
        .add(WatchedThread::new(106, "wg", "watched", 0, thread_url("wg", 106)));
    h.catalog.set(&catalog_url("wg"), catalog(unix_now()));

    let admitted = h.watcher.discover("wg", "walls", 5).await.unwrap();
    assert_eq!(admitted, 3);

    let threads = h.watcher.registry().all();
    let new: Vec<_> = threads.iter().filter(|t| t.id != 106).collect();
    let ids: Vec<u64> = new.iter().map(|t| t.id).collect();
    assert_eq!(ids, vec![102, 105, 101]);
    for t in &new {
        assert!(t.active);
        assert!(!t.closed && !t.error);
        assert_eq!(t.total_children(), 0);
        assert_eq!(t.downloaded_count(), 0);
        assert_eq!(t.url, thread_url("wg", t.id));
    }
    assert_eq!(new[0].title, "Thread 102");
    assert_eq!(new[2].title, "Walls general");

    let params = h.watcher.last_search_params();
    assert_eq!(params.board, "wg");
    assert_eq!(params.search_term, "walls");
    let stored = h.store.peek(KEY_SEARCH_PARAMS).unwrap();
    assert_eq!(stored["search_term"], "walls");
}

#[tokio::test]
async fn discovery_respects_limit() {
    let h = Harness::ready(fast_config()).await;
    h.watcher.set_running(true);
    h.catalog.set(&catalog_url("wg"), catalog(unix_now()));

    assert_eq!(h.watcher.discover("wg", "walls", 1).await.unwrap(), 1);
    assert_eq!(h.watcher.registry().all()[0].id, 102);
}

#[tokio::test]
async fn discovery_skips_populated_destinations() {
    let h = Harness::ready(fast_config()).await;
    h.watcher.set_running(true);
    h.transfers.add_completed("twd_downloads/102/Anonymous/1.jpg");
    h.catalog.set(&catalog_url("wg"), catalog(unix_now()));

    h.watcher.discover("wg", "walls", 5).await.unwrap();
    assert!(!h.watcher.registry().contains(102));
    assert!(h.watcher.registry().contains(105));
}

#[tokio::test]
async fn discovery_is_a_noop_when_not_running() {
    let h = Harness::ready(fast_config()).await;
    h.catalog.set(&catalog_url("wg"), catalog(unix_now()));
    assert_eq!(h.watcher.discover("wg", "walls", 5).await.unwrap(), 0);
    assert_eq!(h.catalog.calls_to(&catalog_url("wg")), 0);
}

#[tokio::test]
async fn invalid_pattern_aborts_discovery() {
    let h = Harness::ready(fast_config()).await;
    h.watcher.set_running(true);
    let err = h.watcher.discover("wg", "walls(", 5).await.unwrap_err();
    assert!(matches!(err, WatchError::InvalidFilterPattern { .. }));
    assert_eq!(h.catalog.calls_to(&catalog_url("wg")), 0);
}

#[tokio::test]
async fn non_array_catalog_is_malformed() {
    let h = Harness::ready(fast_config()).await;
    h.watcher.set_running(true);
    h.catalog.set(&catalog_url("wg"), json!({"error": "nope"}));
    let err = h.watcher.discover("wg", "walls", 5).await.unwrap_err();
    assert!(matches!(err, WatchError::MalformedUpstreamData(_)));
}

#[tokio::test]
async fn add_by_id_activates_when_capacity_allows() {
    let h = Harness::ready(fast_config()).await;
    h.catalog.set(&thread_url("g", 77), thread_doc(77, 2));

    assert!(h.watcher.add_thread_by_id("g", 77).await.unwrap());
    let t = h.watcher.registry().find(77).unwrap();
    assert!(t.active);
    assert!(!t.closed);
    assert_eq!(t.title, "Thread 77");
    assert_eq!(t.board, "g");
    assert_eq!(h.watcher.last_search_params().board, "g");

    // Already registered.
    assert!(!h.watcher.add_thread_by_id("g", 77).await.unwrap());
}

#[tokio::test]
async fn add_by_id_of_closed_thread_adds_it_closed() {
    let h = Harness::ready(fast_config()).await;
    h.catalog.set(&thread_url("g", 5), closed_thread_doc(5, 1));

    assert!(h.watcher.add_thread_by_id("g", 5).await.unwrap());
    let t = h.watcher.registry().find(5).unwrap();
    assert!(t.closed);
    assert!(!t.active);
}

#[tokio::test]
async fn add_by_id_over_capacity_stays_paused() {
    let cfg = TwdConfig {
        max_concurrent: 1,
        ..fast_config()
    };
    let h = Harness::ready(cfg).await;
    let mut busy = WatchedThread::new(1, "g", "busy", 0, thread_url("g", 1));
    busy.active = true;
    h.watcher.registry().add(busy);
    h.catalog.set(&thread_url("g", 2), thread_doc(2, 1));

    assert!(h.watcher.add_thread_by_id("g", 2).await.unwrap());
    assert!(!h.watcher.registry().find(2).unwrap().active);
}

#[tokio::test]
async fn add_by_id_refuses_populated_destination() {
    let h = Harness::ready(fast_config()).await;
    h.transfers.add_completed("twd_downloads/9/Anonymous/1.jpg");
    h.catalog.set(&thread_url("g", 9), thread_doc(9, 1));

    assert!(!h.watcher.add_thread_by_id("g", 9).await.unwrap());
    assert!(h.watcher.registry().is_empty());
    assert_eq!(h.catalog.calls_to(&thread_url("g", 9)), 0);
}

#[tokio::test]
async fn capacity_freed_pass_repeats_last_search() {
    let cfg = TwdConfig {
        max_concurrent: 2,
        ..fast_config()
    };
    let h = Harness::ready(cfg).await;
    h.watcher.set_running(true);
    h.catalog.set(&catalog_url("wg"), catalog(unix_now()));
    assert_eq!(h.watcher.discover("wg", "walls", 1).await.unwrap(), 1);

    assert_eq!(h.watcher.check_for_new_threads().await, 1);
    assert_eq!(h.watcher.registry().len(), 2);
    // Full now.
    assert_eq!(h.watcher.check_for_new_threads().await, 0);
}

#[tokio::test(start_paused = true)]
async fn overlapping_discoveries_share_the_cap() {
    let cfg = TwdConfig {
        max_concurrent: 2,
        ..fast_config()
    };
    let h = Harness::ready(cfg).await;
    h.watcher.set_running(true);
    let now = unix_now();
    h.catalog.set(
        &catalog_url("wg"),
        json!([{"page": 1, "threads": [
            {"no": 1, "time": now - 10, "sub": "walls a"},
            {"no": 2, "time": now - 20, "sub": "walls b"},
            {"no": 3, "time": now - 30, "sub": "walls c"},
            {"no": 4, "time": now - 40, "sub": "walls d"}
        ]}]),
    );
    h.catalog.set_delay(std::time::Duration::from_millis(100));

    // Both passes see two free slots before either fetch returns.
    let (a, b) = tokio::join!(
        h.watcher.discover("wg", "walls", 2),
        h.watcher.discover("wg", "walls", 2)
    );
    assert_eq!(h.catalog.max_in_flight(), 2);
    assert_eq!(a.unwrap() + b.unwrap(), 2);
    assert_eq!(h.watcher.registry().active_eligible_count(), 2);
    assert_eq!(h.watcher.registry().len(), 2);
}
