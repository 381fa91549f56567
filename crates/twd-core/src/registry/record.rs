//! Serialized thread form, shared by persistence and status snapshots.
//!
//! `downloaded_count` is written for observers but ignored on load; the
//! count is re-derived from `skipped`.

use std::collections::{BTreeSet, HashSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::thread::WatchedThread;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadRecord {
    pub id: u64,
    pub board: String,
    pub title: String,
    pub time: i64,
    pub url: String,
    pub active: bool,
    pub closed: bool,
    pub error: bool,
    pub total_children: usize,
    pub downloaded_count: usize,
    pub skipped: Vec<String>,
}

impl From<&WatchedThread> for ThreadRecord {
    fn from(t: &WatchedThread) -> Self {
        Self {
            id: t.id,
            board: t.board.clone(),
            title: t.title.clone(),
            time: t.created_at,
            url: t.url.clone(),
            active: t.active,
            closed: t.closed,
            error: t.error,
            total_children: t.total_children(),
            downloaded_count: t.downloaded_count(),
            skipped: t.skipped().iter().cloned().collect(),
        }
    }
}

/// Decodes the persisted thread list field by field.
///
/// Wrong-typed fields are reset to safe defaults, entries without a usable id
/// are dropped, and later duplicates of an id are collapsed into the first.
/// Returns the threads and a description of every repair made.
pub fn decode_threads(value: &Value) -> (Vec<WatchedThread>, Vec<String>) {
    let mut repairs = Vec::new();
    let Some(items) = value.as_array() else {
        if !value.is_null() {
            repairs.push("watched_threads is not an array, resetting".to_string());
        }
        return (Vec::new(), repairs);
    };

    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        let Some(thread) = decode_one(item, &mut repairs) else {
            continue;
        };
        if !seen.insert(thread.id) {
            repairs.push(format!(
                "removed duplicate thread entry {} ({})",
                thread.id, thread.title
            ));
            continue;
        }
        out.push(thread);
    }
    (out, repairs)
}

fn decode_one(item: &Value, repairs: &mut Vec<String>) -> Option<WatchedThread> {
    let Some(obj) = item.as_object() else {
        repairs.push(format!("dropped non-object thread entry: {}", item));
        return None;
    };
    let id = match obj.get("id") {
        Some(Value::Number(n)) => n.as_u64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    };
    let Some(id) = id.filter(|id| *id > 0) else {
        repairs.push(format!("dropped thread entry without a valid id: {}", item));
        return None;
    };

    let mut text = |key: &str| -> Option<String> {
        match obj.get(key) {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(s.clone()),
            Some(other) => {
                repairs.push(format!("thread {}: invalid {} {}, resetting", id, key, other));
                None
            }
        }
    };
    let board = text("board").unwrap_or_default();
    let url = text("url").unwrap_or_default();
    let title = text("title")
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| format!("Thread {}", id));

    let mut flag = |key: &str| -> bool {
        match obj.get(key) {
            None | Some(Value::Null) => false,
            Some(Value::Bool(b)) => *b,
            Some(other) => {
                repairs.push(format!("thread {}: invalid {} {}, resetting", id, key, other));
                false
            }
        }
    };
    let active = flag("active");
    let closed = flag("closed");
    let error = flag("error");

    let time = obj.get("time").and_then(Value::as_i64).unwrap_or(0);
    let total = obj
        .get("total_children")
        .and_then(Value::as_i64)
        .map(|n| n.max(0) as usize)
        .unwrap_or(0);

    let skipped: BTreeSet<String> = match obj.get("skipped") {
        None | Some(Value::Null) => BTreeSet::new(),
        Some(Value::Array(names)) => names
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        Some(_) => {
            repairs.push(format!("thread {}: invalid skipped format, resetting", id));
            BTreeSet::new()
        }
    };

    let mut thread = WatchedThread::new(id, board, title, time, url);
    thread.active = active;
    thread.closed = closed;
    thread.error = error;
    thread.set_total_children(total);
    thread.replace_skipped(skipped);

    if let Some(stored) = obj.get("downloaded_count").and_then(Value::as_u64) {
        if stored as usize != thread.downloaded_count() {
            repairs.push(format!(
                "thread {}: corrected count from {} to {}",
                id,
                stored,
                thread.downloaded_count()
            ));
        }
    }
    Some(thread)
}
