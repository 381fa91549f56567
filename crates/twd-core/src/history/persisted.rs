//! Persisted form: a JSON array of `[path, {timestamp, thread_id}]` pairs.

use std::collections::HashMap;

use serde_json::Value;

use super::{HistoryEntry, HistoryLedger};

impl HistoryLedger {
    pub fn to_persisted(&self) -> Value {
        Value::Array(
            self.snapshot()
                .into_iter()
                .map(|(path, e)| {
                    serde_json::json!([path, {"timestamp": e.timestamp, "thread_id": e.thread_id}])
                })
                .collect(),
        )
    }

    /// Rebuilds a ledger from its persisted form. Entries of the wrong shape
    /// are dropped with a warning; a non-array value yields an empty ledger.
    /// Returns the ledger and the number of dropped entries.
    pub fn from_persisted(value: &Value, capacity: usize) -> (Self, usize) {
        let Some(items) = value.as_array() else {
            if !value.is_null() {
                tracing::warn!("history is not an array, resetting");
                return (Self::new(capacity), 1);
            }
            return (Self::new(capacity), 0);
        };

        let mut map = HashMap::with_capacity(items.len());
        let mut dropped = 0usize;
        for item in items {
            match parse_item(item) {
                Some((path, entry)) => {
                    map.insert(path, entry);
                }
                None => {
                    tracing::warn!("removing invalid history entry: {}", item);
                    dropped += 1;
                }
            }
        }
        (Self::from_entries(map, capacity), dropped)
    }
}

fn parse_item(item: &Value) -> Option<(String, HistoryEntry)> {
    let pair = item.as_array().filter(|a| a.len() == 2)?;
    let path = pair[0].as_str().filter(|p| !p.is_empty())?;
    let timestamp = pair[1].get("timestamp").and_then(Value::as_i64)?;
    let thread_id = pair[1].get("thread_id").and_then(Value::as_u64)?;
    Some((
        path.to_string(),
        HistoryEntry {
            timestamp,
            thread_id,
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn restores_persisted_entries() {
        let l = HistoryLedger::new(10);
        l.record_at("d/1/A/a.jpg", 1, 5);
        l.record_at("d/2/A/b.jpg", 2, 6);
        let (restored, dropped) = HistoryLedger::from_persisted(&l.to_persisted(), 10);
        assert_eq!(dropped, 0);
        assert_eq!(restored.len(), 2);
        assert_eq!(restored.get("d/2/A/b.jpg").unwrap().thread_id, 2);
    }

    #[test]
    fn drops_invalid_entries() {
        let v = json!([
            ["d/1/A/a.jpg", {"timestamp": 1, "thread_id": 1}],
            ["d/1/A/b.jpg", {"timestamp": "x", "thread_id": 1}],
            ["d/1/A/c.jpg"],
            42
        ]);
        let (l, dropped) = HistoryLedger::from_persisted(&v, 10);
        assert_eq!(l.len(), 1);
        assert_eq!(dropped, 3);
    }

    #[test]
    fn non_array_resets() {
        let (l, dropped) = HistoryLedger::from_persisted(&json!({"a": 1}), 10);
        assert!(l.is_empty());
        assert_eq!(dropped, 1);
        let (l, dropped) = HistoryLedger::from_persisted(&Value::Null, 10);
        assert!(l.is_empty());
        assert_eq!(dropped, 0);
    }
}
