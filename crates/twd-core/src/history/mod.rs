//! History ledger: global record of every child path ever materialized.
//!
//! Shared across all watched threads. Used for dedup before a transfer and to
//! rebuild a thread's skip set after restart.

mod ledger;
mod persisted;

pub use ledger::HistoryLedger;

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Value stored per child path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Unix milliseconds at which the child was materialized.
    pub timestamp: i64,
    pub thread_id: u64,
}

/// Current time as Unix milliseconds.
pub(crate) fn unix_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}
