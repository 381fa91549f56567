//! Discovery: admit new threads from a board catalog or by explicit id.

use std::time::{SystemTime, UNIX_EPOCH};

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::catalog::{catalog_url, parse_catalog, thread_url, CatalogEntry};
use crate::error::WatchError;
use crate::registry::{Admission, ThreadId, WatchedThread};
use crate::watcher::Watcher;

pub const DEFAULT_DOWNLOAD_PATH: &str = "twd_downloads";

/// Last used board, filter and download root. Persisted so capacity-freed
/// discovery passes can repeat the user's search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchParams {
    pub board: String,
    pub search_term: String,
    pub download_path: String,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            board: String::new(),
            search_term: String::new(),
            download_path: DEFAULT_DOWNLOAD_PATH.to_string(),
        }
    }
}

impl SearchParams {
    /// Lenient decode of the persisted form. Fields of the wrong type fall
    /// back to their default and are reported.
    pub fn decode(value: &Value) -> (Self, Vec<String>) {
        let mut repairs = Vec::new();
        let mut params = Self::default();
        let obj = match value {
            Value::Null => return (params, repairs),
            Value::Object(obj) => obj,
            other => {
                repairs.push(format!("invalid search params {}, resetting", other));
                return (params, repairs);
            }
        };

        let mut field = |key: &str, slot: &mut String| match obj.get(key) {
            None | Some(Value::Null) => {}
            Some(Value::String(s)) => *slot = s.clone(),
            Some(other) => repairs.push(format!("invalid search param {} {}, resetting", key, other)),
        };
        field("board", &mut params.board);
        field("search_term", &mut params.search_term);
        field("download_path", &mut params.download_path);
        if params.download_path.is_empty() {
            params.download_path = DEFAULT_DOWNLOAD_PATH.to_string();
        }
        (params, repairs)
    }
}

/// Compiles a user filter, case-insensitive.
pub fn compile_filter(pattern: &str) -> Result<Regex, WatchError> {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .map_err(|e| WatchError::InvalidFilterPattern {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })
}

fn unix_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

fn entry_matches(entry: &CatalogEntry, filter: &Regex) -> bool {
    let hit = |s: &Option<String>| s.as_deref().is_some_and(|s| filter.is_match(s));
    hit(&entry.sub) || hit(&entry.com)
}

impl Watcher {
    /// Searches the board catalog and admits up to `limit` matching threads
    /// as active. Returns how many were admitted.
    pub async fn discover(
        &self,
        board: &str,
        search_term: &str,
        limit: usize,
    ) -> Result<usize, WatchError> {
        if !self.is_running() {
            return Ok(0);
        }
        let n = &self.inner.notifier;
        let filter = match compile_filter(search_term) {
            Ok(f) => f,
            Err(e) => {
                n.error(&format!("Invalid regex pattern: \"{}\". Error: {}", search_term, e));
                return Err(e);
            }
        };

        {
            let mut params = self.search();
            params.board = board.to_string();
            params.search_term = search_term.to_string();
        }
        self.persist_search_params().await;

        let entries = match self.fetch_catalog(board).await {
            Ok(entries) => entries,
            Err(e) => {
                n.error(&format!(
                    "Error searching catalog for /{}/ with term \"{}\": {}",
                    board, search_term, e
                ));
                return Err(e);
            }
        };

        let now = unix_secs();
        let cutoff = now - self.inner.cfg.discovery_max_age().as_secs() as i64;
        let mut candidates = Vec::new();
        for entry in entries {
            if entry.time.is_some_and(|t| t < cutoff) {
                continue;
            }
            if self.inner.registry.contains(entry.no) {
                continue;
            }
            if !entry_matches(&entry, &filter) {
                continue;
            }
            if self.destination_populated(entry.no).await {
                n.info(&format!(
                    "Skipping potential thread {} - download directory seems to exist.",
                    entry.no
                ));
                continue;
            }
            let title = entry
                .sub
                .clone()
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| format!("Thread {}", entry.no));
            let url = thread_url(&self.inner.cfg.api_base, board, entry.no);
            candidates.push(WatchedThread::new(
                entry.no,
                board,
                title,
                entry.time.unwrap_or(now),
                url,
            ));
        }

        // Newest first; sort is stable so equal times keep catalog order.
        candidates.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        candidates.truncate(limit);

        if candidates.is_empty() {
            n.info(&format!("No new matching threads on /{}/ for \"{}\".", board, search_term));
            return Ok(0);
        }

        n.success(&format!(
            "Found {} new matching threads. Adding to watch list.",
            candidates.len()
        ));
        // `limit` was computed before the catalog fetch; the cap is checked
        // again per admission since other passes may have admitted meanwhile.
        let cap = self.inner.cfg.max_concurrent;
        let mut admitted = 0;
        for t in candidates {
            let line = format!("Added: \"{}\" ({})", t.title, t.id);
            match self.inner.registry.admit_active(t, cap) {
                Admission::Added => {
                    n.info(&line);
                    admitted += 1;
                }
                Admission::Duplicate => {}
                Admission::Full => {
                    n.info("Max concurrent threads reached. Not adding more.");
                    break;
                }
            }
        }
        self.persist_threads().await;
        self.kick();
        Ok(admitted)
    }

    /// Adds one thread by id. Returns whether it was added.
    pub async fn add_thread_by_id(&self, board: &str, id: ThreadId) -> Result<bool, WatchError> {
        let n = &self.inner.notifier;
        n.info(&format!(
            "Attempting to add thread {} from board /{}/ by ID...",
            id, board
        ));
        self.search().board = board.to_string();
        self.persist_search_params().await;

        if let Some(existing) = self.inner.registry.find(id) {
            n.warn(&format!("Thread {} is already in the watch list.", id));
            if !existing.active {
                n.info(&format!(
                    "Existing thread {} is inactive. Use Toggle/Resume to reactivate.",
                    id
                ));
            }
            return Ok(false);
        }

        if self.destination_populated(id).await {
            n.warn(&format!(
                "Thread ID {} not added - download directory seems to exist.",
                id
            ));
            return Ok(false);
        }

        let url = thread_url(&self.inner.cfg.api_base, board, id);
        let snapshot = match self.fetch_thread(&url).await {
            Ok(s) => s,
            Err(e) => {
                n.error(&format!(
                    "Failed to add thread {} from board /{}/: {}",
                    id, board, e
                ));
                return Err(e.into());
            }
        };

        let title = snapshot
            .subject
            .clone()
            .unwrap_or_else(|| format!("Thread {}", id));
        let created_at = snapshot.time.unwrap_or_else(unix_secs);
        let mut thread = WatchedThread::new(id, board, title, created_at, url);
        thread.closed = snapshot.is_closed_or_archived();
        if thread.closed {
            n.info(&format!(
                "Thread \"{}\" ({}) is already {} upstream. Adding as closed.",
                thread.title,
                id,
                snapshot.terminal_state()
            ));
        }

        let title = thread.title.clone();
        let closed = thread.closed;
        let activate = if closed {
            if !self.inner.registry.add(thread) {
                return Ok(false);
            }
            false
        } else {
            match self
                .inner
                .registry
                .admit_active(thread.clone(), self.inner.cfg.max_concurrent)
            {
                Admission::Added => true,
                Admission::Duplicate => return Ok(false),
                Admission::Full => {
                    if !self.inner.registry.add(thread) {
                        return Ok(false);
                    }
                    false
                }
            }
        };
        n.success(&format!(
            "Added thread \"{}\" ({}) to watch list{}.",
            title,
            id,
            if closed { " (as closed)" } else { "" }
        ));

        if activate {
            n.info(&format!("Activating new thread {}.", id));
            self.set_running(true);
            self.persist_running().await;
        } else if !closed {
            n.warn(&format!(
                "Thread {} added but not activated (max concurrent threads reached).",
                id
            ));
        }
        self.persist_threads().await;
        if activate {
            self.kick();
        }
        Ok(true)
    }

    /// Capacity-freed discovery: repeats the last search for the free slots.
    /// Returns how many threads were admitted.
    pub async fn check_for_new_threads(&self) -> usize {
        if !self.is_running() || !self.is_initialized() {
            return 0;
        }
        let params = self.last_search_params();
        if params.board.is_empty() || params.search_term.is_empty() {
            self.inner
                .notifier
                .info("Capacity check: skipped, board or search term missing.");
            return 0;
        }
        let active = self.inner.registry.active_eligible_count();
        let slots = self.inner.cfg.max_concurrent.saturating_sub(active);
        if slots == 0 {
            return 0;
        }
        self.inner.notifier.info(&format!(
            "Capacity check: searching /{}/ for \"{}\" ({} free slots).",
            params.board, params.search_term, slots
        ));
        // Errors are already logged by discover.
        self.discover(&params.board, &params.search_term, slots)
            .await
            .unwrap_or(0)
    }

    /// Best-effort check: does any completed file already live under the
    /// thread's destination directory?
    pub(crate) async fn destination_populated(&self, id: ThreadId) -> bool {
        let root = self.download_root();
        let pattern = format!("^{}/{}/.*", regex::escape(&root), id);
        match Regex::new(&pattern) {
            Ok(re) => !self.inner.transfers.search(&re, 1).await.is_empty(),
            Err(e) => {
                self.inner.notifier.error(&format!(
                    "Error searching downloads for thread {} directory check: {}",
                    id, e
                ));
                false
            }
        }
    }

    pub(crate) async fn fetch_catalog(&self, board: &str) -> Result<Vec<CatalogEntry>, WatchError> {
        let url = catalog_url(&self.inner.cfg.api_base, board);
        let value = self.fetch_json(&url).await?;
        Ok(parse_catalog(&value)?)
    }
}
