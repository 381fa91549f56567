use std::collections::BTreeSet;

pub type ThreadId = u64;

/// One thread under watch.
///
/// Progress is the skip set: child filenames already materialized or known to
/// be unnecessary. The downloaded count is always derived from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchedThread {
    pub id: ThreadId,
    pub board: String,
    pub title: String,
    /// Unix seconds of the upstream opening post.
    pub created_at: i64,
    /// Thread JSON URL.
    pub url: String,
    pub active: bool,
    /// Terminal: no further work.
    pub closed: bool,
    /// Last parent-level operation failed; paused until resumed.
    pub error: bool,
    total_children: usize,
    skipped: BTreeSet<String>,
}

impl WatchedThread {
    /// New inactive thread with no progress.
    pub fn new(
        id: ThreadId,
        board: impl Into<String>,
        title: impl Into<String>,
        created_at: i64,
        url: impl Into<String>,
    ) -> Self {
        Self {
            id,
            board: board.into(),
            title: title.into(),
            created_at,
            url: url.into(),
            active: false,
            closed: false,
            error: false,
            total_children: 0,
            skipped: BTreeSet::new(),
        }
    }

    pub fn total_children(&self) -> usize {
        self.total_children
    }

    pub fn skipped(&self) -> &BTreeSet<String> {
        &self.skipped
    }

    pub fn is_skipped(&self, filename: &str) -> bool {
        self.skipped.contains(filename)
    }

    /// `min(|skipped|, total_children)`.
    pub fn downloaded_count(&self) -> usize {
        self.skipped.len().min(self.total_children)
    }

    /// Adds `filename` to the skip set. Returns false if it was already there.
    pub fn mark_skipped(&mut self, filename: &str) -> bool {
        self.skipped.insert(filename.to_string())
    }

    /// Takes the upstream count as-is; a shrink leaves the skip set intact.
    pub fn set_total_children(&mut self, total: usize) {
        self.total_children = total;
    }

    pub fn replace_skipped(&mut self, skipped: BTreeSet<String>) {
        self.skipped = skipped;
    }

    /// Unions `names` into the skip set; returns how many were new.
    pub fn merge_skipped<I: IntoIterator<Item = String>>(&mut self, names: I) -> usize {
        let before = self.skipped.len();
        self.skipped.extend(names);
        self.skipped.len() - before
    }

    pub fn clear_progress(&mut self) {
        self.skipped.clear();
    }

    /// Unknown total (never fetched) or children still missing.
    pub fn has_pending_work(&self) -> bool {
        self.total_children == 0 || self.downloaded_count() < self.total_children
    }

    pub fn is_complete(&self) -> bool {
        self.total_children > 0 && self.downloaded_count() >= self.total_children
    }

    /// Active, not errored, not closed.
    pub fn is_active_eligible(&self) -> bool {
        self.active && !self.error && !self.closed
    }

    /// Contributes to the global run flag.
    pub fn is_running(&self) -> bool {
        self.active && !self.closed
    }

    /// Terminal close; clears the error flag since closing is not a failure.
    pub fn close(&mut self) {
        self.closed = true;
        self.active = false;
        self.error = false;
    }

    /// Pause after a parent-level failure.
    pub fn fail(&mut self) {
        self.error = true;
        self.active = false;
    }

    pub fn progress_label(&self) -> String {
        format!("{}/{}", self.downloaded_count(), self.total_children)
    }
}
