//! Pure selection over a registry snapshot.

use crate::registry::{StuckTimers, ThreadId, WatchedThread};

/// Threads whose stuck timer should be checked: active ones with a running
/// timer, then inactive finished ones (not closed, not errored, complete).
pub fn timer_candidates(threads: &[WatchedThread], timers: &StuckTimers) -> Vec<ThreadId> {
    let stuck = threads
        .iter()
        .filter(|t| t.is_active_eligible() && timers.contains(t.id));
    let finished = threads
        .iter()
        .filter(|t| !t.active && !t.closed && !t.error && t.is_complete());
    stuck.chain(finished).map(|t| t.id).collect()
}

/// Up to `slots` threads to process, in registry (admission) order: active,
/// not errored, not closed, not already mid-processing, with work left or an
/// unknown total.
pub fn pick_eligible(
    threads: &[WatchedThread],
    is_processing: impl Fn(ThreadId) -> bool,
    slots: usize,
) -> Vec<ThreadId> {
    threads
        .iter()
        .filter(|t| t.is_active_eligible())
        .filter(|t| !is_processing(t.id))
        .filter(|t| t.has_pending_work())
        .take(slots)
        .map(|t| t.id)
        .collect()
}
