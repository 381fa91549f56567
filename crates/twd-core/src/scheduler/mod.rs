//! Thread scheduler.
//!
//! A periodic tick (plus immediate kicks after admissions) re-checks expired
//! stuck timers, fans eligible threads out to per-thread processing up to the
//! concurrency cap, tops up capacity through discovery and re-derives the
//! global run flag.

mod choose;
mod fetch;
mod process;
mod run;
mod tick;

pub use choose::{pick_eligible, timer_candidates};
