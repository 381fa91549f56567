//! Watched-thread registry and the per-thread transient state around it.
//!
//! [`ThreadRegistry`] owns the canonical list. Callers get clones and must go
//! back through [`ThreadRegistry::update`] for any consult-then-mutate step.

mod active;
mod list;
mod record;
mod thread;
mod timers;

pub use active::{ActiveAttempts, ProcessingGuard};
pub use list::{Admission, ThreadRegistry};
pub use record::{decode_threads, ThreadRecord};
pub use thread::{ThreadId, WatchedThread};
pub use timers::StuckTimers;
