//! Quiet-period coalescing: many `trigger()` calls inside the window produce
//! one call of the flush function after the window has been quiet.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;

#[derive(Debug)]
pub struct Debouncer {
    notify: Arc<Notify>,
    task: JoinHandle<()>,
}

impl Debouncer {
    /// Spawns the flush task. Must be called inside a tokio runtime.
    pub fn spawn<F>(quiet: Duration, flush: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        let notify = Arc::new(Notify::new());
        let rx = Arc::clone(&notify);
        let task = tokio::spawn(async move {
            loop {
                rx.notified().await;
                loop {
                    tokio::select! {
                        _ = tokio::time::sleep(quiet) => break,
                        _ = rx.notified() => continue,
                    }
                }
                flush();
            }
        });
        Self { notify, task }
    }

    /// Requests a flush after the quiet period.
    pub fn trigger(&self) {
        self.notify.notify_one();
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.task.abort();
    }
}
