use std::sync::{Arc, Mutex, PoisonError, RwLock};

use super::{LogLevel, Observer, StatusSnapshot};

/// Discovery status lines that every tick may repeat verbatim. A repeat of
/// the immediately previous line with one of these prefixes is not
/// forwarded to observers.
pub const QUIET_REPEAT_PREFIXES: &[&str] = &["Capacity check: searching", "No new matching threads"];

/// Fans log lines and snapshots out to attached observers.
///
/// Every line also goes to `tracing`.
#[derive(Default)]
pub struct Notifier {
    observers: RwLock<Vec<Arc<dyn Observer>>>,
    last_line: Mutex<Option<String>>,
}

impl Notifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&self, observer: Arc<dyn Observer>) {
        self.observers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(observer);
    }

    fn observers(&self) -> Vec<Arc<dyn Observer>> {
        self.observers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn log(&self, level: LogLevel, message: &str) {
        match level {
            LogLevel::Debug => tracing::debug!("{}", message),
            LogLevel::Info | LogLevel::Success => tracing::info!("{}", message),
            LogLevel::Warning => tracing::warn!("{}", message),
            LogLevel::Error => tracing::error!("{}", message),
        }
        {
            let mut last = self.last_line.lock().unwrap_or_else(PoisonError::into_inner);
            let quiet = QUIET_REPEAT_PREFIXES.iter().any(|p| message.starts_with(p));
            if quiet && last.as_deref() == Some(message) {
                return;
            }
            *last = Some(message.to_string());
        }
        for o in self.observers() {
            let _ = o.log_line(level, message);
        }
    }

    pub fn info(&self, message: &str) {
        self.log(LogLevel::Info, message);
    }

    pub fn success(&self, message: &str) {
        self.log(LogLevel::Success, message);
    }

    pub fn warn(&self, message: &str) {
        self.log(LogLevel::Warning, message);
    }

    pub fn error(&self, message: &str) {
        self.log(LogLevel::Error, message);
    }

    pub fn debug(&self, message: &str) {
        self.log(LogLevel::Debug, message);
    }

    pub fn push_snapshot(&self, status: &StatusSnapshot) {
        for o in self.observers() {
            if let Err(e) = o.snapshot(status) {
                tracing::debug!("observer snapshot delivery failed: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        lines: Mutex<Vec<(LogLevel, String)>>,
        snapshots: Mutex<usize>,
    }

    impl Observer for Recorder {
        fn log_line(&self, level: LogLevel, message: &str) -> anyhow::Result<()> {
            self.lines.lock().unwrap().push((level, message.to_string()));
            Ok(())
        }
        fn snapshot(&self, _status: &StatusSnapshot) -> anyhow::Result<()> {
            *self.snapshots.lock().unwrap() += 1;
            Ok(())
        }
    }

    struct Broken;

    impl Observer for Broken {
        fn log_line(&self, _: LogLevel, _: &str) -> anyhow::Result<()> {
            anyhow::bail!("no listener")
        }
        fn snapshot(&self, _: &StatusSnapshot) -> anyhow::Result<()> {
            anyhow::bail!("no listener")
        }
    }

    #[test]
    fn repeated_discovery_status_suppressed() {
        let n = Notifier::new();
        let r = Arc::new(Recorder::default());
        n.attach(r.clone());
        n.info("No new matching threads on /wg/.");
        n.info("No new matching threads on /wg/.");
        n.info("Capacity check: searching /wg/ for \"walls\" (2 free slots).");
        n.info("No new matching threads on /wg/.");
        let lines = r.lines.lock().unwrap();
        assert_eq!(lines.len(), 3);
        assert!(lines[1].1.starts_with("Capacity check"));
    }

    #[test]
    fn repeated_warnings_and_errors_still_delivered() {
        let n = Notifier::new();
        let r = Arc::new(Recorder::default());
        n.attach(r.clone());
        n.warn("Thread 1 added but not activated (max concurrent threads reached).");
        n.warn("Thread 1 added but not activated (max concurrent threads reached).");
        n.error("boom");
        n.error("boom");
        n.info("Scheduler: waiting for initialization.");
        n.info("Scheduler: waiting for initialization.");
        assert_eq!(r.lines.lock().unwrap().len(), 6);
    }

    #[test]
    fn failing_observer_does_not_stop_others() {
        let n = Notifier::new();
        let r = Arc::new(Recorder::default());
        n.attach(Arc::new(Broken));
        n.attach(r.clone());
        n.error("boom");
        n.push_snapshot(&StatusSnapshot {
            is_running: false,
            threads: vec![],
            tracked_downloads: 0,
            next_tick_ms: None,
        });
        assert_eq!(r.lines.lock().unwrap().len(), 1);
        assert_eq!(*r.snapshots.lock().unwrap(), 1);
    }
}
