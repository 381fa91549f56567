//! In-memory collaborators with scripted behavior.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;
use tokio::sync::broadcast;
use twd_core::catalog::CatalogClient;
use twd_core::notify::{LogLevel, Observer, StatusSnapshot};
use twd_core::retry::FetchError;
use twd_core::transfer::{CollisionPolicy, TransferError, TransferEvent, TransferId, TransferManager};

/// URL -> JSON document. Unknown URLs answer HTTP 404.
#[derive(Default)]
pub struct FakeCatalog {
    docs: Mutex<HashMap<String, Value>>,
    failing: Mutex<HashMap<String, u32>>,
    calls: Mutex<Vec<String>>,
    delay: Mutex<Option<Duration>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, url: &str, doc: Value) {
        self.failing.lock().unwrap().remove(url);
        self.docs.lock().unwrap().insert(url.to_string(), doc);
    }

    /// Every request for `url` answers with `status`.
    pub fn fail(&self, url: &str, status: u32) {
        self.failing.lock().unwrap().insert(url.to_string(), status);
    }

    /// Each request sleeps this long before answering.
    pub fn set_delay(&self, d: Duration) {
        *self.delay.lock().unwrap() = Some(d);
    }

    pub fn calls_to(&self, url: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|u| *u == url).count()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CatalogClient for FakeCatalog {
    async fn get_json(&self, url: &str) -> Result<Value, FetchError> {
        self.calls.lock().unwrap().push(url.to_string());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let delay = *self.delay.lock().unwrap();
        if let Some(d) = delay {
            tokio::time::sleep(d).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if let Some(status) = self.failing.lock().unwrap().get(url) {
            return Err(FetchError::Http(*status));
        }
        self.docs
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or(FetchError::Http(404))
    }
}

/// How a scripted transfer ends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Complete,
    Interrupt(String),
    /// Never reports; only a cancel ends it.
    Hang,
}

#[derive(Debug, Clone)]
pub struct Begun {
    pub id: TransferId,
    pub url: String,
    pub path: String,
}

/// Transfer manager that reports scripted outcomes immediately.
pub struct FakeTransfers {
    events: broadcast::Sender<TransferEvent>,
    next_id: AtomicU64,
    default_outcome: Mutex<Outcome>,
    scripted: Mutex<HashMap<String, VecDeque<Outcome>>>,
    begun: Mutex<Vec<Begun>>,
    completed: Mutex<Vec<String>>,
    hanging: Mutex<Vec<TransferId>>,
    cancelled: Mutex<Vec<TransferId>>,
    erased: Mutex<Vec<TransferId>>,
    erase_fails: AtomicBool,
}

impl FakeTransfers {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(1024);
        Self {
            events,
            next_id: AtomicU64::new(0),
            default_outcome: Mutex::new(Outcome::Complete),
            scripted: Mutex::new(HashMap::new()),
            begun: Mutex::new(Vec::new()),
            completed: Mutex::new(Vec::new()),
            hanging: Mutex::new(Vec::new()),
            cancelled: Mutex::new(Vec::new()),
            erased: Mutex::new(Vec::new()),
            erase_fails: AtomicBool::new(false),
        }
    }

    pub fn set_default(&self, outcome: Outcome) {
        *self.default_outcome.lock().unwrap() = outcome;
    }

    /// Queues outcomes for successive transfers of `url`.
    pub fn script(&self, url: &str, outcomes: impl IntoIterator<Item = Outcome>) {
        self.scripted
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_default()
            .extend(outcomes);
    }

    /// Pretends a file already exists at `path` (for the destination check).
    pub fn add_completed(&self, path: &str) {
        self.completed.lock().unwrap().push(path.to_string());
    }

    /// Announces a transfer created outside the engine.
    pub fn emit_created(&self, path: &str) -> TransferId {
        let id = TransferId(self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        self.hanging.lock().unwrap().push(id);
        let _ = self.events.send(TransferEvent::Created {
            id,
            path: path.to_string(),
        });
        id
    }

    /// Every later `erase` is recorded and then answers with an error.
    pub fn fail_erase(&self) {
        self.erase_fails.store(true, Ordering::SeqCst);
    }

    pub fn begun(&self) -> Vec<Begun> {
        self.begun.lock().unwrap().clone()
    }

    pub fn begun_for(&self, url: &str) -> usize {
        self.begun.lock().unwrap().iter().filter(|b| b.url == url).count()
    }

    pub fn cancelled(&self) -> Vec<TransferId> {
        self.cancelled.lock().unwrap().clone()
    }

    pub fn erased(&self) -> Vec<TransferId> {
        self.erased.lock().unwrap().clone()
    }

    fn next_outcome(&self, url: &str) -> Outcome {
        self.scripted
            .lock()
            .unwrap()
            .get_mut(url)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| self.default_outcome.lock().unwrap().clone())
    }
}

#[async_trait]
impl TransferManager for FakeTransfers {
    async fn begin(
        &self,
        url: &str,
        relative_path: &str,
        _policy: CollisionPolicy,
    ) -> Result<TransferId, TransferError> {
        let id = TransferId(self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        self.begun.lock().unwrap().push(Begun {
            id,
            url: url.to_string(),
            path: relative_path.to_string(),
        });
        let _ = self.events.send(TransferEvent::Created {
            id,
            path: relative_path.to_string(),
        });
        match self.next_outcome(url) {
            Outcome::Complete => {
                self.completed.lock().unwrap().push(relative_path.to_string());
                let _ = self.events.send(TransferEvent::Complete { id });
            }
            Outcome::Interrupt(reason) => {
                let _ = self.events.send(TransferEvent::Interrupted { id, reason });
            }
            Outcome::Hang => self.hanging.lock().unwrap().push(id),
        }
        Ok(id)
    }

    fn subscribe(&self) -> broadcast::Receiver<TransferEvent> {
        self.events.subscribe()
    }

    async fn cancel(&self, id: TransferId) -> Result<(), TransferError> {
        self.cancelled.lock().unwrap().push(id);
        let mut hanging = self.hanging.lock().unwrap();
        if let Some(pos) = hanging.iter().position(|h| *h == id) {
            hanging.remove(pos);
            let _ = self.events.send(TransferEvent::Interrupted {
                id,
                reason: "USER_CANCELED".into(),
            });
        }
        Ok(())
    }

    async fn erase(&self, id: TransferId) -> Result<(), TransferError> {
        self.erased.lock().unwrap().push(id);
        if self.erase_fails.load(Ordering::SeqCst) {
            return Err(TransferError::Unknown(id));
        }
        Ok(())
    }

    async fn search(&self, pattern: &Regex, limit: usize) -> Vec<String> {
        self.completed
            .lock()
            .unwrap()
            .iter()
            .filter(|p| pattern.is_match(p))
            .take(limit)
            .cloned()
            .collect()
    }
}

/// Observer that keeps every delivered log line.
#[derive(Default)]
pub struct RecordingObserver {
    lines: Mutex<Vec<(LogLevel, String)>>,
}

impl RecordingObserver {
    pub fn count_containing(&self, needle: &str) -> usize {
        self.lines
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, l)| l.contains(needle))
            .count()
    }
}

impl Observer for RecordingObserver {
    fn log_line(&self, level: LogLevel, message: &str) -> anyhow::Result<()> {
        self.lines.lock().unwrap().push((level, message.to_string()));
        Ok(())
    }

    fn snapshot(&self, _status: &StatusSnapshot) -> anyhow::Result<()> {
        Ok(())
    }
}
