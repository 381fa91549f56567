//! libcurl-backed transfer manager writing below a download directory.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use tokio::sync::broadcast;

use super::fetch::download_to;
use super::search::walk_matching;
use super::uniquify::first_free;
use super::{CollisionPolicy, TransferError, TransferEvent, TransferId, TransferManager};

pub(crate) const PART_SUFFIX: &str = ".part";

const EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    InProgress,
    Complete,
    Interrupted,
}

#[derive(Debug)]
struct Record {
    relative_path: String,
    state: State,
    abort: Arc<AtomicBool>,
}

#[derive(Debug)]
struct Shared {
    root: PathBuf,
    timeout: Duration,
    events: broadcast::Sender<TransferEvent>,
    next_id: AtomicU64,
    table: Mutex<HashMap<TransferId, Record>>,
}

/// Downloads each transfer into `{dest}.part` and renames it on success.
#[derive(Debug, Clone)]
pub struct CurlTransferManager {
    shared: Arc<Shared>,
}

fn part_path(final_path: &Path) -> PathBuf {
    let mut s = final_path.as_os_str().to_owned();
    s.push(PART_SUFFIX);
    PathBuf::from(s)
}

fn join_rel(dir: &str, name: &str) -> String {
    if dir.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", dir, name)
    }
}

impl CurlTransferManager {
    /// `timeout` bounds a whole transfer at the curl level.
    pub fn new(root: impl Into<PathBuf>, timeout: Duration) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            shared: Arc::new(Shared {
                root: root.into(),
                timeout,
                events,
                next_id: AtomicU64::new(0),
                table: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn root(&self) -> &Path {
        &self.shared.root
    }
}

impl Shared {
    fn table(&self) -> MutexGuard<'_, HashMap<TransferId, Record>> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, id: TransferId, state: State) {
        if let Some(r) = self.table().get_mut(&id) {
            r.state = state;
        }
    }

    async fn run(self: Arc<Self>, id: TransferId, url: String, rel: String, abort: Arc<AtomicBool>) {
        let final_path = self.root.join(&rel);
        let part = part_path(&final_path);
        let timeout = self.timeout;

        let part_c = part.clone();
        let result = tokio::task::spawn_blocking(move || download_to(&url, &part_c, &abort, timeout))
            .await
            .unwrap_or_else(|e| Err(format!("transfer task failed: {}", e)));

        let outcome = match result {
            Ok(bytes) => match tokio::fs::rename(&part, &final_path).await {
                Ok(()) => {
                    tracing::debug!(transfer = %id, bytes, "transfer complete: {}", rel);
                    Ok(())
                }
                Err(e) => Err(format!("FILE_FAILED: {}", e)),
            },
            Err(reason) => Err(reason),
        };

        match outcome {
            Ok(()) => {
                self.set_state(id, State::Complete);
                let _ = self.events.send(TransferEvent::Complete { id });
            }
            Err(reason) => {
                let _ = tokio::fs::remove_file(&part).await;
                tracing::debug!(transfer = %id, "transfer interrupted ({}): {}", reason, rel);
                self.set_state(id, State::Interrupted);
                let _ = self.events.send(TransferEvent::Interrupted { id, reason });
            }
        }
    }
}

#[async_trait]
impl TransferManager for CurlTransferManager {
    async fn begin(
        &self,
        url: &str,
        relative_path: &str,
        policy: CollisionPolicy,
    ) -> Result<TransferId, TransferError> {
        let rel = relative_path.trim_matches('/');
        if rel.is_empty() || rel.split('/').any(|c| c.is_empty() || c == "." || c == "..") {
            return Err(TransferError::Begin(format!(
                "invalid destination {:?}",
                relative_path
            )));
        }
        let (dir_rel, file) = rel.rsplit_once('/').unwrap_or(("", rel));
        let dir = self.shared.root.join(dir_rel);
        tokio::fs::create_dir_all(&dir).await?;

        let id = TransferId(self.shared.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        let abort = Arc::new(AtomicBool::new(false));
        let final_rel = {
            let mut table = self.shared.table();
            let name = match policy {
                CollisionPolicy::Uniquify => first_free(file, |candidate| {
                    let candidate_rel = join_rel(dir_rel, candidate);
                    dir.join(candidate).exists()
                        || table.values().any(|r| {
                            r.state == State::InProgress && r.relative_path == candidate_rel
                        })
                }),
            };
            let final_rel = join_rel(dir_rel, &name);
            table.insert(
                id,
                Record {
                    relative_path: final_rel.clone(),
                    state: State::InProgress,
                    abort: Arc::clone(&abort),
                },
            );
            final_rel
        };

        let _ = self.shared.events.send(TransferEvent::Created {
            id,
            path: final_rel.clone(),
        });
        tokio::spawn(Arc::clone(&self.shared).run(id, url.to_string(), final_rel, abort));
        Ok(id)
    }

    fn subscribe(&self) -> broadcast::Receiver<TransferEvent> {
        self.shared.events.subscribe()
    }

    async fn cancel(&self, id: TransferId) -> Result<(), TransferError> {
        let table = self.shared.table();
        let record = table.get(&id).ok_or(TransferError::Unknown(id))?;
        if record.state == State::InProgress {
            record.abort.store(true, Ordering::Relaxed);
        }
        Ok(())
    }

    async fn erase(&self, id: TransferId) -> Result<(), TransferError> {
        let record = self
            .shared
            .table()
            .remove(&id)
            .ok_or(TransferError::Unknown(id))?;
        if record.state == State::InProgress {
            record.abort.store(true, Ordering::Relaxed);
        }
        let part = part_path(&self.shared.root.join(&record.relative_path));
        match tokio::fs::remove_file(&part).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn search(&self, pattern: &Regex, limit: usize) -> Vec<String> {
        let mut found: Vec<String> = self
            .shared
            .table()
            .values()
            .filter(|r| r.state == State::Complete && pattern.is_match(&r.relative_path))
            .map(|r| r.relative_path.clone())
            .take(limit)
            .collect();
        if found.len() >= limit {
            return found;
        }

        let root = self.shared.root.clone();
        let re = pattern.clone();
        let walked = tokio::task::spawn_blocking(move || walk_matching(&root, &re, limit))
            .await
            .unwrap_or_default();
        for path in walked {
            if found.len() >= limit {
                break;
            }
            if !found.contains(&path) {
                found.push(path);
            }
        }
        found
    }
}
