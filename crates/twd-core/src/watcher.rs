//! The watcher handle: owns the registry, ledger, locks and timers and wires
//! them to the external collaborators.
//!
//! Operations live in the modules that implement them (`engine`, `scheduler`,
//! `discovery`, `reconcile`, `control`) as further `impl Watcher` blocks; this
//! file holds the state, persistence helpers and the user commands that only
//! flip flags.

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError, Weak};

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::catalog::CatalogClient;
use crate::config::TwdConfig;
use crate::discovery::{SearchParams, DEFAULT_DOWNLOAD_PATH};
use crate::error::WatchError;
use crate::history::HistoryLedger;
use crate::locks::DownloadLocks;
use crate::notify::{Debouncer, Notifier, Observer, StatusSnapshot};
use crate::registry::{ActiveAttempts, StuckTimers, ThreadId, ThreadRegistry};
use crate::retry::RetryPolicy;
use crate::store::{load_state, KvStore, StateStore};
use crate::transfer::{TransferId, TransferManager};
use crate::url_model::clean_root;

/// External collaborators the watcher drives.
#[derive(Clone)]
pub struct Collaborators {
    pub catalog: Arc<dyn CatalogClient>,
    pub transfers: Arc<dyn TransferManager>,
    pub store: Arc<dyn KvStore>,
}

pub(crate) struct ResumeState {
    pub(crate) in_progress: AtomicBool,
    pub(crate) last: Mutex<Option<Instant>>,
}

pub(crate) struct Inner {
    pub(crate) cfg: TwdConfig,
    pub(crate) retry: RetryPolicy,
    pub(crate) registry: ThreadRegistry,
    pub(crate) ledger: HistoryLedger,
    pub(crate) locks: DownloadLocks,
    pub(crate) active: ActiveAttempts,
    pub(crate) timers: StuckTimers,
    pub(crate) search: Mutex<SearchParams>,
    pub(crate) running: AtomicBool,
    pub(crate) initialized: AtomicBool,
    pub(crate) shutting_down: AtomicBool,
    pub(crate) catalog: Arc<dyn CatalogClient>,
    pub(crate) transfers: Arc<dyn TransferManager>,
    pub(crate) state: StateStore,
    pub(crate) notifier: Notifier,
    debouncer: OnceLock<Debouncer>,
    pub(crate) kick: Notify,
    pub(crate) resume: ResumeState,
    /// Unix ms of the next scheduled tick; 0 when no loop is running.
    pub(crate) next_tick_ms: AtomicI64,
}

/// Cheap-to-clone handle shared by the scheduler loop, spawned tasks and the
/// control front end.
#[derive(Clone)]
pub struct Watcher {
    pub(crate) inner: Arc<Inner>,
}

/// Handles of the long-running tasks started by [`Watcher::spawn_background`].
pub struct BackgroundTasks {
    handles: Vec<JoinHandle<()>>,
}

impl BackgroundTasks {
    /// Aborts every background task.
    pub fn shutdown(self) {
        for h in self.handles {
            h.abort();
        }
    }
}

impl Watcher {
    pub fn new(cfg: TwdConfig, collaborators: Collaborators) -> Self {
        let retry = cfg.retry_policy();
        let ledger = HistoryLedger::new(cfg.history_capacity);
        Self {
            inner: Arc::new(Inner {
                retry,
                registry: ThreadRegistry::new(),
                ledger,
                locks: DownloadLocks::new(),
                active: ActiveAttempts::new(),
                timers: StuckTimers::new(),
                search: Mutex::new(SearchParams::default()),
                running: AtomicBool::new(false),
                initialized: AtomicBool::new(false),
                shutting_down: AtomicBool::new(false),
                catalog: collaborators.catalog,
                transfers: collaborators.transfers,
                state: StateStore::new(collaborators.store),
                notifier: Notifier::new(),
                debouncer: OnceLock::new(),
                kick: Notify::new(),
                resume: ResumeState {
                    in_progress: AtomicBool::new(false),
                    last: Mutex::new(None),
                },
                next_tick_ms: AtomicI64::new(0),
                cfg,
            }),
        }
    }

    pub fn config(&self) -> &TwdConfig {
        &self.inner.cfg
    }

    pub fn registry(&self) -> &ThreadRegistry {
        &self.inner.registry
    }

    pub fn ledger(&self) -> &HistoryLedger {
        &self.inner.ledger
    }

    pub fn timers(&self) -> &StuckTimers {
        &self.inner.timers
    }

    pub fn active(&self) -> &ActiveAttempts {
        &self.inner.active
    }

    pub fn locks(&self) -> &DownloadLocks {
        &self.inner.locks
    }

    pub fn attach_observer(&self, observer: Arc<dyn Observer>) {
        self.inner.notifier.attach(observer);
    }

    /// Cooperative run flag checked before every transfer attempt.
    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    /// Overrides the run flag without touching any thread.
    pub fn set_running(&self, running: bool) {
        self.inner.running.store(running, Ordering::SeqCst);
    }

    pub fn is_initialized(&self) -> bool {
        self.inner.initialized.load(Ordering::SeqCst)
    }

    pub(crate) fn shutting_down(&self) -> bool {
        self.inner.shutting_down.load(Ordering::SeqCst)
    }

    /// Makes every fetch and retry loop stop at its next check point.
    pub fn begin_shutdown(&self) {
        self.inner.shutting_down.store(true, Ordering::SeqCst);
        self.inner.kick.notify_one();
    }

    /// Flags shutdown and cancels every tracked transfer so blocking fetches
    /// end now instead of at their timeout. Thread flags are kept, so the
    /// next start resumes the same work. Returns how many were cancelled.
    pub async fn shutdown(&self) -> usize {
        self.begin_shutdown();
        let ids = self.inner.active.take_all_transfers();
        if !ids.is_empty() {
            self.inner.notifier.info(&format!(
                "Shutdown: cancelling {} in-flight downloads.",
                ids.len()
            ));
        }
        for &id in &ids {
            self.cancel_and_erase(id).await;
        }
        ids.len()
    }

    pub(crate) fn search(&self) -> MutexGuard<'_, SearchParams> {
        self.inner.search.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn last_search_params(&self) -> SearchParams {
        self.search().clone()
    }

    /// Replaces the search params and persists them.
    pub async fn set_search_params(&self, params: SearchParams) {
        *self.search() = params;
        self.persist_search_params().await;
    }

    /// Download root with surrounding slashes removed.
    pub(crate) fn download_root(&self) -> String {
        let params = self.search();
        let root = clean_root(&params.download_path);
        if root.is_empty() {
            DEFAULT_DOWNLOAD_PATH.to_string()
        } else {
            root.to_string()
        }
    }

    pub(crate) fn thread_active(&self, id: ThreadId) -> bool {
        self.inner.registry.find(id).is_some_and(|t| t.active)
    }

    /// Wakes the scheduler loop for an immediate tick. Coalesces.
    pub fn kick(&self) {
        self.inner.kick.notify_one();
    }

    // --- persistence and refresh ---

    /// Requests a debounced status push to observers.
    pub(crate) fn request_refresh(&self) {
        if tokio::runtime::Handle::try_current().is_err() {
            return;
        }
        let debouncer = self.inner.debouncer.get_or_init(|| {
            let weak: Weak<Inner> = Arc::downgrade(&self.inner);
            Debouncer::spawn(self.inner.cfg.ui_debounce(), move || {
                if let Some(inner) = weak.upgrade() {
                    let w = Watcher { inner };
                    w.inner.notifier.push_snapshot(&w.status());
                }
            })
        });
        debouncer.trigger();
    }

    /// Saves the thread list and requests a refresh.
    pub(crate) async fn persist_threads(&self) {
        self.inner.registry.dedup();
        if let Err(e) = self.inner.state.save_threads(&self.inner.registry).await {
            tracing::error!("saving watched threads failed: {:#}", e);
        }
        self.request_refresh();
    }

    pub(crate) async fn persist_history(&self) {
        if let Err(e) = self.inner.state.save_history(&self.inner.ledger).await {
            tracing::error!("saving download history failed: {:#}", e);
        }
        self.request_refresh();
    }

    pub(crate) async fn persist_search_params(&self) {
        let params = self.last_search_params();
        if let Err(e) = self.inner.state.save_search_params(&params).await {
            tracing::error!("saving search params failed: {:#}", e);
        }
    }

    pub(crate) async fn persist_running(&self) {
        if let Err(e) = self.inner.state.save_running(self.is_running()).await {
            tracing::error!("saving run flag failed: {:#}", e);
        }
    }

    /// Re-derives the run flag from the threads and persists it.
    pub(crate) async fn rederive_running(&self) -> bool {
        let running = self.inner.registry.any_running();
        self.set_running(running);
        self.persist_running().await;
        running
    }

    pub fn status(&self) -> StatusSnapshot {
        let next = self.inner.next_tick_ms.load(Ordering::SeqCst);
        StatusSnapshot {
            is_running: self.inner.registry.any_running(),
            threads: self.inner.registry.records(),
            tracked_downloads: self.inner.ledger.len(),
            next_tick_ms: (next > 0).then_some(next),
        }
    }

    /// Cancels and erases every tracked transfer of `thread_id`.
    pub(crate) async fn cancel_transfers_for(&self, thread_id: ThreadId, why: &str) {
        for id in self.inner.active.take_transfers_for(thread_id) {
            self.inner.notifier.info(&format!(
                "Cancelling download {} for {} thread {}",
                id, why, thread_id
            ));
            self.cancel_and_erase(id).await;
        }
    }

    async fn cancel_and_erase(&self, id: TransferId) {
        match self.inner.transfers.cancel(id).await {
            Ok(()) => {
                if let Err(e) = self.inner.transfers.erase(id).await {
                    tracing::debug!(transfer = %id, "erase after cancel failed: {}", e);
                }
            }
            Err(e) => self
                .inner
                .notifier
                .warn(&format!("Failed to cancel download {}: {}", id, e)),
        }
    }

    // --- lifecycle ---

    /// Loads persisted state, repairs it, purges expired history and, if the
    /// stored state says work was in progress, reconciles active threads.
    pub async fn initialize(&self) -> Result<(), WatchError> {
        let n = &self.inner.notifier;
        n.info("Initializing state from storage...");
        let loaded = load_state(self.inner.state.kv(), self.inner.cfg.history_capacity).await?;
        for repair in &loaded.repairs {
            n.warn(&format!("State repair: {}", repair));
        }

        self.inner.registry.replace_all(loaded.threads);
        {
            let mut params = loaded.search_params;
            params.download_path = clean_root(&params.download_path).to_string();
            if params.download_path.is_empty() {
                params.download_path = DEFAULT_DOWNLOAD_PATH.to_string();
            }
            *self.search() = params;
        }
        self.inner.ledger.replace_with(loaded.history);

        let actual = self.inner.registry.any_running();
        if loaded.is_running != actual {
            n.info(&format!(
                "Correcting isRunning state: {} -> {}",
                loaded.is_running, actual
            ));
        }
        self.set_running(actual);
        self.persist_running().await;
        self.persist_search_params().await;
        if !loaded.repairs.is_empty() {
            self.persist_history().await;
        }
        self.persist_threads().await;

        n.info(&format!(
            "Initialization complete. {} threads loaded. {} downloads tracked. isRunning: {}",
            self.inner.registry.len(),
            self.inner.ledger.len(),
            actual
        ));
        self.inner.initialized.store(true, Ordering::SeqCst);

        self.purge_history().await;

        if actual {
            n.info("Restart: isRunning was true, attempting to sync/process active threads.");
            self.resume_active().await;
        }
        self.request_refresh();
        Ok(())
    }

    /// Starts the scheduler loop, the daily history purge and the duplicate
    /// rename watcher.
    pub fn spawn_background(&self) -> BackgroundTasks {
        BackgroundTasks {
            handles: vec![
                self.spawn_scheduler(),
                self.spawn_history_purge(),
                self.spawn_duplicate_watcher(),
            ],
        }
    }

    /// Removes history entries older than the retention window.
    pub async fn purge_history(&self) -> usize {
        let before = self.inner.ledger.len();
        let removed = self
            .inner
            .ledger
            .purge_expired(self.inner.cfg.history_retention());
        if removed > 0 {
            self.inner.notifier.info(&format!(
                "Cleaned up {} download history entries older than {} days. Size: {} -> {}",
                removed,
                self.inner.cfg.history_retention_days,
                before,
                self.inner.ledger.len()
            ));
            self.persist_history().await;
        }
        removed
    }

    fn spawn_history_purge(&self) -> JoinHandle<()> {
        let w = self.clone();
        tokio::spawn(async move {
            let period = w.inner.cfg.history_purge_interval();
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            loop {
                interval.tick().await;
                if w.shutting_down() {
                    break;
                }
                w.purge_history().await;
            }
        })
    }

    // --- user commands ---

    /// Starts watching: by explicit thread id if given, else by catalog search.
    /// Returns after the admission step; downloads continue in the background.
    pub async fn start(
        &self,
        board: &str,
        search_term: Option<&str>,
        thread_id: Option<ThreadId>,
        download_path: Option<&str>,
    ) -> Result<(), WatchError> {
        self.set_running(true);
        {
            let mut params = self.search();
            params.download_path = download_path
                .map(clean_root)
                .filter(|p| !p.is_empty())
                .unwrap_or(DEFAULT_DOWNLOAD_PATH)
                .to_string();
        }
        self.persist_running().await;
        self.persist_search_params().await;

        let result = if let Some(id) = thread_id {
            self.add_thread_by_id(board, id).await.map(|_| ())
        } else if let Some(term) = search_term.filter(|t| !t.is_empty()) {
            let limit = self
                .inner
                .cfg
                .max_concurrent
                .saturating_sub(self.inner.registry.active_eligible_count());
            self.discover(board, term, limit).await.map(|_| ())
        } else {
            self.inner
                .notifier
                .error("Start command failed: Neither search term nor thread ID provided.");
            Err(WatchError::MissingTarget)
        };

        if let Err(e) = &result {
            tracing::error!("error during initial start operation: {}", e);
        }
        self.rederive_running().await;
        self.request_refresh();
        result
    }

    /// Pauses every active thread and cancels their transfers.
    pub async fn stop(&self) {
        let n = &self.inner.notifier;
        n.info("Stop command received: Pausing all active threads...");
        let mut paused = Vec::new();
        self.inner.registry.update_all(|t| {
            if t.active {
                t.active = false;
                paused.push((t.id, t.title.clone()));
            }
        });
        for (id, title) in &paused {
            self.inner.timers.clear(*id);
            n.info(&format!("Paused thread \"{}\" ({})", title, id));
        }
        for (id, _) in &paused {
            self.cancel_transfers_for(*id, "paused").await;
        }

        self.set_running(false);
        self.persist_running().await;
        if !paused.is_empty() {
            self.persist_threads().await;
        }
        n.warn("All active threads paused.");
        self.request_refresh();
    }

    /// Pauses an active thread or activates a paused one (capacity
    /// permitting). Returns whether the thread is now active.
    pub async fn toggle(&self, id: ThreadId) -> Result<bool, WatchError> {
        let n = &self.inner.notifier;
        let Some(thread) = self.inner.registry.find(id) else {
            n.error(&format!("ToggleThread: Thread {} not found.", id));
            return Err(WatchError::NotFound(id));
        };

        if thread.active {
            n.info(&format!("Pausing thread \"{}\" ({})", thread.title, id));
            self.inner.registry.update(id, |t| t.active = false);
            self.inner.timers.clear(id);
            self.cancel_transfers_for(id, "paused").await;
            self.rederive_running().await;
            self.persist_threads().await;
            return Ok(false);
        }

        if thread.closed {
            n.warn(&format!(
                "Cannot activate thread \"{}\" ({}) because it is marked as closed.",
                thread.title, id
            ));
            return Ok(false);
        }
        if thread.error {
            n.info(&format!("Retrying errored thread \"{}\" ({})", thread.title, id));
            self.inner.registry.update(id, |t| t.error = false);
        }

        let cap = self.inner.cfg.max_concurrent;
        if self.inner.registry.active_eligible_count() >= cap {
            n.warn(&format!(
                "Cannot activate thread \"{}\" ({}): Maximum concurrent threads ({}) reached.",
                thread.title, id, cap
            ));
            self.persist_threads().await;
            return Ok(false);
        }

        n.info(&format!("Resuming thread \"{}\" ({})", thread.title, id));
        self.inner.registry.update(id, |t| t.active = true);
        self.set_running(true);
        self.persist_running().await;
        self.persist_threads().await;
        self.kick();
        Ok(true)
    }

    /// Marks a thread closed (terminal) and cancels its transfers.
    pub async fn close(&self, id: ThreadId) -> Result<(), WatchError> {
        let n = &self.inner.notifier;
        let Some(thread) = self.inner.registry.find(id) else {
            n.error(&format!("CloseThread: Thread {} not found.", id));
            return Err(WatchError::NotFound(id));
        };
        n.info(&format!("Closing thread \"{}\" ({})", thread.title, id));
        self.inner.registry.update(id, |t| t.close());
        self.inner.timers.clear(id);
        self.cancel_transfers_for(id, "closed").await;
        let running = self.rederive_running().await;
        self.persist_threads().await;

        if thread.active && running {
            self.check_for_new_threads().await;
        }
        Ok(())
    }

    /// Drops a thread from the watch list. Its history entries stay.
    pub async fn remove(&self, id: ThreadId) -> Result<(), WatchError> {
        let n = &self.inner.notifier;
        n.info(&format!("Removing thread {}...", id));
        self.cancel_transfers_for(id, "removed").await;
        let Some(thread) = self.inner.registry.remove(id) else {
            n.error(&format!("RemoveThread: Thread {} not found.", id));
            return Err(WatchError::NotFound(id));
        };
        self.inner.timers.clear(id);
        n.success(&format!(
            "Thread \"{}\" ({}) removed. {} threads remaining.",
            thread.title,
            id,
            self.inner.registry.len()
        ));
        let running = self.rederive_running().await;
        self.persist_threads().await;

        if thread.active && running {
            self.check_for_new_threads().await;
        }
        Ok(())
    }

    /// Clears one thread's progress and its history entries so its images
    /// are fetched again.
    pub async fn forget_history(&self, id: ThreadId) -> Result<(), WatchError> {
        let n = &self.inner.notifier;
        let Some(thread) = self.inner.registry.find(id) else {
            n.error(&format!("ForgetThreadDownloads: Thread {} not found.", id));
            return Err(WatchError::NotFound(id));
        };
        n.warn(&format!(
            "Forgetting download history for thread \"{}\" ({})...",
            thread.title, id
        ));
        let cleared = thread.skipped().len();
        self.inner.registry.update(id, |t| {
            t.clear_progress();
            t.error = false;
        });

        let removed = self.inner.ledger.clear_thread(id);
        if removed > 0 {
            n.info(&format!(
                "Removed {} entries from master download history for thread {}.",
                removed, id
            ));
            self.persist_history().await;
        } else {
            n.info(&format!(
                "No master download history entries found for thread {}.",
                id
            ));
        }
        self.persist_threads().await;
        n.success(&format!(
            "Finished forgetting downloads for thread \"{}\" ({}). Cleared {} skipped entries. Count reset to 0.",
            thread.title, id, cleared
        ));

        if thread.active {
            self.kick();
        }
        Ok(())
    }

    /// Clears the whole ledger and every thread's progress. Active/closed
    /// flags are kept.
    pub async fn forget_all_history(&self) {
        let n = &self.inner.notifier;
        n.warn("Forgetting ALL downloaded image history... THIS IS IRREVERSIBLE.");
        self.inner.ledger.clear_all();
        self.inner.timers.clear_all();
        self.inner.registry.update_all(|t| {
            t.clear_progress();
            t.error = false;
        });
        match self.inner.state.remove_history().await {
            Ok(()) => n.info("Cleared download history from storage."),
            Err(e) => n.error(&format!("Error clearing download history from storage: {:#}", e)),
        }
        self.persist_threads().await;
        n.success(&format!(
            "All download history cleared. Reset counts/errors for {} threads.",
            self.inner.registry.len()
        ));

        if self.is_running() {
            self.kick();
        }
    }
}
