//! Sync orchestrator.
//!
//! Owns the durable queue and runs drain-then-merge cycles against a
//! [`RemoteProfileService`]. UI code enqueues mutations through the
//! `enqueue_*` methods; the mutation is applied to the local snapshot
//! immediately and delivered later.

use crate::config::{SyncConfig, LAST_SYNC_KEY, QUEUE_KEY};
use crate::connectivity::ConnectivityMonitor;
use crate::error::{SyncError, SyncResult};
use crate::profile_store::ProfileStore;
use crate::queue::DurableQueue;
use crate::transport::RemoteProfileService;
use closetsync_protocol::{
    current_timestamp, merge, ClosetItem, ClosetItemChanges, Mutation, Operation, OperationId,
    OperationKind, Outfit, Timestamp,
};
use closetsync_storage::KeyValueStore;
use parking_lot::{Mutex, RwLock};
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Coarse state of the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// Online and not syncing.
    Idle,
    /// A drain cycle is running.
    Syncing,
    /// The device is offline; mutations only queue.
    Offline,
}

/// Read-only view for status indicators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncStatus {
    /// Operations waiting for delivery.
    pub pending_count: usize,
    /// Whether the device is online.
    pub is_online: bool,
    /// Whether a drain cycle is running.
    pub is_syncing: bool,
    /// Completion time of the last successful merge.
    pub last_sync_timestamp: Option<Timestamp>,
}

/// Statistics about sync operations.
#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    /// Total number of sync cycles completed.
    pub cycles_completed: u64,
    /// Operations delivered to the server.
    pub operations_delivered: u64,
    /// Failed delivery attempts.
    pub operations_failed: u64,
    /// Operations given up after the retry ceiling.
    pub operations_abandoned: u64,
    /// Cycles whose remote snapshot was merged.
    pub merges_applied: u64,
    /// Cycles whose merge was skipped.
    pub merges_skipped: u64,
    /// Duration of the last cycle.
    pub last_cycle_duration: Option<Duration>,
    /// Last error message.
    pub last_error: Option<String>,
}

/// Why a sync request did not run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The device is offline.
    Offline,
    /// Another cycle is already running.
    AlreadySyncing,
    /// No user is signed in.
    NoUser,
}

/// A delivery attempt that failed during a cycle.
#[derive(Debug)]
pub struct DispatchFailure {
    /// Failed operation.
    pub operation_id: OperationId,
    /// Kind of the failed operation.
    pub kind: OperationKind,
    /// Error returned by the server or transport.
    pub error: SyncError,
    /// Whether this failure exhausted the retry budget.
    pub abandoned: bool,
}

/// What happened to the remote snapshot in a cycle.
#[derive(Debug)]
pub enum MergeOutcome {
    /// The merged snapshot was published.
    Applied {
        /// Recorded last sync timestamp.
        last_sync: Timestamp,
        /// Pending operations replayed onto the merged snapshot.
        replayed: usize,
    },
    /// Local state was left untouched.
    Skipped(SyncError),
}

impl MergeOutcome {
    /// Returns true if the merged snapshot was published.
    pub fn is_applied(&self) -> bool {
        matches!(self, MergeOutcome::Applied { .. })
    }
}

/// Result of a sync cycle.
#[derive(Debug)]
pub struct SyncCycleResult {
    /// Operations delivered.
    pub delivered: usize,
    /// Operations left untouched because the device went offline.
    pub deferred: usize,
    /// Failed deliveries, in dispatch order.
    pub failures: Vec<DispatchFailure>,
    /// Operations abandoned in this cycle.
    pub abandoned: Vec<Operation>,
    /// Merge step outcome.
    pub merge: MergeOutcome,
    /// Duration of the sync cycle.
    pub duration: Duration,
}

/// Outcome of [`SyncOrchestrator::sync_now`].
#[derive(Debug)]
pub enum SyncOutcome {
    /// The cycle ran.
    Completed(SyncCycleResult),
    /// The cycle did not run.
    Skipped(SkipReason),
}

impl SyncOutcome {
    /// Returns the cycle result if the cycle ran.
    pub fn completed(self) -> Option<SyncCycleResult> {
        match self {
            SyncOutcome::Completed(result) => Some(result),
            SyncOutcome::Skipped(_) => None,
        }
    }

    /// Returns the skip reason if the cycle did not run.
    pub fn skip_reason(&self) -> Option<SkipReason> {
        match self {
            SyncOutcome::Completed(_) => None,
            SyncOutcome::Skipped(reason) => Some(*reason),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Trigger {
    Timer,
    Reconnect,
    Enqueue,
}

/// Clears the syncing flag when dropped.
struct SyncingGuard<'a>(&'a AtomicBool);

impl<'a> SyncingGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| SyncingGuard(flag))
    }
}

impl Drop for SyncingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Coordinates local mutations, the durable queue and the server.
///
/// # Invariants
///
/// - At most one drain cycle runs at a time
/// - Operations are dispatched in enqueue order
/// - The local snapshot always reflects every queued operation
pub struct SyncOrchestrator<S, R, P> {
    config: SyncConfig,
    store: Arc<S>,
    remote: Arc<R>,
    profiles: Arc<P>,
    connectivity: ConnectivityMonitor,
    queue: Mutex<DurableQueue<S>>,
    // Serializes read-modify-write of the local snapshot.
    profile_lock: Mutex<()>,
    syncing: AtomicBool,
    last_sync: RwLock<Option<Timestamp>>,
    stats: RwLock<SyncStats>,
    abandoned: Mutex<Vec<Operation>>,
    wake: Notify,
}

impl<S, R, P> SyncOrchestrator<S, R, P>
where
    S: KeyValueStore,
    R: RemoteProfileService,
    P: ProfileStore,
{
    /// Creates an orchestrator and restores its persisted state.
    pub fn new(
        config: SyncConfig,
        store: Arc<S>,
        remote: Arc<R>,
        profiles: Arc<P>,
        connectivity: ConnectivityMonitor,
    ) -> Self {
        let queue = DurableQueue::load(Arc::clone(&store), QUEUE_KEY, config.max_operation_retries);
        let last_sync = load_last_sync(store.as_ref());
        debug!(
            pending = queue.pending_count(),
            ?last_sync,
            "sync orchestrator initialized"
        );

        Self {
            config,
            store,
            remote,
            profiles,
            connectivity,
            queue: Mutex::new(queue),
            profile_lock: Mutex::new(()),
            syncing: AtomicBool::new(false),
            last_sync: RwLock::new(last_sync),
            stats: RwLock::new(SyncStats::default()),
            abandoned: Mutex::new(Vec::new()),
            wake: Notify::new(),
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Returns the connectivity monitor.
    pub fn connectivity(&self) -> &ConnectivityMonitor {
        &self.connectivity
    }

    /// Returns the profile store.
    pub fn profiles(&self) -> &Arc<P> {
        &self.profiles
    }

    /// Gets the current state.
    pub fn state(&self) -> SyncState {
        if self.syncing.load(Ordering::Acquire) {
            SyncState::Syncing
        } else if self.connectivity.is_online() {
            SyncState::Idle
        } else {
            SyncState::Offline
        }
    }

    /// Returns the status view.
    pub fn status(&self) -> SyncStatus {
        SyncStatus {
            pending_count: self.queue.lock().pending_count(),
            is_online: self.connectivity.is_online(),
            is_syncing: self.syncing.load(Ordering::Acquire),
            last_sync_timestamp: *self.last_sync.read(),
        }
    }

    /// Gets the current stats.
    pub fn stats(&self) -> SyncStats {
        self.stats.read().clone()
    }

    /// Returns a copy of the queued operations.
    pub fn pending_operations(&self) -> Vec<Operation> {
        self.queue.lock().pending()
    }

    /// Returns operations abandoned since the last call.
    ///
    /// Each abandoned operation is reported once.
    pub fn take_abandoned(&self) -> Vec<Operation> {
        std::mem::take(&mut *self.abandoned.lock())
    }

    /// Queues a mutation for the signed-in user.
    ///
    /// The mutation is persisted, then applied to the local snapshot. While
    /// online the background worker is woken to deliver it.
    pub fn enqueue(&self, mutation: Mutation) -> SyncResult<OperationId> {
        validate(&mutation)?;

        let id = {
            let _profile = self.profile_lock.lock();
            let mut profile = self
                .profiles
                .current_profile()
                .ok_or(SyncError::NotAuthenticated)?;
            let timestamp = current_timestamp();
            let id = self
                .queue
                .lock()
                .enqueue(&mutation, &profile.user_id, timestamp)?;
            profile.apply(&mutation, timestamp);
            self.profiles.replace_profile(profile);
            id
        };

        debug!(operation_id = %id, kind = %mutation.kind(), "operation queued");
        if self.connectivity.is_online() {
            self.wake.notify_one();
        }
        Ok(id)
    }

    /// Adds an item to the closet.
    pub fn enqueue_add_closet_item(&self, item: ClosetItem) -> SyncResult<OperationId> {
        self.enqueue(Mutation::AddClosetItem(item))
    }

    /// Removes an item from the closet.
    pub fn enqueue_remove_closet_item(&self, item_id: impl Into<String>) -> SyncResult<OperationId> {
        self.enqueue(Mutation::RemoveClosetItem {
            item_id: item_id.into(),
        })
    }

    /// Updates fields of a closet item.
    pub fn enqueue_update_closet_item(
        &self,
        item_id: impl Into<String>,
        changes: ClosetItemChanges,
    ) -> SyncResult<OperationId> {
        self.enqueue(Mutation::UpdateClosetItem {
            item_id: item_id.into(),
            changes,
        })
    }

    /// Marks or unmarks a closet item as favorite.
    pub fn enqueue_toggle_favorite(
        &self,
        item_id: impl Into<String>,
        favorite: bool,
    ) -> SyncResult<OperationId> {
        self.enqueue(Mutation::ToggleFavorite {
            item_id: item_id.into(),
            favorite,
        })
    }

    /// Merges keys into the style preferences.
    pub fn enqueue_update_preferences(
        &self,
        preferences: Map<String, Value>,
    ) -> SyncResult<OperationId> {
        self.enqueue(Mutation::UpdatePreferences(preferences))
    }

    /// Submits style quiz answers.
    pub fn enqueue_submit_quiz(&self, answers: Value) -> SyncResult<OperationId> {
        self.enqueue(Mutation::SubmitQuiz(answers))
    }

    /// Likes an item.
    pub fn enqueue_like(&self, item_id: impl Into<String>) -> SyncResult<OperationId> {
        self.enqueue(Mutation::AddLikedItem {
            item_id: item_id.into(),
        })
    }

    /// Withdraws a like.
    pub fn enqueue_unlike(&self, item_id: impl Into<String>) -> SyncResult<OperationId> {
        self.enqueue(Mutation::RemoveLikedItem {
            item_id: item_id.into(),
        })
    }

    /// Dislikes an item.
    pub fn enqueue_dislike(&self, item_id: impl Into<String>) -> SyncResult<OperationId> {
        self.enqueue(Mutation::AddDislikedItem {
            item_id: item_id.into(),
        })
    }

    /// Withdraws a dislike.
    pub fn enqueue_undislike(&self, item_id: impl Into<String>) -> SyncResult<OperationId> {
        self.enqueue(Mutation::RemoveDislikedItem {
            item_id: item_id.into(),
        })
    }

    /// Saves an outfit.
    pub fn enqueue_save_outfit<I, T>(&self, items: I) -> SyncResult<OperationId>
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.enqueue(Mutation::SaveOutfit(outfit(items)))
    }

    /// Removes a saved outfit.
    pub fn enqueue_remove_outfit<I, T>(&self, items: I) -> SyncResult<OperationId>
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.enqueue(Mutation::RemoveOutfit(outfit(items)))
    }

    /// Runs one drain-then-merge cycle now.
    ///
    /// Returns [`SyncOutcome::Skipped`] when offline, signed out or when
    /// another cycle is running. Errors only come from persisting the queue.
    pub async fn sync_now(&self) -> SyncResult<SyncOutcome> {
        if !self.connectivity.is_online() {
            return Ok(SyncOutcome::Skipped(SkipReason::Offline));
        }
        let Some(user_id) = self.profiles.current_profile().map(|p| p.user_id) else {
            return Ok(SyncOutcome::Skipped(SkipReason::NoUser));
        };
        let Some(_syncing) = SyncingGuard::acquire(&self.syncing) else {
            return Ok(SyncOutcome::Skipped(SkipReason::AlreadySyncing));
        };

        let result = self.drain(&user_id).await;
        self.record_cycle(&result);
        result.map(SyncOutcome::Completed)
    }

    async fn drain(&self, user_id: &str) -> SyncResult<SyncCycleResult> {
        let start = Instant::now();
        let pending = self.queue.lock().pending();
        debug!(user_id, pending = pending.len(), "sync cycle started");

        let mut delivered = Vec::new();
        let mut failed = Vec::new();
        let mut errors = Vec::new();
        let mut deferred = 0;

        for operation in &pending {
            match self.remote.dispatch(operation).await {
                Ok(()) => {
                    debug!(operation_id = %operation.id(), kind = %operation.kind(), "operation delivered");
                    delivered.push(operation.id().clone());
                }
                Err(SyncError::OfflineNoFallback) => {
                    // Never reached the server; the retry budget is kept.
                    debug!(operation_id = %operation.id(), "offline, operation deferred");
                    deferred += 1;
                }
                Err(e) => {
                    debug!(operation_id = %operation.id(), kind = %operation.kind(), error = %e, "delivery failed");
                    failed.push(operation.id().clone());
                    errors.push((operation, e));
                }
            }
        }

        let abandoned = self.queue.lock().settle(&delivered, &failed)?;
        for operation in &abandoned {
            let notice = SyncError::Abandoned {
                operation_id: operation.id().clone(),
                kind: operation.kind(),
                attempts: operation.retry_count(),
            };
            warn!(error = %notice, "operation abandoned");
        }
        self.abandoned.lock().extend(abandoned.iter().cloned());

        let failures = errors
            .into_iter()
            .map(|(operation, error)| DispatchFailure {
                operation_id: operation.id().clone(),
                kind: operation.kind(),
                abandoned: abandoned.iter().any(|op| op.id() == operation.id()),
                error,
            })
            .collect();

        let merge = self.merge_remote(user_id).await;

        Ok(SyncCycleResult {
            delivered: delivered.len(),
            deferred,
            failures,
            abandoned,
            merge,
            duration: start.elapsed(),
        })
    }

    async fn merge_remote(&self, user_id: &str) -> MergeOutcome {
        let remote = match self.remote.fetch_profile(user_id).await {
            Ok(profile) if profile.user_id == user_id => profile,
            Ok(profile) => {
                let err = SyncError::Codec(format!(
                    "server returned the profile of {:?}",
                    profile.user_id
                ));
                warn!(user_id, error = %err, "merge skipped");
                return MergeOutcome::Skipped(SyncError::MergeSkipped(Box::new(err)));
            }
            Err(e) => {
                warn!(user_id, error = %e, "remote fetch failed, keeping local state");
                return MergeOutcome::Skipped(SyncError::MergeSkipped(Box::new(e)));
            }
        };

        let replayed = {
            let _profile = self.profile_lock.lock();
            let Some(local) = self
                .profiles
                .current_profile()
                .filter(|profile| profile.user_id == user_id)
            else {
                debug!(user_id, "user signed out during sync, merge dropped");
                return MergeOutcome::Skipped(SyncError::MergeSkipped(Box::new(
                    SyncError::NotAuthenticated,
                )));
            };

            let mut merged = merge(&local, &remote);
            let pending = self.queue.lock().pending();
            let mut replayed = 0;
            for operation in pending.iter().filter(|op| op.user_id() == user_id) {
                match operation.mutation() {
                    Ok(mutation) => {
                        merged.apply(&mutation, operation.timestamp());
                        replayed += 1;
                    }
                    Err(e) => {
                        warn!(operation_id = %operation.id(), error = %e, "cannot replay operation")
                    }
                }
            }
            self.profiles.replace_profile(merged);
            replayed
        };

        let last_sync = current_timestamp();
        *self.last_sync.write() = Some(last_sync);
        if let Err(e) = self.store.set(LAST_SYNC_KEY, &last_sync.to_string()) {
            warn!(error = %e, "failed to persist last sync timestamp");
        }

        MergeOutcome::Applied {
            last_sync,
            replayed,
        }
    }

    fn record_cycle(&self, result: &SyncResult<SyncCycleResult>) {
        let mut stats = self.stats.write();
        match result {
            Ok(cycle) => {
                stats.cycles_completed += 1;
                stats.operations_delivered += cycle.delivered as u64;
                stats.operations_failed += cycle.failures.len() as u64;
                stats.operations_abandoned += cycle.abandoned.len() as u64;
                stats.last_cycle_duration = Some(cycle.duration);
                match &cycle.merge {
                    MergeOutcome::Applied { .. } => stats.merges_applied += 1,
                    MergeOutcome::Skipped(e) => {
                        stats.merges_skipped += 1;
                        stats.last_error = Some(e.to_string());
                    }
                }
                if let Some(failure) = cycle.failures.last() {
                    stats.last_error = Some(failure.error.to_string());
                }
                info!(
                    delivered = cycle.delivered,
                    deferred = cycle.deferred,
                    failed = cycle.failures.len(),
                    abandoned = cycle.abandoned.len(),
                    merged = cycle.merge.is_applied(),
                    duration_ms = cycle.duration.as_millis() as u64,
                    "sync cycle finished"
                );
            }
            Err(e) => {
                stats.last_error = Some(e.to_string());
                warn!(error = %e, "sync cycle failed");
            }
        }
    }
}

impl<S, R, P> SyncOrchestrator<S, R, P>
where
    S: KeyValueStore + 'static,
    R: RemoteProfileService + 'static,
    P: ProfileStore + 'static,
{
    /// Spawns the background worker on the current tokio runtime.
    ///
    /// The worker syncs on every timer tick, when connectivity comes back
    /// and after an enqueue while online. Dropping the returned handle
    /// stops the worker.
    pub fn start(self: &Arc<Self>) -> SyncHandle {
        let (shutdown, mut shutdown_rx) = watch::channel(false);
        let mut online_rx = self.connectivity.subscribe();
        let mut was_online = *online_rx.borrow_and_update();
        let interval = self.config.sync_interval.max(Duration::from_millis(1));
        let this = Arc::clone(self);

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(?interval, online = was_online, "sync worker started");

            loop {
                tokio::select! {
                    biased;
                    _ = shutdown_rx.changed() => break,
                    changed = online_rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let online = *online_rx.borrow_and_update();
                        if online && !was_online {
                            info!("connectivity restored");
                            this.run_cycle(Trigger::Reconnect).await;
                        } else if !online && was_online {
                            info!("connectivity lost, queueing locally");
                        }
                        was_online = online;
                    }
                    _ = this.wake.notified() => this.run_cycle(Trigger::Enqueue).await,
                    _ = ticker.tick() => this.run_cycle(Trigger::Timer).await,
                }
            }

            info!("sync worker stopped");
        });

        SyncHandle { shutdown, task }
    }

    async fn run_cycle(&self, trigger: Trigger) {
        match self.sync_now().await {
            Ok(SyncOutcome::Completed(_)) => debug!(?trigger, "triggered sync completed"),
            Ok(SyncOutcome::Skipped(reason)) => debug!(?trigger, ?reason, "triggered sync skipped"),
            // Already logged and recorded by sync_now.
            Err(_) => {}
        }
    }
}

/// Handle to the background sync worker.
pub struct SyncHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SyncHandle {
    /// Stops the worker, letting an in-flight cycle finish first.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            warn!(error = %e, "sync worker ended abnormally");
        }
    }

    /// Returns true while the worker task is alive.
    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}

fn load_last_sync<S: KeyValueStore>(store: &S) -> Option<Timestamp> {
    match store.get(LAST_SYNC_KEY) {
        Ok(Some(text)) => match text.trim().parse() {
            Ok(timestamp) => Some(timestamp),
            Err(e) => {
                warn!(value = %text, error = %e, "ignoring invalid last sync timestamp");
                None
            }
        },
        Ok(None) => None,
        Err(e) => {
            warn!(error = %e, "failed to read last sync timestamp");
            None
        }
    }
}

fn outfit<I, T>(items: I) -> Outfit
where
    I: IntoIterator<Item = T>,
    T: Into<String>,
{
    items.into_iter().map(Into::into).collect()
}

fn validate(mutation: &Mutation) -> SyncResult<()> {
    let item_id = match mutation {
        Mutation::AddClosetItem(item) => Some(item.id.as_str()),
        Mutation::RemoveClosetItem { item_id }
        | Mutation::ToggleFavorite { item_id, .. }
        | Mutation::AddLikedItem { item_id }
        | Mutation::RemoveLikedItem { item_id }
        | Mutation::AddDislikedItem { item_id }
        | Mutation::RemoveDislikedItem { item_id } => Some(item_id.as_str()),
        Mutation::UpdateClosetItem { item_id, changes } => {
            if changes.is_empty() {
                return Err(SyncError::InvalidOperation(
                    "closet item update without changes".to_string(),
                ));
            }
            Some(item_id.as_str())
        }
        Mutation::SaveOutfit(items) | Mutation::RemoveOutfit(items) => {
            if items.len() < 2 {
                return Err(SyncError::InvalidOperation(
                    "an outfit needs at least 2 distinct items".to_string(),
                ));
            }
            None
        }
        Mutation::UpdatePreferences(_) | Mutation::SubmitQuiz(_) => None,
    };

    match item_id {
        Some(id) if id.trim().is_empty() => {
            Err(SyncError::InvalidOperation("empty item id".to_string()))
        }
        _ => Ok(()),
    }
}
