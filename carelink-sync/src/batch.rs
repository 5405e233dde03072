//! Batch sync orchestration.
//!
//! [`BatchSyncService`] drains the priority queue against the registered
//! remotes. One cycle runs at a time. Each cycle pulls bounded batches of
//! ready items, syncs the items of a batch concurrently, and publishes a
//! [`SyncProgress`] snapshot after every batch.
//!
//! Each queued entity remembers the newest change-log entry that existed
//! when it was queued. A confirmed push settles the log only up to that
//! entry, so edits saved while the push was in flight stay pending.

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::network::NetworkStatus;
use crate::progress::{ProgressHub, Subscription, SyncProgress};
use crate::queue::{PriorityQueue, QueueItem};
use crate::remote::{RemoteAck, RemoteRegistry};
use carelink_model::Entity;
use carelink_storage::OfflineStorage;
use futures::future::join_all;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// An entity waiting in the sync queue.
#[derive(Debug, Clone, PartialEq)]
pub struct QueuedEntity {
    pub entity: Entity,
    /// Newest change-log entry for the entity when it was queued. A
    /// successful push marks changes synced up to and including this one.
    pub through_change: Option<String>,
}

/// How one item left `sync_item`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ItemOutcome {
    Synced,
    Failed,
    /// Went back to the queue untouched because the network dropped.
    Deferred,
}

struct Inner {
    config: SyncConfig,
    queue: PriorityQueue<QueuedEntity>,
    storage: Arc<OfflineStorage>,
    remotes: RemoteRegistry,
    network: NetworkStatus,
    in_progress: AtomicBool,
    /// Set on every enqueue, cleared each time the cycle looks at the queue.
    wakeup: AtomicBool,
    hub: Arc<ProgressHub>,
}

/// Releases the in-flight flag on every exit path, panics included.
struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Queue-draining sync engine. Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct BatchSyncService {
    inner: Arc<Inner>,
}

impl BatchSyncService {
    /// A `batch_size` of zero is treated as one.
    pub fn new(
        mut config: SyncConfig,
        storage: Arc<OfflineStorage>,
        remotes: RemoteRegistry,
        network: NetworkStatus,
    ) -> Self {
        config.batch_size = config.batch_size.max(1);
        let queue = PriorityQueue::new(config.queue_max_retries);
        Self {
            inner: Arc::new(Inner {
                config,
                queue,
                storage,
                remotes,
                network,
                in_progress: AtomicBool::new(false),
                wakeup: AtomicBool::new(false),
                hub: Arc::new(ProgressHub::default()),
            }),
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.inner.config
    }

    pub fn queue(&self) -> &PriorityQueue<QueuedEntity> {
        &self.inner.queue
    }

    pub fn network(&self) -> &NetworkStatus {
        &self.inner.network
    }

    pub fn storage(&self) -> &Arc<OfflineStorage> {
        &self.inner.storage
    }

    // ── Queueing ─────────────────────────────────────────────────

    /// Adds an entity to the queue under its storage key without starting a
    /// cycle. Returns `true` for a new queue entry, `false` for an update.
    pub fn enqueue(&self, entity: Entity, priority: i32, dependencies: Vec<String>) -> bool {
        let key = entity.storage_key();
        let through_change = match self
            .inner
            .storage
            .latest_change_id(entity.entity_type, &entity.id)
        {
            Ok(change) => change,
            Err(e) => {
                warn!("Could not read change log for {}: {}", key, e);
                None
            }
        };
        let queued = QueuedEntity {
            entity,
            through_change,
        };
        let added = self.inner.queue.enqueue(key, queued, priority, dependencies);
        self.inner.wakeup.store(true, Ordering::SeqCst);
        added
    }

    /// Enqueues an entity and, when online with no cycle running, starts a
    /// cycle in the background.
    ///
    /// Returns the handle of the cycle it started. Outside a tokio runtime
    /// the entity is only queued.
    pub fn queue_for_sync(
        &self,
        entity: Entity,
        priority: i32,
        dependencies: Vec<String>,
    ) -> Option<JoinHandle<Option<SyncProgress>>> {
        self.enqueue(entity, priority, dependencies);
        if !self.inner.network.is_online() || self.is_in_progress() {
            return None;
        }
        let handle = Handle::try_current().ok()?;
        let service = self.clone();
        Some(handle.spawn(async move { service.start_sync().await }))
    }

    // ── Cycle ────────────────────────────────────────────────────

    /// Runs one sync cycle to completion.
    ///
    /// Returns `None` without doing anything if a cycle is already running.
    /// Otherwise returns the final progress snapshot, which is also
    /// published to subscribers.
    ///
    /// Anything enqueued after the cycle last looked at the queue, but before
    /// it released the in-flight flag, is drained by another pass: such an
    /// enqueue saw the cycle as running and did not start its own.
    pub async fn start_sync(&self) -> Option<SyncProgress> {
        if !self.try_begin() {
            debug!("Sync cycle already running");
            return None;
        }

        info!("Sync cycle started with {} queued item(s)", self.inner.queue.size());
        let mut progress = SyncProgress {
            in_progress: true,
            ..SyncProgress::default()
        };
        self.run_guarded(&mut progress).await;

        while self.inner.wakeup.load(Ordering::SeqCst)
            && self.inner.network.is_online()
            && !self.inner.queue.is_empty()
        {
            // Another cycle took over and will see the same items.
            if !self.try_begin() {
                break;
            }
            debug!("Items queued while the cycle was winding down, running again");
            self.run_guarded(&mut progress).await;
        }

        progress.in_progress = false;
        progress.total = progress.completed + progress.failed + self.inner.queue.size();
        self.inner.hub.publish(&progress);
        info!(
            "Sync cycle finished: {} synced, {} failed, {} still queued",
            progress.completed,
            progress.failed,
            self.inner.queue.size()
        );
        Some(progress)
    }

    fn try_begin(&self) -> bool {
        self.inner
            .in_progress
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// Runs `run_cycle` with the in-flight flag held, releasing it afterwards
    /// even if the cycle panics. The flag must already be set.
    async fn run_guarded(&self, progress: &mut SyncProgress) {
        let guard = InFlightGuard(&self.inner.in_progress);
        if AssertUnwindSafe(self.run_cycle(progress))
            .catch_unwind()
            .await
            .is_err()
        {
            error!("Sync cycle aborted by a panic");
        }
        drop(guard);
    }

    async fn run_cycle(&self, progress: &mut SyncProgress) {
        loop {
            self.inner.wakeup.store(false, Ordering::SeqCst);
            if !self.inner.network.is_online() {
                info!(
                    "Offline, pausing sync with {} item(s) queued",
                    self.inner.queue.size()
                );
                break;
            }
            if self.inner.queue.is_empty() {
                break;
            }

            let batch = self.inner.queue.dequeue_batch(self.inner.config.batch_size);
            if batch.is_empty() {
                warn!(
                    "{} queued item(s) are waiting on dependencies that cannot clear",
                    self.inner.queue.size()
                );
                break;
            }

            let size = batch.len();
            let outcomes = join_all(batch.into_iter().map(|item| self.sync_item(item))).await;
            for outcome in outcomes {
                match outcome {
                    ItemOutcome::Synced => progress.completed += 1,
                    ItemOutcome::Failed => progress.failed += 1,
                    ItemOutcome::Deferred => {}
                }
            }
            progress.total = progress.completed + progress.failed + self.inner.queue.size();
            debug!(
                "Batch of {} done: {}/{} synced, {} failed",
                size, progress.completed, progress.total, progress.failed
            );
            self.inner.hub.publish(progress);
        }
    }

    /// Pushes one item, retrying with linear backoff.
    async fn sync_item(&self, item: QueueItem<QueuedEntity>) -> ItemOutcome {
        let key = item.id.as_str();
        let mut attempt: u32 = 1;
        loop {
            if !self.inner.network.is_online() {
                self.inner.queue.requeue(key);
                debug!("Offline, returning {} to the queue", key);
                return ItemOutcome::Deferred;
            }

            match self.push(&item.data.entity).await {
                Ok(ack) => {
                    self.inner.queue.mark_as_complete(key);
                    self.mark_synced(&item.data).await;
                    debug!("Synced {} (remote version {:?})", key, ack.version);
                    return ItemOutcome::Synced;
                }
                Err(e) if e.is_retryable() && attempt < self.inner.config.retry_attempts => {
                    let delay = self.inner.config.retry_delay() * attempt;
                    warn!(
                        "Sync attempt {} for {} failed: {}; retrying in {:?}",
                        attempt, key, e, delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    self.inner.queue.mark_as_dropped(key);
                    error!("Giving up on {} after {} attempt(s): {}", key, attempt, e);
                    return ItemOutcome::Failed;
                }
            }
        }
    }

    /// One attempt: fetch the remote snapshot, merge if it exists, save.
    async fn push(&self, entity: &Entity) -> SyncResult<RemoteAck> {
        let remote = self
            .inner
            .remotes
            .get(entity.entity_type)
            .ok_or(SyncError::NoRemote(entity.entity_type))?;
        let timeout = self.inner.config.request_timeout();

        let existing = tokio::time::timeout(timeout, remote.fetch(entity))
            .await
            .map_err(|_| SyncError::Timeout)??;

        let outgoing = match existing {
            Some(server) => {
                let (resolved, metadata) =
                    self.inner.storage.resolve_conflict(entity, &server, None)?;
                if metadata.has_conflicts() {
                    debug!(
                        "Merged {} conflicting field(s) on {}",
                        metadata.conflict_field_paths.len(),
                        entity.storage_key()
                    );
                }
                resolved
            }
            None => entity.clone(),
        };

        tokio::time::timeout(timeout, remote.save(&outgoing))
            .await
            .map_err(|_| SyncError::Timeout)?
    }

    /// Settles the change log up to the entry the pushed snapshot covers.
    async fn mark_synced(&self, queued: &QueuedEntity) {
        let entity = &queued.entity;
        let Some(through) = queued.through_change.clone() else {
            debug!("{} had no logged changes when queued", entity.storage_key());
            return;
        };
        let storage = Arc::clone(&self.inner.storage);
        let entity_type = entity.entity_type;
        let id = entity.id.clone();
        let marked = tokio::task::spawn_blocking(move || {
            storage.mark_changes_synced_through(entity_type, &id, &through)
        })
        .await;
        match marked {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => warn!(
                "Failed to mark changes synced for {}: {}",
                entity.storage_key(),
                e
            ),
            Err(e) => warn!("spawn_blocking panicked for {}: {}", entity.storage_key(), e),
        }
    }

    // ── Introspection ────────────────────────────────────────────

    /// Subscribes to progress snapshots.
    pub fn on_progress(&self, cb: impl Fn(&SyncProgress) + Send + Sync + 'static) -> Subscription {
        self.inner.hub.subscribe(cb)
    }

    /// Items queued or currently being pushed.
    pub fn get_pending_count(&self) -> usize {
        self.inner.queue.size() + self.inner.queue.processing_count()
    }

    pub fn is_in_progress(&self) -> bool {
        self.inner.in_progress.load(Ordering::SeqCst)
    }

    /// Drops every queued item. A running cycle finishes its current batch.
    pub fn clear_queue(&self) {
        self.inner.queue.clear();
        info!("Cleared sync queue");
    }

    pub fn progress_subscribers(&self) -> usize {
        self.inner.hub.len()
    }
}
