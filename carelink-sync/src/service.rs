//! Periodic sync coordinator.

use crate::batch::BatchSyncService;
use crate::error::{SyncError, SyncResult};
use crate::progress::{Subscription, SyncProgress};
use carelink_model::{EntityType, PendingChange};
use carelink_storage::OfflineStorage;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

/// Summary for status displays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    /// Latest timestamp among synced changes, if any.
    pub last_sync: Option<i64>,
    /// Unsynced entries in the change log.
    pub pending_changes: usize,
    /// Approximate bytes used by the local store.
    pub storage_used: u64,
}

impl SyncStatus {
    fn from_changes(changes: &[PendingChange], storage_used: u64) -> Self {
        Self {
            last_sync: changes.iter().filter(|c| c.synced).map(|c| c.timestamp).max(),
            pending_changes: changes.iter().filter(|c| !c.synced).count(),
            storage_used,
        }
    }
}

/// Runs [`BatchSyncService`] on an interval while the network is up.
///
/// `start` spawns a supervisor that watches connectivity: going online
/// starts the interval (its first tick syncs immediately), going offline
/// stops it once any running cycle has finished.
pub struct SyncService {
    batch: BatchSyncService,
    supervisor: Mutex<Option<JoinHandle<()>>>,
}

impl SyncService {
    pub fn new(batch: BatchSyncService) -> Self {
        Self {
            batch,
            supervisor: Mutex::new(None),
        }
    }

    pub fn batch(&self) -> &BatchSyncService {
        &self.batch
    }

    fn storage(&self) -> &Arc<OfflineStorage> {
        self.batch.storage()
    }

    fn supervisor(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.supervisor.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ── Lifecycle ────────────────────────────────────────────────

    /// Starts following connectivity. Calling it again while running is a
    /// no-op.
    pub fn start(&self) -> SyncResult<()> {
        let mut slot = self.supervisor();
        if slot.as_ref().is_some_and(|h| !h.is_finished()) {
            return Ok(());
        }
        let handle = Handle::try_current()
            .map_err(|_| SyncError::Config("sync service needs a tokio runtime".into()))?;

        let batch = self.batch.clone();
        let every = batch.config().sync_interval().max(Duration::from_millis(1));
        let mut online_rx = batch.network().subscribe();

        *slot = Some(handle.spawn(async move {
            // Dropping the sender also stops the ticker.
            let mut ticker: Option<oneshot::Sender<()>> = None;
            loop {
                let online = *online_rx.borrow_and_update();
                if online && ticker.is_none() {
                    info!("Starting periodic sync every {:?}", every);
                    ticker = Some(spawn_ticker(batch.clone(), every));
                } else if !online {
                    if let Some(stop) = ticker.take() {
                        info!("Stopping periodic sync while offline");
                        let _ = stop.send(());
                    }
                }
                if online_rx.changed().await.is_err() {
                    break;
                }
            }
        }));
        Ok(())
    }

    /// Stops the supervisor and the interval. A cycle already in flight
    /// runs to completion.
    pub fn stop(&self) {
        if let Some(handle) = self.supervisor().take() {
            handle.abort();
            info!("Sync service stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.supervisor()
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }

    // ── Triggers ─────────────────────────────────────────────────

    /// Queues the stored copy of every record with an unsynced change, then
    /// runs a cycle to completion.
    ///
    /// Returns `None` if another cycle was already running; the records stay
    /// queued for it.
    pub async fn force_sync_all(&self) -> SyncResult<Option<SyncProgress>> {
        let mut seen = BTreeSet::new();
        let mut queued = 0;
        for change in self.storage().unsynced_changes()? {
            if !seen.insert((change.entity_type, change.entity_id.clone())) {
                continue;
            }
            match self.storage().get(change.entity_type, &change.entity_id)? {
                Some(entity) => {
                    self.batch.enqueue(entity, 0, Vec::new());
                    queued += 1;
                }
                None => debug!(
                    "Skipping {}: no stored record",
                    change.entity_type.storage_key(&change.entity_id)
                ),
            }
        }
        info!("Force sync queued {} record(s)", queued);
        Ok(self.batch.start_sync().await)
    }

    /// Loads a stored record and queues it for sync.
    pub fn sync_entity(
        &self,
        entity_type: EntityType,
        id: &str,
        priority: i32,
    ) -> SyncResult<Option<JoinHandle<Option<SyncProgress>>>> {
        let entity = self
            .storage()
            .get(entity_type, id)?
            .ok_or_else(|| SyncError::NotFound(entity_type.storage_key(id)))?;
        Ok(self.batch.queue_for_sync(entity, priority, Vec::new()))
    }

    pub fn sync_assessment(&self, id: &str) -> SyncResult<Option<JoinHandle<Option<SyncProgress>>>> {
        self.sync_entity(EntityType::Assessment, id, 0)
    }

    pub fn sync_visit(&self, id: &str) -> SyncResult<Option<JoinHandle<Option<SyncProgress>>>> {
        self.sync_entity(EntityType::Visit, id, 0)
    }

    // ── Status ───────────────────────────────────────────────────

    pub fn get_sync_status(&self) -> SyncResult<SyncStatus> {
        let changes = self.storage().pending_changes()?;
        Ok(SyncStatus::from_changes(&changes, self.storage().storage_size()?))
    }

    pub fn is_online(&self) -> bool {
        self.batch.network().is_online()
    }

    pub fn on_progress(&self, cb: impl Fn(&SyncProgress) + Send + Sync + 'static) -> Subscription {
        self.batch.on_progress(cb)
    }
}

impl Drop for SyncService {
    fn drop(&mut self) {
        self.stop();
    }
}

fn spawn_ticker(batch: BatchSyncService, every: Duration) -> oneshot::Sender<()> {
    let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    batch.start_sync().await;
                }
                _ = &mut stop_rx => break,
            }
        }
        debug!("Periodic sync stopped");
    });
    stop_tx
}
