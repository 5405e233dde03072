//! Offline-first sync engine for CareLink.
//!
//! Records edited on a device are saved locally first and pushed to the
//! remote API whenever connectivity allows.
//!
//! # Architecture
//!
//! - **Queue**: [`PriorityQueue`] orders work by priority, then age, and holds
//!   back items whose dependencies are still queued or in flight
//! - **Network**: [`NetworkStatus`] is the shared online/offline flag, fed by
//!   the platform or a [`ConnectivityProbe`]
//! - **Remote**: one [`RemoteStore`] per entity type, collected in a
//!   [`RemoteRegistry`]
//! - **Batch**: [`BatchSyncService`] drains the queue in bounded, concurrent
//!   batches with per-item retry and linear backoff
//! - **Service**: [`SyncService`] runs batches on an interval while online and
//!   reports status
//!
//! ## Sync Process
//!
//! 1. **Fetch**: ask the remote for its snapshot of the record
//! 2. **Merge**: if one exists, resolve field conflicts through
//!    [`carelink_storage::OfflineStorage::resolve_conflict`]
//! 3. **Save**: push the merged (or local) record
//! 4. **Confirm**: flag the record's pending changes as synced, up to the
//!    newest one that existed when it was queued
//!
//! # Example
//!
//! ```
//! use carelink_crypto::{EncryptionService, FieldKey};
//! use carelink_merge::ConflictResolver;
//! use carelink_model::{Entity, EntityType};
//! use carelink_storage::{OfflineStorage, StorageConfig};
//! use carelink_sync::{BatchSyncService, NetworkStatus, RemoteRegistry, SyncConfig};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! let storage = OfflineStorage::open(
//!     &StorageConfig::default(),
//!     EncryptionService::new(FieldKey::random()),
//!     Arc::new(ConflictResolver::default()),
//! )
//! .unwrap();
//! let network = NetworkStatus::new(false);
//! let sync = BatchSyncService::new(
//!     SyncConfig::default(),
//!     Arc::new(storage),
//!     RemoteRegistry::new(),
//!     network,
//! );
//!
//! let visit = Entity::new(EntityType::Visit, "v-1", json!({"notes": "All well"}));
//! assert!(sync.queue_for_sync(visit, 0, vec![]).is_none());
//! assert_eq!(sync.get_pending_count(), 1);
//! ```

mod batch;
mod config;
mod error;
mod network;
mod progress;
pub mod queue;
pub mod remote;
mod service;

pub use batch::{BatchSyncService, QueuedEntity};
pub use config::{SyncConfig, DEFAULT_BATCH_SIZE};
pub use error::{SyncError, SyncResult};
pub use network::{ConnectivityProbe, NetworkStatus, TcpProbe};
pub use progress::{Subscription, SyncProgress};
pub use queue::{FailureOutcome, PriorityQueue, QueueItem};
pub use remote::{RemoteAck, RemoteRegistry, RemoteStore};
pub use service::{SyncService, SyncStatus};
