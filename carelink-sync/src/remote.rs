//! Remote persistence abstraction.
//!
//! The application's API layer supplies one [`RemoteStore`] per entity type.
//! The sync loop only ever asks two things of it: "what do you have for this
//! record?" and "store this record".

use crate::error::SyncResult;
use async_trait::async_trait;
use carelink_model::{Entity, EntityType};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Acknowledgement of a successful remote save.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteAck {
    pub id: String,
    /// Version the remote now holds, when it reports one.
    pub version: Option<u64>,
}

/// Fetch-by-id and save for one entity type.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// The remote's current snapshot of `entity`, or `None` if it has never
    /// seen the record.
    async fn fetch(&self, entity: &Entity) -> SyncResult<Option<Entity>>;

    /// Creates or replaces the record remotely.
    async fn save(&self, entity: &Entity) -> SyncResult<RemoteAck>;
}

/// Remotes keyed by the entity type they serve.
#[derive(Clone, Default)]
pub struct RemoteRegistry {
    remotes: HashMap<EntityType, Arc<dyn RemoteStore>>,
}

impl RemoteRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style registration.
    #[must_use]
    pub fn with(mut self, entity_type: EntityType, remote: Arc<dyn RemoteStore>) -> Self {
        self.register(entity_type, remote);
        self
    }

    pub fn register(&mut self, entity_type: EntityType, remote: Arc<dyn RemoteStore>) {
        self.remotes.insert(entity_type, remote);
    }

    pub fn get(&self, entity_type: EntityType) -> Option<Arc<dyn RemoteStore>> {
        self.remotes.get(&entity_type).cloned()
    }

    pub fn is_empty(&self) -> bool {
        self.remotes.is_empty()
    }
}

impl std::fmt::Debug for RemoteRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut types: Vec<_> = self.remotes.keys().collect();
        types.sort();
        f.debug_struct("RemoteRegistry")
            .field("types", &types)
            .finish()
    }
}

/// An in-memory remote for testing.
pub mod mock {
    use super::*;
    use crate::error::SyncError;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{Mutex, PoisonError};
    use std::time::Duration;

    type SaveHook = Arc<dyn Fn(&Entity) + Send + Sync>;

    /// Remote that keeps records in a map and can be scripted to fail.
    #[derive(Default)]
    pub struct MockRemote {
        records: Mutex<HashMap<String, Entity>>,
        saved: Mutex<Vec<Entity>>,
        fetch_calls: AtomicUsize,
        save_calls: AtomicUsize,
        fail_always: AtomicBool,
        fail_next: AtomicUsize,
        delay: Mutex<Option<Duration>>,
        on_save: Mutex<Option<SaveHook>>,
    }

    impl MockRemote {
        pub fn new() -> Self {
            Self::default()
        }

        /// Seeds the remote with an existing snapshot.
        pub fn insert(&self, entity: Entity) {
            self.records
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(entity.storage_key(), entity);
        }

        /// The remote's current copy of a record.
        pub fn record(&self, entity_type: EntityType, id: &str) -> Option<Entity> {
            self.lookup(&entity_type.storage_key(id))
        }

        fn lookup(&self, key: &str) -> Option<Entity> {
            self.records
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .get(key)
                .cloned()
        }

        /// Every entity passed to `save`, in call order.
        pub fn saved(&self) -> Vec<Entity> {
            self.saved
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone()
        }

        pub fn fetch_calls(&self) -> usize {
            self.fetch_calls.load(Ordering::SeqCst)
        }

        pub fn save_calls(&self) -> usize {
            self.save_calls.load(Ordering::SeqCst)
        }

        /// Every call fails with a network error until reset.
        pub fn fail_always(&self, fail: bool) {
            self.fail_always.store(fail, Ordering::SeqCst);
        }

        /// The next `n` calls fail with a network error.
        pub fn fail_next(&self, n: usize) {
            self.fail_next.store(n, Ordering::SeqCst);
        }

        /// Every call sleeps this long before answering.
        pub fn set_delay(&self, delay: Duration) {
            *self.delay.lock().unwrap_or_else(PoisonError::into_inner) = Some(delay);
        }

        /// Runs after each successful save.
        pub fn on_save(&self, hook: impl Fn(&Entity) + Send + Sync + 'static) {
            *self.on_save.lock().unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(hook));
        }

        async fn before_call(&self) -> SyncResult<()> {
            let delay = *self.delay.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail_always.load(Ordering::SeqCst) {
                return Err(SyncError::Network("simulated outage".into()));
            }
            let scripted = self
                .fail_next
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if scripted {
                return Err(SyncError::Network("simulated failure".into()));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl RemoteStore for MockRemote {
        async fn fetch(&self, entity: &Entity) -> SyncResult<Option<Entity>> {
            self.fetch_calls.fetch_add(1, Ordering::SeqCst);
            self.before_call().await?;
            Ok(self.lookup(&entity.storage_key()))
        }

        async fn save(&self, entity: &Entity) -> SyncResult<RemoteAck> {
            self.save_calls.fetch_add(1, Ordering::SeqCst);
            self.before_call().await?;
            self.insert(entity.clone());
            self.saved
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(entity.clone());

            let hook = self
                .on_save
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone();
            if let Some(hook) = hook {
                hook(entity);
            }
            Ok(RemoteAck {
                id: entity.id.clone(),
                version: Some(entity.version),
            })
        }
    }
}
