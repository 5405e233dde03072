//! The single gateway to the on-device store.
//!
//! Write path: compress the type's large fields, encrypt its sensitive
//! fields, persist under `{type}_{id}`, then append a pending change.
//! Read path is the exact inverse: decrypt, then decompress.

use crate::backend::KvStore;
use crate::compression::CompressionService;
use crate::config::StorageConfig;
use crate::error::StorageResult;
use carelink_crypto::EncryptionService;
use carelink_merge::{ConflictMetadata, ConflictResolver, ResolutionStrategy};
use carelink_model::{ChangeKind, Entity, EntityType, FieldSchemaTable, PendingChange};
use serde_json::Value;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info, warn};

/// Key of the pending-change log inside the store.
pub const PENDING_CHANGES_KEY: &str = "pending_changes";

pub struct OfflineStorage {
    store: Arc<dyn KvStore>,
    compression: CompressionService,
    encryption: EncryptionService,
    schemas: FieldSchemaTable,
    resolver: Arc<ConflictResolver>,
    /// Serializes read-modify-write cycles on the pending-change log.
    changes_lock: Mutex<()>,
}

impl OfflineStorage {
    /// Opens the backend described by `config`.
    pub fn open(
        config: &StorageConfig,
        encryption: EncryptionService,
        resolver: Arc<ConflictResolver>,
    ) -> StorageResult<Self> {
        let store = config.open_backend()?;
        info!(
            "Opened offline store '{}' ({})",
            config.store_name,
            config
                .path
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "in memory".to_string())
        );
        Ok(Self::with_backend(store, config, encryption, resolver))
    }

    /// Wraps an already opened backend.
    pub fn with_backend(
        store: Arc<dyn KvStore>,
        config: &StorageConfig,
        encryption: EncryptionService,
        resolver: Arc<ConflictResolver>,
    ) -> Self {
        Self {
            store,
            compression: CompressionService::new(config.compression_threshold),
            encryption,
            schemas: config.schemas.clone(),
            resolver,
            changes_lock: Mutex::new(()),
        }
    }

    pub fn resolver(&self) -> &Arc<ConflictResolver> {
        &self.resolver
    }

    // ── Records ──────────────────────────────────────────────────

    /// Persists an entity and logs a pending change for it.
    ///
    /// The change is `Create` when no record existed under the key, `Update`
    /// otherwise. Returns the logged change.
    pub fn save(&self, entity: &Entity) -> StorageResult<PendingChange> {
        let key = entity.storage_key();
        let encoded = self.encode(entity)?;
        let payload = serde_json::to_value(&encoded)?;

        let existed = self.store.get(&key)?.is_some();
        self.store.put(&key, &serde_json::to_string(&payload)?)?;

        let kind = if existed {
            ChangeKind::Update
        } else {
            ChangeKind::Create
        };
        let change = PendingChange::new(entity.entity_type, entity.id.clone(), kind, payload);
        self.append_change(change.clone())?;
        debug!("Saved {} ({:?})", key, kind);
        Ok(change)
    }

    /// Loads and decodes one entity; `None` if absent.
    pub fn get(&self, entity_type: EntityType, id: &str) -> StorageResult<Option<Entity>> {
        let key = entity_type.storage_key(id);
        match self.store.get(&key)? {
            Some(raw) => {
                let stored: Entity = serde_json::from_str(&raw)?;
                Ok(Some(self.decode(stored)))
            }
            None => Ok(None),
        }
    }

    /// Loads and decodes every entity of a type.
    ///
    /// Records that no longer parse are skipped with a warning rather than
    /// failing the whole listing.
    pub fn get_all(&self, entity_type: EntityType) -> StorageResult<Vec<Entity>> {
        let rows = self.store.scan_prefix(&entity_type.key_prefix())?;
        let mut entities = Vec::with_capacity(rows.len());
        for (key, raw) in rows {
            match serde_json::from_str::<Entity>(&raw) {
                Ok(stored) => entities.push(self.decode(stored)),
                Err(e) => warn!("Skipping unreadable record {}: {}", key, e),
            }
        }
        Ok(entities)
    }

    /// Removes an entity and logs a `Delete` change. Returns whether it existed.
    pub fn delete(&self, entity_type: EntityType, id: &str) -> StorageResult<bool> {
        let key = entity_type.storage_key(id);
        if !self.store.delete(&key)? {
            return Ok(false);
        }
        self.append_change(PendingChange::new(
            entity_type,
            id,
            ChangeKind::Delete,
            Value::Null,
        ))?;
        debug!("Deleted {}", key);
        Ok(true)
    }

    // ── Pending changes ──────────────────────────────────────────

    /// The full change log, oldest first.
    pub fn pending_changes(&self) -> StorageResult<Vec<PendingChange>> {
        let _guard = self.changes_lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.load_changes()
    }

    /// Changes not yet confirmed by the remote.
    pub fn unsynced_changes(&self) -> StorageResult<Vec<PendingChange>> {
        Ok(self
            .pending_changes()?
            .into_iter()
            .filter(|c| !c.synced)
            .collect())
    }

    /// Flags every unsynced change for `entity_id` as synced. Entries are
    /// kept. Returns how many were flipped.
    pub fn mark_change_synced(&self, entity_type: EntityType, entity_id: &str) -> StorageResult<usize> {
        let _guard = self.changes_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut changes = self.load_changes()?;
        let mut flipped = 0;
        for change in changes
            .iter_mut()
            .filter(|c| !c.synced && c.entity_type == entity_type && c.entity_id == entity_id)
        {
            change.synced = true;
            flipped += 1;
        }
        if flipped > 0 {
            self.store_changes(&changes)?;
        }
        Ok(flipped)
    }

    /// Id of the newest logged change for an entity, synced or not.
    pub fn latest_change_id(&self, entity_type: EntityType, entity_id: &str) -> StorageResult<Option<String>> {
        Ok(self
            .pending_changes()?
            .into_iter()
            .rev()
            .find(|c| c.entity_type == entity_type && c.entity_id == entity_id)
            .map(|c| c.change_id))
    }

    /// Flags unsynced changes for `entity_id` as synced, up to and including
    /// the change `through`. Later changes stay pending. Flips nothing when
    /// `through` is no longer in the log.
    pub fn mark_changes_synced_through(
        &self,
        entity_type: EntityType,
        entity_id: &str,
        through: &str,
    ) -> StorageResult<usize> {
        let _guard = self.changes_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut changes = self.load_changes()?;
        let Some(end) = changes.iter().position(|c| c.change_id == through) else {
            return Ok(0);
        };
        let mut flipped = 0;
        for change in changes[..=end]
            .iter_mut()
            .filter(|c| !c.synced && c.entity_type == entity_type && c.entity_id == entity_id)
        {
            change.synced = true;
            flipped += 1;
        }
        if flipped > 0 {
            self.store_changes(&changes)?;
        }
        Ok(flipped)
    }

    fn append_change(&self, change: PendingChange) -> StorageResult<()> {
        let _guard = self.changes_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut changes = self.load_changes()?;
        changes.push(change);
        self.store_changes(&changes)
    }

    fn load_changes(&self) -> StorageResult<Vec<PendingChange>> {
        match self.store.get(PENDING_CHANGES_KEY)? {
            Some(raw) => Ok(serde_json::from_str(&raw)?),
            None => Ok(Vec::new()),
        }
    }

    fn store_changes(&self, changes: &[PendingChange]) -> StorageResult<()> {
        self.store
            .put(PENDING_CHANGES_KEY, &serde_json::to_string(changes)?)
    }

    // ── Conflicts ────────────────────────────────────────────────

    /// Diffs two snapshots and merges them with `strategy` (or the
    /// resolver's default).
    pub fn resolve_conflict(
        &self,
        client: &Entity,
        server: &Entity,
        strategy: Option<ResolutionStrategy>,
    ) -> StorageResult<(Entity, ConflictMetadata)> {
        let metadata = self.resolver.detect_conflicts(client, server);
        let resolved = self
            .resolver
            .resolve_conflict(client, server, &metadata, strategy)?;
        Ok((resolved, metadata))
    }

    // ── Administration ───────────────────────────────────────────

    /// Wipes every record and the change log.
    pub fn clear_storage(&self) -> StorageResult<()> {
        let _guard = self.changes_lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.store.clear()?;
        info!("Cleared offline store");
        Ok(())
    }

    /// Approximate bytes used on device.
    pub fn storage_size(&self) -> StorageResult<u64> {
        self.store.size_bytes()
    }

    // ── Field codec ──────────────────────────────────────────────

    fn encode(&self, entity: &Entity) -> StorageResult<Entity> {
        let compressed = self
            .compression
            .compress_fields(&entity.data, self.schemas.compressed_fields(entity.entity_type))?;
        let sealed = self
            .encryption
            .encrypt_fields(&compressed, self.schemas.sensitive_fields(entity.entity_type))?;
        Ok(Entity {
            data: sealed,
            ..entity.clone()
        })
    }

    /// Best-effort inverse of `encode`: a field that fails to decrypt or
    /// inflate is left in its stored form and a warning is logged.
    fn decode(&self, mut entity: Entity) -> Entity {
        let key = entity.storage_key();
        let sensitive = self.schemas.sensitive_fields(entity.entity_type);
        let compressed = self.schemas.compressed_fields(entity.entity_type);
        let Some(map) = entity.data.as_object_mut() else {
            return entity;
        };

        for field in sensitive {
            if let Some(slot) = map.get_mut(field) {
                if !EncryptionService::is_encrypted(slot) {
                    continue;
                }
                match self.encryption.decrypt(slot) {
                    Ok(plain) => *slot = plain,
                    Err(e) => warn!("Could not decrypt {}.{}: {}", key, field, e),
                }
            }
        }

        for field in compressed {
            if let Some(slot) = map.get_mut(field) {
                match self.compression.decompress(slot) {
                    Ok(plain) => *slot = plain,
                    Err(e) => warn!("Could not decompress {}.{}: {}", key, field, e),
                }
            }
        }

        entity
    }
}
