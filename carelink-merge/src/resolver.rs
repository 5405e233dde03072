//! Conflict detection and resolution between client and server snapshots.

use crate::diff::{diff_paths, get_path, set_path};
use crate::error::{MergeError, MergeResult};
use carelink_model::{Entity, EntityType};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::debug;

/// How conflicting fields are settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResolutionStrategy {
    /// Start from the server snapshot and take the client's value at every conflict.
    #[default]
    ClientWins,
    /// Start from the client snapshot and take the server's value at every conflict.
    ServerWins,
    /// Hand both snapshots to a resolver registered for the entity type.
    ManualMerge,
}

/// Describes how two snapshots of one record differ. Computed on demand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictMetadata {
    pub entity_id: String,
    pub entity_type: EntityType,
    pub client_version: u64,
    pub server_version: u64,
    pub client_timestamp: i64,
    pub server_timestamp: i64,
    /// Dot-delimited paths of every differing leaf in `data`.
    pub conflict_field_paths: Vec<String>,
}

impl ConflictMetadata {
    pub fn has_conflicts(&self) -> bool {
        !self.conflict_field_paths.is_empty()
    }
}

/// Everything a manual resolver gets to look at.
#[derive(Debug, Clone, Copy)]
pub struct MergeInput<'a> {
    pub client_data: &'a Entity,
    pub server_data: &'a Entity,
    pub metadata: &'a ConflictMetadata,
}

/// Custom merge logic for one entity type.
pub trait ManualResolver: Send + Sync {
    fn merge(&self, input: MergeInput<'_>) -> MergeResult<Entity>;
}

impl<F> ManualResolver for F
where
    F: Fn(MergeInput<'_>) -> MergeResult<Entity> + Send + Sync,
{
    fn merge(&self, input: MergeInput<'_>) -> MergeResult<Entity> {
        self(input)
    }
}

/// Field-level diff and merge between client and server snapshots.
///
/// Shared by reference between storage and the sync loop; the default
/// strategy and resolver registry are interior-mutable.
pub struct ConflictResolver {
    default_strategy: RwLock<ResolutionStrategy>,
    manual: RwLock<HashMap<EntityType, Arc<dyn ManualResolver>>>,
}

impl Default for ConflictResolver {
    fn default() -> Self {
        Self::new(ResolutionStrategy::default())
    }
}

impl std::fmt::Debug for ConflictResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConflictResolver")
            .field("default_strategy", &self.default_strategy())
            .finish_non_exhaustive()
    }
}

impl ConflictResolver {
    pub fn new(default_strategy: ResolutionStrategy) -> Self {
        Self {
            default_strategy: RwLock::new(default_strategy),
            manual: RwLock::new(HashMap::new()),
        }
    }

    /// The strategy used when a caller does not name one.
    pub fn default_strategy(&self) -> ResolutionStrategy {
        *self.default_strategy.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_default_strategy(&self, strategy: ResolutionStrategy) {
        *self.default_strategy.write().unwrap_or_else(PoisonError::into_inner) = strategy;
    }

    /// Registers (or replaces) the manual resolver for an entity type.
    pub fn register_manual_resolver(
        &self,
        entity_type: EntityType,
        resolver: impl ManualResolver + 'static,
    ) {
        self.manual
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(entity_type, Arc::new(resolver));
    }

    /// Compares the `data` of two snapshots of the same record.
    pub fn detect_conflicts(&self, client: &Entity, server: &Entity) -> ConflictMetadata {
        let conflict_field_paths = diff_paths(&client.data, &server.data);
        debug!(
            "Detected {} conflicting field(s) on {}",
            conflict_field_paths.len(),
            client.storage_key()
        );
        ConflictMetadata {
            entity_id: client.id.clone(),
            entity_type: client.entity_type,
            client_version: client.version,
            server_version: server.version,
            client_timestamp: client.updated_at,
            server_timestamp: server.updated_at,
            conflict_field_paths,
        }
    }

    /// Merges two snapshots. `None` uses the default strategy.
    ///
    /// The result keeps the client's identity and takes the newer version
    /// and timestamp of the two inputs.
    pub fn resolve_conflict(
        &self,
        client: &Entity,
        server: &Entity,
        metadata: &ConflictMetadata,
        strategy: Option<ResolutionStrategy>,
    ) -> MergeResult<Entity> {
        if client.id != server.id || client.entity_type != server.entity_type {
            return Err(MergeError::Mismatch {
                client: client.storage_key(),
                server: server.storage_key(),
            });
        }

        let strategy = strategy.unwrap_or_else(|| self.default_strategy());
        let data = match strategy {
            ResolutionStrategy::ClientWins => overlay(&server.data, &client.data, metadata),
            ResolutionStrategy::ServerWins => overlay(&client.data, &server.data, metadata),
            ResolutionStrategy::ManualMerge => {
                let resolver = self
                    .manual
                    .read()
                    .unwrap_or_else(PoisonError::into_inner)
                    .get(&client.entity_type)
                    .cloned()
                    .ok_or(MergeError::ResolverNotFound(client.entity_type))?;
                return resolver.merge(MergeInput {
                    client_data: client,
                    server_data: server,
                    metadata,
                });
            }
        };

        Ok(Entity {
            id: client.id.clone(),
            entity_type: client.entity_type,
            version: client.version.max(server.version),
            updated_at: client.updated_at.max(server.updated_at),
            data,
        })
    }
}

/// Copies `winner`'s value at every conflicting path onto a clone of `base`.
fn overlay(base: &Value, winner: &Value, metadata: &ConflictMetadata) -> Value {
    let mut out = base.clone();
    // Reverse order so array tail removals pop from the end first.
    for path in metadata.conflict_field_paths.iter().rev() {
        set_path(&mut out, path, get_path(winner, path).cloned());
    }
    out
}
