use crate::entity::{now_millis, EntityType};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What a pending change did to its record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Create,
    Update,
    Delete,
}

/// Append-only record of a local mutation awaiting remote confirmation.
///
/// Entries are never removed; syncing only flips `synced`, so the list
/// doubles as an audit trail of everything written on this device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingChange {
    /// Unique id of this log entry (UUID v7, time-ordered).
    pub change_id: String,
    pub entity_id: String,
    pub entity_type: EntityType,
    pub kind: ChangeKind,
    /// The payload exactly as persisted (after compression and encryption).
    pub payload: serde_json::Value,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    pub synced: bool,
}

impl PendingChange {
    /// Creates an unsynced change stamped with the current time.
    pub fn new(
        entity_type: EntityType,
        entity_id: impl Into<String>,
        kind: ChangeKind,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            change_id: Uuid::now_v7().to_string(),
            entity_id: entity_id.into(),
            entity_type,
            kind,
            payload,
            timestamp: now_millis(),
            synced: false,
        }
    }
}
