use crate::ModelError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The kinds of record that participate in offline sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Assessment,
    Visit,
}

impl EntityType {
    /// The lowercase name used in storage keys.
    pub const fn as_str(&self) -> &'static str {
        match self {
            EntityType::Assessment => "assessment",
            EntityType::Visit => "visit",
        }
    }

    /// Prefix shared by every storage key of this type (`assessment_`).
    pub fn key_prefix(&self) -> String {
        format!("{}_", self.as_str())
    }

    /// Builds the storage key for a record of this type.
    pub fn storage_key(&self, id: &str) -> String {
        format!("{}_{}", self.as_str(), id)
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "assessment" => Ok(EntityType::Assessment),
            "visit" => Ok(EntityType::Visit),
            other => Err(ModelError::UnknownEntityType(other.to_string())),
        }
    }
}

/// A syncable record.
///
/// `data` holds the record body as arbitrary JSON; the envelope fields are
/// what sync and conflict detection reason about.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entity {
    pub id: String,
    pub entity_type: EntityType,
    /// Monotonic per-record version.
    pub version: u64,
    /// Milliseconds since the Unix epoch.
    pub updated_at: i64,
    pub data: serde_json::Value,
}

impl Entity {
    /// Creates a version-1 entity stamped with the current time.
    pub fn new(entity_type: EntityType, id: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            entity_type,
            version: 1,
            updated_at: now_millis(),
            data,
        }
    }

    /// Builder-style version override.
    #[must_use]
    pub fn with_version(mut self, version: u64) -> Self {
        self.version = version;
        self
    }

    /// Builder-style timestamp override.
    #[must_use]
    pub fn with_updated_at(mut self, updated_at: i64) -> Self {
        self.updated_at = updated_at;
        self
    }

    /// The key this entity is stored and queued under.
    pub fn storage_key(&self) -> String {
        self.entity_type.storage_key(&self.id)
    }

    /// Records a local edit: bumps the version and refreshes the timestamp.
    pub fn touch(&mut self) {
        self.version += 1;
        self.updated_at = now_millis();
    }

    /// Extract a string value from `data` using a JSON pointer (e.g., "/status").
    pub fn get_str(&self, pointer: &str) -> Option<&str> {
        self.data.pointer(pointer).and_then(|v| v.as_str())
    }
}

/// Current wall-clock time in milliseconds since the Unix epoch.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
