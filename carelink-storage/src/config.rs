use crate::backend::{KvStore, MemoryStore, SqliteStore};
use crate::compression::DEFAULT_THRESHOLD;
use crate::error::{StorageError, StorageResult};
use carelink_model::FieldSchemaTable;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

/// Environment override for the database path.
pub const STORE_PATH_ENV: &str = "CARELINK_STORE_PATH";
/// Environment override for the compression threshold.
pub const COMPRESSION_THRESHOLD_ENV: &str = "CARELINK_COMPRESSION_THRESHOLD";

/// Configuration for the on-device store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Name scoping this application's rows inside the database.
    pub store_name: String,
    /// SQLite file. `None` keeps everything in memory.
    pub path: Option<PathBuf>,
    /// Serialized size in bytes above which listed fields are deflated.
    pub compression_threshold: usize,
    /// Compressed and sensitive fields per entity type.
    pub schemas: FieldSchemaTable,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            store_name: "carelink".to_string(),
            path: None,
            compression_threshold: DEFAULT_THRESHOLD,
            schemas: FieldSchemaTable::default(),
        }
    }
}

impl StorageConfig {
    /// Defaults with environment overrides applied.
    pub fn from_env() -> StorageResult<Self> {
        let mut config = Self::default();
        if let Ok(path) = std::env::var(STORE_PATH_ENV) {
            if !path.is_empty() {
                config.path = Some(PathBuf::from(path));
            }
        }
        if let Ok(raw) = std::env::var(COMPRESSION_THRESHOLD_ENV) {
            config.compression_threshold = raw.parse().map_err(|e| {
                StorageError::Config(format!("{COMPRESSION_THRESHOLD_ENV}={raw}: {e}"))
            })?;
        }
        Ok(config)
    }

    /// Opens the backend this configuration describes.
    pub fn open_backend(&self) -> StorageResult<Arc<dyn KvStore>> {
        match &self.path {
            Some(path) => Ok(Arc::new(SqliteStore::open(path, &self.store_name)?)),
            None => Ok(Arc::new(MemoryStore::new())),
        }
    }
}
