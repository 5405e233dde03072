//! Durable on-device store for CareLink records.
//!
//! Field staff edit assessments and visits while disconnected; everything
//! they write lands here first.
//!
//! # Architecture
//!
//! - [`OfflineStorage`] is the only reader/writer of the store. Sync code
//!   never touches the backend directly.
//! - Records are kept as JSON under `{type}_{id}` keys, next to a single
//!   `pending_changes` log.
//! - Large fields are deflated by [`CompressionService`], then sensitive
//!   fields are sealed by [`carelink_crypto::EncryptionService`]. Reads run
//!   the exact inverse and degrade per field instead of failing the read.
//! - [`KvStore`] backends: SQLite for devices, in-memory for tests.

mod backend;
mod compression;
mod config;
mod error;
mod offline;

pub use backend::{KvStore, MemoryStore, SqliteStore};
pub use compression::{CompressionService, COMPRESSED_PREFIX, DEFAULT_THRESHOLD};
pub use config::{StorageConfig, COMPRESSION_THRESHOLD_ENV, STORE_PATH_ENV};
pub use error::{StorageError, StorageResult};
pub use offline::{OfflineStorage, PENDING_CHANGES_KEY};
