//! Core record model for CareLink.
//!
//! Defines the types every other CareLink crate depends on:
//! - [`Entity`]: a syncable record (assessment or visit) with version and timestamp
//! - [`EntityType`]: the closed set of syncable record kinds
//! - [`PendingChange`]: append-only log entry of a local mutation
//! - [`FieldSchema`] / [`FieldSchemaTable`]: per-type compressed and sensitive fields
//!
//! The schema table is the single source of field lists for both the write
//! path (compress, then encrypt) and the read path (decrypt, then decompress).

mod change;
mod entity;
mod schema;

pub use change::{ChangeKind, PendingChange};
pub use entity::{now_millis, Entity, EntityType};
pub use schema::{FieldSchema, FieldSchemaTable};

/// Result type alias using the crate's error type.
pub type ModelResult<T> = std::result::Result<T, ModelError>;

/// Errors that can occur in model operations.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("unknown entity type: {0}")]
    UnknownEntityType(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
