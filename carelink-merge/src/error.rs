//! Error types for conflict resolution.

use carelink_model::EntityType;
use thiserror::Error;

/// Result type for merge operations.
pub type MergeResult<T> = Result<T, MergeError>;

/// Errors that can occur while resolving a conflict.
#[derive(Debug, Error)]
pub enum MergeError {
    /// Manual merge requested but nothing registered for the type.
    #[error("no manual resolver registered for entity type {0}")]
    ResolverNotFound(EntityType),

    /// A registered manual resolver refused or failed.
    #[error("manual merge failed: {0}")]
    ManualMerge(String),

    /// Client and server snapshots describe different records.
    #[error("snapshots describe different records: {client} vs {server}")]
    Mismatch { client: String, server: String },
}
