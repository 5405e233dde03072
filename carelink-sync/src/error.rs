//! Error types for the sync layer.

use carelink_merge::MergeError;
use carelink_model::EntityType;
use carelink_storage::StorageError;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur in sync operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Transport-level failure talking to the remote.
    #[error("network error: {0}")]
    Network(String),

    /// The remote answered but refused the request.
    #[error("remote rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// Conflict resolution could not produce a record.
    #[error("conflict resolution failed: {0}")]
    Conflict(#[from] MergeError),

    /// Local store failure.
    #[error("storage error: {0}")]
    Storage(StorageError),

    /// A remote call exceeded the configured timeout.
    #[error("operation timed out")]
    Timeout,

    /// No remote registered for an entity type.
    #[error("no remote registered for entity type {0}")]
    NoRemote(EntityType),

    /// The requested record is not in the local store.
    #[error("record not found: {0}")]
    NotFound(String),

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl SyncError {
    /// Whether the failure should consume the retry ladder.
    ///
    /// Local storage failures and missing remotes will not improve by
    /// waiting, so they fail the item immediately.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SyncError::Network(_)
                | SyncError::Rejected { .. }
                | SyncError::Conflict(_)
                | SyncError::Timeout
        )
    }
}

impl From<StorageError> for SyncError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Merge(e) => SyncError::Conflict(e),
            other => SyncError::Storage(other),
        }
    }
}
