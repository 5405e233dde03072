//! Error types for the storage layer.

use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur in storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Database error from SQLite.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Deflate/inflate failure.
    #[error("compression error: {0}")]
    Compression(String),

    /// A stored value could not be turned back into its plain form.
    #[error("decode error: {0}")]
    Decode(String),

    /// Encryption/decryption error.
    #[error("encryption error: {0}")]
    Crypto(#[from] carelink_crypto::CryptoError),

    /// Conflict resolution failed.
    #[error("merge error: {0}")]
    Merge(#[from] carelink_merge::MergeError),

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    Config(String),
}
