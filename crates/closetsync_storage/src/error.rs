//! Error types for storage operations.

use std::io;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The key contains characters that cannot be stored.
    #[error("invalid storage key: {0:?}")]
    InvalidKey(String),

    /// A stored value is not valid UTF-8.
    #[error("value for key {key:?} is not valid UTF-8")]
    InvalidUtf8 {
        /// The key whose value could not be decoded.
        key: String,
    },

    /// Another process holds the store directory lock.
    #[error("store directory is locked by another process")]
    Locked,
}
