//! Error types for the sync engine.

use closetsync_protocol::{OperationId, OperationKind, ProtocolError};
use closetsync_storage::StorageError;
use std::time::Duration;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during sync operations.
#[derive(Error, Debug)]
pub enum SyncError {
    /// The device is offline and the call has no fallback value.
    #[error("device is offline and no fallback is configured")]
    OfflineNoFallback,

    /// The server answered with a non-success status.
    #[error("request failed with status {status}: {message}")]
    RequestFailed {
        /// HTTP status code.
        status: u16,
        /// Message extracted from the response body.
        message: String,
    },

    /// A single attempt exceeded its deadline.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// Network or transport error.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// An operation exhausted its retry budget and was given up.
    #[error("operation {operation_id} ({kind}) abandoned after {attempts} failed attempts")]
    Abandoned {
        /// Abandoned operation.
        operation_id: OperationId,
        /// Kind of the abandoned operation.
        kind: OperationKind,
        /// Number of failed delivery attempts.
        attempts: u32,
    },

    /// The remote snapshot could not be fetched; local state was kept.
    #[error("merge skipped: {0}")]
    MergeSkipped(#[source] Box<SyncError>),

    /// No user is signed in.
    #[error("no authenticated user")]
    NotAuthenticated,

    /// The mutation was rejected before it reached the queue.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// Invalid engine configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Storage error.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Protocol error (invalid payload or unknown kind).
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Codec error.
    #[error("codec error: {0}")]
    Codec(String),
}

impl SyncError {
    /// Creates a retryable transport error.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable transport error.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Returns true if this error can be retried.
    ///
    /// Server errors, rate limiting and request timeouts are retryable;
    /// other client errors are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::OfflineNoFallback => true,
            SyncError::Transport { retryable, .. } => *retryable,
            SyncError::Timeout(_) => true,
            SyncError::RequestFailed { status, .. } => {
                *status >= 500 || *status == 408 || *status == 429
            }
            SyncError::MergeSkipped(_) => true,
            _ => false,
        }
    }

    /// Returns the HTTP status for `RequestFailed` errors.
    pub fn status(&self) -> Option<u16> {
        match self {
            SyncError::RequestFailed { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::Codec(err.to_string())
    }
}
