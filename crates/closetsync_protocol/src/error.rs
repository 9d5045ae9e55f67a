//! Error types for protocol decoding.

use crate::operation::OperationKind;
use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors raised while encoding or interpreting protocol values.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// An operation payload does not match its kind.
    #[error("invalid payload for {kind}: {message}")]
    InvalidPayload {
        /// The operation kind whose payload was rejected.
        kind: OperationKind,
        /// Decoder message.
        message: String,
    },

    /// An operation kind name is not recognized.
    #[error("unknown operation kind: {0}")]
    UnknownKind(String),

    /// JSON encoding failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ProtocolError {
    pub(crate) fn invalid_payload(kind: OperationKind, message: impl Into<String>) -> Self {
        Self::InvalidPayload {
            kind,
            message: message.into(),
        }
    }
}
