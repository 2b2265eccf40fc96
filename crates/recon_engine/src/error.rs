//! Error types for the reconciliation engine.

use recon_model::ModelError;
use thiserror::Error;

/// Result type for remote store calls.
pub type StoreResult<T> = Result<T, StoreError>;

/// Result type for reconciliation entry points.
pub type ReconcileResult<T> = Result<T, ReconcileError>;

/// Errors returned by a [`RemoteStore`](crate::RemoteStore) call.
///
/// Per-item failures are values, not control flow: the applier logs them
/// and moves on.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Network or transport error.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// The store answered with a non-success status.
    #[error("store rejected request ({status}): {message}")]
    Rejected {
        /// HTTP-like status code.
        status: u16,
        /// Message returned by the store.
        message: String,
    },

    /// The addressed entity or blueprint does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Request or response body could not be encoded/decoded.
    #[error("codec error: {0}")]
    Codec(String),
}

impl StoreError {
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

    /// Returns true if this error can be retried by the caller.
    pub fn is_retryable(&self) -> bool {
        match self {
            StoreError::Transport { retryable, .. } => *retryable,
            StoreError::Rejected { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

/// Errors that abort a whole reconciliation invocation.
#[derive(Error, Debug)]
pub enum ReconcileError {
    /// Malformed input, rejected before diffing.
    #[error("invalid input: {0}")]
    Invalid(#[from] ModelError),

    /// The related-entity lookup needed by the deletion guard failed, so
    /// nothing was deleted.
    #[error("related entity lookup failed: {0}")]
    RelatedLookup(StoreError),
}
