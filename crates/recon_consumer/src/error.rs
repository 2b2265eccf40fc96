//! Error types for the consumer.

use recon_engine::ReconcileError;
use thiserror::Error;

/// Result type for consumer operations.
pub type ConsumerResult<T> = Result<T, ConsumerError>;

/// Errors that can occur while consuming messages.
#[derive(Error, Debug)]
pub enum ConsumerError {
    /// The message source failed.
    #[error("source error: {0}")]
    Source(String),

    /// The source was used before subscribing or after closing.
    #[error("source not ready: {0}")]
    NotReady(&'static str),

    /// A payload was not valid JSON or not a known command.
    #[error("invalid payload: {0}")]
    Decode(#[from] serde_json::Error),

    /// The reconciliation run failed.
    #[error("reconcile error: {0}")]
    Reconcile(#[from] ReconcileError),

    /// Invalid consumer configuration.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// I/O error while reading a source.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
