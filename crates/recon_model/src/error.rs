//! Error types for model validation and decoding.

use thiserror::Error;

/// Result type for model operations.
pub type ModelResult<T> = Result<T, ModelError>;

/// Errors raised for malformed reconciliation input.
#[derive(Error, Debug)]
pub enum ModelError {
    /// A required field is empty.
    #[error("entity at index {index} has an empty {field}")]
    EmptyField {
        /// Name of the empty field.
        field: &'static str,
        /// Position of the entity in its collection.
        index: usize,
    },

    /// Two items in one collection share an identity key.
    #[error("duplicate identity key ({identifier}, {blueprint})")]
    DuplicateIdentity {
        /// Duplicated identifier.
        identifier: String,
        /// Blueprint of the duplicated identifier.
        blueprint: String,
    },

    /// JSON decoding failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}
