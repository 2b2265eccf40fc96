//! Input validation, run before any diffing.

use crate::entity::Identified;
use crate::error::{ModelError, ModelResult};
use std::collections::HashSet;

/// Validates one collection of entities or references.
///
/// Rejects empty identifiers, empty blueprints and duplicate identity
/// keys. The first offending item is reported.
pub fn validate_collection<T: Identified>(items: &[T]) -> ModelResult<()> {
    let mut seen = HashSet::with_capacity(items.len());

    for (index, item) in items.iter().enumerate() {
        if item.identifier().is_empty() {
            return Err(ModelError::EmptyField {
                field: "identifier",
                index,
            });
        }
        if item.blueprint().is_empty() {
            return Err(ModelError::EmptyField {
                field: "blueprint",
                index,
            });
        }
        if !seen.insert(item.key()) {
            return Err(ModelError::DuplicateIdentity {
                identifier: item.identifier().to_string(),
                blueprint: item.blueprint().to_string(),
            });
        }
    }

    Ok(())
}
