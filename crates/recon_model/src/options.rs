//! Request options passed through to the remote store.

use serde::{Deserialize, Serialize};

/// Options attached to every remote write/delete call.
///
/// The engine does not interpret these; they are forwarded as-is.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestOptions {
    /// Merge properties into the stored entity instead of replacing them.
    pub merge: bool,
    /// Ask the store to create missing relation targets.
    pub create_missing_related_entities: bool,
    /// Ask the store to cascade deletes to dependents.
    pub delete_dependent_entities: bool,
    /// Validate only, do not persist.
    pub validation_only: bool,
}

impl RequestOptions {
    /// Creates default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets merge mode.
    pub fn with_merge(mut self, merge: bool) -> Self {
        self.merge = merge;
        self
    }

    /// Sets whether missing relation targets are created.
    pub fn with_create_missing_related_entities(mut self, enabled: bool) -> Self {
        self.create_missing_related_entities = enabled;
        self
    }

    /// Sets whether deletes cascade to dependents.
    pub fn with_delete_dependent_entities(mut self, enabled: bool) -> Self {
        self.delete_dependent_entities = enabled;
        self
    }

    /// Sets validation-only mode.
    pub fn with_validation_only(mut self, enabled: bool) -> Self {
        self.validation_only = enabled;
        self
    }
}
