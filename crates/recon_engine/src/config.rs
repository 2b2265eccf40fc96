//! Configuration read by the state applier at call time.

use recon_model::RequestOptions;
use serde::{Deserialize, Serialize};

/// Execution context for reconciliation.
///
/// The two flags select between batch-delegated and ordered-sequential
/// processing of the upsert and delete paths.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileConfig {
    /// Let the store create missing relation targets. Upserts go out as a
    /// single batch and related entities are protected from deletion.
    pub auto_create_missing_related: bool,
    /// Let the store cascade deletes to dependents. Deletes go out as a
    /// single batch.
    pub cascade_delete_dependents: bool,
    /// Options forwarded to the store with every call.
    pub request_options: RequestOptions,
}

impl ReconcileConfig {
    /// Creates a configuration with both batch modes enabled.
    pub fn new() -> Self {
        Self {
            auto_create_missing_related: true,
            cascade_delete_dependents: true,
            request_options: RequestOptions::default(),
        }
    }

    /// Creates a configuration with both ordered-sequential modes.
    pub fn sequential() -> Self {
        Self::new()
            .with_auto_create_missing_related(false)
            .with_cascade_delete_dependents(false)
    }

    /// Sets whether missing related entities are created by the store.
    pub fn with_auto_create_missing_related(mut self, enabled: bool) -> Self {
        self.auto_create_missing_related = enabled;
        self
    }

    /// Sets whether deletes cascade to dependents.
    pub fn with_cascade_delete_dependents(mut self, enabled: bool) -> Self {
        self.cascade_delete_dependents = enabled;
        self
    }

    /// Sets the forwarded request options.
    pub fn with_request_options(mut self, options: RequestOptions) -> Self {
        self.request_options = options;
        self
    }

    /// Returns the options to send to the store.
    ///
    /// The store-side flags always mirror this configuration's flags.
    pub fn request_options(&self) -> RequestOptions {
        self.request_options
            .clone()
            .with_create_missing_related_entities(self.auto_create_missing_related)
            .with_delete_dependent_entities(self.cascade_delete_dependents)
    }
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self::new()
    }
}
