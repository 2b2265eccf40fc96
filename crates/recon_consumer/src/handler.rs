//! Message handling.

use crate::error::ConsumerResult;
use recon_engine::{ApplyReport, RemoteStore, StateApplier};
use recon_model::{Entity, EntityDiff, EntityRef, EntityRefDiff, Provenance};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};

/// Processes decoded message payloads.
pub trait MessageHandler: Send + Sync {
    /// Handles one payload read from `topic`.
    fn handle(&self, topic: &str, payload: Value) -> ConsumerResult<()>;
}

impl<F> MessageHandler for F
where
    F: Fn(&str, Value) -> ConsumerResult<()> + Send + Sync,
{
    fn handle(&self, topic: &str, payload: Value) -> ConsumerResult<()> {
        self(topic, payload)
    }
}

/// A reconciliation request carried by a message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReconcileCommand {
    /// Reconcile full entities.
    Apply {
        /// Who asked for the run.
        #[serde(default)]
        provenance: Provenance,
        /// Entities previously written.
        #[serde(default)]
        before: Vec<Entity>,
        /// Entities that should exist now.
        #[serde(default)]
        after: Vec<Entity>,
    },
    /// Delete references that disappeared.
    Delete {
        /// Who asked for the run.
        #[serde(default)]
        provenance: Provenance,
        /// References previously written.
        #[serde(default)]
        before: Vec<EntityRef>,
        /// References that should exist now.
        #[serde(default)]
        after: Vec<EntityRef>,
    },
}

impl ReconcileCommand {
    /// Provenance the run will be tagged with.
    pub fn provenance(&self) -> Provenance {
        match self {
            Self::Apply { provenance, .. } | Self::Delete { provenance, .. } => *provenance,
        }
    }
}

/// Runs every decoded [`ReconcileCommand`] through a [`StateApplier`].
pub struct ReconcileHandler<S: RemoteStore> {
    applier: Arc<StateApplier<S>>,
}

impl<S: RemoteStore> ReconcileHandler<S> {
    /// Creates a handler over a shared applier.
    pub fn new(applier: Arc<StateApplier<S>>) -> Self {
        Self { applier }
    }

    /// The applier commands run through.
    pub fn applier(&self) -> &Arc<StateApplier<S>> {
        &self.applier
    }

    /// Runs one command.
    pub fn execute(&self, command: ReconcileCommand) -> ConsumerResult<ApplyReport> {
        let report = match command {
            ReconcileCommand::Apply {
                provenance,
                before,
                after,
            } => self
                .applier
                .apply_diff(&EntityDiff::new(before, after), provenance)?,
            ReconcileCommand::Delete {
                provenance,
                before,
                after,
            } => self
                .applier
                .delete_diff(&EntityRefDiff::new(before, after), provenance)?,
        };
        Ok(report)
    }
}

impl<S: RemoteStore> MessageHandler for ReconcileHandler<S> {
    fn handle(&self, topic: &str, payload: Value) -> ConsumerResult<()> {
        let command: ReconcileCommand = serde_json::from_value(payload)?;
        let report = self.execute(command)?;

        if report.is_clean() {
            info!(topic, run_id = %report.run_id, "reconciliation command applied");
        } else {
            warn!(
                topic,
                run_id = %report.run_id,
                failed_upserts = report.failed_upserts.len(),
                failed_deletes = report.failed_deletes.len(),
                "reconciliation command applied with failures"
            );
        }
        Ok(())
    }
}
