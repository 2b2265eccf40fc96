//! Plan command implementation.
//!
//! Runs the diff against an in-memory copy of `before` and prints the
//! store calls the applier made, in order.

use crate::config::Settings;
use recon_engine::{
    MemoryStore, ReconcileConfig, ReconcileResult, StateApplier, StoreCall,
};
use recon_model::{Entity, EntityDiff, EntityRef, EntityRefDiff, Provenance};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;

/// One store call the applier would make.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlanStep {
    /// Call name.
    pub action: &'static str,
    /// Entities the call covers.
    pub entities: Vec<EntityRef>,
}

impl From<StoreCall> for PlanStep {
    fn from(call: StoreCall) -> Self {
        let (action, entities) = match call {
            StoreCall::UpsertOne(entity) => ("upsert", vec![entity]),
            StoreCall::UpsertBatch(entities) => ("upsert_batch", entities),
            StoreCall::DeleteOne(entity) => ("delete", vec![entity]),
            StoreCall::DeleteBatch(entities) => ("delete_batch", entities),
            StoreCall::RelatedLookup(entities) => ("lookup_related", entities),
        };
        Self { action, entities }
    }
}

/// A dry-run result.
#[derive(Debug, Clone, Serialize)]
pub struct Plan {
    /// Store calls, in call order.
    pub steps: Vec<PlanStep>,
    /// Deletion candidates the guard would keep.
    pub preserved: Vec<EntityRef>,
}

/// Plans a full-entity diff.
pub fn plan_entities(diff: &EntityDiff, config: ReconcileConfig) -> ReconcileResult<Plan> {
    let store = Arc::new(MemoryStore::with_entities(diff.before.clone()));
    let applier = StateApplier::new(Arc::clone(&store), config);
    let report = applier.apply_diff(diff, Provenance::Automated)?;
    Ok(collect(&store, report.preserved))
}

/// Plans a reference-only diff.
pub fn plan_refs(diff: &EntityRefDiff, config: ReconcileConfig) -> ReconcileResult<Plan> {
    let seed = diff
        .before
        .iter()
        .map(|r| Entity::new(r.identifier.as_str(), r.blueprint.as_str()));
    let store = Arc::new(MemoryStore::with_entities(seed));
    let applier = StateApplier::new(Arc::clone(&store), config);
    let report = applier.delete_diff(diff, Provenance::Automated)?;
    Ok(collect(&store, report.preserved))
}

fn collect(store: &MemoryStore, preserved: Vec<EntityRef>) -> Plan {
    Plan {
        steps: store.calls().into_iter().map(PlanStep::from).collect(),
        preserved,
    }
}

/// Runs the plan command.
pub fn run(
    path: &Path,
    refs: bool,
    format: &str,
    settings: &Settings,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = settings.reconcile.clone();
    let plan = if refs {
        plan_refs(&super::read_diff(path)?, config)?
    } else {
        plan_entities(&super::read_diff(path)?, config)?
    };

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&plan)?),
        "text" => print_text(path, &plan),
        other => return Err(format!("unknown format: {other}").into()),
    }
    Ok(())
}

fn print_text(path: &Path, plan: &Plan) {
    println!("Plan for {}", path.display());
    println!();

    if plan.steps.is_empty() {
        println!("Nothing to do");
        return;
    }

    for (n, step) in plan.steps.iter().enumerate() {
        let entities: Vec<String> = step.entities.iter().map(ToString::to_string).collect();
        println!("{:>4}. {:<15} {}", n + 1, step.action, entities.join(", "));
    }

    if !plan.preserved.is_empty() {
        println!();
        println!("Preserved:");
        for entity in &plan.preserved {
            println!("  {entity}");
        }
    }
}
