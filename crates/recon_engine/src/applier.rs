//! State applier: diff, write, guard, delete.

use crate::config::ReconcileConfig;
use crate::diff::classify;
use crate::error::{ReconcileError, ReconcileResult};
use crate::guard::filter_deletable;
use crate::ordering::{order, Dependent, Direction};
use crate::store::RemoteStore;
use parking_lot::RwLock;
use recon_model::{
    validate_collection, Entity, EntityDiff, EntityRef, EntityRefDiff, Identified, Provenance,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, info_span, warn};
use uuid::Uuid;

/// Outcome of one `apply_diff` / `delete_diff` invocation.
#[derive(Debug, Clone)]
pub struct ApplyReport {
    /// Identifier of this run, also attached to its log span.
    pub run_id: Uuid,
    /// Provenance the run was tagged with.
    pub provenance: Provenance,
    /// Number of items classified as created.
    pub created: usize,
    /// Number of items classified as modified.
    pub modified: usize,
    /// Number of items classified as deleted.
    pub deletion_candidates: usize,
    /// Entities written successfully, in call order.
    pub upserted: Vec<EntityRef>,
    /// Entities whose write failed.
    pub failed_upserts: Vec<EntityRef>,
    /// Entities deleted, in call order.
    pub deleted: Vec<EntityRef>,
    /// Entities whose delete failed.
    pub failed_deletes: Vec<EntityRef>,
    /// Deletion candidates kept alive by the guard.
    pub preserved: Vec<EntityRef>,
    /// Wall time of the run.
    pub duration: Duration,
}

impl ApplyReport {
    fn new(provenance: Provenance) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            provenance,
            created: 0,
            modified: 0,
            deletion_candidates: 0,
            upserted: Vec::new(),
            failed_upserts: Vec::new(),
            deleted: Vec::new(),
            failed_deletes: Vec::new(),
            preserved: Vec::new(),
            duration: Duration::ZERO,
        }
    }

    /// Returns true if no store call failed.
    pub fn is_clean(&self) -> bool {
        self.failed_upserts.is_empty() && self.failed_deletes.is_empty()
    }
}

/// Applies entity diffs to a [`RemoteStore`].
///
/// The applier holds no per-run state. The configuration is read once at
/// the start of every call, so it may be swapped between runs with
/// [`StateApplier::set_config`]. Concurrent runs over disjoint entity sets
/// are safe; overlapping sets are not serialized here.
pub struct StateApplier<S: RemoteStore> {
    store: Arc<S>,
    config: RwLock<ReconcileConfig>,
}

impl<S: RemoteStore> StateApplier<S> {
    /// Creates a new applier owning `store`.
    pub fn new(store: S, config: ReconcileConfig) -> Self {
        Self::with_shared_store(Arc::new(store), config)
    }

    /// Creates a new applier over a shared store.
    pub fn with_shared_store(store: Arc<S>, config: ReconcileConfig) -> Self {
        Self {
            store,
            config: RwLock::new(config),
        }
    }

    /// Gets the underlying store.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Gets a copy of the current configuration.
    pub fn config(&self) -> ReconcileConfig {
        self.config.read().clone()
    }

    /// Replaces the configuration used by subsequent calls.
    pub fn set_config(&self, config: ReconcileConfig) {
        *self.config.write() = config;
    }

    /// Reconciles full entities.
    ///
    /// Writes `created + modified`, then deletes whatever disappeared from
    /// `after` unless the guard protects it. Only entities written
    /// successfully protect anything: a failed write leaves its previous
    /// stored version eligible for deletion.
    pub fn apply_diff(
        &self,
        entities: &EntityDiff,
        provenance: Provenance,
    ) -> ReconcileResult<ApplyReport> {
        let start = Instant::now();
        let config = self.config();
        let mut report = ApplyReport::new(provenance);
        let span = info_span!("apply_diff", run_id = %report.run_id, %provenance);
        let _enter = span.enter();

        validate_collection(&entities.before)?;
        validate_collection(&entities.after)?;

        let diff = classify(&entities.before, &entities.after);
        report.created = diff.created.len();
        report.modified = diff.modified.len();
        report.deletion_candidates = diff.deleted.len();
        info!(
            created = report.created,
            deleted = report.deletion_candidates,
            modified = report.modified,
            "updating entity diff"
        );

        let (kept, deleted) = diff.into_kept_and_deleted();
        let written = self.upsert_with(&config, kept, provenance, &mut report);
        let protect: Vec<EntityRef> = written.iter().map(Identified::to_ref).collect();

        self.safe_delete_with(&config, deleted, &protect, provenance, &mut report)?;

        report.duration = start.elapsed();
        Self::log_summary(&report);
        Ok(report)
    }

    /// Reconciles identity-only references. Only deletes are issued.
    pub fn delete_diff(
        &self,
        entities: &EntityRefDiff,
        provenance: Provenance,
    ) -> ReconcileResult<ApplyReport> {
        let start = Instant::now();
        let config = self.config();
        let mut report = ApplyReport::new(provenance);
        let span = info_span!("delete_diff", run_id = %report.run_id, %provenance);
        let _enter = span.enter();

        validate_collection(&entities.before)?;
        validate_collection(&entities.after)?;

        let diff = classify(&entities.before, &entities.after);
        report.created = diff.created.len();
        report.modified = diff.modified.len();
        report.deletion_candidates = diff.deleted.len();

        if diff.deleted.is_empty() {
            debug!("nothing to delete");
            report.duration = start.elapsed();
            return Ok(report);
        }

        let (kept, deleted) = diff.into_kept_and_deleted();
        info!(
            candidates = deleted.len(),
            kept = kept.len(),
            "determining entities to delete"
        );

        self.safe_delete_with(&config, deleted, &kept, provenance, &mut report)?;

        report.duration = start.elapsed();
        Self::log_summary(&report);
        Ok(report)
    }

    /// Writes `entities` and returns the versions stored successfully.
    pub fn upsert(&self, entities: Vec<Entity>, provenance: Provenance) -> Vec<Entity> {
        let config = self.config();
        let mut report = ApplyReport::new(provenance);
        self.upsert_with(&config, entities, provenance, &mut report)
    }

    /// Deletes `entities` and returns the references deleted successfully.
    pub fn delete<T: Dependent>(&self, entities: Vec<T>, provenance: Provenance) -> Vec<EntityRef> {
        let config = self.config();
        let mut report = ApplyReport::new(provenance);
        self.delete_with(&config, entities, provenance, &mut report);
        report.deleted
    }

    fn upsert_with(
        &self,
        config: &ReconcileConfig,
        entities: Vec<Entity>,
        provenance: Provenance,
        report: &mut ApplyReport,
    ) -> Vec<Entity> {
        if entities.is_empty() {
            return Vec::new();
        }
        info!(count = entities.len(), "upserting entities");
        let options = config.request_options();
        let mut written = Vec::with_capacity(entities.len());

        if config.auto_create_missing_related {
            let mut results = self
                .store
                .upsert_batch(&entities, &options, provenance)
                .into_iter();
            for entity in &entities {
                match results.next() {
                    Some(Ok(stored)) => written.push(stored),
                    Some(Err(err)) => {
                        warn!(entity = %entity.to_ref(), error = %err, "failed to upsert entity");
                        report.failed_upserts.push(entity.to_ref());
                    }
                    None => {
                        warn!(entity = %entity.to_ref(), "no result for entity in batch upsert");
                        report.failed_upserts.push(entity.to_ref());
                    }
                }
            }
        } else {
            let search = entities.iter().filter(|e| e.uses_search_identifier).count();
            debug!(search_identifier = search, "ordering entities for creation");

            for entity in order(entities, Direction::ForCreation) {
                match self.store.upsert_one(&entity, &options, provenance) {
                    Ok(stored) => written.push(stored),
                    Err(err) => {
                        warn!(entity = %entity.to_ref(), error = %err, "failed to upsert entity");
                        report.failed_upserts.push(entity.to_ref());
                    }
                }
            }
        }

        report.upserted = written.iter().map(Identified::to_ref).collect();
        written
    }

    fn safe_delete_with<T: Dependent>(
        &self,
        config: &ReconcileConfig,
        candidates: Vec<T>,
        protect: &[EntityRef],
        provenance: Provenance,
        report: &mut ApplyReport,
    ) -> ReconcileResult<()> {
        if candidates.is_empty() {
            return Ok(());
        }

        let related = self
            .store
            .related_entity_refs(protect)
            .map_err(ReconcileError::RelatedLookup)?;

        let outcome = filter_deletable(
            candidates,
            protect,
            &related,
            config.auto_create_missing_related,
        );
        report.preserved = outcome.preserved.iter().map(Identified::to_ref).collect();

        self.delete_with(config, outcome.deletable, provenance, report);
        Ok(())
    }

    fn delete_with<T: Dependent>(
        &self,
        config: &ReconcileConfig,
        entities: Vec<T>,
        provenance: Provenance,
        report: &mut ApplyReport,
    ) {
        if entities.is_empty() {
            return;
        }
        info!(count = entities.len(), "deleting entities");
        let options = config.request_options();

        if config.cascade_delete_dependents {
            let refs: Vec<EntityRef> = entities.iter().map(Identified::to_ref).collect();
            match self.store.delete_batch(&refs, &options, provenance) {
                Ok(()) => report.deleted.extend(refs),
                Err(err) => {
                    warn!(count = refs.len(), error = %err, "batch delete failed");
                    report.failed_deletes.extend(refs);
                }
            }
        } else {
            for entity in order(entities, Direction::ForDeletion) {
                let entity = entity.to_ref();
                match self.store.delete_one(&entity, &options, provenance) {
                    Ok(()) => report.deleted.push(entity),
                    Err(err) => {
                        warn!(%entity, error = %err, "failed to delete entity");
                        report.failed_deletes.push(entity);
                    }
                }
            }
        }
    }

    fn log_summary(report: &ApplyReport) {
        info!(
            upserted = report.upserted.len(),
            failed_upserts = report.failed_upserts.len(),
            deleted = report.deleted.len(),
            failed_deletes = report.failed_deletes.len(),
            preserved = report.preserved.len(),
            elapsed_ms = report.duration.as_millis() as u64,
            "reconciliation finished"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, StoreCall};

    fn svc(id: &str) -> Entity {
        Entity::new(id, "service")
    }

    fn r(id: &str) -> EntityRef {
        EntityRef::new(id, "service")
    }

    #[test]
    fn single_create_upserts_once_without_delete() {
        let applier = StateApplier::new(
            MemoryStore::new(),
            ReconcileConfig::new().with_auto_create_missing_related(false),
        );

        let report = applier
            .apply_diff(&EntityDiff::new(vec![], vec![svc("A")]), Provenance::Automated)
            .unwrap();

        assert_eq!(applier.store().calls(), vec![StoreCall::UpsertOne(r("A"))]);
        assert_eq!(report.created, 1);
        assert_eq!(report.upserted, vec![r("A")]);
        assert!(report.deleted.is_empty());
        assert!(report.is_clean());
    }

    #[test]
    fn sequential_delete_puts_dependents_first() {
        let before = vec![svc("A"), svc("B").with_relation("depends_on", "A")];
        let store = MemoryStore::with_entities(before.clone());
        let applier = StateApplier::new(
            store,
            ReconcileConfig::new().with_cascade_delete_dependents(false),
        );

        let report = applier
            .apply_diff(&EntityDiff::new(before, vec![]), Provenance::Automated)
            .unwrap();

        assert_eq!(report.deleted, vec![r("B"), r("A")]);
        let deletes: Vec<StoreCall> = applier
            .store()
            .calls()
            .into_iter()
            .filter(|c| matches!(c, StoreCall::DeleteOne(_)))
            .collect();
        assert_eq!(
            deletes,
            vec![StoreCall::DeleteOne(r("B")), StoreCall::DeleteOne(r("A"))]
        );
        assert!(applier.store().is_empty());
    }

    #[test]
    fn batch_modes_issue_single_calls() {
        let applier = StateApplier::new(MemoryStore::new(), ReconcileConfig::new());
        let report = applier
            .apply_diff(
                &EntityDiff::new(vec![svc("old1"), svc("old2")], vec![svc("n1"), svc("n2")]),
                Provenance::Automated,
            )
            .unwrap();

        assert_eq!(
            applier.store().calls(),
            vec![
                StoreCall::UpsertBatch(vec![r("n1"), r("n2")]),
                StoreCall::RelatedLookup(vec![r("n1"), r("n2")]),
                StoreCall::DeleteBatch(vec![r("old1"), r("old2")]),
            ]
        );
        assert_eq!(report.deleted, vec![r("old1"), r("old2")]);
    }

    #[test]
    fn failed_upsert_does_not_protect() {
        let store = MemoryStore::with_entities([svc("x")]);
        store.fail_on(r("x"));
        let applier = StateApplier::new(store, ReconcileConfig::sequential());

        // a failing delete is reported, not raised
        let before = vec![svc("x"), svc("keep")];
        let after = vec![svc("keep")];
        let report = applier
            .apply_diff(&EntityDiff::new(before, after), Provenance::Automated)
            .unwrap();
        assert_eq!(report.upserted, vec![r("keep")]);
        assert_eq!(report.failed_deletes, vec![r("x")]);

        // a failed write protects nothing
        let applier = StateApplier::new(MemoryStore::new(), ReconcileConfig::sequential());
        applier.store().fail_on(r("new"));
        let report = applier
            .apply_diff(
                &EntityDiff::new(vec![svc("stale")], vec![svc("new")]),
                Provenance::Automated,
            )
            .unwrap();
        assert_eq!(report.failed_upserts, vec![r("new")]);
        assert!(report.upserted.is_empty());
        assert_eq!(report.deleted, vec![r("stale")]);
        assert!(!report.is_clean());
    }

    #[test]
    fn related_entity_is_preserved_with_auto_create() {
        // Y is kept and relates to X; X disappears from the source
        let store = MemoryStore::with_entities([
            svc("X"),
            svc("Y").with_relation("depends_on", "X"),
        ]);
        let applier = StateApplier::new(store, ReconcileConfig::new());

        let before = vec![svc("X"), svc("Y").with_relation("depends_on", "X")];
        let after = vec![svc("Y").with_relation("depends_on", "X")];
        let report = applier
            .apply_diff(&EntityDiff::new(before.clone(), after.clone()), Provenance::Automated)
            .unwrap();
        assert_eq!(report.preserved, vec![r("X")]);
        assert!(report.deleted.is_empty());
        assert!(applier.store().contains(&r("X")));

        applier.set_config(ReconcileConfig::sequential());
        let report = applier
            .apply_diff(&EntityDiff::new(before, after), Provenance::Automated)
            .unwrap();
        assert_eq!(report.deleted, vec![r("X")]);
        assert!(!applier.store().contains(&r("X")));
    }

    #[test]
    fn related_lookup_failure_deletes_nothing() {
        let store = MemoryStore::with_entities([svc("gone")]);
        store.set_related_unavailable(true);
        let applier = StateApplier::new(store, ReconcileConfig::sequential());

        let result = applier.apply_diff(
            &EntityDiff::new(vec![svc("gone")], vec![svc("new")]),
            Provenance::Automated,
        );
        assert!(matches!(result, Err(ReconcileError::RelatedLookup(_))));
        assert!(applier.store().contains(&r("gone")));
        assert!(applier.store().contains(&r("new")));
    }

    #[test]
    fn duplicate_keys_are_rejected_before_any_call() {
        let applier = StateApplier::new(MemoryStore::new(), ReconcileConfig::new());
        let result = applier.apply_diff(
            &EntityDiff::new(vec![], vec![svc("a"), svc("a")]),
            Provenance::Automated,
        );
        assert!(matches!(result, Err(ReconcileError::Invalid(_))));
        assert!(applier.store().calls().is_empty());
    }

    #[test]
    fn delete_diff_without_deletions_is_noop() {
        let applier = StateApplier::new(MemoryStore::new(), ReconcileConfig::new());
        let report = applier
            .delete_diff(
                &EntityRefDiff::new(vec![r("a")], vec![r("a"), r("b")]),
                Provenance::UserTriggered,
            )
            .unwrap();
        assert!(applier.store().calls().is_empty());
        assert_eq!(report.deletion_candidates, 0);
    }

    #[test]
    fn delete_diff_protects_kept_refs() {
        let store = MemoryStore::with_entities([svc("a"), svc("b"), svc("c")]);
        let applier = StateApplier::new(store, ReconcileConfig::sequential());

        let report = applier
            .delete_diff(
                &EntityRefDiff::new(vec![r("a"), r("b"), r("c")], vec![r("b")]),
                Provenance::Automated,
            )
            .unwrap();
        assert_eq!(report.deleted, vec![r("a"), r("c")]);
        assert_eq!(applier.store().refs(), vec![r("b")]);
        assert_eq!(
            applier.store().calls()[0],
            StoreCall::RelatedLookup(vec![r("b")])
        );
    }

    #[test]
    fn search_identifier_entities_are_written_first() {
        let applier = StateApplier::new(MemoryStore::new(), ReconcileConfig::sequential());
        let written = applier.upsert(
            vec![
                svc("api").with_relation("depends_on", "db"),
                svc("db"),
                svc("lookup").with_search_identifier(),
            ],
            Provenance::Automated,
        );
        let ids: Vec<&str> = written.iter().map(|e| e.identifier.as_str()).collect();
        assert_eq!(ids, vec!["lookup", "db", "api"]);
    }

    #[test]
    fn public_delete_reports_successes() {
        let store = MemoryStore::with_entities([svc("a"), svc("b")]);
        store.fail_on(r("b"));
        let applier = StateApplier::new(store, ReconcileConfig::sequential());

        let deleted = applier.delete(vec![r("a"), r("b")], Provenance::Automated);
        assert_eq!(deleted, vec![r("a")]);
    }
}
