//! End-to-end reconciliation against the in-memory store.

use recon_engine::{MemoryStore, ReconcileConfig, ReconcileError, StateApplier, StoreCall};
use recon_model::{Entity, EntityDiff, EntityRef, EntityRefDiff, Identified, Provenance};
use recon_testkit::{chain, refs, service, service_ref, star, team};
use std::sync::Arc;

fn sequential_applier() -> (Arc<MemoryStore>, StateApplier<Arc<MemoryStore>>) {
    let store = Arc::new(MemoryStore::new());
    let applier = StateApplier::new(Arc::clone(&store), ReconcileConfig::sequential());
    (store, applier)
}

fn upsert_order(calls: &[StoreCall]) -> Vec<String> {
    calls
        .iter()
        .filter_map(|call| match call {
            StoreCall::UpsertOne(entity) => Some(entity.identifier.clone()),
            _ => None,
        })
        .collect()
}

fn delete_order(calls: &[StoreCall]) -> Vec<String> {
    calls
        .iter()
        .filter_map(|call| match call {
            StoreCall::DeleteOne(entity) => Some(entity.identifier.clone()),
            _ => None,
        })
        .collect()
}

#[test]
fn initial_sync_writes_owner_before_services() {
    let (store, applier) = sequential_applier();
    let catalog = star("platform", 3);

    let report = applier
        .apply_diff(&EntityDiff::new(vec![], catalog.clone()), Provenance::Automated)
        .unwrap();

    assert!(report.is_clean());
    assert_eq!(report.created, 4);
    assert_eq!(store.len(), 4);
    assert_eq!(upsert_order(&store.calls())[0], "platform");
}

#[test]
fn removed_service_is_deleted() {
    let (store, applier) = sequential_applier();
    let before = star("platform", 2);
    applier
        .apply_diff(&EntityDiff::new(vec![], before.clone()), Provenance::Automated)
        .unwrap();
    store.clear_calls();

    let after: Vec<Entity> = before
        .iter()
        .filter(|e| e.identifier != "platform-svc-1")
        .cloned()
        .collect();
    let report = applier
        .apply_diff(&EntityDiff::new(before, after), Provenance::UserTriggered)
        .unwrap();

    assert_eq!(report.deleted, vec![service_ref("platform-svc-1")]);
    assert!(!store.contains(&service_ref("platform-svc-1")));
    assert_eq!(store.len(), 2);
}

#[test]
fn owner_referenced_by_kept_services_survives_with_auto_create() {
    let store = Arc::new(MemoryStore::new());
    let applier = StateApplier::new(Arc::clone(&store), ReconcileConfig::new());
    let before = star("platform", 2);
    applier
        .apply_diff(&EntityDiff::new(vec![], before.clone()), Provenance::Automated)
        .unwrap();

    let after: Vec<Entity> = before
        .iter()
        .filter(|e| e.blueprint != "team")
        .cloned()
        .collect();
    let report = applier
        .apply_diff(&EntityDiff::new(before.clone(), after.clone()), Provenance::Automated)
        .unwrap();

    assert_eq!(report.preserved, vec![EntityRef::new("platform", "team")]);
    assert!(report.deleted.is_empty());
    assert!(store.contains(&EntityRef::new("platform", "team")));

    // the same diff without auto-create deletes the owner
    applier.set_config(ReconcileConfig::sequential());
    let report = applier
        .apply_diff(&EntityDiff::new(before, after), Provenance::Automated)
        .unwrap();
    assert_eq!(report.deleted, vec![EntityRef::new("platform", "team")]);
    assert!(!store.contains(&EntityRef::new("platform", "team")));
}

#[test]
fn chain_is_torn_down_from_the_leaf() {
    let (store, applier) = sequential_applier();
    let items = chain("service", 4);
    applier
        .apply_diff(&EntityDiff::new(vec![], items.clone()), Provenance::Automated)
        .unwrap();
    assert_eq!(
        upsert_order(&store.calls()),
        vec!["service-0", "service-1", "service-2", "service-3"]
    );
    store.clear_calls();

    let report = applier
        .apply_diff(&EntityDiff::new(items, vec![]), Provenance::Automated)
        .unwrap();

    assert_eq!(report.deleted.len(), 4);
    assert_eq!(
        delete_order(&store.calls()),
        vec!["service-3", "service-2", "service-1", "service-0"]
    );
    assert!(store.is_empty());
}

#[test]
fn cascading_batch_delete_takes_stored_dependents() {
    let store = Arc::new(MemoryStore::with_entities(star("infra", 2)));
    let applier = StateApplier::new(Arc::clone(&store), ReconcileConfig::new());

    let report = applier
        .apply_diff(
            &EntityDiff::new(vec![team("infra")], vec![]),
            Provenance::Automated,
        )
        .unwrap();

    assert_eq!(report.deleted, vec![EntityRef::new("infra", "team")]);
    assert!(store.is_empty());
    assert!(store
        .calls()
        .iter()
        .any(|call| matches!(call, StoreCall::DeleteBatch(batch) if batch.len() == 1)));
}

#[test]
fn delete_diff_leaves_kept_refs_alone() {
    let catalog = vec![service("a"), service("b"), service("c")];
    let store = Arc::new(MemoryStore::with_entities(catalog.clone()));
    let applier = StateApplier::new(Arc::clone(&store), ReconcileConfig::sequential());

    let diff = EntityRefDiff::new(refs(&catalog), vec![service_ref("b")]);
    let report = applier.delete_diff(&diff, Provenance::Automated).unwrap();

    assert_eq!(report.deleted, vec![service_ref("a"), service_ref("c")]);
    assert_eq!(store.refs(), vec![service_ref("b")]);
    assert!(store
        .calls()
        .iter()
        .all(|call| !matches!(call, StoreCall::UpsertOne(_) | StoreCall::UpsertBatch(_))));
}

#[test]
fn failed_write_is_reported_not_raised() {
    let (store, applier) = sequential_applier();
    let old = service("api");
    store.insert(old.clone());
    store.fail_on(old.to_ref());

    let moved = Entity::new("api", "service").with_title("API");
    let report = applier
        .apply_diff(&EntityDiff::new(vec![old], vec![moved]), Provenance::Automated)
        .unwrap();

    assert_eq!(report.failed_upserts, vec![service_ref("api")]);
    assert!(report.deleted.is_empty());
    assert!(!report.is_clean());
}

#[test]
fn unavailable_related_lookup_aborts_before_deleting() {
    let catalog = star("core", 1);
    let store = Arc::new(MemoryStore::with_entities(catalog.clone()));
    store.set_related_unavailable(true);
    let applier = StateApplier::new(Arc::clone(&store), ReconcileConfig::new());

    let err = applier
        .apply_diff(&EntityDiff::new(catalog, vec![]), Provenance::Automated)
        .unwrap_err();

    assert!(matches!(err, ReconcileError::RelatedLookup(_)));
    assert_eq!(store.len(), 2);
}

#[test]
fn appliers_can_share_one_store() {
    let store = Arc::new(MemoryStore::new());
    let first = StateApplier::with_shared_store(Arc::clone(&store), ReconcileConfig::sequential());
    let second = StateApplier::with_shared_store(Arc::clone(&store), ReconcileConfig::new());

    first
        .apply_diff(&EntityDiff::new(vec![], vec![service("a")]), Provenance::Automated)
        .unwrap();
    second
        .apply_diff(&EntityDiff::new(vec![], vec![service("b")]), Provenance::Automated)
        .unwrap();

    assert_eq!(store.len(), 2);
    assert!(Arc::ptr_eq(first.store(), second.store()));
}

#[test]
fn repeated_apply_is_stable() {
    let (store, applier) = sequential_applier();
    let catalog = star("ops", 2);
    let diff = EntityDiff::new(vec![], catalog);

    let first = applier.apply_diff(&diff, Provenance::Automated).unwrap();
    let snapshot = store.refs();
    let second = applier.apply_diff(&diff, Provenance::Automated).unwrap();

    assert_eq!(first.upserted, second.upserted);
    assert_eq!(store.refs(), snapshot);
    assert_ne!(first.run_id, second.run_id);
}
