//! Remote store abstraction.

use crate::error::{StoreError, StoreResult};
use parking_lot::RwLock;
use recon_model::{Entity, EntityRef, Identified, Provenance, RequestOptions};
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// The catalog that entities are reconciled against.
///
/// This trait abstracts the remote API, allowing for different
/// implementations (HTTP, in-memory for tests and dry runs, etc.).
/// Every call is a blocking round trip; the applier issues them one at a
/// time.
pub trait RemoteStore: Send + Sync {
    /// Creates or replaces one entity, returning the stored version.
    fn upsert_one(
        &self,
        entity: &Entity,
        options: &RequestOptions,
        provenance: Provenance,
    ) -> StoreResult<Entity>;

    /// Creates or replaces many entities in one call.
    ///
    /// Returns one result per input entity, in input order. The store
    /// decides internal ordering and creates missing related entities when
    /// asked to.
    fn upsert_batch(
        &self,
        entities: &[Entity],
        options: &RequestOptions,
        provenance: Provenance,
    ) -> Vec<StoreResult<Entity>>;

    /// Deletes one entity.
    fn delete_one(
        &self,
        entity: &EntityRef,
        options: &RequestOptions,
        provenance: Provenance,
    ) -> StoreResult<()>;

    /// Deletes many entities in one best-effort call, letting the store
    /// cascade to dependents when asked to.
    fn delete_batch(
        &self,
        entities: &[EntityRef],
        options: &RequestOptions,
        provenance: Provenance,
    ) -> StoreResult<()>;

    /// Returns the entities that `entities` depend on through their
    /// stored relations.
    fn related_entity_refs(&self, entities: &[EntityRef]) -> StoreResult<Vec<EntityRef>>;
}

impl<S: RemoteStore + ?Sized> RemoteStore for Arc<S> {
    fn upsert_one(
        &self,
        entity: &Entity,
        options: &RequestOptions,
        provenance: Provenance,
    ) -> StoreResult<Entity> {
        (**self).upsert_one(entity, options, provenance)
    }

    fn upsert_batch(
        &self,
        entities: &[Entity],
        options: &RequestOptions,
        provenance: Provenance,
    ) -> Vec<StoreResult<Entity>> {
        (**self).upsert_batch(entities, options, provenance)
    }

    fn delete_one(
        &self,
        entity: &EntityRef,
        options: &RequestOptions,
        provenance: Provenance,
    ) -> StoreResult<()> {
        (**self).delete_one(entity, options, provenance)
    }

    fn delete_batch(
        &self,
        entities: &[EntityRef],
        options: &RequestOptions,
        provenance: Provenance,
    ) -> StoreResult<()> {
        (**self).delete_batch(entities, options, provenance)
    }

    fn related_entity_refs(&self, entities: &[EntityRef]) -> StoreResult<Vec<EntityRef>> {
        (**self).related_entity_refs(entities)
    }
}

/// A call observed by [`MemoryStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCall {
    /// `upsert_one`.
    UpsertOne(EntityRef),
    /// `upsert_batch`.
    UpsertBatch(Vec<EntityRef>),
    /// `delete_one`.
    DeleteOne(EntityRef),
    /// `delete_batch`.
    DeleteBatch(Vec<EntityRef>),
    /// `related_entity_refs`.
    RelatedLookup(Vec<EntityRef>),
}

/// An in-memory catalog for tests and dry runs.
///
/// Records every call in order and can be told to fail specific
/// entities or the related lookup.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entities: RwLock<BTreeMap<EntityRef, Entity>>,
    calls: RwLock<Vec<StoreCall>>,
    failing: RwLock<HashSet<EntityRef>>,
    related_unavailable: AtomicBool,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store pre-populated with `entities`.
    pub fn with_entities(entities: impl IntoIterator<Item = Entity>) -> Self {
        let store = Self::new();
        for entity in entities {
            store.insert(entity);
        }
        store
    }

    /// Inserts or replaces an entity without recording a call.
    pub fn insert(&self, entity: Entity) {
        self.entities.write().insert(entity.to_ref(), entity);
    }

    /// Returns a stored entity.
    pub fn get(&self, entity: &EntityRef) -> Option<Entity> {
        self.entities.read().get(entity).cloned()
    }

    /// Returns true if the entity is stored.
    pub fn contains(&self, entity: &EntityRef) -> bool {
        self.entities.read().contains_key(entity)
    }

    /// Returns all stored references, sorted by key.
    pub fn refs(&self) -> Vec<EntityRef> {
        self.entities.read().keys().cloned().collect()
    }

    /// Returns the number of stored entities.
    pub fn len(&self) -> usize {
        self.entities.read().len()
    }

    /// Returns true if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.entities.read().is_empty()
    }

    /// Returns every call made so far.
    pub fn calls(&self) -> Vec<StoreCall> {
        self.calls.read().clone()
    }

    /// Forgets recorded calls.
    pub fn clear_calls(&self) {
        self.calls.write().clear();
    }

    /// Makes every write and delete of `entity` fail.
    pub fn fail_on(&self, entity: EntityRef) {
        self.failing.write().insert(entity);
    }

    /// Makes the related lookup fail.
    pub fn set_related_unavailable(&self, unavailable: bool) {
        self.related_unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn record(&self, call: StoreCall) {
        self.calls.write().push(call);
    }

    fn check_failing(&self, entity: &EntityRef) -> StoreResult<()> {
        if self.failing.read().contains(entity) {
            return Err(StoreError::Rejected {
                status: 422,
                message: format!("entity {entity} rejected"),
            });
        }
        Ok(())
    }

    fn write_entity(&self, entity: &Entity, options: &RequestOptions) -> StoreResult<Entity> {
        let key = entity.to_ref();
        self.check_failing(&key)?;

        let mut entities = self.entities.write();
        let stored = match entities.get(&key) {
            Some(existing) if options.merge => {
                let mut merged = entity.clone();
                for (name, value) in &existing.properties {
                    merged
                        .properties
                        .entry(name.clone())
                        .or_insert_with(|| value.clone());
                }
                merged
            }
            _ => entity.clone(),
        };

        if !options.validation_only {
            entities.insert(key, stored.clone());
        }
        Ok(stored)
    }

    /// Removes `roots` and, transitively, every stored entity relating to
    /// a removed identifier.
    fn cascade_remove(&self, roots: Vec<EntityRef>) {
        let mut entities = self.entities.write();
        let mut pending = roots;

        while let Some(removed) = pending.pop() {
            if entities.remove(&removed).is_none() {
                continue;
            }
            pending.extend(
                entities
                    .values()
                    .filter(|e| e.relation_targets().any(|t| t == removed.identifier))
                    .map(Identified::to_ref),
            );
        }
    }
}

impl RemoteStore for MemoryStore {
    fn upsert_one(
        &self,
        entity: &Entity,
        options: &RequestOptions,
        _provenance: Provenance,
    ) -> StoreResult<Entity> {
        self.record(StoreCall::UpsertOne(entity.to_ref()));
        self.write_entity(entity, options)
    }

    fn upsert_batch(
        &self,
        entities: &[Entity],
        options: &RequestOptions,
        _provenance: Provenance,
    ) -> Vec<StoreResult<Entity>> {
        self.record(StoreCall::UpsertBatch(
            entities.iter().map(Identified::to_ref).collect(),
        ));
        entities
            .iter()
            .map(|entity| self.write_entity(entity, options))
            .collect()
    }

    fn delete_one(
        &self,
        entity: &EntityRef,
        options: &RequestOptions,
        _provenance: Provenance,
    ) -> StoreResult<()> {
        self.record(StoreCall::DeleteOne(entity.clone()));
        self.check_failing(entity)?;
        if !options.validation_only {
            self.entities.write().remove(entity);
        }
        Ok(())
    }

    fn delete_batch(
        &self,
        entities: &[EntityRef],
        options: &RequestOptions,
        _provenance: Provenance,
    ) -> StoreResult<()> {
        self.record(StoreCall::DeleteBatch(entities.to_vec()));
        if options.validation_only {
            return Ok(());
        }

        let allowed: Vec<EntityRef> = entities
            .iter()
            .filter(|entity| self.check_failing(entity).is_ok())
            .cloned()
            .collect();

        if options.delete_dependent_entities {
            self.cascade_remove(allowed);
        } else {
            let mut stored = self.entities.write();
            for entity in &allowed {
                stored.remove(entity);
            }
        }
        Ok(())
    }

    fn related_entity_refs(&self, entities: &[EntityRef]) -> StoreResult<Vec<EntityRef>> {
        self.record(StoreCall::RelatedLookup(entities.to_vec()));
        if self.related_unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::transport_retryable("related lookup unavailable"));
        }

        let stored = self.entities.read();
        let mut seen = HashSet::new();
        let mut related = Vec::new();

        for entity in entities.iter().filter_map(|key| stored.get(key)) {
            for target in entity.relation_targets() {
                for candidate in stored.keys().filter(|k| k.identifier == target) {
                    if seen.insert(candidate.clone()) {
                        related.push(candidate.clone());
                    }
                }
            }
        }

        Ok(related)
    }
}
