//! Entity fixtures.
//!
//! Provides small, readable builders for the catalog shapes tests keep
//! reaching for.

use recon_model::{Entity, EntityRef};
use serde_json::json;

/// A `service` entity with a `language` property.
pub fn service(identifier: &str) -> Entity {
    Entity::new(identifier, "service").with_property("language", json!("rust"))
}

/// A `team` entity.
pub fn team(identifier: &str) -> Entity {
    Entity::new(identifier, "team")
}

/// A `service` reference.
pub fn service_ref(identifier: &str) -> EntityRef {
    EntityRef::new(identifier, "service")
}

/// `n` entities of `blueprint` where entity `i` depends on entity `i - 1`.
///
/// Identifiers are `"{blueprint}-{i}"`.
pub fn chain(blueprint: &str, n: usize) -> Vec<Entity> {
    (0..n)
        .map(|i| {
            let entity = Entity::new(format!("{blueprint}-{i}"), blueprint);
            if i == 0 {
                entity
            } else {
                entity.with_relation("depends_on", format!("{blueprint}-{}", i - 1).as_str())
            }
        })
        .collect()
}

/// A hub team plus `n` services owned by it, hub last.
pub fn star(hub: &str, n: usize) -> Vec<Entity> {
    let mut entities: Vec<Entity> = (0..n)
        .map(|i| service(&format!("{hub}-svc-{i}")).with_relation("owner", hub))
        .collect();
    entities.push(team(hub));
    entities
}

/// Projects entities to references.
pub fn refs(entities: &[Entity]) -> Vec<EntityRef> {
    entities.iter().map(EntityRef::from).collect()
}
