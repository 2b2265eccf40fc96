//! Property-based test generators using proptest.
//!
//! Provides strategies for generating entity collections that maintain
//! the invariants callers must uphold (unique identity keys).

use proptest::prelude::*;
use recon_model::{Entity, EntityDiff, RelationTarget};
use std::collections::BTreeSet;

/// Strategy for generating identifiers.
pub fn identifier_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-z0-9-]{0,7}").expect("Invalid regex")
}

/// Strategy for generating blueprint names.
pub fn blueprint_strategy() -> impl Strategy<Value = String> {
    prop::sample::select(vec!["service", "team", "database"]).prop_map(str::to_string)
}

/// Strategy for generating a set of unique identity keys.
pub fn key_set_strategy(max: usize) -> impl Strategy<Value = Vec<(String, String)>> {
    prop::collection::btree_set((identifier_strategy(), blueprint_strategy()), 0..=max)
        .prop_map(|keys| keys.into_iter().collect::<Vec<_>>())
        .prop_shuffle()
}

/// Which side(s) of a diff a key appears on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    /// Only in `before`.
    Before,
    /// Only in `after`.
    After,
    /// In both.
    Both,
}

fn side_strategy() -> impl Strategy<Value = Side> {
    prop_oneof![Just(Side::Before), Just(Side::After), Just(Side::Both)]
}

/// Strategy for generating a before/after pair with unique keys per side.
///
/// Keys on both sides get a differing property value, so payload changes
/// are exercised too.
pub fn entity_diff_strategy(max: usize) -> impl Strategy<Value = EntityDiff> {
    key_set_strategy(max)
        .prop_flat_map(|keys| {
            let n = keys.len();
            (Just(keys), prop::collection::vec(side_strategy(), n))
        })
        .prop_map(|(keys, sides)| {
            let mut before = Vec::new();
            let mut after = Vec::new();
            for ((identifier, blueprint), side) in keys.into_iter().zip(sides) {
                let old = Entity::new(identifier.as_str(), blueprint.as_str())
                    .with_property("rev", serde_json::json!(1));
                let new = old.clone().with_property("rev", serde_json::json!(2));
                match side {
                    Side::Before => before.push(old),
                    Side::After => after.push(new),
                    Side::Both => {
                        before.push(old);
                        after.push(new);
                    }
                }
            }
            EntityDiff::new(before, after)
        })
}

/// Strategy for generating entities whose relations form a DAG.
///
/// Entity `e{i}` may only depend on `e{j}` with `j < i`; the result is
/// shuffled so input order carries no hint. About one in eight entities
/// uses a search identifier.
pub fn acyclic_entities_strategy(max: usize) -> impl Strategy<Value = Vec<Entity>> {
    (1..=max.max(1))
        .prop_flat_map(|n| {
            let deps = (0..n)
                .map(|i| prop::collection::btree_set(0..i.max(1), 0..=i.min(3)))
                .collect::<Vec<_>>();
            (deps, prop::collection::vec(prop::bool::weighted(0.125), n))
        })
        .prop_map(|(deps, search): (Vec<BTreeSet<usize>>, Vec<bool>)| {
            deps.into_iter()
                .enumerate()
                .map(|(i, targets)| {
                    let mut entity = Entity::new(format!("e{i}"), "service");
                    let targets: Vec<String> = targets
                        .into_iter()
                        .filter(|&j| j < i)
                        .map(|j| format!("e{j}"))
                        .collect();
                    if !targets.is_empty() {
                        entity = entity.with_relation("depends_on", RelationTarget::Many(targets));
                    }
                    entity.uses_search_identifier = search[i];
                    entity
                })
                .collect::<Vec<_>>()
        })
        .prop_shuffle()
}

/// Strategy for generating entities whose relations may form cycles.
///
/// Entity `e{i}` may depend on any other `e{j}`, so the graph mixes
/// cycles with plain edges into and out of them.
pub fn cyclic_entities_strategy(max: usize) -> impl Strategy<Value = Vec<Entity>> {
    (1..=max.max(1))
        .prop_flat_map(|n| {
            prop::collection::vec(prop::collection::btree_set(0..n, 0..=n.min(3)), n)
        })
        .prop_map(|deps: Vec<BTreeSet<usize>>| {
            deps.into_iter()
                .enumerate()
                .map(|(i, targets)| {
                    let entity = Entity::new(format!("e{i}"), "service");
                    let targets: Vec<String> = targets
                        .into_iter()
                        .filter(|&j| j != i)
                        .map(|j| format!("e{j}"))
                        .collect();
                    if targets.is_empty() {
                        entity
                    } else {
                        entity.with_relation("depends_on", RelationTarget::Many(targets))
                    }
                })
                .collect::<Vec<_>>()
        })
        .prop_shuffle()
}
