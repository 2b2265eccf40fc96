//! Before/after inputs to a reconciliation.

use crate::entity::{Entity, EntityRef};
use serde::{Deserialize, Serialize};

/// Full-payload before/after pair.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityDiff {
    /// Entities as previously stored.
    #[serde(default)]
    pub before: Vec<Entity>,
    /// Entities as they should be stored now.
    #[serde(default)]
    pub after: Vec<Entity>,
}

impl EntityDiff {
    /// Creates a new diff input.
    pub fn new(before: Vec<Entity>, after: Vec<Entity>) -> Self {
        Self { before, after }
    }

    /// Projects both sides to references.
    pub fn to_refs(&self) -> EntityRefDiff {
        EntityRefDiff {
            before: self.before.iter().map(EntityRef::from).collect(),
            after: self.after.iter().map(EntityRef::from).collect(),
        }
    }
}

/// Identity-only before/after pair, used by delete-oriented events.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRefDiff {
    /// References as previously stored.
    #[serde(default)]
    pub before: Vec<EntityRef>,
    /// References that should remain.
    #[serde(default)]
    pub after: Vec<EntityRef>,
}

impl EntityRefDiff {
    /// Creates a new reference diff input.
    pub fn new(before: Vec<EntityRef>, after: Vec<EntityRef>) -> Self {
        Self { before, after }
    }
}
