//! Entities and their identity projection.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Anything that carries an identity key `(identifier, blueprint)`.
///
/// Two items are the same entity for diffing, ordering and guarding
/// purposes iff both parts of the key are equal.
pub trait Identified {
    /// The identifier, unique within the blueprint.
    fn identifier(&self) -> &str;

    /// The blueprint (type name).
    fn blueprint(&self) -> &str;

    /// Returns the identity key as a borrowed pair.
    fn key(&self) -> (&str, &str) {
        (self.identifier(), self.blueprint())
    }

    /// Projects this item to an owned reference.
    fn to_ref(&self) -> EntityRef {
        EntityRef::new(self.identifier(), self.blueprint())
    }

    /// Returns true if `other` has the same identity key.
    fn is_same_entity(&self, other: &impl Identified) -> bool {
        self.key() == other.key()
    }
}

/// Target(s) of a single named relation.
///
/// The target blueprint is implied by the relation's schema and is not
/// stored here; only identifiers are.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RelationTarget {
    /// The relation is set but points nowhere (`null`).
    Empty,
    /// A single-valued relation.
    One(String),
    /// A many-valued relation.
    Many(Vec<String>),
}

impl RelationTarget {
    /// Returns the target identifiers.
    pub fn identifiers(&self) -> &[String] {
        match self {
            RelationTarget::Empty => &[],
            RelationTarget::One(id) => std::slice::from_ref(id),
            RelationTarget::Many(ids) => ids,
        }
    }

    /// Returns true if the relation has no targets.
    pub fn is_empty(&self) -> bool {
        self.identifiers().is_empty()
    }
}

impl From<&str> for RelationTarget {
    fn from(id: &str) -> Self {
        RelationTarget::One(id.to_string())
    }
}

impl From<Vec<String>> for RelationTarget {
    fn from(ids: Vec<String>) -> Self {
        RelationTarget::Many(ids)
    }
}

/// A typed catalog record.
///
/// Entities are immutable snapshots for the duration of a reconciliation:
/// built from the triggering event, consumed by the engine, then dropped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entity {
    /// Identifier, unique within `blueprint`.
    pub identifier: String,
    /// Blueprint (type) of the entity.
    pub blueprint: String,
    /// Display title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Owning teams.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub team: Vec<String>,
    /// Icon name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    /// Opaque property values.
    #[serde(default)]
    pub properties: BTreeMap<String, Value>,
    /// Relation name to target identifiers.
    #[serde(default)]
    pub relations: BTreeMap<String, RelationTarget>,
    /// The identifier is resolved by a query at the remote store rather
    /// than supplied literally.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub uses_search_identifier: bool,
}

impl Entity {
    /// Creates an entity with no properties or relations.
    pub fn new(identifier: impl Into<String>, blueprint: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            blueprint: blueprint.into(),
            title: None,
            team: Vec::new(),
            icon: None,
            properties: BTreeMap::new(),
            relations: BTreeMap::new(),
            uses_search_identifier: false,
        }
    }

    /// Sets the title.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Sets a property value.
    pub fn with_property(mut self, name: impl Into<String>, value: Value) -> Self {
        self.properties.insert(name.into(), value);
        self
    }

    /// Sets a relation.
    pub fn with_relation(
        mut self,
        name: impl Into<String>,
        target: impl Into<RelationTarget>,
    ) -> Self {
        self.relations.insert(name.into(), target.into());
        self
    }

    /// Marks the identifier as a search identifier.
    pub fn with_search_identifier(mut self) -> Self {
        self.uses_search_identifier = true;
        self
    }

    /// Iterates over every relation target identifier, across all relations.
    pub fn relation_targets(&self) -> impl Iterator<Item = &str> {
        self.relations
            .values()
            .flat_map(|target| target.identifiers().iter().map(String::as_str))
    }
}

impl Identified for Entity {
    fn identifier(&self) -> &str {
        &self.identifier
    }

    fn blueprint(&self) -> &str {
        &self.blueprint
    }
}

/// The identity projection of an [`Entity`].
///
/// Used wherever only identity is known, e.g. delete-only events.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityRef {
    /// Identifier, unique within `blueprint`.
    pub identifier: String,
    /// Blueprint (type) of the entity.
    pub blueprint: String,
}

impl EntityRef {
    /// Creates a new reference.
    pub fn new(identifier: impl Into<String>, blueprint: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            blueprint: blueprint.into(),
        }
    }
}

impl Identified for EntityRef {
    fn identifier(&self) -> &str {
        &self.identifier
    }

    fn blueprint(&self) -> &str {
        &self.blueprint
    }
}

impl From<&Entity> for EntityRef {
    fn from(entity: &Entity) -> Self {
        entity.to_ref()
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.identifier, self.blueprint)
    }
}
