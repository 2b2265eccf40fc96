//! Identity-based classification of before/after collections.

use recon_model::Identified;
use std::collections::HashSet;

/// A before/after pair split into created, modified and deleted items.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifiedDiff<T> {
    /// In `after`, not in `before`.
    pub created: Vec<T>,
    /// In both; carries the `after` version.
    pub modified: Vec<T>,
    /// In `before`, not in `after`.
    pub deleted: Vec<T>,
}

impl<T> ClassifiedDiff<T> {
    /// Returns true if all three buckets are empty.
    pub fn is_empty(&self) -> bool {
        self.created.is_empty() && self.modified.is_empty() && self.deleted.is_empty()
    }

    /// Splits into the kept items (created then modified) and the deleted items.
    pub fn into_kept_and_deleted(self) -> (Vec<T>, Vec<T>) {
        let mut kept = self.created;
        kept.extend(self.modified);
        (kept, self.deleted)
    }
}

/// Classifies `before` and `after` by identity key.
///
/// Each bucket keeps the input order of its source collection. Both
/// collections are expected to have unique keys; validate them first.
pub fn classify<T: Identified + Clone>(before: &[T], after: &[T]) -> ClassifiedDiff<T> {
    let before_keys: HashSet<(&str, &str)> = before.iter().map(Identified::key).collect();
    let after_keys: HashSet<(&str, &str)> = after.iter().map(Identified::key).collect();

    let mut created = Vec::new();
    let mut modified = Vec::new();
    for item in after {
        if before_keys.contains(&item.key()) {
            modified.push(item.clone());
        } else {
            created.push(item.clone());
        }
    }

    let deleted = before
        .iter()
        .filter(|item| !after_keys.contains(&item.key()))
        .cloned()
        .collect();

    ClassifiedDiff {
        created,
        modified,
        deleted,
    }
}
