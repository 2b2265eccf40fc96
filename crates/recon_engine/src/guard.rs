//! Safe-delete filtering.

use recon_model::{EntityRef, Identified};
use std::collections::HashSet;
use tracing::{debug, info};

/// Deletion candidates split into what may go and what must stay.
#[derive(Debug, Clone, PartialEq)]
pub struct GuardOutcome<T> {
    /// Candidates cleared for deletion, in input order.
    pub deletable: Vec<T>,
    /// Candidates kept alive, in input order.
    pub preserved: Vec<T>,
}

/// Filters deletion candidates against a protect set.
///
/// `keep` are the entities just written or retained; they are never
/// deleted. `related` are the entities `keep` depends on, as reported by
/// the store. A related candidate survives only while the store is
/// allowed to create missing related entities.
///
/// A candidate is deletable iff it is not in `keep` and it is either not
/// related or `auto_create_missing_related` is off.
pub fn filter_deletable<T: Identified>(
    candidates: Vec<T>,
    keep: &[EntityRef],
    related: &[EntityRef],
    auto_create_missing_related: bool,
) -> GuardOutcome<T> {
    let keep_keys: HashSet<(&str, &str)> = keep.iter().map(Identified::key).collect();
    let related_keys: HashSet<(&str, &str)> = related.iter().map(Identified::key).collect();

    let mut deletable = Vec::new();
    let mut preserved = Vec::new();

    for candidate in candidates {
        let key = candidate.key();
        if keep_keys.contains(&key) {
            debug!(
                identifier = key.0,
                blueprint = key.1,
                "skipping delete of kept entity"
            );
            preserved.push(candidate);
        } else if related_keys.contains(&key) && auto_create_missing_related {
            info!(
                identifier = key.0,
                blueprint = key.1,
                "skipping delete: entity is related to kept entities and missing related entities are auto-created"
            );
            preserved.push(candidate);
        } else {
            deletable.push(candidate);
        }
    }

    GuardOutcome {
        deletable,
        preserved,
    }
}
