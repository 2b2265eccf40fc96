//! Provenance of a change, carried to the remote store for audit.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Who initiated a change.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    /// Automated reconciliation (e.g. a periodic export).
    #[default]
    Automated,
    /// A change initiated by a user.
    UserTriggered,
}

impl Provenance {
    /// Returns the tag used in user-agent strings and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Provenance::Automated => "automated",
            Provenance::UserTriggered => "user_triggered",
        }
    }
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
