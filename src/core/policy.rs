//! core::policy
//!
//! Conflict-resolution policy for replaying the migrated history onto the
//! destination branch.

use serde::{Deserialize, Serialize};

/// Rule used to pick a winner when the replayed history and the destination
/// disagree on the same content.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictPolicy {
    /// The migrated commit wins.
    #[default]
    PreferIncoming,
    /// The destination's existing content wins.
    PreferExisting,
    /// Patience diff with rename detection, migrated commit wins the
    /// hunks that still conflict. Suited to reordered or refactored files.
    DiffAlign,
}

impl ConflictPolicy {
    pub fn name(&self) -> &'static str {
        match self {
            ConflictPolicy::PreferIncoming => "prefer-incoming",
            ConflictPolicy::PreferExisting => "prefer-existing",
            ConflictPolicy::DiffAlign => "diff-align",
        }
    }

    /// Suffix added to proposal branch names. The default policy adds none.
    pub fn branch_suffix(&self) -> Option<&'static str> {
        match self {
            ConflictPolicy::PreferIncoming => None,
            ConflictPolicy::PreferExisting => Some("existing"),
            ConflictPolicy::DiffAlign => Some("aligned"),
        }
    }

    /// Whether the incoming side wins an unresolved conflict.
    pub fn incoming_wins(&self) -> bool {
        !matches!(self, ConflictPolicy::PreferExisting)
    }
}

impl std::fmt::Display for ConflictPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for ConflictPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "prefer-incoming" | "theirs" => Ok(ConflictPolicy::PreferIncoming),
            "prefer-existing" | "ours" => Ok(ConflictPolicy::PreferExisting),
            "diff-align" | "patience" => Ok(ConflictPolicy::DiffAlign),
            other => Err(format!(
                "unknown conflict policy '{other}' (expected prefer-incoming, prefer-existing or diff-align)"
            )),
        }
    }
}
