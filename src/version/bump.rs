//! Semver bump suggestion from classified changes.

use std::fmt;

use semver::Version;
use serde::{Deserialize, Serialize};

use crate::classify::{ChangeSignal, SemanticCategory};
use crate::git::FileChange;

/// Type of version bump.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BumpType {
    Patch,
    Minor,
    Major,
}

impl BumpType {
    /// Breaking changes bump major, any feature bumps minor, anything else
    /// bumps patch.
    pub fn for_changes(changes: &[FileChange]) -> Self {
        let mut bump = BumpType::Patch;
        for change in changes {
            if change.has_signal(ChangeSignal::Breaking) {
                return BumpType::Major;
            }
            if change.category == Some(SemanticCategory::Feat) {
                bump = BumpType::Minor;
            }
        }
        bump
    }

    pub fn apply(self, base: &Version) -> Version {
        match self {
            BumpType::Major => Version::new(base.major + 1, 0, 0),
            BumpType::Minor => Version::new(base.major, base.minor + 1, 0),
            BumpType::Patch => Version::new(base.major, base.minor, base.patch + 1),
        }
    }
}

impl fmt::Display for BumpType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BumpType::Patch => write!(f, "patch"),
            BumpType::Minor => write!(f, "minor"),
            BumpType::Major => write!(f, "major"),
        }
    }
}

/// Next version after `base` (0.0.0 when the repository has no release yet).
pub fn next_version(base: Option<&Version>, bump: BumpType) -> Version {
    let base = base.cloned().unwrap_or_else(|| Version::new(0, 0, 0));
    bump.apply(&base)
}
