//! Semantic change categories and per-file signals.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Conventional-commit style category of a change.
///
/// Variants are declared in tie-break order: when two categories are equally
/// frequent, the one declared first wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SemanticCategory {
    Feat,
    Fix,
    Refactor,
    Perf,
    Docs,
    Test,
    Build,
    Ci,
    Style,
    Chore,
}

impl SemanticCategory {
    pub const ALL: [SemanticCategory; 10] = [
        SemanticCategory::Feat,
        SemanticCategory::Fix,
        SemanticCategory::Refactor,
        SemanticCategory::Perf,
        SemanticCategory::Docs,
        SemanticCategory::Test,
        SemanticCategory::Build,
        SemanticCategory::Ci,
        SemanticCategory::Style,
        SemanticCategory::Chore,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SemanticCategory::Feat => "feat",
            SemanticCategory::Fix => "fix",
            SemanticCategory::Refactor => "refactor",
            SemanticCategory::Perf => "perf",
            SemanticCategory::Docs => "docs",
            SemanticCategory::Test => "test",
            SemanticCategory::Build => "build",
            SemanticCategory::Ci => "ci",
            SemanticCategory::Style => "style",
            SemanticCategory::Chore => "chore",
        }
    }
}

impl fmt::Display for SemanticCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SemanticCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "feat" => Ok(Self::Feat),
            "fix" => Ok(Self::Fix),
            "docs" => Ok(Self::Docs),
            "style" => Ok(Self::Style),
            "refactor" => Ok(Self::Refactor),
            "perf" => Ok(Self::Perf),
            "test" => Ok(Self::Test),
            "build" => Ok(Self::Build),
            "ci" => Ok(Self::Ci),
            "chore" => Ok(Self::Chore),
            _ => Err(format!("Unknown change category: {}", s)),
        }
    }
}

/// Extra facts noticed while classifying a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeSignal {
    /// Added lines mention TODO or FIXME.
    ContainsTodo,
    /// The file is configuration.
    TouchesConfig,
    /// The change likely breaks a public interface.
    Breaking,
}
