//! Changelog output formats and section styles.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::classify::SemanticCategory;

/// Rendering format for a changelog entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangelogFormat {
    /// JSON document with groups and items.
    Structured,
    /// Markdown sections with bullet items.
    #[default]
    HumanReadable,
    /// One `type: description` line per category.
    ConventionalList,
}

impl fmt::Display for ChangelogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangelogFormat::Structured => write!(f, "structured"),
            ChangelogFormat::HumanReadable => write!(f, "human"),
            ChangelogFormat::ConventionalList => write!(f, "conventional"),
        }
    }
}

impl std::str::FromStr for ChangelogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "structured" | "json" => Ok(Self::Structured),
            "human" | "human-readable" | "markdown" => Ok(Self::HumanReadable),
            "conventional" | "conventional-list" | "list" => Ok(Self::ConventionalList),
            _ => Err(format!(
                "Unknown changelog format: {s} (expected structured, human or conventional)"
            )),
        }
    }
}

/// Section naming and ordering. Styles change presentation only; the
/// grouping by category stays the same.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangelogStyle {
    #[default]
    Conventional,
    /// Keep a Changelog headings (Added, Fixed, Changed, ...).
    KeepAChangelog,
}

impl std::str::FromStr for ChangelogStyle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "conventional" => Ok(Self::Conventional),
            "keep-a-changelog" | "keepachangelog" | "keep_a_changelog" => {
                Ok(Self::KeepAChangelog)
            }
            _ => Err(format!(
                "Unknown changelog style: {s} (expected conventional or keep-a-changelog)"
            )),
        }
    }
}

/// A rendered section: heading plus the categories it collects, in order.
pub struct Section {
    pub title: &'static str,
    pub categories: &'static [SemanticCategory],
}

const CONVENTIONAL_SECTIONS: &[Section] = &[
    Section {
        title: "Features",
        categories: &[SemanticCategory::Feat],
    },
    Section {
        title: "Bug Fixes",
        categories: &[SemanticCategory::Fix],
    },
    Section {
        title: "Performance",
        categories: &[SemanticCategory::Perf],
    },
    Section {
        title: "Refactoring",
        categories: &[SemanticCategory::Refactor],
    },
    Section {
        title: "Documentation",
        categories: &[SemanticCategory::Docs],
    },
    Section {
        title: "Tests",
        categories: &[SemanticCategory::Test],
    },
    Section {
        title: "Build & CI",
        categories: &[SemanticCategory::Build, SemanticCategory::Ci],
    },
    Section {
        title: "Chores",
        categories: &[SemanticCategory::Style, SemanticCategory::Chore],
    },
];

const KEEP_A_CHANGELOG_SECTIONS: &[Section] = &[
    Section {
        title: "Added",
        categories: &[SemanticCategory::Feat],
    },
    Section {
        title: "Fixed",
        categories: &[SemanticCategory::Fix],
    },
    Section {
        title: "Changed",
        categories: &[
            SemanticCategory::Perf,
            SemanticCategory::Refactor,
            SemanticCategory::Style,
        ],
    },
    Section {
        title: "Documentation",
        categories: &[SemanticCategory::Docs],
    },
    Section {
        title: "Maintenance",
        categories: &[
            SemanticCategory::Test,
            SemanticCategory::Build,
            SemanticCategory::Ci,
            SemanticCategory::Chore,
        ],
    },
];

impl ChangelogStyle {
    /// Sections in output order. Every category appears in exactly one.
    pub fn sections(self) -> &'static [Section] {
        match self {
            ChangelogStyle::Conventional => CONVENTIONAL_SECTIONS,
            ChangelogStyle::KeepAChangelog => KEEP_A_CHANGELOG_SECTIONS,
        }
    }

    /// Categories flattened in section order.
    pub fn category_order(self) -> impl Iterator<Item = SemanticCategory> {
        self.sections()
            .iter()
            .flat_map(|s| s.categories.iter().copied())
    }
}

/// Keep a Changelog header for new files.
pub const CHANGELOG_HEADER: &str = r#"# Changelog

All notable changes to this project will be documented in this file.

The format is based on [Keep a Changelog](https://keepachangelog.com/en/1.1.0/),
and this project adheres to [Semantic Versioning](https://semver.org/spec/v2.0.0.html).

"#;
