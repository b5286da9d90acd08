//! Build changelog entries from classified changes.
//!
//! Building is a pure function of its inputs: no clock, no filesystem, and
//! every collection is ordered, so repeated calls render identical bytes.

use semver::Version;
use serde::{Deserialize, Serialize};

use crate::classify::SemanticCategory;
use crate::git::{ChangeKind, FileChange};
use crate::version::{BumpType, next_version};

use super::format::{ChangelogFormat, ChangelogStyle};

/// Items per category before a conventional-list line is cut off.
const LIST_ITEM_LIMIT: usize = 5;

/// One changed file as it appears in a changelog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangelogItem {
    pub path: String,
    pub kind: ChangeKind,
    pub insertions: usize,
    pub deletions: usize,
    pub breaking: bool,
    pub description: String,
}

/// Items sharing one semantic category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryGroup {
    pub category: SemanticCategory,
    pub items: Vec<ChangelogItem>,
}

/// A grouped, rendered changelog for one change set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangelogEntry {
    /// Non-empty groups in the style's section order.
    pub groups: Vec<CategoryGroup>,
    pub bump: BumpType,
    pub breaking: bool,
    pub magnitude: usize,
    pub previous_version: Option<Version>,
    pub next_version: Option<Version>,
    pub format: ChangelogFormat,
    pub style: ChangelogStyle,
    pub rendered: String,
}

/// Borrowed view serialized by the structured format.
#[derive(Serialize)]
struct StructuredView<'a> {
    bump: BumpType,
    breaking: bool,
    magnitude: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    previous_version: Option<&'a Version>,
    #[serde(skip_serializing_if = "Option::is_none")]
    next_version: Option<&'a Version>,
    groups: &'a [CategoryGroup],
}

/// Group classified changes and render them.
pub fn build(
    classified: &[FileChange],
    format: ChangelogFormat,
    style: ChangelogStyle,
) -> ChangelogEntry {
    let groups = group_changes(classified, style);
    let breaking = groups.iter().flat_map(|g| &g.items).any(|i| i.breaking);
    let mut entry = ChangelogEntry {
        groups,
        bump: BumpType::for_changes(classified),
        breaking,
        magnitude: classified.iter().map(FileChange::magnitude).sum(),
        previous_version: None,
        next_version: None,
        format,
        style,
        rendered: String::new(),
    };
    entry.rendered = entry.render_as(format);
    entry
}

/// Like [`build`], with the next version computed from `previous`.
pub fn build_with_version(
    classified: &[FileChange],
    format: ChangelogFormat,
    style: ChangelogStyle,
    previous: Option<&Version>,
) -> ChangelogEntry {
    let mut entry = build(classified, format, style);
    entry.previous_version = previous.cloned();
    entry.next_version = Some(next_version(previous, entry.bump));
    entry.rendered = entry.render_as(format);
    entry
}

fn group_changes(classified: &[FileChange], style: ChangelogStyle) -> Vec<CategoryGroup> {
    style
        .category_order()
        .filter_map(|category| {
            let mut items: Vec<ChangelogItem> = classified
                .iter()
                .filter(|c| c.effective_category() == category)
                .map(ChangelogItem::from_change)
                .collect();
            if items.is_empty() {
                return None;
            }
            items.sort_by(|a, b| a.path.cmp(&b.path));
            Some(CategoryGroup { category, items })
        })
        .collect()
}

impl ChangelogItem {
    fn from_change(change: &FileChange) -> Self {
        let description = match (change.kind, change.old_path.as_deref()) {
            (ChangeKind::Added, _) => format!("add {}", change.path),
            (ChangeKind::Modified, _) => format!("update {}", change.path),
            (ChangeKind::Deleted, _) => format!("remove {}", change.path),
            (ChangeKind::Renamed, Some(old)) => format!("rename {old} to {}", change.path),
            (ChangeKind::Renamed, None) => format!("rename {}", change.path),
        };
        Self {
            path: change.path.clone(),
            kind: change.kind,
            insertions: change.insertions,
            deletions: change.deletions,
            breaking: change.has_signal(crate::classify::ChangeSignal::Breaking),
            description,
        }
    }
}

impl ChangelogEntry {
    /// Total number of items across all groups.
    pub fn item_count(&self) -> usize {
        self.groups.iter().map(|g| g.items.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Render the same grouped data in any format.
    pub fn render_as(&self, format: ChangelogFormat) -> String {
        match format {
            ChangelogFormat::Structured => self.render_structured(),
            ChangelogFormat::HumanReadable => self.render_human(),
            ChangelogFormat::ConventionalList => self.render_list(),
        }
    }

    fn render_structured(&self) -> String {
        let view = StructuredView {
            bump: self.bump,
            breaking: self.breaking,
            magnitude: self.magnitude,
            previous_version: self.previous_version.as_ref(),
            next_version: self.next_version.as_ref(),
            groups: &self.groups,
        };
        serde_json::to_string_pretty(&view).unwrap_or_default()
    }

    fn render_human(&self) -> String {
        let mut blocks = Vec::new();

        let breaking: Vec<&ChangelogItem> = self
            .groups
            .iter()
            .flat_map(|g| &g.items)
            .filter(|i| i.breaking)
            .collect();
        if !breaking.is_empty() {
            blocks.push(section_block("BREAKING CHANGES", breaking));
        }

        for section in self.style.sections() {
            let items: Vec<&ChangelogItem> = self
                .groups
                .iter()
                .filter(|g| section.categories.contains(&g.category))
                .flat_map(|g| &g.items)
                .collect();
            if !items.is_empty() {
                blocks.push(section_block(section.title, items));
            }
        }

        blocks.join("\n")
    }

    fn render_list(&self) -> String {
        let mut out = String::new();
        for group in &self.groups {
            let bang = if group.items.iter().any(|i| i.breaking) {
                "!"
            } else {
                ""
            };
            let mut parts: Vec<&str> = group
                .items
                .iter()
                .take(LIST_ITEM_LIMIT)
                .map(|i| i.description.as_str())
                .collect();
            let rest = group.items.len().saturating_sub(LIST_ITEM_LIMIT);
            let more = format!("and {rest} more");
            if rest > 0 {
                parts.push(&more);
            }
            out.push_str(&format!("{}{bang}: {}\n", group.category, parts.join(", ")));
        }
        out
    }
}

fn section_block(title: &str, items: Vec<&ChangelogItem>) -> String {
    let mut block = format!("### {title}\n\n");
    for item in items {
        block.push_str(&format!("- {}\n", item.description));
    }
    block
}
