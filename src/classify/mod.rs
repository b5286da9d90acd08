//! Heuristic classification of file changes into semantic categories.
//!
//! Rules run in a fixed order and the first match wins:
//! path rules (test, ci, build, docs), then the style-only check, then
//! content rules (feat, fix, perf, refactor), with chore as the fallback.
//! Classification is pure: the same input always gives the same output.

pub mod category;
pub mod rules;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::git::{ChangeKind, FileChange};
use crate::version::BumpType;

pub use category::{ChangeSignal, SemanticCategory};
pub use rules::ClassifierRules;

/// Classify every change. Input order is preserved.
pub fn classify(changes: &[FileChange], rules: &ClassifierRules) -> Vec<FileChange> {
    changes.iter().map(|c| classify_file(c, rules)).collect()
}

/// Assign a category and signals to one change.
pub fn classify_file(change: &FileChange, rules: &ClassifierRules) -> FileChange {
    let category = rules
        .path_category(&change.path)
        .or_else(|| is_style_only(change, rules).then_some(SemanticCategory::Style))
        .or_else(|| content_category(change, rules))
        .unwrap_or(SemanticCategory::Chore);

    let mut classified = change.clone();
    classified.category = Some(category);
    classified.signals = collect_signals(change, rules);
    classified
}

fn content_category(change: &FileChange, rules: &ClassifierRules) -> Option<SemanticCategory> {
    let large = change.magnitude() >= rules.refactor_line_threshold;

    match change.kind {
        ChangeKind::Added if change.insertions > 0 => return Some(SemanticCategory::Feat),
        ChangeKind::Added => return None,
        ChangeKind::Deleted => return large.then_some(SemanticCategory::Refactor),
        ChangeKind::Modified | ChangeKind::Renamed => {}
    }

    let mut changed = change
        .added_lines()
        .chain(change.removed_lines())
        .map(|l| l.content.as_str());
    if changed.any(|l| rules.has_fix_token(l)) {
        return Some(SemanticCategory::Fix);
    }
    if change.added_lines().any(|l| rules.has_perf_token(&l.content)) {
        return Some(SemanticCategory::Perf);
    }
    if large && change.deletions > 0 {
        return Some(SemanticCategory::Refactor);
    }
    if change.kind == ChangeKind::Renamed {
        return Some(SemanticCategory::Refactor);
    }
    None
}

/// Only whitespace or formatting changed: added and removed lines are the
/// same multiset once whitespace and formatter directives are ignored.
fn is_style_only(change: &FileChange, rules: &ClassifierRules) -> bool {
    if change.kind != ChangeKind::Modified || change.truncated || change.magnitude() == 0 {
        return false;
    }

    let normalize = |lines: Vec<&str>| {
        let mut out: Vec<String> = lines
            .into_iter()
            .filter(|l| !rules.is_style_signature(l))
            .map(|l| l.chars().filter(|c| !c.is_whitespace()).collect::<String>())
            .filter(|l| !l.is_empty())
            .collect();
        out.sort();
        out
    };

    let added = normalize(change.added_lines().map(|l| l.content.as_str()).collect());
    let removed = normalize(change.removed_lines().map(|l| l.content.as_str()).collect());
    added == removed
}

fn collect_signals(change: &FileChange, rules: &ClassifierRules) -> Vec<ChangeSignal> {
    let mut signals = Vec::new();

    if change
        .added_lines()
        .any(|l| l.content.contains("TODO") || l.content.contains("FIXME"))
    {
        signals.push(ChangeSignal::ContainsTodo);
    }
    if rules.is_config_file(&change.path) {
        signals.push(ChangeSignal::TouchesConfig);
    }

    let public = rules.is_public_interface(&change.path)
        || change
            .old_path
            .as_deref()
            .is_some_and(|p| rules.is_public_interface(p));
    let marked = change
        .added_lines()
        .any(|l| l.content.contains("BREAKING CHANGE"));
    let removed_api = change.kind == ChangeKind::Deleted
        || change.kind == ChangeKind::Renamed
        || change.deletions > rules.breaking_deletion_threshold;
    // The marker only counts on exported surfaces; docs and changelogs quote it.
    if public && (marked || removed_api) {
        signals.push(ChangeSignal::Breaking);
    }

    signals
}

/// Most frequent category among classified changes, ties broken by
/// [`SemanticCategory`] declaration order. None for an empty set.
pub fn primary_type(changes: &[FileChange]) -> Option<SemanticCategory> {
    let counts = category_counts(changes);
    counts
        .iter()
        .max_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.cmp(a.0)))
        .map(|(category, _)| *category)
}

pub fn category_counts(changes: &[FileChange]) -> BTreeMap<SemanticCategory, usize> {
    let mut counts = BTreeMap::new();
    for change in changes {
        *counts.entry(change.effective_category()).or_insert(0) += 1;
    }
    counts
}

/// Aggregate view of a classified change set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSummary {
    pub files: usize,
    pub insertions: usize,
    pub deletions: usize,
    /// Insertions plus deletions.
    pub magnitude: usize,
    pub primary: Option<SemanticCategory>,
    pub counts: BTreeMap<SemanticCategory, usize>,
    pub breaking: bool,
    pub bump: BumpType,
    pub todo_files: Vec<String>,
    pub config_files: Vec<String>,
}

pub fn summarize(changes: &[FileChange]) -> ChangeSummary {
    let insertions = changes.iter().map(|c| c.insertions).sum();
    let deletions = changes.iter().map(|c| c.deletions).sum();
    let with_signal = |signal| {
        changes
            .iter()
            .filter(|c| c.has_signal(signal))
            .map(|c| c.path.clone())
            .collect()
    };

    ChangeSummary {
        files: changes.len(),
        insertions,
        deletions,
        magnitude: insertions + deletions,
        primary: primary_type(changes),
        counts: category_counts(changes),
        breaking: changes.iter().any(|c| c.has_signal(ChangeSignal::Breaking)),
        bump: BumpType::for_changes(changes),
        todo_files: with_signal(ChangeSignal::ContainsTodo),
        config_files: with_signal(ChangeSignal::TouchesConfig),
    }
}
