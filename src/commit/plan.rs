//! Deterministic commit plan synthesis from classified changes.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::classify::{ChangeSignal, SemanticCategory, primary_type};
use crate::commit::message::{CommitStyle, format_subject, render_message};
use crate::config::CommitConfig;
use crate::error::PlanError;
use crate::git::{ChangeKind, FileChange};
use crate::security::{SecurityFinding, SkippedFile};

/// A proposed commit. Produced only when no blocking finding exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitPlan {
    pub commit_type: SemanticCategory,
    pub scope: Option<String>,
    pub subject: String,
    /// Body paragraphs: an optional breaking-change note, then bullet lines.
    pub body: Vec<String>,
    pub breaking: bool,
    pub style: CommitStyle,
    /// Paths the commit will include (renamed files list both names).
    pub files: Vec<String>,
    /// Low and medium findings, reported without blocking.
    pub advisories: Vec<SecurityFinding>,
    /// Files the security scan could not read in full.
    #[serde(default)]
    pub unscanned: Vec<SkippedFile>,
    /// HEAD the plan was computed against, for staleness checks.
    pub head: Option<String>,
}

impl CommitPlan {
    /// Full commit message.
    pub fn message(&self) -> String {
        let mut paragraphs = Vec::new();
        let (notes, bullets): (Vec<&String>, Vec<&String>) =
            self.body.iter().partition(|l| l.starts_with("BREAKING CHANGE:"));
        paragraphs.extend(notes.into_iter().cloned());
        if !bullets.is_empty() {
            paragraphs.push(
                bullets
                    .into_iter()
                    .cloned()
                    .collect::<Vec<_>>()
                    .join("\n"),
            );
        }
        render_message(&self.subject, &paragraphs)
    }
}

/// Turn classified changes plus scan findings into a commit plan.
///
/// Fails with [`PlanError::BlockedBySecurity`] when any finding is high or
/// critical, and with [`PlanError::NoChangesToCommit`] for an empty set.
pub fn synthesize(
    classified: &[FileChange],
    findings: &[SecurityFinding],
    style: CommitStyle,
    options: &CommitConfig,
) -> Result<CommitPlan, PlanError> {
    if findings.iter().any(|f| f.severity.is_blocking()) {
        return Err(PlanError::BlockedBySecurity {
            findings: findings.to_vec(),
        });
    }
    let Some(commit_type) = primary_type(classified) else {
        return Err(PlanError::NoChangesToCommit);
    };

    let scope = detect_scope(classified, options.scope_share_percent);
    let breaking_paths: Vec<&str> = classified
        .iter()
        .filter(|c| c.has_signal(ChangeSignal::Breaking))
        .map(|c| c.path.as_str())
        .collect();
    let breaking = !breaking_paths.is_empty();

    let summary = summarize_dominant(classified, commit_type);
    let subject = format_subject(
        style,
        commit_type,
        scope.as_deref(),
        breaking,
        &summary,
        options.max_subject_len,
    );

    let mut body = Vec::new();
    if breaking {
        body.push(format!(
            "BREAKING CHANGE: public interface changed in {}",
            breaking_paths.join(", ")
        ));
    }
    body.extend(body_bullets(classified, options.max_body_bullets));

    let files = classified
        .iter()
        .flat_map(|c| std::iter::once(c.path.clone()).chain(c.old_path.clone()))
        .collect();

    debug!(%commit_type, ?scope, breaking, "Synthesized commit plan");
    Ok(CommitPlan {
        commit_type,
        scope,
        subject,
        body,
        breaking,
        style,
        files,
        advisories: findings.to_vec(),
        unscanned: Vec::new(),
        head: None,
    })
}

/// Top-level directory shared by at least `share_percent` of the files.
pub fn detect_scope(changes: &[FileChange], share_percent: u8) -> Option<String> {
    if changes.is_empty() {
        return None;
    }
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for change in changes {
        if let Some(dir) = change.top_level_dir() {
            *counts.entry(dir).or_insert(0) += 1;
        }
    }
    // BTreeMap iteration makes ties resolve to the alphabetically first dir.
    let (dir, count) = counts
        .into_iter()
        .fold(None, |best: Option<(&str, usize)>, (dir, n)| match best {
            Some((_, m)) if m >= n => best,
            _ => Some((dir, n)),
        })?;
    (count * 100 >= changes.len() * share_percent as usize).then(|| dir.to_string())
}

/// Short description built from the largest change of the primary type.
fn summarize_dominant(changes: &[FileChange], commit_type: SemanticCategory) -> String {
    let dominant = changes
        .iter()
        .filter(|c| c.effective_category() == commit_type)
        .max_by(|a, b| {
            a.magnitude()
                .cmp(&b.magnitude())
                .then_with(|| b.path.cmp(&a.path))
        });
    let Some(dominant) = dominant else {
        return "update files".to_string();
    };

    let name = dominant.file_name();
    let action = match (dominant.kind, commit_type) {
        (ChangeKind::Added, SemanticCategory::Test) => format!("add tests in {name}"),
        (ChangeKind::Added, SemanticCategory::Docs) => format!("document {name}"),
        (ChangeKind::Added, _) => format!("add {name}"),
        (ChangeKind::Deleted, _) => format!("remove {name}"),
        (ChangeKind::Renamed, _) => {
            let from = dominant
                .old_path
                .as_deref()
                .map(|p| p.rsplit('/').next().unwrap_or(p))
                .unwrap_or("file");
            format!("rename {from} to {name}")
        }
        (ChangeKind::Modified, SemanticCategory::Fix) => format!("fix {name}"),
        (ChangeKind::Modified, SemanticCategory::Perf) => format!("speed up {name}"),
        (ChangeKind::Modified, SemanticCategory::Refactor) => format!("restructure {name}"),
        (ChangeKind::Modified, SemanticCategory::Style) => format!("format {name}"),
        (ChangeKind::Modified, SemanticCategory::Docs) => format!("update docs in {name}"),
        (ChangeKind::Modified, SemanticCategory::Test) => format!("update tests in {name}"),
        (ChangeKind::Modified, _) => format!("update {name}"),
    };

    match changes.len() - 1 {
        0 => action,
        1 => format!("{action} and 1 more file"),
        n => format!("{action} and {n} more files"),
    }
}

/// One bullet per (category, top-level path) pair, capped at `max`.
fn body_bullets(changes: &[FileChange], max: usize) -> Vec<String> {
    let mut groups: BTreeMap<(SemanticCategory, &str), usize> = BTreeMap::new();
    for change in changes {
        *groups
            .entry((change.effective_category(), change.top_level()))
            .or_insert(0) += 1;
    }

    let mut bullets = Vec::new();
    let mut hidden_files = 0;
    for (index, ((category, segment), count)) in groups.into_iter().enumerate() {
        if index < max {
            let noun = if count == 1 { "file" } else { "files" };
            bullets.push(format!("- {category}: {segment} ({count} {noun})"));
        } else {
            hidden_files += count;
        }
    }
    if hidden_files > 0 {
        bullets.push(format!("- +{hidden_files} more files"));
    }
    bullets
}
