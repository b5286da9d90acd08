//! Per-file change collection from the working tree using git2.

use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use git2::{Delta, DiffFindOptions, DiffOptions, ErrorCode, Patch, Repository, Tree};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::classify::{ChangeSignal, SemanticCategory};
use crate::error::RepoError;

/// Diff lines kept per file; the rest are dropped and the file is marked truncated.
const MAX_LINES_PER_FILE: usize = 20_000;

/// Bytes inspected when sniffing for binary content.
const BINARY_SNIFF_LEN: usize = 8_000;

/// How a file changed relative to HEAD.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Added,
    Modified,
    Deleted,
    Renamed,
}

impl ChangeKind {
    /// Whether the file was present at HEAD.
    pub fn existed_before(self) -> bool {
        !matches!(self, ChangeKind::Added)
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeKind::Added => write!(f, "added"),
            ChangeKind::Modified => write!(f, "modified"),
            ChangeKind::Deleted => write!(f, "deleted"),
            ChangeKind::Renamed => write!(f, "renamed"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineOrigin {
    Added,
    Removed,
    Context,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffLine {
    pub origin: LineOrigin,
    pub content: String,
    /// Line number in the new file (None for removed lines).
    pub new_lineno: Option<u32>,
    pub old_lineno: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffHunk {
    pub header: String,
    pub old_start: u32,
    pub new_start: u32,
    pub lines: Vec<DiffLine>,
}

/// One changed file, with its hunks and (once classified) its category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileChange {
    pub path: String,
    /// Previous path for renames.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_path: Option<String>,
    pub kind: ChangeKind,
    pub insertions: usize,
    pub deletions: usize,
    #[serde(default, skip_serializing)]
    pub hunks: Vec<DiffHunk>,
    pub binary: bool,
    /// Size of the working tree file (0 for deletions).
    pub size_bytes: u64,
    /// Whether the change is already in the index.
    pub staged: bool,
    /// Set when hunks were cut at the per-file line cap.
    #[serde(default)]
    pub truncated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<SemanticCategory>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub signals: Vec<ChangeSignal>,
}

impl FileChange {
    pub fn new(path: impl Into<String>, kind: ChangeKind) -> Self {
        Self {
            path: path.into(),
            old_path: None,
            kind,
            insertions: 0,
            deletions: 0,
            hunks: Vec::new(),
            binary: false,
            size_bytes: 0,
            staged: false,
            truncated: false,
            category: None,
            signals: Vec::new(),
        }
    }

    /// Append a hunk of added lines, numbered from the end of the last hunk.
    pub fn with_added_lines(mut self, lines: &[&str]) -> Self {
        let start = self.next_new_line();
        let hunk = DiffHunk {
            header: format!("@@ -0,0 +{},{} @@", start, lines.len()),
            old_start: 0,
            new_start: start,
            lines: lines
                .iter()
                .enumerate()
                .map(|(i, content)| DiffLine {
                    origin: LineOrigin::Added,
                    content: content.to_string(),
                    new_lineno: Some(start + i as u32),
                    old_lineno: None,
                })
                .collect(),
        };
        self.insertions += lines.len();
        self.size_bytes += lines.iter().map(|l| l.len() as u64 + 1).sum::<u64>();
        self.hunks.push(hunk);
        self
    }

    /// Append a hunk of removed lines.
    pub fn with_removed_lines(mut self, lines: &[&str]) -> Self {
        let hunk = DiffHunk {
            header: format!("@@ -1,{} +0,0 @@", lines.len()),
            old_start: 1,
            new_start: 0,
            lines: lines
                .iter()
                .enumerate()
                .map(|(i, content)| DiffLine {
                    origin: LineOrigin::Removed,
                    content: content.to_string(),
                    new_lineno: None,
                    old_lineno: Some(1 + i as u32),
                })
                .collect(),
        };
        self.deletions += lines.len();
        self.hunks.push(hunk);
        self
    }

    fn next_new_line(&self) -> u32 {
        self.added_lines()
            .filter_map(|l| l.new_lineno)
            .max()
            .map_or(1, |n| n + 1)
    }

    pub fn magnitude(&self) -> usize {
        self.insertions + self.deletions
    }

    pub fn added_lines(&self) -> impl Iterator<Item = &DiffLine> {
        self.hunks
            .iter()
            .flat_map(|h| h.lines.iter())
            .filter(|l| l.origin == LineOrigin::Added)
    }

    pub fn removed_lines(&self) -> impl Iterator<Item = &DiffLine> {
        self.hunks
            .iter()
            .flat_map(|h| h.lines.iter())
            .filter(|l| l.origin == LineOrigin::Removed)
    }

    /// First path component: a directory, or the file name for root-level files.
    pub fn top_level(&self) -> &str {
        self.path.split('/').next().unwrap_or(&self.path)
    }

    /// Top-level directory, if the file is not at the repository root.
    pub fn top_level_dir(&self) -> Option<&str> {
        self.path.split_once('/').map(|(head, _)| head)
    }

    pub fn file_name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }

    pub fn has_signal(&self, signal: ChangeSignal) -> bool {
        self.signals.contains(&signal)
    }

    /// Category, treating unclassified files as chores.
    pub fn effective_category(&self) -> SemanticCategory {
        self.category.unwrap_or(SemanticCategory::Chore)
    }
}

/// Resolve the HEAD tree, distinguishing empty-repo errors from real failures.
///
/// Returns `Ok(None)` for repos with no commits (unborn branch / not found).
pub(crate) fn resolve_head_tree(repo: &Repository) -> Result<Option<Tree<'_>>, RepoError> {
    let head_ref = match repo.head() {
        Ok(r) => r,
        Err(e) if e.code() == ErrorCode::UnbornBranch || e.code() == ErrorCode::NotFound => {
            return Ok(None);
        }
        Err(e) => return Err(RepoError::DiffFailed(e)),
    };

    let tree = head_ref.peel_to_tree().map_err(RepoError::DiffFailed)?;
    Ok(Some(tree))
}

/// Collect every pending change (staged, unstaged and untracked) against HEAD.
///
/// Files come back sorted by path, with hunks populated and renames detected.
pub fn collect_changes(repo: &Repository) -> Result<Vec<FileChange>, RepoError> {
    let workdir = repo.workdir().ok_or(RepoError::BareRepository)?;
    let head_tree = resolve_head_tree(repo)?;

    let staged_paths: Vec<String> = repo
        .diff_tree_to_index(head_tree.as_ref(), None, None)
        .map_err(RepoError::DiffFailed)?
        .deltas()
        .filter_map(|d| d.new_file().path().map(|p| p.to_string_lossy().into_owned()))
        .collect();

    let mut opts = DiffOptions::new();
    opts.include_untracked(true)
        .recurse_untracked_dirs(true)
        .show_untracked_content(true);
    let mut diff = repo
        .diff_tree_to_workdir_with_index(head_tree.as_ref(), Some(&mut opts))
        .map_err(RepoError::DiffFailed)?;

    let mut find_opts = DiffFindOptions::new();
    find_opts.renames(true).for_untracked(true);
    diff.find_similar(Some(&mut find_opts))
        .map_err(RepoError::DiffFailed)?;

    let mut changes = Vec::new();
    for idx in 0..diff.deltas().len() {
        let Some(delta) = diff.get_delta(idx) else {
            continue;
        };
        let kind = match delta.status() {
            Delta::Added | Delta::Untracked | Delta::Copied => ChangeKind::Added,
            Delta::Modified | Delta::Typechange | Delta::Conflicted => ChangeKind::Modified,
            Delta::Deleted => ChangeKind::Deleted,
            Delta::Renamed => ChangeKind::Renamed,
            Delta::Unmodified | Delta::Ignored | Delta::Unreadable => continue,
        };

        let file = if kind == ChangeKind::Deleted {
            delta.old_file()
        } else {
            delta.new_file()
        };
        let Some(path) = file.path().map(|p| p.to_string_lossy().into_owned()) else {
            warn!("Skipping delta without a path");
            continue;
        };

        let mut change = FileChange::new(path, kind);
        if kind == ChangeKind::Renamed {
            change.old_path = delta
                .old_file()
                .path()
                .map(|p| p.to_string_lossy().into_owned());
        }
        change.staged = staged_paths.contains(&change.path);

        let on_disk = workdir.join(&change.path);
        if kind != ChangeKind::Deleted {
            change.size_bytes = std::fs::metadata(&on_disk).map(|m| m.len()).unwrap_or(0);
        }

        let patch = Patch::from_diff(&diff, idx).map_err(RepoError::DiffFailed)?;
        change.binary = delta.flags().is_binary()
            || patch
                .as_ref()
                .is_some_and(|p| p.delta().flags().is_binary())
            || (kind != ChangeKind::Deleted && sniff_binary(&on_disk));

        if let Some(patch) = patch
            && !change.binary
        {
            read_patch(&patch, &mut change)?;
        }

        changes.push(change);
    }

    changes.sort_by(|a, b| a.path.cmp(&b.path));
    debug!(files = changes.len(), "Collected working tree changes");
    Ok(changes)
}

/// Copy line statistics and hunks out of a patch.
fn read_patch(patch: &Patch<'_>, change: &mut FileChange) -> Result<(), RepoError> {
    let (_, insertions, deletions) = patch.line_stats().map_err(RepoError::DiffFailed)?;
    change.insertions = insertions;
    change.deletions = deletions;

    let mut kept = 0usize;
    for hunk_idx in 0..patch.num_hunks() {
        let (hunk, line_count) = patch.hunk(hunk_idx).map_err(RepoError::DiffFailed)?;
        let mut out = DiffHunk {
            header: String::from_utf8_lossy(hunk.header()).trim_end().to_string(),
            old_start: hunk.old_start(),
            new_start: hunk.new_start(),
            lines: Vec::with_capacity(line_count),
        };

        for line_idx in 0..line_count {
            if kept >= MAX_LINES_PER_FILE {
                change.truncated = true;
                break;
            }
            let line = patch
                .line_in_hunk(hunk_idx, line_idx)
                .map_err(RepoError::DiffFailed)?;
            let origin = match line.origin() {
                '+' => LineOrigin::Added,
                '-' => LineOrigin::Removed,
                ' ' => LineOrigin::Context,
                _ => continue,
            };
            out.lines.push(DiffLine {
                origin,
                content: String::from_utf8_lossy(line.content())
                    .trim_end_matches(['\n', '\r'])
                    .to_string(),
                new_lineno: line.new_lineno(),
                old_lineno: line.old_lineno(),
            });
            kept += 1;
        }

        change.hunks.push(out);
        if change.truncated {
            warn!(path = %change.path, "Diff truncated at {} lines", MAX_LINES_PER_FILE);
            break;
        }
    }
    Ok(())
}

/// A NUL byte near the start of the file marks it as binary.
fn sniff_binary(path: &Path) -> bool {
    let Ok(file) = File::open(path) else {
        return false;
    };
    let mut buf = Vec::with_capacity(BINARY_SNIFF_LEN);
    if file
        .take(BINARY_SNIFF_LEN as u64)
        .read_to_end(&mut buf)
        .is_err()
    {
        return false;
    }
    buf.contains(&0)
}
