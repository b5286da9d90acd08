//! Point-in-time view of a repository: branch, tracking state and file status.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use git2::{BranchType, ErrorCode, Oid, Repository, Sort, Status, StatusOptions};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::RepoError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteInfo {
    pub name: String,
    pub fetch_url: Option<String>,
    pub push_url: Option<String>,
}

/// Commit counts between a local branch and its tracking ref.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Divergence {
    pub ahead: usize,
    pub behind: usize,
    /// Tracking ref the counts were taken against, e.g. `refs/remotes/origin/main`.
    pub tracking_ref: Option<String>,
}

impl Divergence {
    pub fn diverged(&self) -> bool {
        self.ahead > 0 && self.behind > 0
    }
}

/// Snapshot of repository state. It reflects the moment it was taken and
/// goes stale after any mutating operation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoSnapshot {
    pub root: PathBuf,
    pub branch: String,
    pub detached: bool,
    /// HEAD commit, None before the first commit.
    pub head: Option<String>,
    /// Short tracking name such as `origin/main`.
    pub upstream: Option<String>,
    pub clean: bool,
    pub ahead: usize,
    pub behind: usize,
    pub diverged: bool,
    pub staged: Vec<String>,
    pub unstaged: Vec<String>,
    pub untracked: Vec<String>,
    pub conflicted: Vec<String>,
    pub remotes: Vec<RemoteInfo>,
    pub branches: Vec<String>,
    pub taken_at: DateTime<Utc>,
}

/// Read branch, tracking and status information from an open repository.
pub fn take_snapshot(repo: &Repository, default_remote: &str) -> Result<RepoSnapshot, RepoError> {
    let root = repo.workdir().ok_or(RepoError::BareRepository)?.to_path_buf();
    let (branch, detached) = current_branch(repo)?;
    let head = repo.head().ok().and_then(|h| h.target()).map(|oid| oid.to_string());

    let status = collect_status(repo)?;

    // Unborn and detached heads have nothing to compare.
    let divergence = match branch_tip(repo, &branch)? {
        Some(local) if !detached => {
            let tracking = tracking_ref(repo, &branch, default_remote);
            divergence_against(repo, local, tracking)?
        }
        _ => Divergence::default(),
    };

    let clean = status.staged.is_empty()
        && status.unstaged.is_empty()
        && status.untracked.is_empty()
        && status.conflicted.is_empty();

    let snapshot = RepoSnapshot {
        root,
        branch,
        detached,
        head,
        upstream: divergence
            .tracking_ref
            .as_deref()
            .map(|r| r.strip_prefix("refs/remotes/").unwrap_or(r).to_string()),
        clean,
        ahead: divergence.ahead,
        behind: divergence.behind,
        diverged: divergence.diverged(),
        staged: status.staged,
        unstaged: status.unstaged,
        untracked: status.untracked,
        conflicted: status.conflicted,
        remotes: list_remotes(repo)?,
        branches: list_branches(repo)?,
        taken_at: Utc::now(),
    };

    debug!(
        branch = %snapshot.branch,
        clean = snapshot.clean,
        ahead = snapshot.ahead,
        behind = snapshot.behind,
        "Took repository snapshot"
    );
    Ok(snapshot)
}

/// Ahead/behind counts of `branch` against `refs/remotes/<remote>/<branch>`.
///
/// Falls back to the configured upstream when the remote ref is missing. With
/// no tracking ref at all every local commit counts as ahead.
pub fn divergence(repo: &Repository, remote: &str, branch: &str) -> Result<Divergence, RepoError> {
    let local = branch_tip(repo, branch)?.ok_or_else(|| RepoError::BranchNotFound {
        branch: branch.to_string(),
    })?;
    let tracking = tracking_ref(repo, branch, remote);
    divergence_against(repo, local, tracking)
}

/// Commit a local branch points at, None when the branch does not exist.
fn branch_tip(repo: &Repository, branch: &str) -> Result<Option<Oid>, RepoError> {
    match repo.refname_to_id(&format!("refs/heads/{branch}")) {
        Ok(oid) => Ok(Some(oid)),
        Err(e) if e.code() == ErrorCode::NotFound => Ok(None),
        Err(e) => Err(RepoError::StatusFailed(e)),
    }
}

fn divergence_against(
    repo: &Repository,
    local: Oid,
    tracking: Option<String>,
) -> Result<Divergence, RepoError> {

    let Some(tracking) = tracking else {
        return Ok(Divergence {
            ahead: count_commits(repo, local)?,
            behind: 0,
            tracking_ref: None,
        });
    };

    let upstream = repo
        .refname_to_id(&tracking)
        .map_err(RepoError::StatusFailed)?;
    let (ahead, behind) = repo
        .graph_ahead_behind(local, upstream)
        .map_err(RepoError::StatusFailed)?;
    Ok(Divergence {
        ahead,
        behind,
        tracking_ref: Some(tracking),
    })
}

/// Configured upstream of the branch, else the same-named branch on `remote`.
fn tracking_ref(repo: &Repository, branch: &str, remote: &str) -> Option<String> {
    let candidate = format!("refs/remotes/{remote}/{branch}");
    if repo.find_reference(&candidate).is_ok() {
        return Some(candidate);
    }
    let configured = repo
        .branch_upstream_name(&format!("refs/heads/{branch}"))
        .ok()?;
    let name = configured.as_str()?.to_string();
    repo.find_reference(&name).is_ok().then_some(name)
}

fn count_commits(repo: &Repository, from: Oid) -> Result<usize, RepoError> {
    let mut revwalk = repo.revwalk().map_err(RepoError::RevwalkError)?;
    revwalk.set_sorting(Sort::NONE).map_err(RepoError::RevwalkError)?;
    revwalk.push(from).map_err(RepoError::RevwalkError)?;
    Ok(revwalk.filter(Result::is_ok).count())
}

/// Current branch name and whether HEAD is detached.
fn current_branch(repo: &Repository) -> Result<(String, bool), RepoError> {
    match repo.head() {
        Ok(head) if head.is_branch() => Ok((head.shorthand().unwrap_or("HEAD").to_string(), false)),
        Ok(_) => Ok(("HEAD".to_string(), true)),
        Err(e) if e.code() == ErrorCode::UnbornBranch || e.code() == ErrorCode::NotFound => {
            // Unborn branch: HEAD still names it symbolically.
            let name = repo
                .find_reference("HEAD")
                .ok()
                .and_then(|r| {
                    r.symbolic_target()
                        .map(|t| t.strip_prefix("refs/heads/").unwrap_or(t).to_string())
                })
                .unwrap_or_else(|| "HEAD".to_string());
            Ok((name, false))
        }
        Err(e) => Err(RepoError::StatusFailed(e)),
    }
}

#[derive(Default)]
struct StatusLists {
    staged: Vec<String>,
    unstaged: Vec<String>,
    untracked: Vec<String>,
    conflicted: Vec<String>,
}

fn collect_status(repo: &Repository) -> Result<StatusLists, RepoError> {
    let mut opts = StatusOptions::new();
    opts.include_untracked(true)
        .recurse_untracked_dirs(true)
        .include_ignored(false);
    let statuses = repo.statuses(Some(&mut opts)).map_err(RepoError::StatusFailed)?;

    let staged_mask = Status::INDEX_NEW
        | Status::INDEX_MODIFIED
        | Status::INDEX_DELETED
        | Status::INDEX_RENAMED
        | Status::INDEX_TYPECHANGE;
    let unstaged_mask =
        Status::WT_MODIFIED | Status::WT_DELETED | Status::WT_RENAMED | Status::WT_TYPECHANGE;

    let mut lists = StatusLists::default();
    for entry in statuses.iter() {
        let Some(path) = entry.path() else {
            continue;
        };
        let status = entry.status();
        if status.is_conflicted() {
            lists.conflicted.push(path.to_string());
            continue;
        }
        if status.intersects(staged_mask) {
            lists.staged.push(path.to_string());
        }
        if status.intersects(unstaged_mask) {
            lists.unstaged.push(path.to_string());
        }
        if status.contains(Status::WT_NEW) {
            lists.untracked.push(path.to_string());
        }
    }

    lists.staged.sort();
    lists.unstaged.sort();
    lists.untracked.sort();
    lists.conflicted.sort();
    Ok(lists)
}

/// Paths currently in a conflicted state.
pub fn conflicted_paths(repo: &Repository) -> Result<Vec<String>, RepoError> {
    Ok(collect_status(repo)?.conflicted)
}

fn list_remotes(repo: &Repository) -> Result<Vec<RemoteInfo>, RepoError> {
    let names = repo.remotes().map_err(RepoError::StatusFailed)?;
    let mut remotes = Vec::new();
    for name in names.iter().flatten() {
        let remote = repo.find_remote(name).map_err(RepoError::StatusFailed)?;
        remotes.push(RemoteInfo {
            name: name.to_string(),
            fetch_url: remote.url().map(String::from),
            push_url: remote.pushurl().or(remote.url()).map(String::from),
        });
    }
    remotes.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(remotes)
}

fn list_branches(repo: &Repository) -> Result<Vec<String>, RepoError> {
    let mut branches = Vec::new();
    for item in repo
        .branches(Some(BranchType::Local))
        .map_err(RepoError::StatusFailed)?
    {
        let (branch, _) = item.map_err(RepoError::StatusFailed)?;
        if let Some(name) = branch.name().map_err(RepoError::StatusFailed)? {
            branches.push(name.to_string());
        }
    }
    branches.sort();
    Ok(branches)
}

#[cfg(test)]
mod tests {
    use super::*;
    use git2::Signature;

    fn commit_file(repo: &Repository, name: &str, content: &str) -> Oid {
        let workdir = repo.workdir().unwrap();
        std::fs::write(workdir.join(name), content).unwrap();
        let mut index = repo.index().unwrap();
        index.add_path(std::path::Path::new(name)).unwrap();
        index.write().unwrap();
        let tree = repo.find_tree(index.write_tree().unwrap()).unwrap();
        let sig = Signature::now("Test", "test@example.com").unwrap();
        let parent = repo.head().ok().and_then(|h| h.peel_to_commit().ok());
        let parents: Vec<&git2::Commit> = parent.iter().collect();
        repo.commit(Some("HEAD"), &sig, &sig, "commit", &tree, &parents)
            .unwrap()
    }

    #[test]
    fn test_unborn_branch_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        std::fs::write(dir.path().join("new.txt"), "x").unwrap();

        let snap = take_snapshot(&repo, "origin").unwrap();
        assert!(!snap.detached);
        assert!(snap.head.is_none());
        assert!(!snap.clean);
        assert_eq!(snap.untracked, vec!["new.txt".to_string()]);
        assert_eq!((snap.ahead, snap.behind), (0, 0));
        assert!(snap.upstream.is_none());
    }

    #[test]
    fn test_no_upstream_counts_all_commits_ahead() {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        commit_file(&repo, "a.txt", "a");
        commit_file(&repo, "b.txt", "b");

        let snap = take_snapshot(&repo, "origin").unwrap();
        assert!(snap.clean);
        assert_eq!(snap.ahead, 2);
        assert_eq!(snap.behind, 0);
        assert!(!snap.diverged);
    }

    #[test]
    fn test_divergence_of_missing_branch_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        commit_file(&repo, "a.txt", "a");

        let err = divergence(&repo, "origin", "no-such-branch").unwrap_err();
        assert!(matches!(err, RepoError::BranchNotFound { ref branch } if branch == "no-such-branch"));
        let err = divergence(&repo, "origin", "HEAD").unwrap_err();
        assert!(matches!(err, RepoError::BranchNotFound { .. }));
    }

    #[test]
    fn test_staged_and_unstaged_lists() {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        commit_file(&repo, "a.txt", "a");

        std::fs::write(dir.path().join("a.txt"), "changed").unwrap();
        std::fs::write(dir.path().join("b.txt"), "new").unwrap();
        let mut index = repo.index().unwrap();
        index.add_path(std::path::Path::new("b.txt")).unwrap();
        index.write().unwrap();

        let snap = take_snapshot(&repo, "origin").unwrap();
        assert_eq!(snap.staged, vec!["b.txt".to_string()]);
        assert_eq!(snap.unstaged, vec!["a.txt".to_string()]);
        assert!(snap.untracked.is_empty());
    }

    #[test]
    fn test_diverged_against_remote_ref() {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        let base = commit_file(&repo, "a.txt", "a");
        commit_file(&repo, "b.txt", "b");

        // A remote-only commit on top of the shared base.
        let sig = Signature::now("Other", "other@example.com").unwrap();
        let base_commit = repo.find_commit(base).unwrap();
        let remote_tip = repo
            .commit(None, &sig, &sig, "remote", &base_commit.tree().unwrap(), &[&base_commit])
            .unwrap();
        let branch = repo.head().unwrap().shorthand().unwrap().to_string();
        repo.reference(&format!("refs/remotes/origin/{branch}"), remote_tip, true, "test")
            .unwrap();

        let div = divergence(&repo, "origin", &branch).unwrap();
        assert_eq!((div.ahead, div.behind), (1, 1));
        assert!(div.diverged());

        let snap = take_snapshot(&repo, "origin").unwrap();
        assert!(snap.diverged);
        assert_eq!(snap.upstream.as_deref(), Some(format!("origin/{branch}").as_str()));
    }
}
