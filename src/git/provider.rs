//! The version-control seam. Everything that reads or mutates a repository
//! goes through [`VcsProvider`], so tests can substitute a fake or a mock.

use std::path::Path;

use async_trait::async_trait;
use git2::{IndexAddOption, Repository, Signature};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::RepoError;
use crate::git::diff::{FileChange, collect_changes};
use crate::git::executor::{self, PullReceipt, PullStrategy, PushReceipt, PushRequest};
use crate::git::log::{LogEntry, read_log};
use crate::git::path::open_repository;
use crate::git::snapshot::{self, Divergence, RepoSnapshot, take_snapshot};
use crate::git::tags::{ReleaseTag, latest_reachable_release};

/// Commit author identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Author {
    pub name: String,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitReceipt {
    pub hash: String,
    pub files: usize,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VcsProvider: Send + Sync {
    /// Snapshot of branch, tracking and status information.
    fn status(&self, repo: &Path) -> Result<RepoSnapshot, RepoError>;

    /// Ahead/behind counts of `branch` against `remote`. Fails with
    /// `BranchNotFound` when `branch` does not exist locally.
    fn divergence(&self, repo: &Path, remote: &str, branch: &str) -> Result<Divergence, RepoError>;

    /// Every pending change against HEAD, with hunks.
    fn diff_stats(&self, repo: &Path) -> Result<Vec<FileChange>, RepoError>;

    /// Stage exactly these paths (deleted paths are removed from the index).
    fn stage(&self, repo: &Path, paths: &[String]) -> Result<(), RepoError>;

    /// Commit the index on HEAD.
    fn commit(&self, repo: &Path, message: &str, author: &Author) -> Result<CommitReceipt, RepoError>;

    /// Identity from git config (user.name / user.email).
    fn default_author(&self, repo: &Path) -> Result<Author, RepoError>;

    async fn push(&self, repo: &Path, request: &PushRequest) -> Result<PushReceipt, RepoError>;

    async fn pull(
        &self,
        repo: &Path,
        remote: &str,
        branch: &str,
        strategy: PullStrategy,
    ) -> Result<PullReceipt, RepoError>;

    fn log(&self, repo: &Path, limit: usize) -> Result<Vec<LogEntry>, RepoError>;

    fn latest_release(&self, repo: &Path) -> Result<Option<ReleaseTag>, RepoError>;
}

/// Provider backed by libgit2 for local operations and the git binary for
/// network operations.
#[derive(Debug, Clone)]
pub struct Git2Provider {
    default_remote: String,
}

impl Git2Provider {
    pub fn new(default_remote: impl Into<String>) -> Self {
        Self {
            default_remote: default_remote.into(),
        }
    }
}

impl Default for Git2Provider {
    fn default() -> Self {
        Self::new("origin")
    }
}

#[async_trait]
impl VcsProvider for Git2Provider {
    fn status(&self, repo: &Path) -> Result<RepoSnapshot, RepoError> {
        take_snapshot(&open_repository(repo)?, &self.default_remote)
    }

    fn divergence(&self, repo: &Path, remote: &str, branch: &str) -> Result<Divergence, RepoError> {
        snapshot::divergence(&open_repository(repo)?, remote, branch)
    }

    fn diff_stats(&self, repo: &Path) -> Result<Vec<FileChange>, RepoError> {
        collect_changes(&open_repository(repo)?)
    }

    fn stage(&self, repo: &Path, paths: &[String]) -> Result<(), RepoError> {
        stage_paths(&open_repository(repo)?, paths)
    }

    fn commit(&self, repo: &Path, message: &str, author: &Author) -> Result<CommitReceipt, RepoError> {
        create_commit(&open_repository(repo)?, message, author)
    }

    fn default_author(&self, repo: &Path) -> Result<Author, RepoError> {
        let repo = open_repository(repo)?;
        let sig = repo.signature().map_err(RepoError::ConfigError)?;
        Ok(Author {
            name: sig.name().unwrap_or("").to_string(),
            email: sig.email().unwrap_or("").to_string(),
        })
    }

    async fn push(&self, repo: &Path, request: &PushRequest) -> Result<PushReceipt, RepoError> {
        executor::push(repo, request).await
    }

    async fn pull(
        &self,
        repo: &Path,
        remote: &str,
        branch: &str,
        strategy: PullStrategy,
    ) -> Result<PullReceipt, RepoError> {
        executor::pull(repo, remote, branch, strategy).await
    }

    fn log(&self, repo: &Path, limit: usize) -> Result<Vec<LogEntry>, RepoError> {
        read_log(&open_repository(repo)?, limit)
    }

    fn latest_release(&self, repo: &Path) -> Result<Option<ReleaseTag>, RepoError> {
        latest_reachable_release(&open_repository(repo)?)
    }
}

/// Stage the given paths, like `git add -A -- <paths>`.
pub fn stage_paths(repo: &Repository, paths: &[String]) -> Result<(), RepoError> {
    let workdir = repo.workdir().ok_or(RepoError::BareRepository)?;
    let mut index = repo.index().map_err(RepoError::StagingFailed)?;

    for path in paths {
        let rel = Path::new(path);
        if workdir.join(rel).exists() {
            index.add_path(rel).map_err(RepoError::StagingFailed)?;
        } else {
            index.remove_path(rel).map_err(RepoError::StagingFailed)?;
        }
    }
    index.write().map_err(RepoError::StagingFailed)?;
    debug!(count = paths.len(), "Staged paths");
    Ok(())
}

/// Stage everything, like `git add -A`.
pub fn stage_all(repo: &Repository) -> Result<(), RepoError> {
    let mut index = repo.index().map_err(RepoError::StagingFailed)?;
    index
        .add_all(["*"].iter(), IndexAddOption::DEFAULT, None)
        .map_err(RepoError::StagingFailed)?;
    index
        .update_all(["*"].iter(), None)
        .map_err(RepoError::StagingFailed)?;
    index.write().map_err(RepoError::StagingFailed)
}

/// Write the index as a tree and commit it on HEAD. Works on an unborn branch.
pub fn create_commit(
    repo: &Repository,
    message: &str,
    author: &Author,
) -> Result<CommitReceipt, RepoError> {
    let mut index = repo.index().map_err(RepoError::StagingFailed)?;
    let tree_id = index.write_tree().map_err(RepoError::StagingFailed)?;
    let tree = repo.find_tree(tree_id).map_err(RepoError::CommitFailed)?;

    let sig = Signature::now(&author.name, &author.email).map_err(RepoError::ConfigError)?;
    let parent = match repo.head() {
        Ok(head) => Some(head.peel_to_commit().map_err(RepoError::CommitFailed)?),
        Err(_) => None,
    };
    let parents: Vec<&git2::Commit> = parent.iter().collect();

    let files = match &parent {
        Some(p) => {
            let parent_tree = p.tree().map_err(RepoError::CommitFailed)?;
            repo.diff_tree_to_tree(Some(&parent_tree), Some(&tree), None)
                .map_err(RepoError::CommitFailed)?
                .deltas()
                .len()
        }
        None => index.len(),
    };

    let oid = repo
        .commit(Some("HEAD"), &sig, &sig, message, &tree, &parents)
        .map_err(RepoError::CommitFailed)?;
    debug!(hash = %oid, files, "Created commit");

    Ok(CommitReceipt {
        hash: oid.to_string(),
        files,
    })
}
