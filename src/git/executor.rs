//! Remote operations (push and pull) through the system `git` binary.
//!
//! Shelling out inherits the user's git config, SSH agent and credential
//! store, which libgit2 does not.

use std::path::Path;
use std::process::Stdio;

use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::debug;

use crate::error::{RemoteFailure, RepoError};
use crate::git::diff::resolve_head_tree;
use crate::git::path::open_repository;
use crate::git::snapshot::conflicted_paths;

/// Parameters for a single push.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushRequest {
    pub remote: String,
    pub branch: String,
    pub force: bool,
    pub set_upstream: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushReceipt {
    /// Porcelain output from git, kept for diagnostics.
    pub output: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PullStrategy {
    #[default]
    Merge,
    Rebase,
}

impl std::str::FromStr for PullStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "merge" => Ok(Self::Merge),
            "rebase" => Ok(Self::Rebase),
            _ => Err(format!("Unknown pull strategy: {s} (expected merge or rebase)")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullReceipt {
    pub strategy: PullStrategy,
    pub files_updated: usize,
    pub head: Option<String>,
}

struct GitOutput {
    success: bool,
    stdout: String,
    stderr: String,
}

impl GitOutput {
    fn combined(&self) -> String {
        format!("{}\n{}", self.stdout.trim(), self.stderr.trim())
            .trim()
            .to_string()
    }
}

fn ensure_git_installed() -> Result<(), RepoError> {
    which::which("git")
        .map(|_| ())
        .map_err(|_| RepoError::GitNotInstalled)
}

/// Run git in `repo` and capture its output. Never prompts for credentials.
async fn run_git(repo: &Path, args: &[&str], operation: &str) -> Result<GitOutput, RepoError> {
    ensure_git_installed()?;
    debug!(operation, ?args, "Running git");
    let output = Command::new("git")
        .args(args)
        .current_dir(repo)
        .env("GIT_TERMINAL_PROMPT", "0")
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|source| RepoError::SpawnFailed {
            operation: operation.to_string(),
            source,
        })?;

    Ok(GitOutput {
        success: output.status.success(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}

/// Push one branch. Force pushes use `--force-with-lease`.
pub async fn push(repo: &Path, request: &PushRequest) -> Result<PushReceipt, RepoError> {
    let mut args = vec!["push", "--porcelain"];
    if request.force {
        args.push("--force-with-lease");
    }
    if request.set_upstream {
        args.push("--set-upstream");
    }
    args.push(&request.remote);
    args.push(&request.branch);

    let output = run_git(repo, &args, "push").await?;
    if output.success {
        return Ok(PushReceipt {
            output: output.stdout.trim().to_string(),
        });
    }
    Err(RepoError::Remote(classify_remote_failure(&output.combined())))
}

/// Pull `branch` from `remote`, merging or rebasing.
///
/// Conflicts leave the working tree as git left it and report the
/// conflicted paths.
pub async fn pull(
    repo_path: &Path,
    remote: &str,
    branch: &str,
    strategy: PullStrategy,
) -> Result<PullReceipt, RepoError> {
    let before = head_oid(repo_path)?;

    let mode = match strategy {
        PullStrategy::Merge => "--no-rebase",
        PullStrategy::Rebase => "--rebase",
    };
    let output = run_git(repo_path, &["pull", "--no-edit", mode, remote, branch], "pull").await?;

    if !output.success {
        let repo = open_repository(repo_path)?;
        let files = conflicted_paths(&repo)?;
        let text = output.combined();
        if !files.is_empty() || text.contains("CONFLICT") {
            return Err(RepoError::MergeConflict { files });
        }
        return Err(RepoError::Remote(classify_remote_failure(&text)));
    }

    let repo = open_repository(repo_path)?;
    let after = repo.head().ok().and_then(|h| h.target());
    let files_updated = if after == before {
        0
    } else {
        let old_tree = match before {
            Some(oid) => Some(
                repo.find_commit(oid)
                    .and_then(|c| c.tree())
                    .map_err(RepoError::DiffFailed)?,
            ),
            None => None,
        };
        let new_tree = resolve_head_tree(&repo)?;
        repo.diff_tree_to_tree(old_tree.as_ref(), new_tree.as_ref(), None)
            .map_err(RepoError::DiffFailed)?
            .deltas()
            .len()
    };

    Ok(PullReceipt {
        strategy,
        files_updated,
        head: after.map(|oid| oid.to_string()),
    })
}

fn head_oid(repo_path: &Path) -> Result<Option<git2::Oid>, RepoError> {
    let repo = open_repository(repo_path)?;
    Ok(repo.head().ok().and_then(|h| h.target()))
}

/// Sort a failed remote operation into retryable and terminal kinds by
/// inspecting git's output.
pub fn classify_remote_failure(output: &str) -> RemoteFailure {
    let lower = output.to_lowercase();
    let summary = summarize(output);

    const AUTH: &[&str] = &[
        "authentication failed",
        "permission denied",
        "could not read username",
        "could not read password",
        "invalid username or password",
        "error: 403",
        "error: 401",
    ];
    const PROTECTED: &[&str] = &["protected branch", "gh006", "pre-receive hook declined"];
    const NON_FAST_FORWARD: &[&str] = &["non-fast-forward", "fetch first", "stale info"];
    const NETWORK: &[&str] = &[
        "could not resolve host",
        "timed out",
        "connection refused",
        "connection reset",
        "the remote end hung up",
        "early eof",
        "network is unreachable",
        "unable to access",
        "ssl_error",
        "broken pipe",
    ];

    let has = |needles: &[&str]| needles.iter().any(|n| lower.contains(n));
    if has(AUTH) {
        RemoteFailure::Auth(summary)
    } else if has(PROTECTED) {
        RemoteFailure::Protected(summary)
    } else if has(NON_FAST_FORWARD) {
        RemoteFailure::NonFastForward(summary)
    } else if has(NETWORK) {
        RemoteFailure::Network(summary)
    } else {
        RemoteFailure::Rejected(summary)
    }
}

/// Last meaningful line of git output, for error messages.
fn summarize(output: &str) -> String {
    output
        .lines()
        .map(str::trim)
        .rfind(|l| !l.is_empty() && *l != "Done")
        .unwrap_or("git reported no output")
        .to_string()
}
