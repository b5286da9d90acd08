//! Error types for ferry modules using thiserror.

use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

use crate::security::SecurityFinding;

/// Failure reported by a remote operation (push or pull), classified by
/// whether retrying could help.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RemoteFailure {
    #[error("network error: {0}")]
    Network(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("remote has commits that are not present locally: {0}")]
    NonFastForward(String),

    #[error("remote refused the update to a protected branch: {0}")]
    Protected(String),

    #[error("remote rejected the update: {0}")]
    Rejected(String),
}

impl RemoteFailure {
    /// Only network-shaped failures are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, RemoteFailure::Network(_))
    }

    pub fn message(&self) -> &str {
        match self {
            RemoteFailure::Network(m)
            | RemoteFailure::Auth(m)
            | RemoteFailure::NonFastForward(m)
            | RemoteFailure::Protected(m)
            | RemoteFailure::Rejected(m) => m,
        }
    }
}

/// Errors from repository inspection and git primitives.
#[derive(Error, Debug)]
pub enum RepoError {
    #[error("Invalid repository path '{path}': {reason}")]
    PathValidation { path: String, reason: String },

    #[error("Repository path '{}' escapes the allowed root: {detail}", path.display())]
    PathEscapeDetected { path: PathBuf, detail: String },

    #[error("Not a git repository: {}", .0.display())]
    NotAVersionedDirectory(PathBuf),

    #[error("Bare repositories are not supported")]
    BareRepository,

    #[error("Branch '{branch}' does not exist locally")]
    BranchNotFound { branch: String },

    #[error("HEAD is detached; check out a branch before pushing")]
    DetachedHead,

    #[error("Failed to open repository: {0}")]
    OpenRepository(#[source] git2::Error),

    #[error("Failed to read working tree status: {0}")]
    StatusFailed(#[source] git2::Error),

    #[error("Failed to collect diff: {0}")]
    DiffFailed(#[source] git2::Error),

    #[error("Failed to stage changes: {0}")]
    StagingFailed(#[source] git2::Error),

    #[error("Failed to create commit: {0}")]
    CommitFailed(#[source] git2::Error),

    #[error("Git config error (missing user.name or user.email): {0}")]
    ConfigError(#[source] git2::Error),

    #[error("Failed to walk commit history: {0}")]
    RevwalkError(#[source] git2::Error),

    #[error("git executable not found in PATH")]
    GitNotInstalled,

    #[error("Failed to run git {operation}: {source}")]
    SpawnFailed {
        operation: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Working tree changed after the security scan: {}", .files.join(", "))]
    ChangedSinceScan { files: Vec<String> },

    #[error("Merge conflict in {} file(s): {}", .files.len(), .files.join(", "))]
    MergeConflict { files: Vec<String> },

    #[error("{0}")]
    Remote(#[from] RemoteFailure),
}

/// Errors from loading and validating configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config {}: {source}", path.display())]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config {}: {source}", path.display())]
    ParseFailed {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid regex for pattern '{name}': {source}")]
    InvalidPattern {
        name: String,
        #[source]
        source: regex_lite::Error,
    },

    #[error("Invalid glob '{pattern}': {source}")]
    InvalidGlob {
        pattern: String,
        #[source]
        source: globset::Error,
    },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

/// Errors from commit planning.
#[derive(Error, Debug)]
pub enum PlanError {
    #[error(
        "Commit blocked by {} high/critical security finding(s)",
        .findings.iter().filter(|f| f.severity.is_blocking()).count()
    )]
    BlockedBySecurity { findings: Vec<SecurityFinding> },

    #[error("No changes to commit (working tree is clean)")]
    NoChangesToCommit,
}

/// Errors from changelog operations.
#[derive(Error, Debug)]
pub enum ChangelogError {
    #[error("Failed to read changelog: {0}")]
    ReadFailed(#[source] std::io::Error),

    #[error("Failed to write changelog: {0}")]
    WriteFailed(#[source] std::io::Error),

    #[error("Failed to parse changelog: {0}")]
    ParseFailed(String),

    #[error("Failed to create backup: {0}")]
    BackupFailed(#[source] std::io::Error),

    #[error("Version {0} already exists in changelog")]
    VersionAlreadyExists(String),

    #[error("No version to write: tag the repository or pass an explicit version")]
    MissingVersion,
}

/// Top-level error surfaced by pipeline operations.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Repo(#[from] RepoError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Plan(#[from] PlanError),

    #[error(transparent)]
    Changelog(#[from] ChangelogError),

    #[error("Force push to protected branch '{branch}' is blocked")]
    ForcePushBlocked { branch: String },

    #[error("Branch '{branch}' has diverged from its remote (ahead {ahead}, behind {behind})")]
    BranchDiverged {
        branch: String,
        ahead: usize,
        behind: usize,
    },

    #[error("Push rejected by remote: {0}")]
    RemoteRejected(String),

    #[error("Remote authentication failed: {0}")]
    RemoteAuthError(String),

    #[error("Transient network error: {0}")]
    TransientNetworkError(String),

    #[error("Push failed after {attempts} attempt(s): {last_error}")]
    RetryBudgetExhausted { attempts: u32, last_error: String },

    #[error("Push session exceeded its {deadline_ms}ms deadline")]
    Timeout { deadline_ms: u64 },
}

impl From<RemoteFailure> for PipelineError {
    fn from(failure: RemoteFailure) -> Self {
        match failure {
            RemoteFailure::Network(m) => PipelineError::TransientNetworkError(m),
            RemoteFailure::Auth(m) => PipelineError::RemoteAuthError(m),
            RemoteFailure::NonFastForward(m)
            | RemoteFailure::Protected(m)
            | RemoteFailure::Rejected(m) => PipelineError::RemoteRejected(m),
        }
    }
}

impl PipelineError {
    /// Stable machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            PipelineError::Repo(e) => match e {
                RepoError::PathValidation { .. } | RepoError::PathEscapeDetected { .. } => {
                    "PATH_VALIDATION_ERROR"
                }
                RepoError::NotAVersionedDirectory(_) | RepoError::BareRepository => {
                    "NOT_A_VERSIONED_DIRECTORY"
                }
                RepoError::MergeConflict { .. } => "MERGE_CONFLICT",
                RepoError::BranchNotFound { .. } | RepoError::DetachedHead => "BRANCH_NOT_FOUND",
                RepoError::Remote(RemoteFailure::Network(_)) => "TRANSIENT_NETWORK_ERROR",
                RepoError::Remote(RemoteFailure::Auth(_)) => "REMOTE_AUTH_ERROR",
                RepoError::Remote(_) => "REMOTE_REJECTED",
                _ => "GIT_ERROR",
            },
            PipelineError::Config(_) => "CONFIG_ERROR",
            PipelineError::Plan(PlanError::BlockedBySecurity { .. }) => "BLOCKED_BY_SECURITY",
            PipelineError::Plan(PlanError::NoChangesToCommit) => "NO_CHANGES_TO_COMMIT",
            PipelineError::Changelog(_) => "CHANGELOG_ERROR",
            PipelineError::ForcePushBlocked { .. } => "FORCE_PUSH_BLOCKED",
            PipelineError::BranchDiverged { .. } => "BRANCH_DIVERGED",
            PipelineError::RemoteRejected(_) => "REMOTE_REJECTED",
            PipelineError::RemoteAuthError(_) => "REMOTE_AUTH_ERROR",
            PipelineError::TransientNetworkError(_) => "TRANSIENT_NETWORK_ERROR",
            PipelineError::RetryBudgetExhausted { .. } => "RETRY_BUDGET_EXHAUSTED",
            PipelineError::Timeout { .. } => "TIMEOUT",
        }
    }

    /// Human-readable next step for the caller.
    pub fn recommendation(&self) -> String {
        match self {
            PipelineError::Repo(RepoError::PathValidation { .. })
            | PipelineError::Repo(RepoError::PathEscapeDetected { .. }) => {
                "Pass an existing directory inside the configured workspace root, without '..' segments.".to_string()
            }
            PipelineError::Repo(RepoError::NotAVersionedDirectory(_))
            | PipelineError::Repo(RepoError::BareRepository) => {
                "Run against the root of a non-bare git working tree (git init or git clone first).".to_string()
            }
            PipelineError::Repo(RepoError::MergeConflict { files }) => format!(
                "Resolve the conflicts in {} and commit, or abort with 'git merge --abort' / 'git rebase --abort'.",
                files.join(", ")
            ),
            PipelineError::Repo(RepoError::BranchNotFound { branch }) => format!(
                "Check the branch name with 'git branch', or create '{branch}' and commit before pushing."
            ),
            PipelineError::Repo(RepoError::ChangedSinceScan { .. }) => {
                "Review the changed files, reset the index with 'git reset' if needed, then commit again.".to_string()
            }
            PipelineError::Repo(RepoError::DetachedHead) => {
                "Check out a branch ('git switch <branch>') or pass --branch explicitly.".to_string()
            }
            PipelineError::Repo(RepoError::GitNotInstalled) => {
                "Install git and make sure it is on PATH.".to_string()
            }
            PipelineError::Repo(RepoError::Remote(failure)) => {
                PipelineError::from(failure.clone()).recommendation()
            }
            PipelineError::Repo(_) => "Inspect the repository with 'git status' and retry.".to_string(),
            PipelineError::Config(_) => {
                "Fix the configuration entry named in the message and rerun.".to_string()
            }
            PipelineError::Plan(PlanError::BlockedBySecurity { .. }) => {
                "Remove the flagged secrets or files from the change set, rotate any exposed credentials, then plan again.".to_string()
            }
            PipelineError::Plan(PlanError::NoChangesToCommit) => {
                "Nothing to do: the working tree has no changes.".to_string()
            }
            PipelineError::Changelog(ChangelogError::VersionAlreadyExists(_)) => {
                "Choose a different version or edit the existing changelog section.".to_string()
            }
            PipelineError::Changelog(_) => "Check the changelog file path and permissions.".to_string(),
            PipelineError::ForcePushBlocked { branch } => format!(
                "Branch '{}' is protected. Push without --force, or push to a different branch.",
                branch
            ),
            PipelineError::BranchDiverged { .. } => {
                "Pull or rebase onto the remote branch, resolve any conflicts, then push again.".to_string()
            }
            PipelineError::RemoteRejected(_) => {
                "Check the remote's branch protection and hook policies.".to_string()
            }
            PipelineError::RemoteAuthError(_) => {
                "Check SSH keys or HTTPS credentials for the remote; this is not retried automatically.".to_string()
            }
            PipelineError::TransientNetworkError(_) => {
                "Check network connectivity to the remote and retry.".to_string()
            }
            PipelineError::RetryBudgetExhausted { .. } => {
                "The remote stayed unreachable; check connectivity or raise push.max_attempts.".to_string()
            }
            PipelineError::Timeout { .. } => {
                "The push session hit its deadline; retry later or raise push.deadline_secs.".to_string()
            }
        }
    }

    /// Serializable form for structured output.
    pub fn report(&self) -> ErrorReport {
        let findings = match self {
            PipelineError::Plan(PlanError::BlockedBySecurity { findings }) => findings.clone(),
            _ => Vec::new(),
        };
        ErrorReport {
            code: self.code(),
            message: self.to_string(),
            recommendation: self.recommendation(),
            findings,
        }
    }
}

/// Structured error payload returned to callers.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorReport {
    pub code: &'static str,
    pub message: String,
    pub recommendation: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub findings: Vec<SecurityFinding>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_network_failures_are_retryable() {
        assert!(RemoteFailure::Network("timeout".into()).is_retryable());
        assert!(!RemoteFailure::Auth("denied".into()).is_retryable());
        assert!(!RemoteFailure::Rejected("hook".into()).is_retryable());
        assert!(!RemoteFailure::NonFastForward("fetch first".into()).is_retryable());
        assert!(!RemoteFailure::Protected("GH006".into()).is_retryable());
    }

    #[test]
    fn test_codes_for_push_failures() {
        let err = PipelineError::ForcePushBlocked {
            branch: "main".into(),
        };
        assert_eq!(err.code(), "FORCE_PUSH_BLOCKED");
        assert!(err.recommendation().contains("main"));

        let err = PipelineError::Timeout { deadline_ms: 1000 };
        assert_eq!(err.code(), "TIMEOUT");
    }

    #[test]
    fn test_path_escape_shares_validation_code() {
        let err = PipelineError::Repo(RepoError::PathEscapeDetected {
            path: PathBuf::from("/tmp/../etc"),
            detail: "contains '..'".into(),
        });
        assert_eq!(err.code(), "PATH_VALIDATION_ERROR");
    }

    #[test]
    fn test_remote_failure_maps_to_pipeline_error() {
        let err = PipelineError::from(RemoteFailure::Auth("403".into()));
        assert_eq!(err.code(), "REMOTE_AUTH_ERROR");

        let err = PipelineError::Repo(RepoError::Remote(RemoteFailure::Network("reset".into())));
        assert_eq!(err.code(), "TRANSIENT_NETWORK_ERROR");
    }

    #[test]
    fn test_report_for_no_changes() {
        let report = PipelineError::Plan(PlanError::NoChangesToCommit).report();
        assert_eq!(report.code, "NO_CHANGES_TO_COMMIT");
        assert!(report.findings.is_empty());
    }
}
