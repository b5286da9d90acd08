//! ferry - change intelligence for git working trees.
//!
//! # Overview
//!
//! ferry inspects a working tree, classifies each changed file into a
//! conventional-commit category, screens the change set for leaked
//! credentials, synthesizes a commit message and changelog, and drives a
//! push with retry, protected-branch policy and divergence detection.
//!
//! [`pipeline::Pipeline`] exposes one operation per stage over a
//! [`git::VcsProvider`].

pub mod changelog;
pub mod classify;
pub mod commit;
pub mod config;
pub mod error;
pub mod git;
pub mod pipeline;
pub mod push;
pub mod security;
pub mod version;

// Re-export commonly used types
pub use changelog::{ChangelogEntry, ChangelogFormat, ChangelogStyle};
pub use classify::{ChangeSummary, SemanticCategory};
pub use commit::{CommitPlan, CommitStyle};
pub use config::Config;
pub use error::{
    ChangelogError, ConfigError, ErrorReport, PipelineError, PlanError, RemoteFailure, RepoError,
};
pub use git::{FileChange, Git2Provider, RepoSnapshot, VcsProvider};
pub use pipeline::{ChangeAnalysis, CommitOutcome, Pipeline, PlanOutcome, RepoLocks};
pub use push::{PushAttempt, PushOrchestrator, PushPolicy, PushReport, PushState};
pub use security::{ScanReport, SecurityFinding, SecurityScanner, Severity};
pub use version::BumpType;
