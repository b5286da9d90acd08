//! Operations exposed to callers, one per pipeline stage.
//!
//! Every operation validates the repository path first. Read-only stages
//! (status, analysis, scanning, planning, changelog building) run without
//! locking; anything that mutates the repository holds the per-repository
//! lock from [`RepoLocks`] for its whole duration.

pub mod lock;

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use chrono::Utc;
use semver::Version;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::changelog::{self, ChangelogEntry, ChangelogFormat, ChangelogStyle};
use crate::classify::{ChangeSummary, ClassifierRules, classify, summarize};
use crate::commit::{CommitPlan, CommitStyle, synthesize};
use crate::config::Config;
use crate::error::{ChangelogError, ConfigError, PipelineError, PlanError, RepoError};
use crate::git::{
    Author, FileChange, LogEntry, PullReceipt, PullStrategy, PushRequest, RepoSnapshot,
    VcsProvider, validate_repo_path,
};
use crate::push::{PushOrchestrator, PushPolicy, PushReport};
use crate::security::{ScanReport, SecurityScanner};

pub use lock::RepoLocks;

/// File name the changelog writer targets inside a repository.
pub const CHANGELOG_FILE: &str = "CHANGELOG.md";

/// Classified changes plus aggregate statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeAnalysis {
    pub changes: Vec<FileChange>,
    pub summary: ChangeSummary,
}

/// Result of planning a commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PlanOutcome {
    Planned { plan: CommitPlan },
    /// The working tree has no changes. Not an error.
    NothingToCommit,
}

/// Result of creating a commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CommitOutcome {
    Committed { hash: String, plan: CommitPlan },
    NothingToCommit,
}

pub struct Pipeline<P: VcsProvider> {
    provider: P,
    config: Config,
    scanner: SecurityScanner,
    rules: ClassifierRules,
    push_policy: PushPolicy,
    locks: RepoLocks,
}

impl<P: VcsProvider> Pipeline<P> {
    /// Compile every pattern table up front so bad config fails at startup.
    pub fn new(provider: P, config: Config) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            scanner: SecurityScanner::new(&config.scanner)?,
            rules: ClassifierRules::new(&config.classifier)?,
            push_policy: PushPolicy::from_config(&config.push)?,
            locks: RepoLocks::new(),
            provider,
            config,
        })
    }

    /// Share locks with other pipelines working on the same repositories.
    pub fn with_locks(mut self, locks: RepoLocks) -> Self {
        self.locks = locks;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn locks(&self) -> &RepoLocks {
        &self.locks
    }

    fn resolve(&self, path: &Path) -> Result<PathBuf, RepoError> {
        validate_repo_path(path, self.config.general.workspace_root.as_deref())
    }

    /// Fresh snapshot of branch, tracking and status.
    pub fn scan_repository(&self, path: &Path) -> Result<RepoSnapshot, PipelineError> {
        let repo = self.resolve(path)?;
        Ok(self.provider.status(&repo)?)
    }

    /// Classify every pending change.
    pub fn analyze_changes(&self, path: &Path) -> Result<ChangeAnalysis, PipelineError> {
        let repo = self.resolve(path)?;
        let changes = classify(&self.provider.diff_stats(&repo)?, &self.rules);
        let summary = summarize(&changes);
        debug!(files = summary.files, primary = ?summary.primary, "Analyzed changes");
        Ok(ChangeAnalysis { changes, summary })
    }

    /// Screen pending changes for secrets and blocked files.
    pub fn security_scan(&self, path: &Path) -> Result<ScanReport, PipelineError> {
        let repo = self.resolve(path)?;
        let report = self.scanner.scan(&self.provider.diff_stats(&repo)?);
        if report.blocking {
            warn!(findings = report.findings.len(), "Security scan found blocking issues");
        }
        Ok(report)
    }

    /// Plan a commit for the pending changes.
    ///
    /// Fails with `BlockedBySecurity` on any high or critical finding. An
    /// unchanged tree is [`PlanOutcome::NothingToCommit`].
    pub fn plan_commit(
        &self,
        path: &Path,
        style: Option<CommitStyle>,
    ) -> Result<PlanOutcome, PipelineError> {
        let repo = self.resolve(path)?;
        let changes = self.provider.diff_stats(&repo)?;
        let style = style.unwrap_or(self.config.general.commit_style);

        match self.plan_from_changes(&changes, style) {
            Ok(mut plan) => {
                plan.head = self.provider.status(&repo)?.head;
                Ok(PlanOutcome::Planned { plan })
            }
            Err(PlanError::NoChangesToCommit) => Ok(PlanOutcome::NothingToCommit),
            Err(e) => Err(e.into()),
        }
    }

    /// Scan and classify concurrently, then synthesize.
    fn plan_from_changes(
        &self,
        changes: &[FileChange],
        style: CommitStyle,
    ) -> Result<CommitPlan, PlanError> {
        if changes.is_empty() {
            return Err(PlanError::NoChangesToCommit);
        }

        let (report, classified) = std::thread::scope(|s| {
            let scan = s.spawn(|| self.scanner.scan(changes));
            let classified = classify(changes, &self.rules);
            let report = scan
                .join()
                .unwrap_or_else(|panic| std::panic::resume_unwind(panic));
            (report, classified)
        });

        let mut plan = synthesize(&classified, &report.findings, style, &self.config.commit)?;
        if !report.skipped.is_empty() {
            warn!(files = report.skipped.len(), "Some files were not scanned for secrets");
        }
        plan.unscanned = report.skipped;
        Ok(plan)
    }

    /// Changelog for the pending changes, with a next-version hint from the
    /// latest release tag reachable from HEAD.
    pub fn build_changelog(
        &self,
        path: &Path,
        format: ChangelogFormat,
        style: ChangelogStyle,
    ) -> Result<ChangelogEntry, PipelineError> {
        let repo = self.resolve(path)?;
        let classified = classify(&self.provider.diff_stats(&repo)?, &self.rules);
        let previous = self.provider.latest_release(&repo)?.map(|tag| tag.version);
        Ok(changelog::build_with_version(
            &classified,
            format,
            style,
            previous.as_ref(),
        ))
    }

    /// Insert `entry` into the repository's CHANGELOG.md under `version`, or
    /// under the entry's next-version hint when none is given.
    pub async fn write_changelog(
        &self,
        path: &Path,
        entry: &ChangelogEntry,
        version: Option<&Version>,
    ) -> Result<PathBuf, PipelineError> {
        let repo = self.resolve(path)?;
        let version = version
            .or(entry.next_version.as_ref())
            .ok_or(ChangelogError::MissingVersion)?;
        let _guard = self.locks.acquire(&repo).await;

        let target = repo.join(CHANGELOG_FILE);
        let date = Utc::now().format("%Y-%m-%d").to_string();
        changelog::write_changelog(&target, entry, version, &date)?;
        Ok(target)
    }

    /// Push with protected-branch guard, divergence checks and retry.
    ///
    /// A failed session is still `Ok`: the report carries the terminal
    /// state and every attempt, and [`PushReport::error`] gives the error.
    pub async fn execute_push(
        &self,
        path: &Path,
        remote: Option<&str>,
        branch: Option<&str>,
        force: bool,
    ) -> Result<PushReport, PipelineError> {
        let repo = self.resolve(path)?;
        let _guard = self.locks.acquire(&repo).await;

        let remote = remote.unwrap_or(&self.config.general.default_remote);
        let (branch, set_upstream) = match branch {
            Some(branch) => (branch.to_string(), false),
            None => {
                let snapshot = self.provider.status(&repo)?;
                if snapshot.detached {
                    return Err(RepoError::DetachedHead.into());
                }
                let set_upstream = snapshot.upstream.is_none();
                (snapshot.branch, set_upstream)
            }
        };

        let request = PushRequest {
            remote: remote.to_string(),
            branch,
            force,
            set_upstream,
        };
        Ok(PushOrchestrator::new(&self.provider, &self.push_policy)
            .execute(&repo, request)
            .await)
    }

    /// Stage and commit the pending changes with a synthesized message.
    ///
    /// The scan runs again here, immediately before staging; a blocking
    /// finding aborts with nothing staged. If the tree changes between the
    /// scan and staging, the commit is abandoned with the index left staged.
    pub async fn commit_changes(
        &self,
        path: &Path,
        style: Option<CommitStyle>,
    ) -> Result<CommitOutcome, PipelineError> {
        let repo = self.resolve(path)?;
        let _guard = self.locks.acquire(&repo).await;

        let changes = self.provider.diff_stats(&repo)?;
        let style = style.unwrap_or(self.config.general.commit_style);
        let mut plan = match self.plan_from_changes(&changes, style) {
            Ok(plan) => plan,
            Err(PlanError::NoChangesToCommit) => return Ok(CommitOutcome::NothingToCommit),
            Err(e) => return Err(e.into()),
        };

        let author = self.author(&repo)?;
        self.provider.stage(&repo, &plan.files)?;
        let files = changed_since_scan(&changes, &self.provider.diff_stats(&repo)?);
        if !files.is_empty() {
            warn!(?files, "Working tree changed after the security scan");
            return Err(RepoError::ChangedSinceScan { files }.into());
        }
        let receipt = self.provider.commit(&repo, &plan.message(), &author)?;
        plan.head = Some(receipt.hash.clone());

        info!(hash = %receipt.hash, files = receipt.files, subject = %plan.subject, "Created commit");
        Ok(CommitOutcome::Committed {
            hash: receipt.hash,
            plan,
        })
    }

    /// Pull with merge or rebase. Conflicts come back as `MergeConflict`.
    pub async fn pull_changes(
        &self,
        path: &Path,
        remote: Option<&str>,
        branch: Option<&str>,
        strategy: PullStrategy,
    ) -> Result<PullReceipt, PipelineError> {
        let repo = self.resolve(path)?;
        let _guard = self.locks.acquire(&repo).await;

        let remote = remote.unwrap_or(&self.config.general.default_remote);
        let branch = match branch {
            Some(branch) => branch.to_string(),
            None => {
                let snapshot = self.provider.status(&repo)?;
                if snapshot.detached {
                    return Err(RepoError::DetachedHead.into());
                }
                snapshot.branch
            }
        };
        Ok(self.provider.pull(&repo, remote, &branch, strategy).await?)
    }

    /// Most recent commits, newest first.
    pub fn history(&self, path: &Path, limit: usize) -> Result<Vec<LogEntry>, PipelineError> {
        let repo = self.resolve(path)?;
        Ok(self.provider.log(&repo, limit)?)
    }

    fn author(&self, repo: &Path) -> Result<Author, RepoError> {
        match &self.config.author {
            Some(author) => Ok(author.clone()),
            None => self.provider.default_author(repo),
        }
    }
}

/// Paths whose content differs between the scanned and the current diff.
fn changed_since_scan(scanned: &[FileChange], current: &[FileChange]) -> Vec<String> {
    fn content(changes: &[FileChange]) -> BTreeMap<&str, (u64, Vec<&str>)> {
        changes
            .iter()
            .map(|c| {
                let added = c.added_lines().map(|l| l.content.as_str()).collect();
                (c.path.as_str(), (c.size_bytes, added))
            })
            .collect()
    }

    let before = content(scanned);
    let after = content(current);
    let paths: BTreeSet<&str> = before.keys().chain(after.keys()).copied().collect();
    paths
        .into_iter()
        .filter(|p| before.get(p) != after.get(p))
        .map(str::to_string)
        .collect()
}
