//! Push orchestration: protected-branch guard, divergence checks and
//! retry with exponential backoff under one overall deadline.

pub mod policy;
pub mod state;

use std::path::Path;

use chrono::Utc;
use tokio::time::{Instant, sleep, timeout_at};
use tracing::{debug, info, warn};

use crate::git::{PushRequest, VcsProvider};

pub use policy::PushPolicy;
pub use state::{
    AttemptOutcome, FailureReason, PushAttempt, PushEvent, PushReport, PushState, RetrySession,
};

/// Drives a [`RetrySession`] against a provider.
pub struct PushOrchestrator<'a, P: VcsProvider + ?Sized> {
    provider: &'a P,
    policy: &'a PushPolicy,
}

impl<'a, P: VcsProvider + ?Sized> PushOrchestrator<'a, P> {
    pub fn new(provider: &'a P, policy: &'a PushPolicy) -> Self {
        Self { provider, policy }
    }

    /// Run one push session to a terminal state.
    ///
    /// Divergence is checked before the first attempt and again before each
    /// retry. The whole session, backoff waits included, is bounded by the
    /// policy deadline.
    pub async fn execute(&self, repo: &Path, request: PushRequest) -> PushReport {
        let deadline = Instant::now() + self.policy.deadline;
        let mut session = RetrySession::new(self.policy, request.clone());

        info!(
            remote = %request.remote,
            branch = %request.branch,
            force = request.force,
            "Starting push"
        );
        session.apply(PushEvent::Start);

        loop {
            let event = match session.state().clone() {
                PushState::Checking => self.check(repo, &request, deadline),
                PushState::Attempting { attempt } => {
                    if attempt > 1 {
                        let recheck = self.check(repo, &request, deadline);
                        if !matches!(
                            session.apply(recheck),
                            PushState::Attempting { .. }
                        ) {
                            continue;
                        }
                    }
                    self.attempt(repo, &request, attempt, deadline).await
                }
                PushState::Retrying { delay_ms, .. } => {
                    debug!(delay_ms, "Waiting before next push attempt");
                    let wait = sleep(std::time::Duration::from_millis(delay_ms));
                    match timeout_at(deadline, wait).await {
                        Ok(()) => PushEvent::BackoffElapsed,
                        Err(_) => PushEvent::DeadlineExpired { in_flight: None },
                    }
                }
                PushState::Idle => PushEvent::Start,
                PushState::Success { .. } | PushState::Failed { .. } => break,
            };
            session.apply(event);
        }

        let report = session.into_report();
        match &report.state {
            PushState::Success { commits_pushed } => info!(
                commits_pushed,
                attempts = report.attempts.len(),
                "Push finished"
            ),
            PushState::Failed { reason } => warn!(?reason, "Push failed"),
            _ => {}
        }
        report
    }

    fn check(&self, repo: &Path, request: &PushRequest, deadline: Instant) -> PushEvent {
        if Instant::now() >= deadline {
            return PushEvent::DeadlineExpired { in_flight: None };
        }
        match self
            .provider
            .divergence(repo, &request.remote, &request.branch)
        {
            Ok(div) => PushEvent::Checked(div),
            Err(e) => PushEvent::CheckFailed(e.to_string()),
        }
    }

    async fn attempt(
        &self,
        repo: &Path,
        request: &PushRequest,
        attempt: u32,
        deadline: Instant,
    ) -> PushEvent {
        let started_at = Utc::now();
        debug!(attempt, "Push attempt");
        match timeout_at(deadline, self.provider.push(repo, request)).await {
            Ok(result) => PushEvent::AttemptFinished { started_at, result },
            Err(_) => PushEvent::DeadlineExpired {
                in_flight: Some(started_at),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PushConfig;
    use crate::error::{RemoteFailure, RepoError};
    use crate::git::provider::MockVcsProvider;
    use crate::git::snapshot::Divergence;

    fn policy() -> PushPolicy {
        PushPolicy::from_config(&PushConfig::default()).unwrap()
    }

    fn request(branch: &str, force: bool) -> PushRequest {
        PushRequest {
            remote: "origin".to_string(),
            branch: branch.to_string(),
            force,
            set_upstream: false,
        }
    }

    fn div(ahead: usize, behind: usize) -> Divergence {
        Divergence {
            ahead,
            behind,
            tracking_ref: None,
        }
    }

    #[tokio::test]
    async fn test_protected_force_push_never_touches_provider() {
        let mut provider = MockVcsProvider::new();
        provider.expect_divergence().never();
        provider.expect_push().never();

        let policy = policy();
        let report = PushOrchestrator::new(&provider, &policy)
            .execute(Path::new("/repo"), request("main", true))
            .await;

        assert!(matches!(
            report.state,
            PushState::Failed {
                reason: FailureReason::ForcePushBlocked { .. }
            }
        ));
        assert!(report.attempts.is_empty());
        assert_eq!(report.error().unwrap().code(), "FORCE_PUSH_BLOCKED");
    }

    #[tokio::test]
    async fn test_diverged_branch_is_not_pushed() {
        let mut provider = MockVcsProvider::new();
        provider
            .expect_divergence()
            .times(1)
            .returning(|_, _, _| Ok(div(3, 2)));
        provider.expect_push().never();

        let policy = policy();
        let report = PushOrchestrator::new(&provider, &policy)
            .execute(Path::new("/repo"), request("feature", false))
            .await;

        assert_eq!(
            report.state,
            PushState::Failed {
                reason: FailureReason::BranchDiverged { ahead: 3, behind: 2 }
            }
        );
        assert!(report.attempts.is_empty());
    }

    #[tokio::test]
    async fn test_up_to_date_branch_is_noop_success() {
        let mut provider = MockVcsProvider::new();
        provider
            .expect_divergence()
            .returning(|_, _, _| Ok(div(0, 0)));
        provider.expect_push().never();

        let policy = policy();
        let report = PushOrchestrator::new(&provider, &policy)
            .execute(Path::new("/repo"), request("feature", false))
            .await;

        assert_eq!(report.state, PushState::Success { commits_pushed: 0 });
        assert!(report.attempts.is_empty());
    }

    #[tokio::test]
    async fn test_rejection_is_not_retried() {
        let mut provider = MockVcsProvider::new();
        provider
            .expect_divergence()
            .returning(|_, _, _| Ok(div(1, 0)));
        provider.expect_push().times(1).returning(|_, _| {
            Err(RepoError::Remote(RemoteFailure::Protected(
                "GH006: Protected branch update failed".to_string(),
            )))
        });

        let policy = policy();
        let report = PushOrchestrator::new(&provider, &policy)
            .execute(Path::new("/repo"), request("feature", false))
            .await;

        assert_eq!(report.attempts.len(), 1);
        assert_eq!(report.attempts[0].outcome, AttemptOutcome::ProtectedBlocked);
        assert_eq!(report.error().unwrap().code(), "REMOTE_REJECTED");
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_recheck_divergence() {
        let mut provider = MockVcsProvider::new();
        let mut seq = mockall::Sequence::new();
        provider
            .expect_divergence()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| Ok(div(2, 0)));
        provider
            .expect_push()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| {
                Err(RepoError::Remote(RemoteFailure::Network(
                    "Connection timed out".to_string(),
                )))
            });
        // The first push landed after all.
        provider
            .expect_divergence()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| Ok(div(0, 0)));

        let policy = policy();
        let report = PushOrchestrator::new(&provider, &policy)
            .execute(Path::new("/repo"), request("feature", false))
            .await;

        assert_eq!(report.state, PushState::Success { commits_pushed: 2 });
        assert_eq!(report.attempts.len(), 1);
        assert_eq!(report.attempts[0].backoff_ms, Some(2_000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_session_deadline_bounds_backoff() {
        let mut provider = MockVcsProvider::new();
        provider
            .expect_divergence()
            .returning(|_, _, _| Ok(div(1, 0)));
        provider.expect_push().returning(|_, _| {
            Err(RepoError::Remote(RemoteFailure::Network(
                "Could not resolve host".to_string(),
            )))
        });

        let config = PushConfig {
            max_attempts: 10,
            base_delay_ms: 2_000,
            deadline_secs: 5,
            ..PushConfig::default()
        };
        let policy = PushPolicy::from_config(&config).unwrap();
        let report = PushOrchestrator::new(&provider, &policy)
            .execute(Path::new("/repo"), request("feature", false))
            .await;

        assert_eq!(
            report.state,
            PushState::Failed {
                reason: FailureReason::Timeout { deadline_ms: 5_000 }
            }
        );
        // 2s + 4s of backoff crosses the 5s deadline during the second wait.
        assert_eq!(report.attempts.len(), 2);
    }
}
