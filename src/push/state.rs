//! Push retry session as an explicit state machine.
//!
//! [`RetrySession::apply`] is the only transition function. The driver in
//! the parent module performs I/O and feeds the results back in as
//! [`PushEvent`]s, so every transition can be exercised without a remote.

use std::time::Duration;

use backoff::ExponentialBackoff;
use backoff::backoff::Backoff;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{PipelineError, RemoteFailure, RepoError};
use crate::git::{Divergence, PushReceipt, PushRequest};

use super::policy::PushPolicy;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PushState {
    Idle,
    Checking,
    Attempting { attempt: u32 },
    Retrying { attempt: u32, delay_ms: u64 },
    Success { commits_pushed: usize },
    Failed { reason: FailureReason },
}

impl PushState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PushState::Success { .. } | PushState::Failed { .. })
    }
}

/// Why a session ended in `Failed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureReason {
    ForcePushBlocked { branch: String },
    /// `behind` is 0 when the remote refused a non-fast-forward without
    /// reporting how far ahead it is.
    BranchDiverged { ahead: usize, behind: usize },
    RemoteRejected { message: String },
    RemoteAuth { message: String },
    RetryBudgetExhausted { attempts: u32, last_error: String },
    Timeout { deadline_ms: u64 },
    /// The push could not be started (git missing, spawn failure, status error).
    Local { message: String },
}

impl FailureReason {
    pub fn to_error(&self, branch: &str) -> PipelineError {
        match self {
            FailureReason::ForcePushBlocked { branch } => PipelineError::ForcePushBlocked {
                branch: branch.clone(),
            },
            FailureReason::BranchDiverged { ahead, behind } => PipelineError::BranchDiverged {
                branch: branch.to_string(),
                ahead: *ahead,
                behind: *behind,
            },
            FailureReason::RemoteRejected { message } => {
                PipelineError::RemoteRejected(message.clone())
            }
            FailureReason::RemoteAuth { message } => PipelineError::RemoteAuthError(message.clone()),
            FailureReason::RetryBudgetExhausted {
                attempts,
                last_error,
            } => PipelineError::RetryBudgetExhausted {
                attempts: *attempts,
                last_error: last_error.clone(),
            },
            FailureReason::Timeout { deadline_ms } => PipelineError::Timeout {
                deadline_ms: *deadline_ms,
            },
            FailureReason::Local { message } => {
                PipelineError::Repo(RepoError::SpawnFailed {
                    operation: "push".to_string(),
                    source: std::io::Error::other(message.clone()),
                })
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    Success,
    NetworkError,
    Rejected,
    Diverged,
    ProtectedBlocked,
    AuthFailed,
    TimedOut,
    LocalError,
}

/// One network push call and what followed it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushAttempt {
    pub attempt: u32,
    pub started_at: DateTime<Utc>,
    pub outcome: AttemptOutcome,
    /// Delay scheduled before the next attempt, if one follows.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backoff_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Input to the state machine.
#[derive(Debug)]
pub enum PushEvent {
    Start,
    Checked(Divergence),
    CheckFailed(String),
    AttemptFinished {
        started_at: DateTime<Utc>,
        result: Result<PushReceipt, RepoError>,
    },
    BackoffElapsed,
    /// The session deadline passed. `in_flight` is the start time of a push
    /// call that was abandoned.
    DeadlineExpired { in_flight: Option<DateTime<Utc>> },
}

/// Final record of a push session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushReport {
    pub remote: String,
    pub branch: String,
    pub force: bool,
    pub state: PushState,
    pub attempts: Vec<PushAttempt>,
    pub transitions: Vec<PushState>,
}

impl PushReport {
    pub fn is_success(&self) -> bool {
        matches!(self.state, PushState::Success { .. })
    }

    pub fn commits_pushed(&self) -> usize {
        match self.state {
            PushState::Success { commits_pushed } => commits_pushed,
            _ => 0,
        }
    }

    /// Error equivalent of a failed session.
    pub fn error(&self) -> Option<PipelineError> {
        match &self.state {
            PushState::Failed { reason } => Some(reason.to_error(&self.branch)),
            _ => None,
        }
    }
}

pub struct RetrySession {
    request: PushRequest,
    protected: bool,
    max_attempts: u32,
    max_delay: Duration,
    deadline_ms: u64,
    backoff: ExponentialBackoff,
    state: PushState,
    attempts: Vec<PushAttempt>,
    transitions: Vec<PushState>,
    pending: usize,
}

impl RetrySession {
    pub fn new(policy: &PushPolicy, request: PushRequest) -> Self {
        Self {
            protected: policy.is_protected(&request.branch),
            max_attempts: policy.max_attempts.max(1),
            max_delay: policy.max_delay,
            deadline_ms: policy.deadline_ms(),
            backoff: policy.backoff(),
            request,
            state: PushState::Idle,
            attempts: Vec::new(),
            transitions: vec![PushState::Idle],
            pending: 0,
        }
    }

    pub fn state(&self) -> &PushState {
        &self.state
    }

    pub fn attempts(&self) -> &[PushAttempt] {
        &self.attempts
    }

    pub fn request(&self) -> &PushRequest {
        &self.request
    }

    /// Apply one event. Terminal states ignore every event.
    pub fn apply(&mut self, event: PushEvent) -> &PushState {
        if self.state.is_terminal() {
            debug!(state = ?self.state, ?event, "Ignoring event in terminal push state");
            return &self.state;
        }

        let current = self.state.clone();
        let next = match (current, event) {
            (PushState::Idle, PushEvent::Start) => self.start(),
            (PushState::Checking, PushEvent::Checked(div)) => self.checked(&div, 1),
            (PushState::Attempting { attempt }, PushEvent::Checked(div)) => {
                self.checked(&div, attempt)
            }
            (PushState::Checking | PushState::Attempting { .. }, PushEvent::CheckFailed(message)) => {
                failed(FailureReason::Local { message })
            }
            (PushState::Attempting { attempt }, PushEvent::AttemptFinished { started_at, result }) => {
                self.finished(attempt, started_at, result)
            }
            (PushState::Retrying { attempt, .. }, PushEvent::BackoffElapsed) => {
                PushState::Attempting {
                    attempt: attempt + 1,
                }
            }
            (state, PushEvent::DeadlineExpired { in_flight }) => {
                if let (PushState::Attempting { attempt }, Some(started_at)) = (state, in_flight) {
                    self.attempts.push(PushAttempt {
                        attempt,
                        started_at,
                        outcome: AttemptOutcome::TimedOut,
                        backoff_ms: None,
                        detail: None,
                    });
                }
                failed(FailureReason::Timeout {
                    deadline_ms: self.deadline_ms,
                })
            }
            (state, event) => {
                warn!(?state, ?event, "Unexpected push event, ignoring");
                return &self.state;
            }
        };

        self.transition(next)
    }

    /// Consume the session into its report.
    pub fn into_report(self) -> PushReport {
        PushReport {
            remote: self.request.remote,
            branch: self.request.branch,
            force: self.request.force,
            state: self.state,
            attempts: self.attempts,
            transitions: self.transitions,
        }
    }

    fn transition(&mut self, next: PushState) -> &PushState {
        debug!(
            from = ?self.state,
            to = ?next,
            branch = %self.request.branch,
            "Push state transition"
        );
        self.state = next;
        self.transitions.push(self.state.clone());
        &self.state
    }

    fn start(&self) -> PushState {
        // Evaluated once, before any network call.
        if self.request.force && self.protected {
            return failed(FailureReason::ForcePushBlocked {
                branch: self.request.branch.clone(),
            });
        }
        PushState::Checking
    }

    fn checked(&mut self, div: &Divergence, attempt: u32) -> PushState {
        let force = self.request.force;

        if div.diverged() && !force {
            return failed(FailureReason::BranchDiverged {
                ahead: div.ahead,
                behind: div.behind,
            });
        }
        if div.ahead == 0 && !force {
            // On a recheck this means an earlier attempt landed after all.
            return PushState::Success {
                commits_pushed: self.pending,
            };
        }
        if div.diverged() {
            warn!(
                branch = %self.request.branch,
                ahead = div.ahead,
                behind = div.behind,
                "Force pushing a diverged branch; remote commits will be replaced"
            );
        }

        self.pending = div.ahead;
        PushState::Attempting { attempt }
    }

    fn finished(
        &mut self,
        attempt: u32,
        started_at: DateTime<Utc>,
        result: Result<PushReceipt, RepoError>,
    ) -> PushState {
        let (outcome, backoff_ms, detail, next) = match result {
            Ok(_) => (
                AttemptOutcome::Success,
                None,
                None,
                PushState::Success {
                    commits_pushed: self.pending,
                },
            ),
            Err(RepoError::Remote(RemoteFailure::Network(message))) => {
                if attempt < self.max_attempts {
                    let delay = self.backoff.next_backoff().unwrap_or(self.max_delay);
                    let delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
                    (
                        AttemptOutcome::NetworkError,
                        Some(delay_ms),
                        Some(message),
                        PushState::Retrying { attempt, delay_ms },
                    )
                } else {
                    (
                        AttemptOutcome::NetworkError,
                        None,
                        Some(message.clone()),
                        failed(FailureReason::RetryBudgetExhausted {
                            attempts: attempt,
                            last_error: message,
                        }),
                    )
                }
            }
            Err(RepoError::Remote(RemoteFailure::Auth(message))) => (
                AttemptOutcome::AuthFailed,
                None,
                Some(message.clone()),
                failed(FailureReason::RemoteAuth { message }),
            ),
            Err(RepoError::Remote(RemoteFailure::NonFastForward(message))) => (
                AttemptOutcome::Diverged,
                None,
                Some(message),
                failed(FailureReason::BranchDiverged {
                    ahead: self.pending,
                    behind: 0,
                }),
            ),
            Err(RepoError::Remote(RemoteFailure::Protected(message))) => (
                AttemptOutcome::ProtectedBlocked,
                None,
                Some(message.clone()),
                failed(FailureReason::RemoteRejected { message }),
            ),
            Err(RepoError::Remote(RemoteFailure::Rejected(message))) => (
                AttemptOutcome::Rejected,
                None,
                Some(message.clone()),
                failed(FailureReason::RemoteRejected { message }),
            ),
            Err(other) => {
                let message = other.to_string();
                (
                    AttemptOutcome::LocalError,
                    None,
                    Some(message.clone()),
                    failed(FailureReason::Local { message }),
                )
            }
        };

        self.attempts.push(PushAttempt {
            attempt,
            started_at,
            outcome,
            backoff_ms,
            detail,
        });
        next
    }
}

fn failed(reason: FailureReason) -> PushState {
    PushState::Failed { reason }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PushConfig;

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
            tracking_ref: Some("refs/remotes/origin/feature".to_string()),
        }
    }

    fn network_error() -> Result<PushReceipt, RepoError> {
        Err(RepoError::Remote(RemoteFailure::Network(
            "Could not resolve host: example.com".to_string(),
        )))
    }

    fn finished(result: Result<PushReceipt, RepoError>) -> PushEvent {
        PushEvent::AttemptFinished {
            started_at: Utc::now(),
            result,
        }
    }

    #[test]
    fn test_force_push_to_protected_branch_fails_on_start() {
        let mut session = RetrySession::new(&policy(), request("main", true));
        let state = session.apply(PushEvent::Start).clone();
        assert_eq!(
            state,
            PushState::Failed {
                reason: FailureReason::ForcePushBlocked {
                    branch: "main".to_string()
                }
            }
        );
        assert!(session.attempts().is_empty());
    }

    #[test]
    fn test_plain_push_to_protected_branch_is_allowed() {
        let mut session = RetrySession::new(&policy(), request("main", false));
        assert_eq!(session.apply(PushEvent::Start), &PushState::Checking);
    }

    #[test]
    fn test_nothing_ahead_is_success_without_attempts() {
        let mut session = RetrySession::new(&policy(), request("feature", false));
        session.apply(PushEvent::Start);
        session.apply(PushEvent::Checked(div(0, 0)));
        let report = session.into_report();
        assert_eq!(report.state, PushState::Success { commits_pushed: 0 });
        assert!(report.attempts.is_empty());
    }

    #[test]
    fn test_diverged_without_force_fails() {
        let mut session = RetrySession::new(&policy(), request("feature", false));
        session.apply(PushEvent::Start);
        let state = session.apply(PushEvent::Checked(div(3, 2))).clone();
        assert_eq!(
            state,
            PushState::Failed {
                reason: FailureReason::BranchDiverged { ahead: 3, behind: 2 }
            }
        );
        assert!(session.attempts().is_empty());
    }

    #[test]
    fn test_diverged_with_force_proceeds() {
        let mut session = RetrySession::new(&policy(), request("feature", true));
        session.apply(PushEvent::Start);
        assert_eq!(
            session.apply(PushEvent::Checked(div(3, 2))),
            &PushState::Attempting { attempt: 1 }
        );
    }

    #[test]
    fn test_network_errors_back_off_then_succeed() {
        let mut session = RetrySession::new(&policy(), request("feature", false));
        session.apply(PushEvent::Start);
        session.apply(PushEvent::Checked(div(2, 0)));

        assert_eq!(
            session.apply(finished(network_error())),
            &PushState::Retrying {
                attempt: 1,
                delay_ms: 2_000
            }
        );
        session.apply(PushEvent::BackoffElapsed);
        session.apply(PushEvent::Checked(div(2, 0)));
        assert_eq!(
            session.apply(finished(network_error())),
            &PushState::Retrying {
                attempt: 2,
                delay_ms: 4_000
            }
        );
        session.apply(PushEvent::BackoffElapsed);
        assert_eq!(session.state(), &PushState::Attempting { attempt: 3 });
        session.apply(finished(Ok(PushReceipt::default())));

        let report = session.into_report();
        assert_eq!(report.state, PushState::Success { commits_pushed: 2 });
        let backoffs: Vec<_> = report.attempts.iter().map(|a| a.backoff_ms).collect();
        assert_eq!(backoffs, vec![Some(2_000), Some(4_000), None]);
    }

    #[test]
    fn test_budget_exhausted_after_max_attempts() {
        let mut session = RetrySession::new(&policy(), request("feature", false));
        session.apply(PushEvent::Start);
        session.apply(PushEvent::Checked(div(1, 0)));
        for _ in 0..2 {
            session.apply(finished(network_error()));
            session.apply(PushEvent::BackoffElapsed);
        }
        let state = session.apply(finished(network_error())).clone();
        assert!(matches!(
            state,
            PushState::Failed {
                reason: FailureReason::RetryBudgetExhausted { attempts: 3, .. }
            }
        ));
        assert_eq!(session.attempts().len(), 3);
        assert_eq!(session.attempts()[2].backoff_ms, None);
    }

    #[test]
    fn test_auth_failure_is_not_retried() {
        let mut session = RetrySession::new(&policy(), request("feature", false));
        session.apply(PushEvent::Start);
        session.apply(PushEvent::Checked(div(1, 0)));
        let state = session
            .apply(finished(Err(RepoError::Remote(RemoteFailure::Auth(
                "Permission denied (publickey)".to_string(),
            )))))
            .clone();
        assert!(matches!(
            state,
            PushState::Failed {
                reason: FailureReason::RemoteAuth { .. }
            }
        ));
        assert_eq!(session.attempts()[0].outcome, AttemptOutcome::AuthFailed);
    }

    #[test]
    fn test_terminal_state_ignores_events() {
        let mut session = RetrySession::new(&policy(), request("feature", false));
        session.apply(PushEvent::Start);
        session.apply(PushEvent::Checked(div(0, 0)));
        session.apply(PushEvent::DeadlineExpired { in_flight: None });
        session.apply(PushEvent::Checked(div(5, 0)));
        assert_eq!(session.state(), &PushState::Success { commits_pushed: 0 });
    }

    #[test]
    fn test_deadline_records_in_flight_attempt() {
        let mut session = RetrySession::new(&policy(), request("feature", false));
        session.apply(PushEvent::Start);
        session.apply(PushEvent::Checked(div(1, 0)));
        session.apply(PushEvent::DeadlineExpired {
            in_flight: Some(Utc::now()),
        });
        let report = session.into_report();
        assert_eq!(
            report.state,
            PushState::Failed {
                reason: FailureReason::Timeout {
                    deadline_ms: 120_000
                }
            }
        );
        assert_eq!(report.attempts[0].outcome, AttemptOutcome::TimedOut);
        assert_eq!(report.error().unwrap().code(), "TIMEOUT");
    }

    #[test]
    fn test_transitions_are_recorded() {
        let mut session = RetrySession::new(&policy(), request("feature", false));
        session.apply(PushEvent::Start);
        session.apply(PushEvent::Checked(div(1, 0)));
        session.apply(finished(Ok(PushReceipt::default())));
        let report = session.into_report();
        assert_eq!(
            report.transitions,
            vec![
                PushState::Idle,
                PushState::Checking,
                PushState::Attempting { attempt: 1 },
                PushState::Success { commits_pushed: 1 },
            ]
        );
    }
}
