//! Push policy: protected branches, attempt budget, backoff and deadline.

use std::time::{Duration, Instant};

use backoff::ExponentialBackoff;
use globset::GlobSet;

use crate::config::{PushConfig, compile_globs};
use crate::error::ConfigError;

/// Compiled push settings shared by every session.
#[derive(Debug, Clone)]
pub struct PushPolicy {
    protected: GlobSet,
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub deadline: Duration,
}

impl PushPolicy {
    pub fn from_config(config: &PushConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            protected: compile_globs(&config.protected_branches, false)?,
            max_attempts: config.max_attempts,
            base_delay: config.base_delay(),
            max_delay: config.max_delay(),
            deadline: config.deadline(),
        })
    }

    /// Whether force pushes to `branch` are refused.
    pub fn is_protected(&self, branch: &str) -> bool {
        self.protected.is_match(branch)
    }

    /// Doubling backoff from `base_delay`, capped at `max_delay`, without
    /// jitter. Attempts are counted by the session, so the backoff itself
    /// never gives up.
    pub fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            current_interval: self.base_delay,
            initial_interval: self.base_delay,
            randomization_factor: 0.0,
            multiplier: 2.0,
            max_interval: self.max_delay,
            start_time: Instant::now(),
            max_elapsed_time: None,
            ..Default::default()
        }
    }

    pub fn deadline_ms(&self) -> u64 {
        u64::try_from(self.deadline.as_millis()).unwrap_or(u64::MAX)
    }
}
