//! Retry classification and backoff scheduling
//!
//! Both halves are pure so the policy can be tested without any timing:
//! [`RetryPolicy::classify`] decides whether an attempt outcome is worth
//! retrying, [`RetryPolicy::backoff`] maps an attempt number to a wait.

use crate::config::RetryPolicy;
use rand::Rng;
use std::time::Duration;

/// What a single attempt produced, as far as retrying is concerned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// The transport answered with this status
    Status(u16),
    /// The attempt exceeded its timeout
    Timeout,
    /// Connection-level failure
    Transport,
}

/// Verdict for an attempt outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// 2xx: nothing to retry
    Success,
    /// Worth another attempt if any remain
    Retry,
    /// Terminal failure for this URL
    Fail,
}

impl RetryPolicy {
    /// Returns true if `status` belongs to the retryable set
    pub fn is_retryable_status(&self, status: u16) -> bool {
        match &self.retryable_statuses {
            Some(statuses) => statuses.contains(&status),
            None => status == 429 || (500..=599).contains(&status),
        }
    }

    pub fn classify(&self, outcome: AttemptOutcome) -> RetryDecision {
        match outcome {
            AttemptOutcome::Status(status) if (200..=299).contains(&status) => {
                RetryDecision::Success
            }
            AttemptOutcome::Status(status) if self.is_retryable_status(status) => {
                RetryDecision::Retry
            }
            AttemptOutcome::Status(_) => RetryDecision::Fail,
            AttemptOutcome::Timeout | AttemptOutcome::Transport => RetryDecision::Retry,
        }
    }

    /// Deterministic part of the wait after failed attempt `attempt` (0-based):
    /// `min(base * 2^attempt, max)`
    pub fn backoff(&self, attempt: u32) -> Duration {
        let delay = self
            .base_delay_ms
            .saturating_mul(2u64.saturating_pow(attempt.min(32)));
        Duration::from_millis(delay.min(self.max_delay_ms))
    }

    /// Backoff plus uniform jitter in `[0, backoff * jitter]`
    pub fn backoff_with_jitter<R: Rng + ?Sized>(&self, attempt: u32, rng: &mut R) -> Duration {
        let base = self.backoff(attempt);
        let spread = base.as_secs_f64() * self.jitter;
        if spread <= 0.0 {
            return base;
        }
        base + Duration::from_secs_f64(rng.gen_range(0.0..=spread))
    }
}
