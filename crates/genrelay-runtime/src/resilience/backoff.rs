//! Exponential backoff schedule for retries on one model.

use backon::{BackoffBuilder, ExponentialBuilder};
use std::time::Duration;

use genrelay_core::RetryPolicy;

/// Upper bound on stored delays. Doubling reaches any `Duration` cap well
/// before this, and every later delay repeats the last stored one.
const MAX_STORED_DELAYS: usize = 128;

/// Delays between attempts on a single model.
///
/// The delay after attempt `a` fails transiently is `min(base * 2^(a-1), max)`.
/// There are `max_attempts_per_model - 1` delays. Only the growing prefix up
/// to the cap is stored, so memory stays constant for any attempt budget.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackoffSchedule {
    /// Number of delays in the schedule
    retries: u32,

    /// Delays until the first one that reaches the cap
    prefix: Vec<Duration>,
}

impl BackoffSchedule {
    /// Build the schedule for a policy. No jitter is applied.
    ///
    /// A base delay above the cap is clamped to the cap.
    pub fn from_policy(policy: &RetryPolicy) -> Self {
        let retries = policy.max_attempts_per_model.saturating_sub(1);
        let stored = (retries as usize).min(MAX_STORED_DELAYS);

        let mut prefix: Vec<Duration> = ExponentialBuilder::default()
            .with_min_delay(policy.base_delay.min(policy.max_delay))
            .with_max_delay(policy.max_delay)
            .with_factor(2.0)
            .with_max_times(stored)
            .build()
            .collect();

        if let Some(capped) = prefix.iter().position(|d| *d >= policy.max_delay) {
            prefix.truncate(capped + 1);
        }

        Self { retries, prefix }
    }

    /// Delay after a failed `attempt` (1-based), or `None` if the attempt
    /// budget for this model is spent.
    pub fn delay_after(&self, attempt: u32) -> Option<Duration> {
        let index = attempt.checked_sub(1)?;
        if index >= self.retries {
            return None;
        }
        self.prefix
            .get(index as usize)
            .or_else(|| self.prefix.last())
            .copied()
    }

    /// Number of delays, one less than the attempt budget.
    pub fn len(&self) -> u32 {
        self.retries
    }

    pub fn is_empty(&self) -> bool {
        self.retries == 0
    }

    /// Longest possible time spent sleeping on one model.
    pub fn total(&self) -> Duration {
        let stored: Duration = self.prefix.iter().sum();
        let repeated = self.retries.saturating_sub(self.prefix.len() as u32);
        match self.prefix.last() {
            Some(last) => stored.saturating_add(last.saturating_mul(repeated)),
            None => stored,
        }
    }
}
