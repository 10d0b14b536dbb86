//! Bounded retry policy applied per model.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::SpecError;

/// Retry policy for one model in the chain.
///
/// The delay before attempt `a + 1` is `min(base_delay * 2^(a-1), max_delay)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Attempts against a single model before moving on (including the first)
    pub max_attempts_per_model: u32,

    /// Delay before the second attempt
    #[serde(rename = "base_delay_ms", with = "duration_millis")]
    pub base_delay: Duration,

    /// Upper bound for any single delay
    #[serde(rename = "max_delay_ms", with = "duration_millis")]
    pub max_delay: Duration,
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis().min(u64::MAX as u128) as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts_per_model: 3,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(8000),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries the same model.
    pub fn no_retry() -> Self {
        Self {
            max_attempts_per_model: 1,
            ..Default::default()
        }
    }

    /// Set attempts per model.
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts_per_model = attempts;
        self
    }

    /// Set the base delay.
    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Set the delay cap.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Check the policy can drive at least one attempt with a sane schedule.
    pub fn validate(&self) -> Result<(), SpecError> {
        if self.max_attempts_per_model == 0 {
            return Err(SpecError::InvalidRetryPolicy(
                "max_attempts_per_model must be at least 1".to_string(),
            ));
        }
        if self.max_delay < self.base_delay {
            return Err(SpecError::InvalidRetryPolicy(format!(
                "max_delay ({:?}) is shorter than base_delay ({:?})",
                self.max_delay, self.base_delay
            )));
        }
        Ok(())
    }
}
