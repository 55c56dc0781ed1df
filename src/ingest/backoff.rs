//! Delay policies for the retrying file reader.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Decides how long to wait before a read attempt.
pub trait BackoffPolicy: Send + Sync + std::fmt::Debug {
    /// Delay before attempt number `attempt` (1-based).
    fn delay_before(&self, attempt: u32) -> Duration;
}

/// Same delay before every attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedBackoff {
    pub delay: Duration,
}

impl FixedBackoff {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

impl BackoffPolicy for FixedBackoff {
    fn delay_before(&self, _attempt: u32) -> Duration {
        self.delay
    }
}

/// Doubling delay starting at `base`, capped at `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExponentialBackoff {
    pub base: Duration,
    pub max: Duration,
}

impl ExponentialBackoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self { base, max }
    }
}

impl BackoffPolicy for ExponentialBackoff {
    fn delay_before(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(31);
        self.base
            .checked_mul(1u32 << shift)
            .unwrap_or(self.max)
            .min(self.max)
    }
}

/// Serializable choice of backoff policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// Wait the configured retry delay before every attempt
    #[default]
    Fixed,
    /// Double the retry delay each attempt, up to `max_delay_secs`
    Exponential { max_delay_secs: u64 },
}

impl BackoffStrategy {
    /// Build the policy for a given base delay.
    pub fn build(self, delay: Duration) -> Arc<dyn BackoffPolicy> {
        match self {
            BackoffStrategy::Fixed => Arc::new(FixedBackoff::new(delay)),
            BackoffStrategy::Exponential { max_delay_secs } => Arc::new(ExponentialBackoff::new(
                delay,
                Duration::from_secs(max_delay_secs).max(delay),
            )),
        }
    }
}
