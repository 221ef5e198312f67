//! Backoff policy for metadata fetch retries.
//!
//! Startup metadata sync retries each topic a bounded number of times.
//! Delays grow per the configured strategy, are capped at `max_delay` and
//! randomized with jitter so a fleet of bridges restarted together does not
//! hammer the brokers in lockstep.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::DEFAULT_SYNC_ATTEMPTS;

/// Retry policy for broker metadata requests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first one.
    pub max_attempts: u32,

    /// Delay after the first failed attempt.
    pub base_delay: Duration,

    /// Upper bound for any single delay.
    pub max_delay: Duration,

    /// Jitter fraction (0.0 to 1.0) applied to each delay.
    pub jitter_factor: f64,

    /// How delays grow between attempts.
    pub backoff_strategy: BackoffStrategy,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_SYNC_ATTEMPTS,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(5),
            jitter_factor: 0.25,
            backoff_strategy: BackoffStrategy::Exponential,
        }
    }
}

/// Strategy for calculating retry delays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackoffStrategy {
    /// Same delay between every attempt.
    Fixed,
    /// Delay doubles each attempt.
    Exponential,
    /// Delay grows by `base_delay` each attempt.
    Linear,
}

impl RetryPolicy {
    /// Returns whether another attempt is allowed after `attempt` (1-based)
    /// has failed.
    pub const fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    /// Delay to wait after failed attempt number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let step = attempt.saturating_sub(1);
        let delay = match self.backoff_strategy {
            BackoffStrategy::Fixed => self.base_delay,
            BackoffStrategy::Linear => self.base_delay.saturating_mul(step.saturating_add(1)),
            BackoffStrategy::Exponential => {
                self.base_delay.saturating_mul(2_u32.saturating_pow(step.min(20)))
            },
        };

        let capped = delay.min(self.max_delay);
        apply_jitter(capped, self.jitter_factor).min(self.max_delay)
    }
}

/// Randomizes `duration` by up to `±jitter_factor`.
fn apply_jitter(duration: Duration, jitter_factor: f64) -> Duration {
    if jitter_factor <= 0.0 {
        return duration;
    }

    let jitter_range = duration.as_secs_f64() * jitter_factor.clamp(0.0, 1.0);
    let offset = rand::rng().random_range(-jitter_range..=jitter_range);

    Duration::from_secs_f64((duration.as_secs_f64() + offset).max(0.0))
}
