//! Bounded exponential backoff with jitter
//!
//! Used only around venue calls. Matching, risk checks, and book mutations
//! are deterministic and never retried.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Retry schedule parameters
///
/// Delays grow geometrically from `base_delay`, capped at `max_delay`,
/// with `jitter` applied as a symmetric fraction of each delay so
/// concurrent retries against a recovering venue spread out.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Total attempts, including the first (1 = no retries)
    pub max_attempts: u32,
    /// 0.0 disables jitter; 0.2 means each delay varies by +/- 10%
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(50),
            max_delay: Duration::from_secs(2),
            max_attempts: 4,
            jitter: 0.2,
        }
    }
}

impl RetryPolicy {
    /// No retries at all; the first failure is final
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    pub fn backoff(&self) -> Backoff {
        Backoff {
            policy: self.clone(),
            attempt: 0,
        }
    }
}

/// Per-call backoff state
///
/// `next_delay` returns the pause before the following attempt, or `None`
/// once the attempt budget is spent.
pub struct Backoff {
    policy: RetryPolicy,
    attempt: u32,
}

impl Backoff {
    pub fn next_delay(&mut self) -> Option<Duration> {
        self.attempt += 1;
        if self.attempt >= self.policy.max_attempts {
            return None;
        }

        let exp = self.attempt.saturating_sub(1).min(20);
        let raw = self.policy.base_delay.as_secs_f64() * 2f64.powi(exp as i32);
        let capped = raw.min(self.policy.max_delay.as_secs_f64());

        let jittered = if self.policy.jitter > 0.0 {
            let spread = rand::thread_rng().gen::<f64>() - 0.5;
            capped * (1.0 + spread * self.policy.jitter)
        } else {
            capped
        };

        Some(Duration::from_secs_f64(jittered.max(0.0)))
    }

    pub fn attempts_made(&self) -> u32 {
        self.attempt
    }
}
