//! Engine configuration
//!
//! One JSON document configures everything: per-account risk limits, venue
//! breaker thresholds, router weights, and the timer intervals. All fields
//! have working defaults so an empty `{}` is a valid config.

use crate::resilience::RetryPolicy;
use crate::risk::{CircuitBreakerConfig, RiskParameters};
use crate::router::RouterWeights;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use tracing::info;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Limits applied to accounts without an explicit entry
    pub default_risk: RiskParameters,

    /// Per-account limit overrides, keyed by account id
    pub accounts: HashMap<String, RiskParameters>,

    pub breaker_failure_threshold: u32,
    pub breaker_reset_timeout_ms: u64,

    pub router_weights: RouterWeights,

    pub retry_base_delay_ms: u64,
    pub retry_max_delay_ms: u64,
    pub retry_max_attempts: u32,
    pub retry_jitter: f64,

    /// Overall budget per venue placement, retries included
    pub venue_deadline_ms: u64,

    pub reconcile_interval_ms: u64,
    pub risk_sweep_interval_ms: u64,

    /// How long terminal order records stay queryable
    pub terminal_retention_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let retry = RetryPolicy::default();
        let breaker = CircuitBreakerConfig::default();
        Self {
            default_risk: RiskParameters::default(),
            accounts: HashMap::new(),
            breaker_failure_threshold: breaker.failure_threshold,
            breaker_reset_timeout_ms: breaker.reset_timeout.as_millis() as u64,
            router_weights: RouterWeights::default(),
            retry_base_delay_ms: retry.base_delay.as_millis() as u64,
            retry_max_delay_ms: retry.max_delay.as_millis() as u64,
            retry_max_attempts: retry.max_attempts,
            retry_jitter: retry.jitter,
            venue_deadline_ms: 5_000,
            reconcile_interval_ms: 1_000,
            risk_sweep_interval_ms: 1_000,
            terminal_retention_secs: 3_600,
        }
    }
}

impl EngineConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: EngineConfig = serde_json::from_str(&raw)
            .with_context(|| format!("parsing config {}", path.display()))?;
        config.validate()?;
        info!(
            accounts = config.accounts.len(),
            "configuration loaded from {}",
            path.display()
        );
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.breaker_failure_threshold > 0,
            "breaker_failure_threshold must be at least 1"
        );
        anyhow::ensure!(
            self.retry_max_attempts > 0,
            "retry_max_attempts must be at least 1"
        );
        anyhow::ensure!(
            (0.0..=1.0).contains(&self.retry_jitter),
            "retry_jitter must be within 0.0..=1.0"
        );
        anyhow::ensure!(self.venue_deadline_ms > 0, "venue_deadline_ms must be positive");
        let w = &self.router_weights;
        anyhow::ensure!(
            w.fill_rate >= 0.0 && w.latency >= 0.0 && w.price_improvement >= 0.0 && w.cost >= 0.0,
            "router weights must be non-negative"
        );
        Ok(())
    }

    pub fn breaker_config(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: self.breaker_failure_threshold,
            reset_timeout: Duration::from_millis(self.breaker_reset_timeout_ms),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            base_delay: Duration::from_millis(self.retry_base_delay_ms),
            max_delay: Duration::from_millis(self.retry_max_delay_ms),
            max_attempts: self.retry_max_attempts,
            jitter: self.retry_jitter,
        }
    }

    pub fn venue_deadline(&self) -> Duration {
        Duration::from_millis(self.venue_deadline_ms)
    }

    pub fn reconcile_interval(&self) -> Duration {
        Duration::from_millis(self.reconcile_interval_ms)
    }

    pub fn risk_sweep_interval(&self) -> Duration {
        Duration::from_millis(self.risk_sweep_interval_ms)
    }

    pub fn terminal_retention(&self) -> Duration {
        Duration::from_secs(self.terminal_retention_secs)
    }
}
