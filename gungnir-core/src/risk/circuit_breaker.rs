//! Circuit breaker over downstream venue calls
//!
//! Strict three-state machine, independent of individual orders. Counts
//! consecutive venue failures; a tripped breaker fails submissions fast
//! instead of piling requests onto a broken venue.
//!
//! ```text
//!     CLOSED ──fail(N)──► OPEN ──reset timeout──► HALFOPEN
//!        ▲                 ▲                          │
//!        │ probe success   │ probe failure            │ one probe
//!        └─────────────────┴──────────────────────────┘
//! ```
//!
//! The allow/record pair is linearizable under one mutex so HalfOpen lets
//! exactly one probe through, even with concurrent submitters.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Circuit breaker thresholds, from the configuration surface
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before the breaker trips
    pub failure_threshold: u32,
    /// How long Open lasts before a probe is permitted
    pub reset_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(30),
        }
    }
}

/// Observable breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum BreakerState {
    Closed = 0,
    Open = 1,
    HalfOpen = 2,
}

impl std::fmt::Display for BreakerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BreakerState::Closed => write!(f, "CLOSED"),
            BreakerState::Open => write!(f, "OPEN"),
            BreakerState::HalfOpen => write!(f, "HALF_OPEN"),
        }
    }
}

#[derive(Debug)]
enum Inner {
    Closed {
        consecutive_failures: u32,
    },
    Open {
        since: Instant,
    },
    HalfOpen {
        /// Set once the single probe has been handed out
        probe_outstanding: bool,
    },
}

/// Shared circuit breaker
///
/// Cloning shares the underlying state; all venue-call sites report into
/// the same counter.
#[derive(Clone)]
pub struct CircuitBreaker {
    inner: Arc<Mutex<Inner>>,
    config: CircuitBreakerConfig,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner::Closed {
                consecutive_failures: 0,
            })),
            config,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }

    /// Whether a request may proceed
    ///
    /// Closed: always. Open: only once the reset timeout has elapsed, which
    /// transitions to HalfOpen and hands out the single probe. HalfOpen:
    /// false while the probe is outstanding.
    pub fn allow_request(&self) -> bool {
        let mut inner = self.inner.lock();
        match &mut *inner {
            Inner::Closed { .. } => true,
            Inner::Open { since } => {
                if since.elapsed() >= self.config.reset_timeout {
                    debug!("circuit breaker: OPEN -> HALF_OPEN, probe permitted");
                    *inner = Inner::HalfOpen {
                        probe_outstanding: true,
                    };
                    true
                } else {
                    false
                }
            }
            Inner::HalfOpen { probe_outstanding } => {
                if *probe_outstanding {
                    false
                } else {
                    *probe_outstanding = true;
                    true
                }
            }
        }
    }

    /// Record a successful venue call
    pub fn record_success(&self) {
        let mut inner = self.inner.lock();
        match &*inner {
            Inner::Closed { .. } => {
                *inner = Inner::Closed {
                    consecutive_failures: 0,
                };
            }
            Inner::HalfOpen { .. } => {
                info!("circuit breaker: HALF_OPEN -> CLOSED, venue recovered");
                *inner = Inner::Closed {
                    consecutive_failures: 0,
                };
            }
            // Successes arriving while Open belong to calls issued earlier;
            // they do not short-circuit the timeout
            Inner::Open { .. } => {}
        }
    }

    /// Record a failed venue call
    pub fn record_failure(&self) {
        let mut inner = self.inner.lock();
        match &mut *inner {
            Inner::Closed {
                consecutive_failures,
            } => {
                *consecutive_failures += 1;
                if *consecutive_failures >= self.config.failure_threshold {
                    warn!(
                        failures = *consecutive_failures,
                        threshold = self.config.failure_threshold,
                        "circuit breaker: CLOSED -> OPEN"
                    );
                    *inner = Inner::Open {
                        since: Instant::now(),
                    };
                } else {
                    debug!(
                        failures = *consecutive_failures,
                        threshold = self.config.failure_threshold,
                        "circuit breaker: failure recorded"
                    );
                }
            }
            Inner::HalfOpen { .. } => {
                warn!("circuit breaker: HALF_OPEN -> OPEN, probe failed");
                *inner = Inner::Open {
                    since: Instant::now(),
                };
            }
            Inner::Open { .. } => {}
        }
    }

    pub fn state(&self) -> BreakerState {
        match &*self.inner.lock() {
            Inner::Closed { .. } => BreakerState::Closed,
            Inner::Open { .. } => BreakerState::Open,
            Inner::HalfOpen { .. } => BreakerState::HalfOpen,
        }
    }
}
