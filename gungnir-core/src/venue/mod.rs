//! Venue adapters and the retrying call path
//!
//! A venue is anything that accepts orders downstream. Adapters implement
//! `VenueAdapter`; the registry owns one adapter and one circuit breaker per
//! venue. All venue calls go through `place_with_retry`, which layers the
//! breaker check, bounded backoff, and the caller's deadline. Venue calls
//! never run while an order book lock is held.

pub mod sim;

pub use sim::SimulatedVenue;

use crate::core::errors::{CoreResult, ExecutionError};
use crate::core::order::Order;
use crate::core::types::{AccountId, OrderId, TradeId, VenueId};
use crate::resilience::RetryPolicy;
use crate::risk::{CircuitBreaker, CircuitBreakerConfig, Position, RiskViolation};
use dashmap::DashMap;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};
use tracing::{debug, warn};

/// One execution reported by a venue
#[derive(Debug, Clone)]
pub struct VenueFill {
    pub trade_id: TradeId,
    pub order_id: OrderId,
    pub price: Decimal,
    pub quantity: Decimal,
    pub executed_at: SystemTime,
}

/// Venue-side view of an order
#[derive(Debug, Clone, PartialEq)]
pub enum VenueOrderStatus {
    Working { filled: Decimal },
    Filled,
    Cancelled,
    /// The venue has no record of this order
    Unknown,
}

/// Downstream execution destination
///
/// Implementations must be safe to call from multiple threads; the engine
/// issues calls from per-order submission paths and from the reconciliation
/// thread concurrently.
pub trait VenueAdapter: Send + Sync {
    fn id(&self) -> VenueId;

    /// Place an order, returning any immediate fills
    fn place_order(&self, order: &Order) -> CoreResult<Vec<VenueFill>>;

    fn cancel_order(&self, order_id: OrderId) -> CoreResult<()>;

    fn order_status(&self, order_id: OrderId) -> CoreResult<VenueOrderStatus>;

    /// Venue-side positions, used by reconciliation
    fn positions(&self, account: &AccountId) -> CoreResult<Vec<Position>>;
}

struct VenueEntry {
    adapter: Arc<dyn VenueAdapter>,
    breaker: CircuitBreaker,
}

/// All configured venues with their health state
#[derive(Default)]
pub struct VenueRegistry {
    venues: DashMap<VenueId, VenueEntry>,
}

impl VenueRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, adapter: Arc<dyn VenueAdapter>, breaker_config: CircuitBreakerConfig) {
        let id = adapter.id();
        self.venues.insert(
            id,
            VenueEntry {
                adapter,
                breaker: CircuitBreaker::new(breaker_config),
            },
        );
    }

    pub fn adapter(&self, venue: &VenueId) -> Option<Arc<dyn VenueAdapter>> {
        self.venues.get(venue).map(|e| Arc::clone(&e.adapter))
    }

    pub fn breaker(&self, venue: &VenueId) -> Option<CircuitBreaker> {
        self.venues.get(venue).map(|e| e.breaker.clone())
    }

    pub fn venue_ids(&self) -> Vec<VenueId> {
        self.venues.iter().map(|e| e.key().clone()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.venues.is_empty()
    }
}

/// Place an order at a venue with breaker gating, retries, and a deadline
///
/// Retries apply only to retryable venue errors. Every attempt outcome is
/// reported to the venue's breaker; `enforce_breaker` controls whether an
/// open breaker blocks this call (accounts can opt out of gating, their
/// outcomes still feed the shared counter). Exceeding the deadline returns
/// a Timeout error: the order's true state at the venue is unknown and the
/// caller must not assume it was rejected.
pub fn place_with_retry(
    registry: &VenueRegistry,
    venue: &VenueId,
    order: &Order,
    policy: &RetryPolicy,
    deadline: Duration,
    enforce_breaker: bool,
) -> CoreResult<Vec<VenueFill>> {
    let (adapter, breaker) = {
        let entry = registry.venues.get(venue).ok_or_else(|| {
            ExecutionError::validation(
                crate::core::errors::reason::VENUE_UNAVAILABLE,
                format!("venue {} not registered", venue),
            )
        })?;
        (Arc::clone(&entry.adapter), entry.breaker.clone())
    };

    if enforce_breaker && !breaker.allow_request() {
        return Err(RiskViolation::CircuitBreakerOpen.into());
    }

    let started = Instant::now();
    let mut backoff = policy.backoff();

    loop {
        match adapter.place_order(order) {
            Ok(fills) => {
                breaker.record_success();
                debug!(venue = %venue, order_id = %order.id, fills = fills.len(), "venue accepted order");
                return Ok(fills);
            }
            Err(err) if err.is_retryable() => {
                breaker.record_failure();
                warn!(venue = %venue, order_id = %order.id, error = %err, "venue call failed");

                let Some(delay) = backoff.next_delay() else {
                    return Err(err);
                };
                if started.elapsed() + delay >= deadline {
                    return Err(ExecutionError::Timeout {
                        venue: venue.clone(),
                        order_id: order.id,
                        deadline,
                    });
                }
                std::thread::sleep(delay);
                // Breaker may have tripped from concurrent failures
                if enforce_breaker && !breaker.allow_request() {
                    return Err(RiskViolation::CircuitBreakerOpen.into());
                }
            }
            Err(err) => {
                // Validation and consistency failures do not count against
                // venue health
                return Err(err);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{OrderType, Side, Symbol, TimeInForce};
    use crate::venue::sim::Behavior;
    use rust_decimal_macros::dec;

    fn order() -> Order {
        Order {
            id: OrderId::generate(),
            symbol: Symbol::from("BTC-USD"),
            side: Side::Buy,
            order_type: OrderType::Limit,
            quantity: dec!(10),
            remaining: dec!(10),
            limit_price: Some(dec!(100)),
            stop_price: None,
            time_in_force: TimeInForce::Gtc,
            account: AccountId::from("A"),
            created_at: SystemTime::now(),
            sequence: 0,
        }
    }

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            max_attempts: 4,
            jitter: 0.0,
        }
    }

    fn registry_with(venue: Arc<SimulatedVenue>, threshold: u32) -> VenueRegistry {
        let registry = VenueRegistry::new();
        registry.register(
            venue,
            CircuitBreakerConfig {
                failure_threshold: threshold,
                reset_timeout: Duration::from_secs(30),
            },
        );
        registry
    }

    #[test]
    fn test_place_succeeds_first_attempt() {
        let venue = Arc::new(SimulatedVenue::new(VenueId::from("SIM")));
        let registry = registry_with(Arc::clone(&venue), 5);

        let fills = place_with_retry(
            &registry,
            &VenueId::from("SIM"),
            &order(),
            &fast_policy(),
            Duration::from_secs(1),
            true,
        )
        .unwrap();
        assert_eq!(fills.len(), 1);
        assert_eq!(fills[0].quantity, dec!(10));
    }

    #[test]
    fn test_transient_failures_are_retried() {
        let venue = Arc::new(SimulatedVenue::new(VenueId::from("SIM")));
        venue.script(Behavior::Fail);
        venue.script(Behavior::Fail);
        let registry = registry_with(Arc::clone(&venue), 10);

        let fills = place_with_retry(
            &registry,
            &VenueId::from("SIM"),
            &order(),
            &fast_policy(),
            Duration::from_secs(1),
            true,
        )
        .unwrap();
        assert_eq!(fills.len(), 1);
        assert_eq!(venue.place_calls(), 3);
    }

    #[test]
    fn test_retry_budget_exhausts() {
        let venue = Arc::new(SimulatedVenue::new(VenueId::from("SIM")));
        for _ in 0..10 {
            venue.script(Behavior::Fail);
        }
        let registry = registry_with(Arc::clone(&venue), 20);

        let err = place_with_retry(
            &registry,
            &VenueId::from("SIM"),
            &order(),
            &fast_policy(),
            Duration::from_secs(1),
            true,
        )
        .unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(venue.place_calls(), 4);
    }

    #[test]
    fn test_breaker_open_fails_fast() {
        let venue = Arc::new(SimulatedVenue::new(VenueId::from("SIM")));
        for _ in 0..10 {
            venue.script(Behavior::Fail);
        }
        // Threshold 2 trips during the first call's retries
        let registry = registry_with(Arc::clone(&venue), 2);

        let _ = place_with_retry(
            &registry,
            &VenueId::from("SIM"),
            &order(),
            &fast_policy(),
            Duration::from_secs(1),
            true,
        );

        let calls_before = venue.place_calls();
        let err = place_with_retry(
            &registry,
            &VenueId::from("SIM"),
            &order(),
            &fast_policy(),
            Duration::from_secs(1),
            true,
        )
        .unwrap_err();
        assert_eq!(err.code(), "BREAKER_OPEN");
        // Fast fail: the venue was never touched
        assert_eq!(venue.place_calls(), calls_before);
    }

    #[test]
    fn test_deadline_yields_timeout() {
        let venue = Arc::new(SimulatedVenue::new(VenueId::from("SIM")));
        for _ in 0..10 {
            venue.script(Behavior::Fail);
        }
        let registry = registry_with(Arc::clone(&venue), 20);

        let policy = RetryPolicy {
            base_delay: Duration::from_millis(50),
            max_delay: Duration::from_millis(50),
            max_attempts: 10,
            jitter: 0.0,
        };
        let err = place_with_retry(
            &registry,
            &VenueId::from("SIM"),
            &order(),
            &policy,
            Duration::from_millis(20),
            true,
        )
        .unwrap_err();
        assert!(matches!(err, ExecutionError::Timeout { .. }));
    }

    #[test]
    fn test_rejection_is_not_retried() {
        let venue = Arc::new(SimulatedVenue::new(VenueId::from("SIM")));
        venue.script(Behavior::Reject {
            detail: "unknown instrument".into(),
        });
        let registry = registry_with(Arc::clone(&venue), 5);

        let err = place_with_retry(
            &registry,
            &VenueId::from("SIM"),
            &order(),
            &fast_policy(),
            Duration::from_secs(1),
            true,
        )
        .unwrap_err();
        assert!(!err.is_retryable());
        assert_eq!(venue.place_calls(), 1);
    }

    #[test]
    fn test_unknown_venue() {
        let registry = VenueRegistry::new();
        let err = place_with_retry(
            &registry,
            &VenueId::from("NOPE"),
            &order(),
            &fast_policy(),
            Duration::from_secs(1),
            true,
        )
        .unwrap_err();
        assert_eq!(err.code(), "VENUE_UNAVAILABLE");
    }
}
