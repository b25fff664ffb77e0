//! Risk gate: pre-trade validation, position tracking, circuit breaker
//!
//! Three collaborating layers, all of which must pass before an order
//! reaches matching or a venue:
//!
//! ```text
//! submit ──► pre-trade validator ──► circuit breaker ──► matching / venue
//!              order size                venue health
//!              projected position
//!              order value
//!              price range
//!              daily activity
//! ```
//!
//! The position risk monitor (`monitor`) runs on an interval, not per
//! order, and raises alerts rather than forcing order actions: forced
//! liquidation policy belongs to the caller.

pub mod circuit_breaker;
pub mod monitor;
pub mod types;

pub use circuit_breaker::{BreakerState, CircuitBreaker, CircuitBreakerConfig};
pub use monitor::{MonitorHandle, PositionRiskMonitor, RiskAlert};
pub use types::{Position, RiskParameters};

use crate::core::order::Order;
use crate::core::types::{AccountId, OrderType, Side, Symbol};
use dashmap::DashMap;
use rust_decimal::Decimal;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// A specific limit breach, carrying the observed and limiting values
///
/// Deterministic: identical parameters and position state always produce
/// the same violation for the same order.
#[derive(Debug, Clone, PartialEq)]
pub enum RiskViolation {
    OrderSizeExceeded {
        size: Decimal,
        limit: Decimal,
    },
    PositionSizeExceeded {
        observed: Decimal,
        limit: Decimal,
    },
    OrderValueExceeded {
        value: Decimal,
        limit: Decimal,
    },
    PriceOutOfRange {
        price: Decimal,
        last_price: Decimal,
        range_percent: Decimal,
    },
    DailyTradesExceeded {
        count: u64,
        limit: u64,
    },
    DailyVolumeExceeded {
        volume: Decimal,
        limit: Decimal,
    },
    /// Venue circuit breaker is open; submission paused
    CircuitBreakerOpen,
}

impl RiskViolation {
    /// Machine-readable reason code
    pub fn code(&self) -> &'static str {
        match self {
            RiskViolation::OrderSizeExceeded { .. } => "MAX_ORDER_SIZE",
            RiskViolation::PositionSizeExceeded { .. } => "MAX_POSITION_SIZE",
            RiskViolation::OrderValueExceeded { .. } => "MAX_ORDER_VALUE",
            RiskViolation::PriceOutOfRange { .. } => "PRICE_RANGE",
            RiskViolation::DailyTradesExceeded { .. } => "MAX_DAILY_TRADES",
            RiskViolation::DailyVolumeExceeded { .. } => "MAX_DAILY_VOLUME",
            RiskViolation::CircuitBreakerOpen => "BREAKER_OPEN",
        }
    }
}

impl fmt::Display for RiskViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RiskViolation::OrderSizeExceeded { size, limit } => {
                write!(f, "max order size: observed={} limit={}", size, limit)
            }
            RiskViolation::PositionSizeExceeded { observed, limit } => {
                write!(f, "max position size: observed={} limit={}", observed, limit)
            }
            RiskViolation::OrderValueExceeded { value, limit } => {
                write!(f, "max order value: observed={} limit={}", value, limit)
            }
            RiskViolation::PriceOutOfRange {
                price,
                last_price,
                range_percent,
            } => write!(
                f,
                "limit price {} outside {}% of last trade {}",
                price, range_percent, last_price
            ),
            RiskViolation::DailyTradesExceeded { count, limit } => {
                write!(f, "max daily trades: observed={} limit={}", count, limit)
            }
            RiskViolation::DailyVolumeExceeded { volume, limit } => {
                write!(f, "max daily volume: observed={} limit={}", volume, limit)
            }
            RiskViolation::CircuitBreakerOpen => {
                write!(f, "circuit breaker open, submissions paused")
            }
        }
    }
}

impl std::error::Error for RiskViolation {}

/// Per-account daily trading activity, reset at start of day
#[derive(Debug, Clone, Default)]
struct DailyActivity {
    trades: u64,
    volume: Decimal,
}

/// All open positions, keyed by account and instrument
///
/// Mutated only by confirmed fills (the execution monitor and the internal
/// matching path feed it); pre-trade checks read per-account snapshots.
#[derive(Default)]
pub struct PositionBook {
    positions: DashMap<(AccountId, Symbol), Position>,
}

impl PositionBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current position, flat if none exists yet
    pub fn position(&self, account: &AccountId, symbol: &Symbol) -> Position {
        self.positions
            .get(&(account.clone(), symbol.clone()))
            .map(|p| p.clone())
            .unwrap_or_else(|| Position::new(account.clone(), symbol.clone()))
    }

    /// Apply a confirmed fill, creating the position on first touch
    pub fn apply_fill(&self, account: &AccountId, symbol: &Symbol, side: Side, qty: Decimal, price: Decimal) {
        let mut entry = self
            .positions
            .entry((account.clone(), symbol.clone()))
            .or_insert_with(|| Position::new(account.clone(), symbol.clone()));
        entry.apply_fill(side, qty, price);
        debug!(account = %account, symbol = %symbol, "position updated: {}", *entry);
    }

    /// Clone of every open position; each entry is internally consistent
    /// even while fills land concurrently
    pub fn snapshot(&self) -> Vec<Position> {
        self.positions.iter().map(|e| e.value().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

/// Pre-trade validator over per-account risk parameters
///
/// Checks run sequentially; the first failure short-circuits with a
/// specific violation and no partial side effects.
pub struct RiskGate {
    accounts: DashMap<AccountId, RiskParameters>,
    default_params: RiskParameters,
    positions: Arc<PositionBook>,
    daily: DashMap<AccountId, DailyActivity>,
}

impl RiskGate {
    pub fn new(positions: Arc<PositionBook>) -> Self {
        Self::with_default_params(positions, RiskParameters::default())
    }

    /// Gate whose unconfigured accounts fall back to `default_params`
    pub fn with_default_params(positions: Arc<PositionBook>, default_params: RiskParameters) -> Self {
        Self {
            accounts: DashMap::new(),
            default_params,
            positions,
            daily: DashMap::new(),
        }
    }

    /// Install or refresh an account's limits (configuration surface)
    pub fn set_parameters(&self, account: AccountId, params: RiskParameters) {
        self.accounts.insert(account, params);
    }

    pub fn parameters_for(&self, account: &AccountId) -> RiskParameters {
        self.accounts
            .get(account)
            .map(|p| p.clone())
            .unwrap_or_else(|| self.default_params.clone())
    }

    pub fn positions(&self) -> &Arc<PositionBook> {
        &self.positions
    }

    /// Validate an order against the account's limits
    ///
    /// `last_price` is the instrument's last trade (or reference) price;
    /// price-based checks are skipped when none exists yet.
    pub fn validate(&self, order: &Order, last_price: Option<Decimal>) -> Result<(), RiskViolation> {
        let params = self.parameters_for(&order.account);

        // 1. Order size
        if order.quantity > params.max_order_size {
            return Err(RiskViolation::OrderSizeExceeded {
                size: order.quantity,
                limit: params.max_order_size,
            });
        }

        // 2. Projected position: current net +/- this order
        let position = self.positions.position(&order.account, &order.symbol);
        let projected = position.projected(order.side, order.quantity);
        if projected.abs() > params.max_position_size {
            return Err(RiskViolation::PositionSizeExceeded {
                observed: projected,
                limit: params.max_position_size,
            });
        }

        // 3. Estimated order value. Market orders price off the last trade
        // with a 5% buffer; without a reference the check cannot run.
        let value = match (order.order_type, order.limit_price, last_price) {
            (OrderType::Market, _, Some(last)) => Some(order.estimated_value(last)),
            (OrderType::Market, _, None) => None,
            (_, Some(_), last) => Some(order.estimated_value(last.unwrap_or(Decimal::ZERO))),
            (_, None, _) => None,
        };
        if let Some(value) = value {
            if value > params.max_order_value {
                return Err(RiskViolation::OrderValueExceeded {
                    value,
                    limit: params.max_order_value,
                });
            }
        }

        // 4. Limit price within range of the last trade (non-market only)
        if order.order_type != OrderType::Market {
            if let (Some(limit), Some(last)) = (order.limit_price, last_price) {
                if !last.is_zero() {
                    let distance_pct = ((limit - last).abs() / last) * Decimal::ONE_HUNDRED;
                    if distance_pct > params.price_range_percent {
                        return Err(RiskViolation::PriceOutOfRange {
                            price: limit,
                            last_price: last,
                            range_percent: params.price_range_percent,
                        });
                    }
                }
            }
        }

        // 5. Daily activity
        let activity = self
            .daily
            .get(&order.account)
            .map(|a| a.clone())
            .unwrap_or_default();
        if activity.trades + 1 > params.max_daily_trades {
            return Err(RiskViolation::DailyTradesExceeded {
                count: activity.trades + 1,
                limit: params.max_daily_trades,
            });
        }
        if activity.volume + order.quantity > params.max_daily_volume {
            return Err(RiskViolation::DailyVolumeExceeded {
                volume: activity.volume + order.quantity,
                limit: params.max_daily_volume,
            });
        }

        Ok(())
    }

    /// Count an admitted order toward the account's daily activity
    pub fn record_activity(&self, account: &AccountId, quantity: Decimal) {
        let mut entry = self.daily.entry(account.clone()).or_default();
        entry.trades += 1;
        entry.volume += quantity;
    }

    /// Reset daily counters (start of trading day)
    pub fn reset_daily(&self) {
        self.daily.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{OrderId, TimeInForce};
    use rust_decimal_macros::dec;
    use std::time::SystemTime;

    fn gate() -> RiskGate {
        let gate = RiskGate::new(Arc::new(PositionBook::new()));
        gate.set_parameters(
            AccountId::from("A"),
            RiskParameters {
                max_order_size: dec!(100),
                max_position_size: dec!(100),
                max_order_value: dec!(10_000),
                max_position_value: dec!(50_000),
                max_loss: dec!(1_000),
                price_range_percent: dec!(5),
                max_daily_trades: 10,
                max_daily_volume: dec!(500),
                circuit_breaker_enabled: true,
            },
        );
        gate
    }

    fn order(side: Side, qty: Decimal, limit: Option<Decimal>) -> Order {
        Order {
            id: OrderId::generate(),
            symbol: Symbol::from("BTC-USD"),
            side,
            order_type: if limit.is_some() {
                OrderType::Limit
            } else {
                OrderType::Market
            },
            quantity: qty,
            remaining: qty,
            limit_price: limit,
            stop_price: None,
            time_in_force: TimeInForce::Gtc,
            account: AccountId::from("A"),
            created_at: SystemTime::now(),
            sequence: 0,
        }
    }

    #[test]
    fn test_order_within_limits_passes() {
        let gate = gate();
        let o = order(Side::Buy, dec!(50), Some(dec!(100)));
        assert!(gate.validate(&o, Some(dec!(100))).is_ok());
    }

    #[test]
    fn test_order_size_check_first() {
        let gate = gate();
        let o = order(Side::Buy, dec!(150), Some(dec!(100)));
        let v = gate.validate(&o, Some(dec!(100))).unwrap_err();
        assert_eq!(v.code(), "MAX_ORDER_SIZE");
    }

    #[test]
    fn test_projected_position_rejection() {
        // Position limit 100, currently long 80: buying 50 projects to 130
        let gate = gate();
        gate.positions
            .apply_fill(&AccountId::from("A"), &Symbol::from("BTC-USD"), Side::Buy, dec!(80), dec!(100));

        let o = order(Side::Buy, dec!(50), Some(dec!(100)));
        let v = gate.validate(&o, Some(dec!(100))).unwrap_err();
        match v {
            RiskViolation::PositionSizeExceeded { observed, limit } => {
                assert_eq!(observed, dec!(130));
                assert_eq!(limit, dec!(100));
            }
            other => panic!("expected PositionSizeExceeded, got {:?}", other),
        }
    }

    #[test]
    fn test_projected_position_counts_direction() {
        let gate = gate();
        gate.positions
            .apply_fill(&AccountId::from("A"), &Symbol::from("BTC-USD"), Side::Buy, dec!(80), dec!(100));

        // Selling reduces the long; projected = 30
        let o = order(Side::Sell, dec!(50), Some(dec!(100)));
        assert!(gate.validate(&o, Some(dec!(100))).is_ok());
    }

    #[test]
    fn test_order_value_limit_order() {
        let gate = gate();
        // 100 * 101 = 10_100 > 10_000
        let o = order(Side::Buy, dec!(100), Some(dec!(101)));
        let v = gate.validate(&o, Some(dec!(100))).unwrap_err();
        // Price range check comes later; value trips first at 1% distance
        assert_eq!(v.code(), "MAX_ORDER_VALUE");
    }

    #[test]
    fn test_order_value_market_uses_buffer() {
        let gate = gate();
        // 96 * (100 * 1.05) = 10_080 > 10_000
        let o = order(Side::Buy, dec!(96), None);
        let v = gate.validate(&o, Some(dec!(100))).unwrap_err();
        assert_eq!(v.code(), "MAX_ORDER_VALUE");
    }

    #[test]
    fn test_price_range_check() {
        let gate = gate();
        let o = order(Side::Buy, dec!(10), Some(dec!(106)));
        let v = gate.validate(&o, Some(dec!(100))).unwrap_err();
        assert_eq!(v.code(), "PRICE_RANGE");

        // Exactly at the boundary passes
        let o = order(Side::Buy, dec!(10), Some(dec!(105)));
        assert!(gate.validate(&o, Some(dec!(100))).is_ok());
    }

    #[test]
    fn test_market_order_skips_price_range() {
        let gate = gate();
        let o = order(Side::Buy, dec!(10), None);
        assert!(gate.validate(&o, Some(dec!(100))).is_ok());
    }

    #[test]
    fn test_daily_trade_limit() {
        let gate = gate();
        for _ in 0..10 {
            gate.record_activity(&AccountId::from("A"), dec!(1));
        }
        let o = order(Side::Buy, dec!(1), Some(dec!(100)));
        let v = gate.validate(&o, Some(dec!(100))).unwrap_err();
        assert_eq!(v.code(), "MAX_DAILY_TRADES");

        gate.reset_daily();
        assert!(gate.validate(&o, Some(dec!(100))).is_ok());
    }

    #[test]
    fn test_daily_volume_limit() {
        let gate = gate();
        gate.record_activity(&AccountId::from("A"), dec!(480));
        let o = order(Side::Buy, dec!(30), Some(dec!(100)));
        let v = gate.validate(&o, Some(dec!(100))).unwrap_err();
        assert_eq!(v.code(), "MAX_DAILY_VOLUME");
    }

    #[test]
    fn test_rejection_is_deterministic() {
        let gate = gate();
        gate.positions
            .apply_fill(&AccountId::from("A"), &Symbol::from("BTC-USD"), Side::Buy, dec!(80), dec!(100));
        let o = order(Side::Buy, dec!(50), Some(dec!(100)));

        let first = gate.validate(&o, Some(dec!(100))).unwrap_err();
        let second = gate.validate(&o, Some(dec!(100))).unwrap_err();
        assert_eq!(first, second);
        assert_eq!(first.code(), second.code());
    }

    #[test]
    fn test_unknown_account_uses_defaults() {
        let gate = gate();
        let mut o = order(Side::Buy, dec!(50), Some(dec!(100)));
        o.account = AccountId::from("UNKNOWN");
        assert!(gate.validate(&o, Some(dec!(100))).is_ok());
    }
}
