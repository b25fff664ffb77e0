//! Risk configuration and position state

use crate::core::types::{AccountId, Side, Symbol};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Per-account risk limits
///
/// Owned by account configuration; the core reads them at validation time
/// and never mutates them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskParameters {
    /// Maximum quantity per order
    pub max_order_size: Decimal,

    /// Maximum absolute net position per instrument
    pub max_position_size: Decimal,

    /// Maximum estimated notional value per order
    pub max_order_value: Decimal,

    /// Maximum absolute position value per instrument (monitor sweep)
    pub max_position_value: Decimal,

    /// Maximum unrealized loss per position before an alert (positive value)
    pub max_loss: Decimal,

    /// Acceptable limit-price distance from last trade, as a percentage
    /// (e.g. 5 means last +/- 5%)
    pub price_range_percent: Decimal,

    /// Maximum trades per day
    pub max_daily_trades: u64,

    /// Maximum traded quantity per day
    pub max_daily_volume: Decimal,

    /// Whether the venue circuit breaker gates this account's orders
    #[serde(default = "default_true")]
    pub circuit_breaker_enabled: bool,
}

fn default_true() -> bool {
    true
}

impl Default for RiskParameters {
    fn default() -> Self {
        use rust_decimal_macros::dec;
        Self {
            max_order_size: dec!(1000),
            max_position_size: dec!(5000),
            max_order_value: dec!(1_000_000),
            max_position_value: dec!(5_000_000),
            max_loss: dec!(100_000),
            price_range_percent: dec!(5),
            max_daily_trades: 10_000,
            max_daily_volume: dec!(100_000),
            circuit_breaker_enabled: true,
        }
    }
}

/// Per-account-per-instrument net position
///
/// Mutated only by confirmed fills, never by pending orders. Driven to zero
/// quantity rather than deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub account: AccountId,
    pub symbol: Symbol,

    /// Net quantity: positive = long, negative = short
    pub quantity: Decimal,

    /// Average entry price of the open quantity
    pub avg_entry_price: Decimal,

    /// PnL locked in by closing fills
    pub realized_pnl: Decimal,
}

impl Position {
    pub fn new(account: AccountId, symbol: Symbol) -> Self {
        Self {
            account,
            symbol,
            quantity: Decimal::ZERO,
            avg_entry_price: Decimal::ZERO,
            realized_pnl: Decimal::ZERO,
        }
    }

    pub fn is_flat(&self) -> bool {
        self.quantity.is_zero()
    }

    /// Net quantity after a hypothetical fill on `side` for `qty`
    pub fn projected(&self, side: Side, qty: Decimal) -> Decimal {
        match side {
            Side::Buy => self.quantity + qty,
            Side::Sell => self.quantity - qty,
        }
    }

    /// Unrealized PnL against a mark price
    pub fn unrealized_pnl(&self, mark: Decimal) -> Decimal {
        if self.quantity.is_zero() {
            Decimal::ZERO
        } else {
            (mark - self.avg_entry_price) * self.quantity
        }
    }

    /// Position notional value at a mark price
    pub fn value(&self, mark: Decimal) -> Decimal {
        (self.quantity * mark).abs()
    }

    /// Apply a confirmed fill
    ///
    /// Increasing fills move the average entry price; reducing fills realize
    /// PnL on the closed quantity. A fill that crosses through flat opens
    /// the residual at the fill price.
    pub fn apply_fill(&mut self, side: Side, qty: Decimal, price: Decimal) {
        let signed = match side {
            Side::Buy => qty,
            Side::Sell => -qty,
        };

        let same_direction = self.quantity.is_zero()
            || (self.quantity.is_sign_positive() == signed.is_sign_positive());

        if same_direction {
            let new_quantity = self.quantity + signed;
            // Weighted average entry over the combined quantity
            self.avg_entry_price = if new_quantity.is_zero() {
                Decimal::ZERO
            } else {
                (self.avg_entry_price * self.quantity + price * signed) / new_quantity
            };
            self.quantity = new_quantity;
        } else {
            let closing = signed.abs().min(self.quantity.abs());
            let direction = if self.quantity.is_sign_positive() {
                Decimal::ONE
            } else {
                -Decimal::ONE
            };
            self.realized_pnl += (price - self.avg_entry_price) * closing * direction;

            let residual = signed + self.quantity;
            if residual.is_zero() {
                self.quantity = Decimal::ZERO;
                self.avg_entry_price = Decimal::ZERO;
            } else if residual.is_sign_positive() == self.quantity.is_sign_positive() {
                // Partially closed, entry price unchanged
                self.quantity = residual;
            } else {
                // Crossed through flat: residual opens at the fill price
                self.quantity = residual;
                self.avg_entry_price = price;
            }
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}: qty={} avg={} realized={}",
            self.account, self.symbol, self.quantity, self.avg_entry_price, self.realized_pnl
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn pos() -> Position {
        Position::new(AccountId::from("A"), Symbol::from("BTC-USD"))
    }

    #[test]
    fn test_open_and_average() {
        let mut p = pos();
        p.apply_fill(Side::Buy, dec!(10), dec!(100));
        assert_eq!(p.quantity, dec!(10));
        assert_eq!(p.avg_entry_price, dec!(100));

        p.apply_fill(Side::Buy, dec!(10), dec!(110));
        assert_eq!(p.quantity, dec!(20));
        assert_eq!(p.avg_entry_price, dec!(105));
    }

    #[test]
    fn test_reduce_realizes_pnl() {
        let mut p = pos();
        p.apply_fill(Side::Buy, dec!(10), dec!(100));
        p.apply_fill(Side::Sell, dec!(4), dec!(110));

        assert_eq!(p.quantity, dec!(6));
        assert_eq!(p.avg_entry_price, dec!(100));
        assert_eq!(p.realized_pnl, dec!(40));
    }

    #[test]
    fn test_close_to_flat() {
        let mut p = pos();
        p.apply_fill(Side::Buy, dec!(10), dec!(100));
        p.apply_fill(Side::Sell, dec!(10), dec!(90));

        assert!(p.is_flat());
        assert_eq!(p.realized_pnl, dec!(-100));
        assert_eq!(p.avg_entry_price, Decimal::ZERO);
    }

    #[test]
    fn test_cross_through_flat() {
        let mut p = pos();
        p.apply_fill(Side::Buy, dec!(10), dec!(100));
        p.apply_fill(Side::Sell, dec!(15), dec!(110));

        // 10 closed at +10 each, 5 short opened at 110
        assert_eq!(p.quantity, dec!(-5));
        assert_eq!(p.avg_entry_price, dec!(110));
        assert_eq!(p.realized_pnl, dec!(100));
    }

    #[test]
    fn test_short_position_unrealized() {
        let mut p = pos();
        p.apply_fill(Side::Sell, dec!(10), dec!(100));
        assert_eq!(p.quantity, dec!(-10));
        // Short profits when the mark falls
        assert_eq!(p.unrealized_pnl(dec!(90)), dec!(100));
        assert_eq!(p.unrealized_pnl(dec!(110)), dec!(-100));
    }

    #[test]
    fn test_projected() {
        let mut p = pos();
        p.apply_fill(Side::Buy, dec!(80), dec!(100));
        assert_eq!(p.projected(Side::Buy, dec!(50)), dec!(130));
        assert_eq!(p.projected(Side::Sell, dec!(50)), dec!(30));
    }
}
