//! Order and trade records
//!
//! `Order` is the mutable unit the matching engine and lifecycle manager
//! operate on; `Trade` is immutable once created. The quantity invariant
//! `0 < remaining <= quantity` is enforced here: any decrement that would
//! go negative is an error, never a silent clamp.

use crate::core::types::{
    AccountId, LiquidityFlag, OrderId, OrderType, Side, Symbol, TimeInForce, TradeId,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::SystemTime;

/// Errors that can occur when applying a fill to an order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FillError {
    /// Fill quantity is zero
    ZeroQuantity,
    /// Fill quantity exceeds remaining order quantity
    ExceedsRemaining {
        fill_qty: Decimal,
        remaining: Decimal,
        quantity: Decimal,
    },
}

impl std::fmt::Display for FillError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FillError::ZeroQuantity => write!(f, "fill quantity cannot be zero"),
            FillError::ExceedsRemaining {
                fill_qty,
                remaining,
                quantity,
            } => write!(
                f,
                "fill quantity {} exceeds remaining {} (total order: {})",
                fill_qty, remaining, quantity
            ),
        }
    }
}

impl std::error::Error for FillError {}

/// A trading order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub symbol: Symbol,
    pub side: Side,
    pub order_type: OrderType,

    /// Original quantity, never mutated after creation
    pub quantity: Decimal,

    /// Open quantity still to be filled; `0 < remaining <= quantity`
    /// while the order is live
    pub remaining: Decimal,

    /// Required for Limit and StopLimit orders
    pub limit_price: Option<Decimal>,

    /// Trigger price for Stop and StopLimit orders
    pub stop_price: Option<Decimal>,

    pub time_in_force: TimeInForce,
    pub account: AccountId,

    pub created_at: SystemTime,

    /// Strictly increasing per instrument; time priority within a price level
    pub sequence: u64,
}

impl Order {
    /// Quantity filled so far
    pub fn filled(&self) -> Decimal {
        self.quantity - self.remaining
    }

    pub fn is_fully_filled(&self) -> bool {
        self.remaining.is_zero()
    }

    /// Apply a fill, decrementing the remaining quantity
    ///
    /// Rejects zero fills and any fill that would take remaining negative.
    /// The caller (the book) escalates `ExceedsRemaining` to a fatal
    /// consistency error for the instrument.
    pub fn fill(&mut self, qty: Decimal) -> Result<(), FillError> {
        if qty.is_zero() || qty.is_sign_negative() {
            return Err(FillError::ZeroQuantity);
        }
        if qty > self.remaining {
            return Err(FillError::ExceedsRemaining {
                fill_qty: qty,
                remaining: self.remaining,
                quantity: self.quantity,
            });
        }
        self.remaining -= qty;
        Ok(())
    }

    /// Whether this order is willing to trade at `price`
    pub fn crosses(&self, price: Decimal) -> bool {
        match (self.order_type, self.limit_price) {
            (OrderType::Market, _) => true,
            (_, Some(limit)) => match self.side {
                Side::Buy => price <= limit,
                Side::Sell => price >= limit,
            },
            // Limit/StopLimit without a price never reaches the book;
            // request validation rejects it first
            (_, None) => false,
        }
    }

    /// Estimated notional value for risk checks
    ///
    /// Limit orders use their limit price. Market orders use the last trade
    /// price with a 5% buffer since the execution price is unknown.
    pub fn estimated_value(&self, last_price: Decimal) -> Decimal {
        use rust_decimal_macros::dec;
        let reference = match self.limit_price {
            Some(limit) if self.order_type != OrderType::Market => limit,
            _ => last_price * dec!(1.05),
        };
        reference * self.quantity
    }
}

/// An immutable execution record
///
/// Created exactly when both contributing orders' remaining quantities are
/// decremented; never modified or reversed afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub id: TradeId,
    pub symbol: Symbol,
    pub price: Decimal,
    pub quantity: Decimal,

    /// The incoming (aggressing) order
    pub taker_order: OrderId,
    /// The resting order that provided liquidity
    pub maker_order: OrderId,

    /// Flag from the perspective of the incoming order
    pub taker_flag: LiquidityFlag,

    pub executed_at: SystemTime,
}

impl Trade {
    pub fn new(
        symbol: Symbol,
        price: Decimal,
        quantity: Decimal,
        taker_order: OrderId,
        maker_order: OrderId,
    ) -> Self {
        Self {
            id: TradeId::generate(),
            symbol,
            price,
            quantity,
            taker_order,
            maker_order,
            taker_flag: LiquidityFlag::Taker,
            executed_at: SystemTime::now(),
        }
    }
}
