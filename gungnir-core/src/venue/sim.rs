//! Scriptable in-process venue
//!
//! Default behavior is an immediate full fill at the order's limit price
//! (or a fixed reference price for market orders). Tests and the paper
//! trading binary push `Behavior` entries to script failures, partial
//! fills, and rejections for upcoming calls.

use crate::core::errors::{reason, CoreResult, ExecutionError};
use crate::core::order::Order;
use crate::core::types::{AccountId, OrderId, OrderType, TradeId, VenueId};
use crate::risk::Position;
use crate::venue::{VenueAdapter, VenueFill, VenueOrderStatus};
use dashmap::DashMap;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

/// What the next `place_order` call should do
#[derive(Debug, Clone)]
pub enum Behavior {
    /// Fill the full quantity at the given price
    FillAt { price: Decimal },
    /// Fill part of the quantity, leaving the rest working
    PartialFill { price: Decimal, quantity: Decimal },
    /// Accept the order but fill nothing
    NoFill,
    /// Transient failure (connection reset, 5xx)
    Fail,
    /// Permanent rejection, not retryable
    Reject { detail: String },
}

const DEFAULT_REFERENCE_PRICE: Decimal = dec!(100);

pub struct SimulatedVenue {
    id: VenueId,
    script: Mutex<VecDeque<Behavior>>,
    statuses: DashMap<OrderId, VenueOrderStatus>,
    positions: DashMap<AccountId, Vec<Position>>,
    place_calls: AtomicU64,
}

impl SimulatedVenue {
    pub fn new(id: VenueId) -> Self {
        Self {
            id,
            script: Mutex::new(VecDeque::new()),
            statuses: DashMap::new(),
            positions: DashMap::new(),
            place_calls: AtomicU64::new(0),
        }
    }

    /// Queue a behavior for an upcoming `place_order` call
    pub fn script(&self, behavior: Behavior) {
        self.script.lock().push_back(behavior);
    }

    /// Seed venue-side positions for reconciliation tests
    pub fn set_positions(&self, account: AccountId, positions: Vec<Position>) {
        self.positions.insert(account, positions);
    }

    pub fn place_calls(&self) -> u64 {
        self.place_calls.load(Ordering::Relaxed)
    }

    fn fill_price(&self, order: &Order) -> Decimal {
        match order.order_type {
            OrderType::Market | OrderType::Stop => DEFAULT_REFERENCE_PRICE,
            _ => order.limit_price.unwrap_or(DEFAULT_REFERENCE_PRICE),
        }
    }
}

impl VenueAdapter for SimulatedVenue {
    fn id(&self) -> VenueId {
        self.id.clone()
    }

    fn place_order(&self, order: &Order) -> CoreResult<Vec<VenueFill>> {
        self.place_calls.fetch_add(1, Ordering::Relaxed);
        let behavior = self
            .script
            .lock()
            .pop_front()
            .unwrap_or(Behavior::FillAt {
                price: self.fill_price(order),
            });

        match behavior {
            Behavior::FillAt { price } => {
                self.statuses.insert(order.id, VenueOrderStatus::Filled);
                Ok(vec![VenueFill {
                    trade_id: TradeId::generate(),
                    order_id: order.id,
                    price,
                    quantity: order.remaining,
                    executed_at: SystemTime::now(),
                }])
            }
            Behavior::PartialFill { price, quantity } => {
                let filled = quantity.min(order.remaining);
                self.statuses
                    .insert(order.id, VenueOrderStatus::Working { filled });
                Ok(vec![VenueFill {
                    trade_id: TradeId::generate(),
                    order_id: order.id,
                    price,
                    quantity: filled,
                    executed_at: SystemTime::now(),
                }])
            }
            Behavior::NoFill => {
                self.statuses.insert(
                    order.id,
                    VenueOrderStatus::Working {
                        filled: Decimal::ZERO,
                    },
                );
                Ok(Vec::new())
            }
            Behavior::Fail => Err(ExecutionError::venue(self.id.clone(), "simulated outage")),
            Behavior::Reject { detail } => {
                Err(ExecutionError::validation(reason::MALFORMED_ORDER, detail))
            }
        }
    }

    fn cancel_order(&self, order_id: OrderId) -> CoreResult<()> {
        match self.statuses.get_mut(&order_id) {
            Some(mut status) => {
                if *status == VenueOrderStatus::Filled {
                    return Err(ExecutionError::validation(
                        reason::ORDER_TERMINAL,
                        format!("order {} already filled", order_id),
                    ));
                }
                *status = VenueOrderStatus::Cancelled;
                Ok(())
            }
            None => Err(ExecutionError::validation(
                reason::UNKNOWN_ORDER,
                format!("order {} not found at venue", order_id),
            )),
        }
    }

    fn order_status(&self, order_id: OrderId) -> CoreResult<VenueOrderStatus> {
        Ok(self
            .statuses
            .get(&order_id)
            .map(|s| s.clone())
            .unwrap_or(VenueOrderStatus::Unknown))
    }

    fn positions(&self, account: &AccountId) -> CoreResult<Vec<Position>> {
        Ok(self
            .positions
            .get(account)
            .map(|p| p.clone())
            .unwrap_or_default())
    }
}
