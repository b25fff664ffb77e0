//! Order lifecycle tracking
//!
//! Single source of truth for order state. Every state change flows through
//! `transition`, which enforces the legal-transition table, appends to the
//! order's event history, and publishes the event before returning. Invalid
//! transitions are rejected with the order state untouched.
//!
//! ```text
//! NEW ─► RISK_PENDING ─► ROUTED ─► PARTIALLY_FILLED ─► FILLED
//!  │          │            │   │        │    │
//!  └──────────┴─► REJECTED ┘   │        │    └─► CANCELLED
//!                              │        └──────► FAILED
//!                              └─► FILLED / CANCELLED / FAILED
//! ```

use crate::core::errors::{reason, CoreResult, ExecutionError};
use crate::core::events::{EngineEvent, EventBus, LifecycleEvent, TransitionCause};
use crate::core::order::Order;
use crate::core::types::OrderId;
use crate::core::LifecycleState;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Instant, SystemTime};
use tracing::{debug, info};

/// An order plus everything the engine knows about its progress
#[derive(Debug, Clone)]
pub struct OrderRecord {
    pub order: Order,
    pub state: LifecycleState,
    pub history: Vec<LifecycleEvent>,
    terminal_at: Option<Instant>,
}

/// Whether `to` is reachable from `from` in one step
fn transition_allowed(from: LifecycleState, to: LifecycleState) -> bool {
    use LifecycleState::*;
    match from {
        New => matches!(to, RiskPending | Rejected),
        RiskPending => matches!(to, Routed | Rejected),
        Routed => matches!(to, PartiallyFilled | Filled | Cancelled | Rejected | Failed),
        // Repeated partial fills stay in PartiallyFilled
        PartiallyFilled => matches!(to, PartiallyFilled | Filled | Cancelled | Failed),
        Filled | Cancelled | Rejected | Failed => false,
    }
}

pub struct OrderLifecycleManager {
    records: DashMap<OrderId, OrderRecord>,
    events: Arc<EventBus>,
}

impl OrderLifecycleManager {
    pub fn new(events: Arc<EventBus>) -> Self {
        Self {
            records: DashMap::new(),
            events,
        }
    }

    /// Admit a new order in state New
    pub fn register(&self, order: Order) -> CoreResult<()> {
        let id = order.id;
        match self.records.entry(id) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(ExecutionError::validation(
                reason::DUPLICATE_ORDER,
                format!("order {} already registered", id),
            )),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(OrderRecord {
                    order,
                    state: LifecycleState::New,
                    history: Vec::new(),
                    terminal_at: None,
                });
                debug!(order_id = %id, "order registered");
                Ok(())
            }
        }
    }

    /// Move an order to `new_state`, recording why
    ///
    /// The record is updated and the event published atomically with respect
    /// to other transitions on the same order.
    pub fn transition(
        &self,
        order_id: OrderId,
        new_state: LifecycleState,
        cause: TransitionCause,
    ) -> CoreResult<LifecycleEvent> {
        let mut record = self.records.get_mut(&order_id).ok_or_else(|| {
            ExecutionError::validation(reason::UNKNOWN_ORDER, format!("order {} not found", order_id))
        })?;

        let old_state = record.state;
        if old_state.is_terminal() {
            return Err(ExecutionError::validation(
                reason::ORDER_TERMINAL,
                format!("order {} is {} and cannot transition", order_id, old_state),
            ));
        }
        if !transition_allowed(old_state, new_state) {
            return Err(ExecutionError::Consistency {
                symbol: record.order.symbol.clone(),
                detail: format!(
                    "illegal transition {} -> {} for order {}",
                    old_state, new_state, order_id
                ),
            });
        }

        let event = LifecycleEvent {
            order_id,
            old_state,
            new_state,
            cause,
            at: SystemTime::now(),
        };
        record.state = new_state;
        record.history.push(event.clone());
        if new_state.is_terminal() {
            record.terminal_at = Some(Instant::now());
            info!(order_id = %order_id, state = %new_state, "order terminal");
        }
        drop(record);

        self.events.publish(EngineEvent::Lifecycle(event.clone()));
        Ok(event)
    }

    /// Record a fill against the order's remaining quantity and advance the
    /// state to PartiallyFilled or Filled accordingly
    pub fn record_fill(
        &self,
        order_id: OrderId,
        quantity: rust_decimal::Decimal,
        cause: TransitionCause,
    ) -> CoreResult<LifecycleEvent> {
        let fully_filled = {
            let mut record = self.records.get_mut(&order_id).ok_or_else(|| {
                ExecutionError::validation(
                    reason::UNKNOWN_ORDER,
                    format!("order {} not found", order_id),
                )
            })?;
            record.order.fill(quantity).map_err(|e| {
                ExecutionError::Consistency {
                    symbol: record.order.symbol.clone(),
                    detail: format!("fill bookkeeping failed for {}: {}", order_id, e),
                }
            })?;
            record.order.is_fully_filled()
        };

        let next = if fully_filled {
            LifecycleState::Filled
        } else {
            LifecycleState::PartiallyFilled
        };
        self.transition(order_id, next, cause)
    }

    pub fn state(&self, order_id: &OrderId) -> Option<LifecycleState> {
        self.records.get(order_id).map(|r| r.state)
    }

    pub fn record(&self, order_id: &OrderId) -> Option<OrderRecord> {
        self.records.get(order_id).map(|r| r.clone())
    }

    /// Full event history for one order, oldest first
    pub fn history(&self, order_id: &OrderId) -> Vec<LifecycleEvent> {
        self.records
            .get(order_id)
            .map(|r| r.history.clone())
            .unwrap_or_default()
    }

    /// Orders not yet in a terminal state
    pub fn active_orders(&self) -> Vec<OrderRecord> {
        self.records
            .iter()
            .filter(|r| !r.state.is_terminal())
            .map(|r| r.clone())
            .collect()
    }

    /// Drop terminal records older than `retention`, returning them so
    /// callers can release their own bookkeeping for the same orders
    ///
    /// Active orders are never swept regardless of age.
    pub fn sweep_terminal(&self, retention: std::time::Duration) -> Vec<OrderRecord> {
        let expired: Vec<OrderId> = self
            .records
            .iter()
            .filter(|r| matches!(r.terminal_at, Some(at) if at.elapsed() >= retention))
            .map(|r| r.order.id)
            .collect();

        let mut swept = Vec::with_capacity(expired.len());
        for id in expired {
            if let Some((_, record)) = self.records.remove(&id) {
                swept.push(record);
            }
        }
        if !swept.is_empty() {
            debug!(swept = swept.len(), "terminal order records swept");
        }
        swept
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
