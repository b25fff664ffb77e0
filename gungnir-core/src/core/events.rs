//! Lifecycle states and the event bus
//!
//! Every state transition emits one immutable `LifecycleEvent`. Events are
//! the sole channel other components use to observe order progress; nothing
//! reaches into another component's mutable state.

use crate::core::order::Trade;
use crate::core::types::{OrderId, TradeId};
use crossbeam::channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::SystemTime;
use tracing::debug;

/// Canonical order lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum LifecycleState {
    /// Created, not yet through risk checks
    New = 0,
    /// Undergoing pre-trade risk validation
    RiskPending = 1,
    /// Risk passed, handed to matching or a venue
    Routed = 2,
    /// Some quantity filled, remainder still live
    PartiallyFilled = 3,
    /// Terminal: remaining reached zero
    Filled = 4,
    /// Terminal: user cancel or IOC/FOK cancel-of-remainder
    Cancelled = 5,
    /// Terminal: risk or validation failure
    Rejected = 6,
    /// Terminal: unrecoverable downstream error
    Failed = 7,
}

impl LifecycleState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            LifecycleState::Filled
                | LifecycleState::Cancelled
                | LifecycleState::Rejected
                | LifecycleState::Failed
        )
    }
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LifecycleState::New => "NEW",
            LifecycleState::RiskPending => "RISK_PENDING",
            LifecycleState::Routed => "ROUTED",
            LifecycleState::PartiallyFilled => "PARTIALLY_FILLED",
            LifecycleState::Filled => "FILLED",
            LifecycleState::Cancelled => "CANCELLED",
            LifecycleState::Rejected => "REJECTED",
            LifecycleState::Failed => "FAILED",
        };
        write!(f, "{}", s)
    }
}

/// The fact that caused a lifecycle transition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TransitionCause {
    Submitted,
    RiskPassed,
    RiskRejected { code: String, detail: String },
    ValidationRejected { code: String, detail: String },
    Fill { trade_id: TradeId },
    CancelRequest,
    /// IOC remainder or user cancel of a partially filled order;
    /// already-filled quantity stays in the trade records
    RemainderCancelled,
    VenueError { detail: String },
    /// Venue deadline expired; terminal state carries a status-unknown
    /// annotation and is subject to manual reconciliation
    StatusUnknown,
}

/// Immutable record of one lifecycle transition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleEvent {
    pub order_id: OrderId,
    pub old_state: LifecycleState,
    pub new_state: LifecycleState,
    pub cause: TransitionCause,
    pub at: SystemTime,
}

/// Everything the core publishes for external consumers
/// (position tracking, UI layers)
#[derive(Debug, Clone)]
pub enum EngineEvent {
    Lifecycle(LifecycleEvent),
    Trade(Trade),
}

/// Fan-out bus for engine events
///
/// Subscribers get an unbounded crossbeam receiver; disconnected
/// subscribers are dropped on the next publish.
#[derive(Clone, Default)]
pub struct EventBus {
    subscribers: Arc<Mutex<Vec<Sender<Arc<EngineEvent>>>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new subscriber
    pub fn subscribe(&self) -> Receiver<Arc<EngineEvent>> {
        let (tx, rx) = unbounded();
        self.subscribers.lock().push(tx);
        rx
    }

    /// Publish an event to all live subscribers
    pub fn publish(&self, event: EngineEvent) {
        let event = Arc::new(event);
        let mut subs = self.subscribers.lock();
        subs.retain(|tx| tx.send(Arc::clone(&event)).is_ok());
        debug!(subscribers = subs.len(), "published engine event");
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(LifecycleState::Filled.is_terminal());
        assert!(LifecycleState::Cancelled.is_terminal());
        assert!(LifecycleState::Rejected.is_terminal());
        assert!(LifecycleState::Failed.is_terminal());
        assert!(!LifecycleState::New.is_terminal());
        assert!(!LifecycleState::Routed.is_terminal());
        assert!(!LifecycleState::PartiallyFilled.is_terminal());
    }

    #[test]
    fn test_event_bus_fan_out() {
        let bus = EventBus::new();
        let rx1 = bus.subscribe();
        let rx2 = bus.subscribe();

        let event = LifecycleEvent {
            order_id: OrderId::generate(),
            old_state: LifecycleState::New,
            new_state: LifecycleState::RiskPending,
            cause: TransitionCause::Submitted,
            at: SystemTime::now(),
        };
        bus.publish(EngineEvent::Lifecycle(event));

        assert!(matches!(&*rx1.recv().unwrap(), EngineEvent::Lifecycle(_)));
        assert!(matches!(&*rx2.recv().unwrap(), EngineEvent::Lifecycle(_)));
    }

    #[test]
    fn test_event_bus_drops_disconnected() {
        let bus = EventBus::new();
        {
            let _rx = bus.subscribe();
        } // receiver dropped here

        let event = LifecycleEvent {
            order_id: OrderId::generate(),
            old_state: LifecycleState::New,
            new_state: LifecycleState::Rejected,
            cause: TransitionCause::ValidationRejected {
                code: "MALFORMED_ORDER".to_string(),
                detail: "test".to_string(),
            },
            at: SystemTime::now(),
        };
        bus.publish(EngineEvent::Lifecycle(event));
        assert_eq!(bus.subscriber_count(), 0);
    }
}
