//! Execution monitoring and reconciliation
//!
//! All confirmed executions funnel through here exactly once. Fills are
//! deduplicated on trade id before they touch order state or positions, so
//! a venue redelivering an execution report cannot double-count. A
//! background pass reconciles locally-active orders against venue-reported
//! status and escalates orders the venue no longer knows about.

use crate::core::errors::{CoreResult, ExecutionError};
use crate::core::events::{EngineEvent, EventBus, TransitionCause};
use crate::core::order::Trade;
use crate::core::types::{OrderId, TradeId, VenueId};
use crate::core::LifecycleState;
use crate::lifecycle::OrderLifecycleManager;
use crate::risk::PositionBook;
use crate::venue::{VenueFill, VenueOrderStatus, VenueRegistry};
use dashmap::DashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, warn};

pub struct ExecutionMonitor {
    lifecycle: Arc<OrderLifecycleManager>,
    positions: Arc<PositionBook>,
    registry: Arc<VenueRegistry>,
    events: Arc<EventBus>,
    seen_trades: DashSet<TradeId>,
    /// Which venue each routed order went to
    routes: dashmap::DashMap<OrderId, VenueId>,
}

impl ExecutionMonitor {
    pub fn new(
        lifecycle: Arc<OrderLifecycleManager>,
        positions: Arc<PositionBook>,
        registry: Arc<VenueRegistry>,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            lifecycle,
            positions,
            registry,
            events,
            seen_trades: DashSet::new(),
            routes: dashmap::DashMap::new(),
        }
    }

    /// Remember where an order was routed, for later reconciliation
    pub fn record_route(&self, order_id: OrderId, venue: VenueId) {
        self.routes.insert(order_id, venue);
    }

    pub fn route_of(&self, order_id: &OrderId) -> Option<VenueId> {
        self.routes.get(order_id).map(|v| v.clone())
    }

    /// Apply a venue execution report
    ///
    /// Returns Ok(false) for a duplicate trade id; nothing is mutated.
    pub fn apply_venue_fill(&self, fill: &VenueFill) -> CoreResult<bool> {
        if !self.seen_trades.insert(fill.trade_id) {
            debug!(trade_id = %fill.trade_id, "duplicate execution report ignored");
            return Ok(false);
        }

        let Some(record) = self.lifecycle.record(&fill.order_id) else {
            // Leave no dedupe entry behind for an order we never knew
            self.seen_trades.remove(&fill.trade_id);
            return Err(ExecutionError::validation(
                crate::core::errors::reason::UNKNOWN_ORDER,
                format!("fill for unknown order {}", fill.order_id),
            ));
        };

        self.lifecycle.record_fill(
            fill.order_id,
            fill.quantity,
            TransitionCause::Fill {
                trade_id: fill.trade_id,
            },
        )?;
        self.positions.apply_fill(
            &record.order.account,
            &record.order.symbol,
            record.order.side,
            fill.quantity,
            fill.price,
        );
        Ok(true)
    }

    /// Apply one internal match: both sides' lifecycle and positions move
    /// together, then the trade is published
    pub fn apply_book_trade(&self, trade: &Trade) -> CoreResult<bool> {
        if !self.seen_trades.insert(trade.id) {
            debug!(trade_id = %trade.id, "duplicate trade ignored");
            return Ok(false);
        }

        for order_id in [trade.taker_order, trade.maker_order] {
            // Both orders were registered before matching; a miss here is
            // a bookkeeping fault, not caller error
            let record = self.lifecycle.record(&order_id).ok_or_else(|| {
                ExecutionError::Consistency {
                    symbol: trade.symbol.clone(),
                    detail: format!("trade {} references unknown order {}", trade.id, order_id),
                }
            })?;
            self.lifecycle.record_fill(
                order_id,
                trade.quantity,
                TransitionCause::Fill { trade_id: trade.id },
            )?;
            self.positions.apply_fill(
                &record.order.account,
                &record.order.symbol,
                record.order.side,
                trade.quantity,
                trade.price,
            );
        }

        self.events.publish(EngineEvent::Trade(trade.clone()));
        Ok(true)
    }

    /// One reconciliation pass over locally-active routed orders
    ///
    /// Returns the number of orders whose state changed.
    pub fn reconcile_once(&self) -> usize {
        let mut changed = 0;

        for record in self.lifecycle.active_orders() {
            let order_id = record.order.id;
            let Some(venue) = self.routes.get(&order_id).map(|v| v.clone()) else {
                continue;
            };
            let Some(adapter) = self.registry.adapter(&venue) else {
                continue;
            };

            let status = match adapter.order_status(order_id) {
                Ok(status) => status,
                Err(err) => {
                    warn!(order_id = %order_id, venue = %venue, error = %err, "status query failed");
                    continue;
                }
            };

            match status {
                VenueOrderStatus::Working { .. } | VenueOrderStatus::Filled => {
                    // Working orders are fine; fills arrive through
                    // execution reports, not through status polling
                }
                VenueOrderStatus::Cancelled => {
                    info!(order_id = %order_id, venue = %venue, "venue reports cancelled, syncing");
                    if self
                        .lifecycle
                        .transition(order_id, LifecycleState::Cancelled, TransitionCause::CancelRequest)
                        .is_ok()
                    {
                        changed += 1;
                    }
                }
                VenueOrderStatus::Unknown => {
                    error!(order_id = %order_id, venue = %venue, "venue has no record of active order");
                    if self
                        .lifecycle
                        .transition(order_id, LifecycleState::Failed, TransitionCause::StatusUnknown)
                        .is_ok()
                    {
                        changed += 1;
                    }
                }
            }
        }
        changed
    }

    /// Sweep terminal order records past `retention` along with the
    /// monitor's own route and trade-id entries for them
    ///
    /// Returns the number of records swept. Without this the dedupe set
    /// and route map would grow for the life of the process.
    pub fn sweep(&self, retention: Duration) -> usize {
        let swept = self.lifecycle.sweep_terminal(retention);
        for record in &swept {
            self.routes.remove(&record.order.id);
            for event in &record.history {
                if let TransitionCause::Fill { trade_id } = &event.cause {
                    self.seen_trades.remove(trade_id);
                }
            }
        }
        swept.len()
    }

    /// Run reconciliation on `interval` until stopped; terminal order
    /// records past `retention` are swept on the same cadence
    pub fn spawn(self: Arc<Self>, interval: Duration, retention: Duration) -> ReconcilerHandle {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = Arc::clone(&stop);

        let handle = thread::Builder::new()
            .name("exec-monitor".into())
            .spawn(move || {
                info!(interval_ms = interval.as_millis() as u64, "execution monitor started");
                while !stop_flag.load(Ordering::Relaxed) {
                    self.reconcile_once();
                    self.sweep(retention);
                    thread::sleep(interval);
                }
                info!("execution monitor stopped");
            })
            .ok();

        ReconcilerHandle { stop, handle }
    }
}

pub struct ReconcilerHandle {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl ReconcilerHandle {
    pub fn stop(mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for ReconcilerHandle {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::order::Order;
    use crate::core::types::{AccountId, OrderType, Side, Symbol, TimeInForce};
    use crate::risk::CircuitBreakerConfig;
    use crate::venue::sim::Behavior;
    use crate::venue::{SimulatedVenue, VenueAdapter};
    use rust_decimal_macros::dec;
    use std::time::SystemTime;

    fn order(side: Side, account: &str) -> Order {
        Order {
            id: crate::core::types::OrderId::generate(),
            symbol: Symbol::from("BTC-USD"),
            side,
            order_type: OrderType::Limit,
            quantity: dec!(10),
            remaining: dec!(10),
            limit_price: Some(dec!(100)),
            stop_price: None,
            time_in_force: TimeInForce::Gtc,
            account: AccountId::from(account),
            created_at: SystemTime::now(),
            sequence: 0,
        }
    }

    struct Fixture {
        monitor: Arc<ExecutionMonitor>,
        lifecycle: Arc<OrderLifecycleManager>,
        positions: Arc<PositionBook>,
        venue: Arc<SimulatedVenue>,
    }

    fn fixture() -> Fixture {
        let events = Arc::new(EventBus::new());
        let lifecycle = Arc::new(OrderLifecycleManager::new(Arc::clone(&events)));
        let positions = Arc::new(PositionBook::new());
        let registry = Arc::new(VenueRegistry::new());
        let venue = Arc::new(SimulatedVenue::new(VenueId::from("SIM")));
        registry.register(Arc::clone(&venue) as Arc<dyn crate::venue::VenueAdapter>, CircuitBreakerConfig::default());

        let monitor = Arc::new(ExecutionMonitor::new(
            Arc::clone(&lifecycle),
            Arc::clone(&positions),
            registry,
            events,
        ));
        Fixture {
            monitor,
            lifecycle,
            positions,
            venue,
        }
    }

    fn routed(fx: &Fixture, o: &Order) {
        fx.lifecycle.register(o.clone()).unwrap();
        fx.lifecycle
            .transition(o.id, LifecycleState::RiskPending, TransitionCause::Submitted)
            .unwrap();
        fx.lifecycle
            .transition(o.id, LifecycleState::Routed, TransitionCause::RiskPassed)
            .unwrap();
        fx.monitor.record_route(o.id, VenueId::from("SIM"));
    }

    fn fill(o: &Order, qty: rust_decimal::Decimal) -> VenueFill {
        VenueFill {
            trade_id: TradeId::generate(),
            order_id: o.id,
            price: dec!(100),
            quantity: qty,
            executed_at: SystemTime::now(),
        }
    }

    #[test]
    fn test_venue_fill_updates_lifecycle_and_position() {
        let fx = fixture();
        let o = order(Side::Buy, "A");
        routed(&fx, &o);

        assert!(fx.monitor.apply_venue_fill(&fill(&o, dec!(10))).unwrap());
        assert_eq!(fx.lifecycle.state(&o.id), Some(LifecycleState::Filled));
        let pos = fx.positions.position(&AccountId::from("A"), &o.symbol);
        assert_eq!(pos.quantity, dec!(10));
    }

    #[test]
    fn test_duplicate_fill_applies_once() {
        let fx = fixture();
        let o = order(Side::Buy, "A");
        routed(&fx, &o);

        let f = fill(&o, dec!(4));
        assert!(fx.monitor.apply_venue_fill(&f).unwrap());
        // Same trade id redelivered
        assert!(!fx.monitor.apply_venue_fill(&f).unwrap());

        assert_eq!(fx.lifecycle.state(&o.id), Some(LifecycleState::PartiallyFilled));
        let pos = fx.positions.position(&AccountId::from("A"), &o.symbol);
        assert_eq!(pos.quantity, dec!(4));
    }

    #[test]
    fn test_book_trade_moves_both_sides() {
        let fx = fixture();
        let taker = order(Side::Buy, "A");
        let maker = order(Side::Sell, "B");
        routed(&fx, &taker);
        routed(&fx, &maker);

        let trade = Trade::new(taker.symbol.clone(), dec!(100), dec!(10), taker.id, maker.id);
        assert!(fx.monitor.apply_book_trade(&trade).unwrap());

        assert_eq!(fx.lifecycle.state(&taker.id), Some(LifecycleState::Filled));
        assert_eq!(fx.lifecycle.state(&maker.id), Some(LifecycleState::Filled));
        assert_eq!(
            fx.positions.position(&AccountId::from("A"), &taker.symbol).quantity,
            dec!(10)
        );
        assert_eq!(
            fx.positions.position(&AccountId::from("B"), &maker.symbol).quantity,
            dec!(-10)
        );
    }

    #[test]
    fn test_reconcile_syncs_venue_cancel() {
        let fx = fixture();
        let o = order(Side::Buy, "A");
        routed(&fx, &o);
        fx.venue.script(Behavior::NoFill);
        fx.venue.place_order(&o).unwrap();
        fx.venue.cancel_order(o.id).unwrap();

        assert_eq!(fx.monitor.reconcile_once(), 1);
        assert_eq!(fx.lifecycle.state(&o.id), Some(LifecycleState::Cancelled));
    }

    #[test]
    fn test_reconcile_escalates_unknown_order() {
        let fx = fixture();
        let o = order(Side::Buy, "A");
        routed(&fx, &o);
        // Never placed at the venue: status comes back Unknown

        assert_eq!(fx.monitor.reconcile_once(), 1);
        assert_eq!(fx.lifecycle.state(&o.id), Some(LifecycleState::Failed));
        let history = fx.lifecycle.history(&o.id);
        assert!(matches!(
            history.last().map(|e| &e.cause),
            Some(TransitionCause::StatusUnknown)
        ));
    }

    #[test]
    fn test_reconcile_leaves_working_orders_alone() {
        let fx = fixture();
        let o = order(Side::Buy, "A");
        routed(&fx, &o);
        fx.venue.script(Behavior::NoFill);
        fx.venue.place_order(&o).unwrap();

        assert_eq!(fx.monitor.reconcile_once(), 0);
        assert_eq!(fx.lifecycle.state(&o.id), Some(LifecycleState::Routed));
    }

    #[test]
    fn test_sweep_drops_monitor_bookkeeping() {
        let fx = fixture();
        let o = order(Side::Buy, "A");
        routed(&fx, &o);
        let f = fill(&o, dec!(10));
        assert!(fx.monitor.apply_venue_fill(&f).unwrap());
        assert_eq!(fx.lifecycle.state(&o.id), Some(LifecycleState::Filled));

        // Zero retention sweeps the filled order's record together with
        // the monitor's route and trade-id entries for it
        assert_eq!(fx.monitor.sweep(Duration::ZERO), 1);
        assert!(fx.monitor.route_of(&o.id).is_none());

        // The redelivered fill now misses on the order, not on dedupe,
        // so the trade-id set was pruned as well
        let err = fx.monitor.apply_venue_fill(&f).unwrap_err();
        assert_eq!(err.code(), crate::core::errors::reason::UNKNOWN_ORDER);
    }
}
