//! Order execution engine
//!
//! Wires the gate, books, router, venues, lifecycle, and monitor into one
//! submission path:
//!
//! ```text
//! submit ─► validate ─► risk gate ─► route ─► match / venue ─► fills
//!               │            │                     │
//!            REJECTED     REJECTED          lifecycle + positions
//! ```
//!
//! Concurrency model: each instrument's book is its own serialization
//! domain behind a mutex; orders for different instruments proceed in
//! parallel. Venue calls never run while a book lock is held.

use crate::book::{OrderBook, Remainder};
use crate::config::EngineConfig;
use crate::core::errors::{reason, CoreResult, ExecutionError};
use crate::core::events::{EventBus, TransitionCause};
use crate::core::order::Order;
use crate::core::types::{AccountId, OrderId, OrderType, Side, Symbol, TimeInForce};
use crate::core::LifecycleState;
use crate::lifecycle::OrderLifecycleManager;
use crate::monitor::{ExecutionMonitor, ReconcilerHandle};
use crate::risk::{MonitorHandle, PositionBook, PositionRiskMonitor, RiskGate};
use crate::router::{RouteResult, SmartRouter};
use crate::venue::{place_with_retry, VenueAdapter, VenueFill, VenueRegistry};
use dashmap::DashMap;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Instant, SystemTime};
use tracing::{info, warn};

/// Caller-facing order parameters; the engine assigns the id and sequence
#[derive(Debug, Clone)]
pub struct OrderRequest {
    pub symbol: Symbol,
    pub side: Side,
    pub order_type: OrderType,
    pub quantity: Decimal,
    pub limit_price: Option<Decimal>,
    pub stop_price: Option<Decimal>,
    pub time_in_force: TimeInForce,
    pub account: AccountId,
}

impl OrderRequest {
    pub fn limit(
        symbol: Symbol,
        side: Side,
        quantity: Decimal,
        price: Decimal,
        time_in_force: TimeInForce,
        account: AccountId,
    ) -> Self {
        Self {
            symbol,
            side,
            order_type: OrderType::Limit,
            quantity,
            limit_price: Some(price),
            stop_price: None,
            time_in_force,
            account,
        }
    }

    pub fn market(symbol: Symbol, side: Side, quantity: Decimal, account: AccountId) -> Self {
        Self {
            symbol,
            side,
            order_type: OrderType::Market,
            quantity,
            limit_price: None,
            stop_price: None,
            time_in_force: TimeInForce::Ioc,
            account,
        }
    }

    pub fn stop(
        symbol: Symbol,
        side: Side,
        quantity: Decimal,
        stop_price: Decimal,
        account: AccountId,
    ) -> Self {
        Self {
            symbol,
            side,
            order_type: OrderType::Stop,
            quantity,
            limit_price: None,
            stop_price: Some(stop_price),
            time_in_force: TimeInForce::Gtc,
            account,
        }
    }

    fn build(self) -> Order {
        Order {
            id: OrderId::generate(),
            symbol: self.symbol,
            side: self.side,
            order_type: self.order_type,
            quantity: self.quantity,
            remaining: self.quantity,
            limit_price: self.limit_price,
            stop_price: self.stop_price,
            time_in_force: self.time_in_force,
            account: self.account,
            created_at: SystemTime::now(),
            sequence: 0,
        }
    }
}

/// Background thread handles; dropping them stops the threads
pub struct EngineHandles {
    pub reconciler: ReconcilerHandle,
    pub risk_monitor: MonitorHandle,
}

pub struct ExecutionEngine {
    config: EngineConfig,
    books: DashMap<Symbol, Mutex<OrderBook>>,
    lifecycle: Arc<OrderLifecycleManager>,
    risk: Arc<RiskGate>,
    router: Arc<SmartRouter>,
    registry: Arc<VenueRegistry>,
    monitor: Arc<ExecutionMonitor>,
    events: Arc<EventBus>,
    /// Stop and stop-limit orders waiting for their trigger price
    pending_stops: DashMap<Symbol, Vec<Order>>,
    /// Last trade price per instrument, fed by both internal matches and
    /// venue fills
    last_prices: DashMap<Symbol, Decimal>,
}

impl ExecutionEngine {
    pub fn new(config: EngineConfig) -> Self {
        let events = Arc::new(EventBus::new());
        let lifecycle = Arc::new(OrderLifecycleManager::new(Arc::clone(&events)));
        let positions = Arc::new(PositionBook::new());

        let risk = Arc::new(RiskGate::with_default_params(
            Arc::clone(&positions),
            config.default_risk.clone(),
        ));
        for (account, params) in &config.accounts {
            risk.set_parameters(AccountId::new(account.clone()), params.clone());
        }

        let router = Arc::new(SmartRouter::new(config.router_weights.clone()));
        let registry = Arc::new(VenueRegistry::new());
        let monitor = Arc::new(ExecutionMonitor::new(
            Arc::clone(&lifecycle),
            positions,
            Arc::clone(&registry),
            Arc::clone(&events),
        ));

        Self {
            config,
            books: DashMap::new(),
            lifecycle,
            risk,
            router,
            registry,
            monitor,
            events,
            pending_stops: DashMap::new(),
            last_prices: DashMap::new(),
        }
    }

    /// Add an execution venue; orders route externally once any venue exists
    pub fn register_venue(&self, adapter: Arc<dyn VenueAdapter>, fee_bps: f64) {
        let id = adapter.id();
        self.registry.register(adapter, self.config.breaker_config());
        self.router.register_venue(id.clone(), fee_bps);
        info!(venue = %id, "venue registered");
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    pub fn lifecycle(&self) -> &Arc<OrderLifecycleManager> {
        &self.lifecycle
    }

    pub fn risk(&self) -> &Arc<RiskGate> {
        &self.risk
    }

    pub fn router(&self) -> &Arc<SmartRouter> {
        &self.router
    }

    pub fn monitor(&self) -> &Arc<ExecutionMonitor> {
        &self.monitor
    }

    pub fn last_price(&self, symbol: &Symbol) -> Option<Decimal> {
        self.last_prices.get(symbol).map(|p| *p)
    }

    /// Seed a reference price for an instrument that has not traded yet
    pub fn set_reference_price(&self, symbol: Symbol, price: Decimal) {
        self.book(&symbol).lock().set_reference_price(price);
        self.last_prices.entry(symbol).or_insert(price);
    }

    pub fn best_bid(&self, symbol: &Symbol) -> Option<Decimal> {
        self.books.get(symbol).and_then(|b| b.lock().best_bid())
    }

    pub fn best_ask(&self, symbol: &Symbol) -> Option<Decimal> {
        self.books.get(symbol).and_then(|b| b.lock().best_ask())
    }

    pub fn quantity_at(&self, symbol: &Symbol, side: Side, price: Decimal) -> Decimal {
        self.books
            .get(symbol)
            .map(|b| b.lock().quantity_at(side, price))
            .unwrap_or(Decimal::ZERO)
    }

    /// Start the reconciliation and risk sweep threads
    pub fn start(self: &Arc<Self>) -> EngineHandles {
        let reconciler = Arc::clone(&self.monitor).spawn(
            self.config.reconcile_interval(),
            self.config.terminal_retention(),
        );

        let risk_monitor = Arc::new(PositionRiskMonitor::new(Arc::clone(&self.risk)));
        let engine = Arc::clone(self);
        let risk_handle = risk_monitor.spawn(
            self.config.risk_sweep_interval(),
            Box::new(move || engine.mark_prices()),
        );

        EngineHandles {
            reconciler,
            risk_monitor: risk_handle,
        }
    }

    fn mark_prices(&self) -> HashMap<Symbol, Decimal> {
        self.last_prices
            .iter()
            .map(|e| (e.key().clone(), *e.value()))
            .collect()
    }

    /// Submit a new order
    ///
    /// Synchronous up to routing: the returned id can immediately be used
    /// to query state and history, including for rejected orders.
    pub fn submit_order(&self, request: OrderRequest) -> CoreResult<OrderId> {
        let order = request.build();
        let id = order.id;
        self.lifecycle.register(order.clone())?;

        if let Err(err) = validate_request(&order) {
            let _ = self.lifecycle.transition(
                id,
                LifecycleState::Rejected,
                TransitionCause::ValidationRejected {
                    code: err.code().into(),
                    detail: err.to_string(),
                },
            );
            return Err(err);
        }
        self.lifecycle
            .transition(id, LifecycleState::RiskPending, TransitionCause::Submitted)?;

        let last = self.last_price(&order.symbol);
        if let Err(violation) = self.risk.validate(&order, last) {
            let _ = self.lifecycle.transition(
                id,
                LifecycleState::Rejected,
                TransitionCause::RiskRejected {
                    code: violation.code().into(),
                    detail: violation.to_string(),
                },
            );
            return Err(violation.into());
        }
        self.risk.record_activity(&order.account, order.quantity);
        self.lifecycle
            .transition(id, LifecycleState::Routed, TransitionCause::RiskPassed)?;

        // Untriggered stops are held off-book until the trigger price prints
        if matches!(order.order_type, OrderType::Stop | OrderType::StopLimit) {
            let triggered = last.is_some_and(|price| stop_triggered(&order, price));
            if !triggered {
                self.pending_stops
                    .entry(order.symbol.clone())
                    .or_default()
                    .push(order);
                return Ok(id);
            }
            self.execute(activate_stop(order))?;
            return Ok(id);
        }

        self.execute(order)?;
        Ok(id)
    }

    /// Cancel an order wherever it currently lives
    pub fn cancel_order(&self, order_id: OrderId) -> CoreResult<()> {
        let record = self.lifecycle.record(&order_id).ok_or_else(|| {
            ExecutionError::validation(reason::UNKNOWN_ORDER, format!("order {} not found", order_id))
        })?;
        if record.state.is_terminal() {
            return Err(ExecutionError::validation(
                reason::ORDER_TERMINAL,
                format!("order {} is already {}", order_id, record.state),
            ));
        }
        let symbol = record.order.symbol.clone();

        // Parked stop: remove from the trigger queue
        if let Some(mut stops) = self.pending_stops.get_mut(&symbol) {
            if let Some(pos) = stops.iter().position(|o| o.id == order_id) {
                stops.remove(pos);
                drop(stops);
                self.lifecycle
                    .transition(order_id, LifecycleState::Cancelled, TransitionCause::CancelRequest)?;
                return Ok(());
            }
        }

        if let Some(venue) = self.monitor.route_of(&order_id) {
            let adapter = self.registry.adapter(&venue).ok_or_else(|| {
                ExecutionError::validation(
                    reason::VENUE_UNAVAILABLE,
                    format!("venue {} not registered", venue),
                )
            })?;
            adapter.cancel_order(order_id)?;
        } else {
            self.book(&symbol).lock().cancel(order_id)?;
        }

        self.lifecycle
            .transition(order_id, LifecycleState::Cancelled, TransitionCause::CancelRequest)?;
        Ok(())
    }

    /// Cancel-replace: the open quantity is resubmitted as a fresh order
    ///
    /// The replacement goes through full validation, risk checks, and
    /// routing again, and takes a new place in the queue. Returns the
    /// replacement's id.
    pub fn modify_order(
        &self,
        order_id: OrderId,
        new_quantity: Option<Decimal>,
        new_limit_price: Option<Decimal>,
    ) -> CoreResult<OrderId> {
        let record = self.lifecycle.record(&order_id).ok_or_else(|| {
            ExecutionError::validation(reason::UNKNOWN_ORDER, format!("order {} not found", order_id))
        })?;
        if record.state.is_terminal() {
            return Err(ExecutionError::validation(
                reason::ORDER_TERMINAL,
                format!("order {} is already {}", order_id, record.state),
            ));
        }

        self.cancel_order(order_id)?;

        let original = &record.order;
        let request = OrderRequest {
            symbol: original.symbol.clone(),
            side: original.side,
            order_type: original.order_type,
            quantity: new_quantity.unwrap_or(original.remaining),
            limit_price: new_limit_price.or(original.limit_price),
            stop_price: original.stop_price,
            time_in_force: original.time_in_force,
            account: original.account.clone(),
        };
        self.submit_order(request)
    }

    fn book(&self, symbol: &Symbol) -> dashmap::mapref::one::Ref<'_, Symbol, Mutex<OrderBook>> {
        if let Some(book) = self.books.get(symbol) {
            return book;
        }
        self.books
            .entry(symbol.clone())
            .or_insert_with(|| Mutex::new(OrderBook::new(symbol.clone())))
            .downgrade()
    }

    fn execute(&self, order: Order) -> CoreResult<()> {
        if self.registry.is_empty() {
            self.execute_internal(order)
        } else {
            self.execute_at_venue(order)
        }
    }

    /// Match against the internal book for this instrument
    fn execute_internal(&self, order: Order) -> CoreResult<()> {
        let id = order.id;
        let symbol = order.symbol.clone();

        let outcome = {
            let book = self.book(&symbol);
            let mut book = book.lock();
            match book.submit(order) {
                Ok(outcome) => outcome,
                Err(err @ ExecutionError::Consistency { .. }) => {
                    // Book is now offline; the order's true disposition is
                    // unrecoverable without a rebuild
                    let _ = self.lifecycle.transition(
                        id,
                        LifecycleState::Failed,
                        TransitionCause::VenueError {
                            detail: err.to_string(),
                        },
                    );
                    return Err(err);
                }
                Err(err) => {
                    let _ = self.lifecycle.transition(
                        id,
                        LifecycleState::Rejected,
                        TransitionCause::ValidationRejected {
                            code: err.code().into(),
                            detail: err.to_string(),
                        },
                    );
                    return Err(err);
                }
            }
        };

        let mut new_last = None;
        for trade in &outcome.fills {
            self.monitor.apply_book_trade(trade)?;
            self.last_prices.insert(symbol.clone(), trade.price);
            new_last = Some(trade.price);
        }

        match outcome.remainder {
            Remainder::None | Remainder::Rested(_) => {}
            Remainder::Cancelled(_) => {
                self.lifecycle.transition(
                    id,
                    LifecycleState::Cancelled,
                    TransitionCause::RemainderCancelled,
                )?;
            }
            Remainder::Rejected { code, .. } => {
                if outcome.fills.is_empty() {
                    let err = ExecutionError::validation(code, format!("order {} unfillable", id));
                    self.lifecycle.transition(
                        id,
                        LifecycleState::Rejected,
                        TransitionCause::ValidationRejected {
                            code: code.into(),
                            detail: err.to_string(),
                        },
                    )?;
                    return Err(err);
                }
                // Partially executed before liquidity ran out: the open
                // portion is cancelled, the fills stand
                self.lifecycle.transition(
                    id,
                    LifecycleState::Cancelled,
                    TransitionCause::RemainderCancelled,
                )?;
            }
        }

        if let Some(price) = new_last {
            self.trigger_stops(&symbol, price)?;
        }
        Ok(())
    }

    /// Route to the best venue and place with retries
    fn execute_at_venue(&self, order: Order) -> CoreResult<()> {
        let id = order.id;
        let mut eligible = self.registry.venue_ids();
        eligible.sort_by(|a, b| a.as_str().cmp(b.as_str()));

        let decision = self.router.route(&eligible)?;
        if decision.degraded {
            warn!(order_id = %id, venue = %decision.venue, "degraded routing decision");
        }
        self.monitor.record_route(id, decision.venue.clone());

        let params = self.risk.parameters_for(&order.account);
        let started = Instant::now();
        let placed = place_with_retry(
            &self.registry,
            &decision.venue,
            &order,
            &self.config.retry_policy(),
            self.config.venue_deadline(),
            params.circuit_breaker_enabled,
        );
        let latency = started.elapsed();

        match placed {
            Ok(fills) => {
                self.router.record_result(
                    &decision.venue,
                    &RouteResult {
                        filled: !fills.is_empty(),
                        latency,
                        improvement_bps: self.improvement_bps(&order, &fills),
                    },
                );
                for fill in &fills {
                    self.monitor.apply_venue_fill(fill)?;
                    self.last_prices.insert(order.symbol.clone(), fill.price);
                }
                if let Some(last) = fills.last() {
                    self.trigger_stops(&order.symbol, last.price)?;
                }
                Ok(())
            }
            Err(err) => {
                self.router.record_result(
                    &decision.venue,
                    &RouteResult {
                        filled: false,
                        latency,
                        improvement_bps: None,
                    },
                );
                let (state, cause) = match &err {
                    ExecutionError::Timeout { .. } => {
                        (LifecycleState::Failed, TransitionCause::StatusUnknown)
                    }
                    ExecutionError::Venue { detail, .. } => (
                        LifecycleState::Failed,
                        TransitionCause::VenueError {
                            detail: detail.clone(),
                        },
                    ),
                    ExecutionError::Risk(v) => (
                        LifecycleState::Rejected,
                        TransitionCause::RiskRejected {
                            code: v.code().into(),
                            detail: v.to_string(),
                        },
                    ),
                    other => (
                        LifecycleState::Rejected,
                        TransitionCause::ValidationRejected {
                            code: other.code().into(),
                            detail: other.to_string(),
                        },
                    ),
                };
                let _ = self.lifecycle.transition(id, state, cause);
                Err(err)
            }
        }
    }

    /// Fire parked stops whose trigger the new trade price reaches
    fn trigger_stops(&self, symbol: &Symbol, last: Decimal) -> CoreResult<()> {
        let fired: Vec<Order> = {
            let Some(mut stops) = self.pending_stops.get_mut(symbol) else {
                return Ok(());
            };
            let mut fired = Vec::new();
            let mut keep = Vec::with_capacity(stops.len());
            for stop in stops.drain(..) {
                if stop_triggered(&stop, last) {
                    fired.push(stop);
                } else {
                    keep.push(stop);
                }
            }
            *stops = keep;
            fired
        };

        for stop in fired {
            info!(order_id = %stop.id, symbol = %symbol, trigger = %last, "stop order triggered");
            // A triggered stop may itself print trades and cascade into
            // further triggers; recursion depth is bounded by the number
            // of parked stops
            self.execute(activate_stop(stop))?;
        }
        Ok(())
    }

    /// Average improvement versus the order's own reference price, in bps
    fn improvement_bps(&self, order: &Order, fills: &[VenueFill]) -> Option<f64> {
        let reference = order
            .limit_price
            .or_else(|| self.last_price(&order.symbol))?;
        if reference.is_zero() || fills.is_empty() {
            return None;
        }
        let notional: Decimal = fills.iter().map(|f| f.price * f.quantity).sum();
        let quantity: Decimal = fills.iter().map(|f| f.quantity).sum();
        let avg = notional / quantity;
        let signed = match order.side {
            Side::Buy => reference - avg,
            Side::Sell => avg - reference,
        };
        let bps = signed / reference * Decimal::from(10_000);
        rust_decimal::prelude::ToPrimitive::to_f64(&bps)
    }
}

/// Convert a triggered stop into its executable form
fn activate_stop(mut order: Order) -> Order {
    order.order_type = match order.order_type {
        OrderType::Stop => OrderType::Market,
        OrderType::StopLimit => OrderType::Limit,
        other => other,
    };
    order
}

fn stop_triggered(order: &Order, last: Decimal) -> bool {
    match (order.stop_price, order.side) {
        (Some(stop), Side::Buy) => last >= stop,
        (Some(stop), Side::Sell) => last <= stop,
        (None, _) => false,
    }
}

/// Structural checks that precede the risk gate
fn validate_request(order: &Order) -> CoreResult<()> {
    if order.quantity <= Decimal::ZERO {
        return Err(ExecutionError::validation(
            reason::MALFORMED_ORDER,
            "quantity must be positive",
        ));
    }
    match order.order_type {
        OrderType::Limit | OrderType::StopLimit => match order.limit_price {
            Some(price) if price > Decimal::ZERO => {}
            _ => {
                return Err(ExecutionError::validation(
                    reason::MALFORMED_ORDER,
                    "limit orders require a positive limit price",
                ))
            }
        },
        _ => {}
    }
    if matches!(order.order_type, OrderType::Stop | OrderType::StopLimit) {
        match order.stop_price {
            Some(price) if price > Decimal::ZERO => {}
            _ => {
                return Err(ExecutionError::validation(
                    reason::MALFORMED_ORDER,
                    "stop orders require a positive stop price",
                ))
            }
        }
    }
    if order.account.as_str().is_empty() {
        return Err(ExecutionError::validation(
            reason::UNKNOWN_ACCOUNT,
            "account must not be empty",
        ));
    }
    Ok(())
}
