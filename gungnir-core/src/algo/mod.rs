//! Sliced execution schedules
//!
//! Works a large parent order as a series of child orders through
//! `ExecutionEngine::submit_order`, so every slice passes validation, the
//! risk gate, and routing like any directly-entered order. The slicer
//! holds no locks and keeps no state beyond the report it returns; a
//! rejected child stops the schedule rather than hammering the gate.

use crate::core::types::{OrderId, Side, Symbol};
use crate::engine::{ExecutionEngine, OrderRequest};
use rust_decimal::{Decimal, RoundingStrategy};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{info, warn};

/// How a parent order is broken into children
#[derive(Debug, Clone)]
pub enum SliceStrategy {
    /// Equal child sizes, one per interval; the last child absorbs the
    /// rounding remainder
    TimeSliced { slices: u32 },
    /// Child size capped at a fraction of the displayed quantity at the
    /// best opposite price, re-read before each child
    Participation { max_fraction: Decimal },
}

/// What became of the parent quantity
#[derive(Debug, Default)]
pub struct SliceReport {
    pub children: Vec<OrderId>,
    /// Quantity handed to the engine
    pub submitted: Decimal,
    /// Quantity never submitted: a child was rejected or displayed
    /// liquidity ran out
    pub unplaced: Decimal,
}

pub struct ExecutionSlicer {
    engine: Arc<ExecutionEngine>,
    interval: Duration,
}

impl ExecutionSlicer {
    pub fn new(engine: Arc<ExecutionEngine>, interval: Duration) -> Self {
        Self { engine, interval }
    }

    /// Work `parent` according to `strategy`, pausing `interval` between
    /// children
    ///
    /// Quantity already submitted stands whatever happens to later
    /// children; the rest is reported as unplaced.
    pub fn execute(&self, parent: OrderRequest, strategy: &SliceStrategy) -> SliceReport {
        match strategy {
            SliceStrategy::TimeSliced { slices } => self.run_time_sliced(parent, *slices),
            SliceStrategy::Participation { max_fraction } => {
                self.run_participation(parent, *max_fraction)
            }
        }
    }

    fn run_time_sliced(&self, parent: OrderRequest, slices: u32) -> SliceReport {
        let mut report = SliceReport::default();
        let plan = even_slices(parent.quantity, slices);
        info!(symbol = %parent.symbol, children = plan.len(), "time-sliced schedule start");

        for (i, qty) in plan.into_iter().enumerate() {
            if i > 0 {
                self.pause();
            }
            if !self.submit_child(&parent, qty, &mut report) {
                break;
            }
        }
        report.unplaced = parent.quantity - report.submitted;
        report
    }

    fn run_participation(&self, parent: OrderRequest, max_fraction: Decimal) -> SliceReport {
        let mut report = SliceReport::default();
        let mut remaining = parent.quantity;
        let mut first = true;

        while remaining > Decimal::ZERO {
            if !first {
                self.pause();
            }
            first = false;

            let visible = self.displayed_opposite(&parent.symbol, parent.side);
            let cap = (visible * max_fraction).round_dp_with_strategy(8, RoundingStrategy::ToZero);
            let qty = remaining.min(cap);
            if qty <= Decimal::ZERO {
                warn!(symbol = %parent.symbol, %remaining, "no displayed liquidity, schedule halted");
                break;
            }
            if !self.submit_child(&parent, qty, &mut report) {
                break;
            }
            remaining -= qty;
        }
        report.unplaced = remaining;
        report
    }

    fn submit_child(&self, parent: &OrderRequest, qty: Decimal, report: &mut SliceReport) -> bool {
        let child = OrderRequest {
            quantity: qty,
            ..parent.clone()
        };
        match self.engine.submit_order(child) {
            Ok(id) => {
                report.children.push(id);
                report.submitted += qty;
                true
            }
            Err(err) => {
                warn!(error = %err, %qty, "child order rejected, schedule halted");
                false
            }
        }
    }

    /// Displayed quantity at the best price on the side this order would
    /// take liquidity from
    fn displayed_opposite(&self, symbol: &Symbol, side: Side) -> Decimal {
        let (best, quote_side) = match side {
            Side::Buy => (self.engine.best_ask(symbol), Side::Sell),
            Side::Sell => (self.engine.best_bid(symbol), Side::Buy),
        };
        best.map(|price| self.engine.quantity_at(symbol, quote_side, price))
            .unwrap_or(Decimal::ZERO)
    }

    fn pause(&self) {
        if !self.interval.is_zero() {
            thread::sleep(self.interval);
        }
    }
}

/// Split `total` into `slices` children whose sizes sum exactly to it
fn even_slices(total: Decimal, slices: u32) -> Vec<Decimal> {
    let n = slices.max(1);
    let base = (total / Decimal::from(n)).round_dp_with_strategy(8, RoundingStrategy::ToZero);
    if base.is_zero() {
        return vec![total];
    }
    let mut plan = vec![base; (n - 1) as usize];
    plan.push(total - base * Decimal::from(n - 1));
    plan
}
