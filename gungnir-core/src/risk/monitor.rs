//! Interval-based position risk monitor
//!
//! Sweeps the position book on a fixed interval and raises alerts for
//! positions outside their account's limits. Alert-only: it never cancels
//! or submits orders. Forced-liquidation policy lives with the operator.

use crate::core::types::Symbol;
use crate::risk::{RiskGate, RiskParameters};
use crossbeam::channel::{unbounded, Receiver, Sender};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{info, warn};

/// A limit breach observed during a sweep
#[derive(Debug, Clone, PartialEq)]
pub enum RiskAlert {
    PositionSizeBreach {
        position: String,
        observed: Decimal,
        limit: Decimal,
    },
    PositionValueBreach {
        position: String,
        observed: Decimal,
        limit: Decimal,
    },
    UnrealizedLossBreach {
        position: String,
        observed: Decimal,
        limit: Decimal,
    },
}

impl std::fmt::Display for RiskAlert {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RiskAlert::PositionSizeBreach {
                position,
                observed,
                limit,
            } => write!(f, "{}: position size {} exceeds {}", position, observed, limit),
            RiskAlert::PositionValueBreach {
                position,
                observed,
                limit,
            } => write!(f, "{}: position value {} exceeds {}", position, observed, limit),
            RiskAlert::UnrealizedLossBreach {
                position,
                observed,
                limit,
            } => write!(f, "{}: unrealized loss {} exceeds {}", position, observed, limit),
        }
    }
}

/// Supplies mark prices for the sweep (usually last trade per book)
pub type MarkProvider = Box<dyn Fn() -> HashMap<Symbol, Decimal> + Send>;

pub struct PositionRiskMonitor {
    gate: Arc<RiskGate>,
    alerts_tx: Sender<RiskAlert>,
    alerts_rx: Receiver<RiskAlert>,
}

impl PositionRiskMonitor {
    pub fn new(gate: Arc<RiskGate>) -> Self {
        let (alerts_tx, alerts_rx) = unbounded();
        Self {
            gate,
            alerts_tx,
            alerts_rx,
        }
    }

    /// Channel the sweep pushes alerts into
    pub fn alerts(&self) -> Receiver<RiskAlert> {
        self.alerts_rx.clone()
    }

    /// One sweep over a snapshot of all open positions
    ///
    /// Positions without a mark price are checked for size only; value and
    /// loss need a price.
    pub fn sweep(&self, marks: &HashMap<Symbol, Decimal>) -> Vec<RiskAlert> {
        let mut raised = Vec::new();

        for position in self.gate.positions().snapshot() {
            if position.is_flat() {
                continue;
            }
            let params = self.gate.parameters_for(&position.account);
            let label = format!("{}/{}", position.account, position.symbol);

            if position.quantity.abs() > params.max_position_size {
                raised.push(RiskAlert::PositionSizeBreach {
                    position: label.clone(),
                    observed: position.quantity,
                    limit: params.max_position_size,
                });
            }

            if let Some(mark) = marks.get(&position.symbol) {
                check_marked(&position, &params, *mark, &label, &mut raised);
            }
        }

        for alert in &raised {
            warn!(alert = %alert, "risk alert");
            // Drop alerts if nobody is listening rather than block the sweep
            let _ = self.alerts_tx.try_send(alert.clone());
        }
        raised
    }

    /// Run sweeps on `interval` until the returned handle is stopped
    pub fn spawn(self: Arc<Self>, interval: Duration, marks: MarkProvider) -> MonitorHandle {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = Arc::clone(&stop);

        let handle = thread::Builder::new()
            .name("risk-monitor".into())
            .spawn(move || {
                info!(interval_ms = interval.as_millis() as u64, "risk monitor started");
                while !stop_flag.load(Ordering::Relaxed) {
                    self.sweep(&marks());
                    thread::sleep(interval);
                }
                info!("risk monitor stopped");
            })
            .ok();

        MonitorHandle { stop, handle }
    }
}

fn check_marked(
    position: &crate::risk::Position,
    params: &RiskParameters,
    mark: Decimal,
    label: &str,
    raised: &mut Vec<RiskAlert>,
) {
    let value = position.value(mark);
    if value > params.max_position_value {
        raised.push(RiskAlert::PositionValueBreach {
            position: label.to_string(),
            observed: value,
            limit: params.max_position_value,
        });
    }

    let unrealized = position.unrealized_pnl(mark);
    if unrealized < -params.max_loss {
        raised.push(RiskAlert::UnrealizedLossBreach {
            position: label.to_string(),
            observed: unrealized,
            limit: params.max_loss,
        });
    }
}

/// Stops the sweep thread on drop or on an explicit `stop()`
pub struct MonitorHandle {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl MonitorHandle {
    pub fn stop(mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for MonitorHandle {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
    }
}
