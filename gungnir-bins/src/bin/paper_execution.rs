//! Paper execution against a simulated venue
//!
//! Routes random order flow through the full engine path (risk gate,
//! router, retries, circuit breaker) into a scriptable simulated venue.
//! A slice of venue calls is scripted to fail so the breaker and retry
//! behavior are visible in the logs. No real orders are placed.

use anyhow::Result;
use clap::Parser;
use gungnir_bins::common::{init_logging, shutdown_flag, CommonArgs};
use gungnir_core::prelude::*;
use gungnir_core::venue::sim::Behavior;
use rand::Rng;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

const ACCOUNTS: [&str; 3] = ["DESK-A", "DESK-B", "DESK-C"];

fn main() -> Result<()> {
    let args = CommonArgs::parse();
    init_logging(&args.log_level, args.json_logs)?;

    let config = args.engine_config()?;
    let engine = Arc::new(ExecutionEngine::new(config));
    let symbol = Symbol::new(args.symbol.clone());

    let venue = Arc::new(SimulatedVenue::new(VenueId::from("PAPER")));
    engine.register_venue(Arc::clone(&venue) as Arc<dyn VenueAdapter>, 1.5);
    engine.set_reference_price(symbol.clone(), dec!(100));

    let handles = engine.start();
    let running = shutdown_flag()?;
    let interval = Duration::from_millis(1_000 / args.rate.max(1));

    let mut rng = rand::thread_rng();
    let mut submitted: u64 = 0;
    let mut rejected: u64 = 0;
    let mut failed: u64 = 0;

    info!(symbol = %symbol, rate = args.rate, "paper execution started");

    while running.load(Ordering::SeqCst) {
        // Roughly one venue call in twenty hits a simulated outage
        if rng.gen_ratio(1, 20) {
            venue.script(Behavior::Fail);
        }

        let side = if rng.gen_bool(0.5) { Side::Buy } else { Side::Sell };
        let qty = Decimal::from(rng.gen_range(1..=50));
        let offset = Decimal::from(rng.gen_range(0..5i64));
        let price = match side {
            Side::Buy => dec!(100) - offset,
            Side::Sell => dec!(100) + offset,
        };
        let account = AccountId::from(ACCOUNTS[rng.gen_range(0..ACCOUNTS.len())]);

        let request = OrderRequest::limit(symbol.clone(), side, qty, price, TimeInForce::Gtc, account);
        submitted += 1;
        match engine.submit_order(request) {
            Ok(id) => {
                if let Some(state) = engine.lifecycle().state(&id) {
                    tracing::debug!(order_id = %id, state = %state, "order submitted");
                }
            }
            Err(ExecutionError::Risk(violation)) => {
                rejected += 1;
                warn!(%violation, "risk rejection");
            }
            Err(err) => {
                failed += 1;
                warn!(error = %err, "submission failed");
            }
        }

        std::thread::sleep(interval);
    }

    handles.reconciler.stop();
    handles.risk_monitor.stop();

    info!("=== Final Statistics ===");
    info!("Orders submitted: {}", submitted);
    info!("Risk rejections: {}", rejected);
    info!("Failed submissions: {}", failed);
    info!("Venue place calls: {}", venue.place_calls());
    for position in engine.risk().positions().snapshot() {
        info!("Position {}", position);
    }

    Ok(())
}
