//! Internal matching demo
//!
//! With no venue registered, the engine crosses order flow against its own
//! per-instrument book. Two desks trade a random walk against each other;
//! a resting stop order demonstrates trigger-on-print behavior.

use anyhow::Result;
use clap::Parser;
use gungnir_bins::common::{init_logging, shutdown_flag, CommonArgs};
use gungnir_core::prelude::*;
use rand::Rng;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

fn main() -> Result<()> {
    let args = CommonArgs::parse();
    init_logging(&args.log_level, args.json_logs)?;

    let config = args.engine_config()?;
    let engine = Arc::new(ExecutionEngine::new(config));
    let symbol = Symbol::new(args.symbol.clone());
    engine.set_reference_price(symbol.clone(), dec!(100));

    let events = engine.events().subscribe();
    let handles = engine.start();
    let running = shutdown_flag()?;
    let interval = Duration::from_millis(1_000 / args.rate.max(1));

    // Protective sell stop below the market; fires if prints reach 95
    let stop_id = engine.submit_order(OrderRequest::stop(
        symbol.clone(),
        Side::Sell,
        dec!(25),
        dec!(95),
        AccountId::from("HEDGE"),
    ))?;
    info!(order_id = %stop_id, "protective stop parked at 95");

    let mut rng = rand::thread_rng();
    let mut mid = dec!(100);
    let mut trades: u64 = 0;

    info!(symbol = %symbol, rate = args.rate, "internal matching started");

    while running.load(Ordering::SeqCst) {
        // Random walk the mid one tick at a time
        mid += Decimal::from(rng.gen_range(-1..=1i64));

        let maker_side = if rng.gen_bool(0.5) { Side::Buy } else { Side::Sell };
        let maker_price = match maker_side {
            Side::Buy => mid - dec!(1),
            Side::Sell => mid + dec!(1),
        };
        let qty = Decimal::from(rng.gen_range(1..=20));

        let _ = engine.submit_order(OrderRequest::limit(
            symbol.clone(),
            maker_side,
            qty,
            maker_price,
            TimeInForce::Gtc,
            AccountId::from("MAKER"),
        ));
        // Aggressive order from the other desk, crossing half the time
        let _ = engine.submit_order(OrderRequest::limit(
            symbol.clone(),
            maker_side.opposite(),
            qty,
            mid,
            TimeInForce::Ioc,
            AccountId::from("TAKER"),
        ));

        while let Ok(event) = events.try_recv() {
            if let EngineEvent::Trade(trade) = &*event {
                trades += 1;
                tracing::debug!(price = %trade.price, qty = %trade.quantity, "print");
            }
        }

        std::thread::sleep(interval);
    }

    handles.reconciler.stop();
    handles.risk_monitor.stop();

    info!("=== Final Statistics ===");
    info!("Trades printed: {}", trades);
    info!(
        "Stop order state: {}",
        engine
            .lifecycle()
            .state(&stop_id)
            .map(|s| s.to_string())
            .unwrap_or_else(|| "swept".into())
    );
    info!(
        "Best bid/ask: {:?} / {:?}",
        engine.best_bid(&symbol),
        engine.best_ask(&symbol)
    );
    for position in engine.risk().positions().snapshot() {
        info!("Position {}", position);
    }

    Ok(())
}
