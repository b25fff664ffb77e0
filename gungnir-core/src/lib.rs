//! Gungnir Core - Order Execution Core
//!
//! An execution engine for electronic trading: order intake, pre-trade risk
//! validation, price-time-priority matching, smart venue routing, and full
//! lifecycle tracking with reconciliation.
//!
//! ## Architecture
//! - **Per-instrument serialization**: each order book is its own mutex
//!   domain; instruments proceed in parallel
//! - **Decimal arithmetic** for all prices and quantities, no floats in
//!   matching or risk paths
//! - **Events over shared state**: components observe order progress via
//!   the lifecycle event bus
//! - **Fail loudly**: book invariant violations take the instrument
//!   offline instead of trading through corrupt state
//!
//! ## Core Modules
//! - `core`: identifiers, orders, trades, errors, lifecycle events
//! - `book`: per-instrument order book and matching
//! - `risk`: pre-trade gate, position tracking, circuit breaker, monitor
//! - `router`: execution-quality venue selection
//! - `lifecycle`: order state machine and history
//! - `venue`: venue adapters and the retrying call path
//! - `monitor`: fill application, dedupe, reconciliation
//! - `engine`: the assembled submission path
//! - `algo`: sliced execution schedules over the submission path

pub mod algo;
pub mod book;
pub mod config;
pub mod core;
pub mod engine;
pub mod lifecycle;
pub mod monitor;
pub mod resilience;
pub mod risk;
pub mod router;
pub mod venue;

// Re-export the types most callers need
pub use crate::core::{
    AccountId, CoreResult, EngineEvent, ExecutionError, LifecycleEvent, LifecycleState, Order,
    OrderId, OrderType, Side, Symbol, TimeInForce, Trade, TradeId, VenueId,
};
pub use config::EngineConfig;
pub use engine::{EngineHandles, ExecutionEngine, OrderRequest};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::algo::{ExecutionSlicer, SliceReport, SliceStrategy};
    pub use crate::config::EngineConfig;
    pub use crate::core::{
        AccountId, CoreResult, EngineEvent, ExecutionError, LifecycleState, Order, OrderId,
        OrderType, Side, Symbol, TimeInForce, Trade, VenueId,
    };
    pub use crate::engine::{EngineHandles, ExecutionEngine, OrderRequest};
    pub use crate::risk::{RiskParameters, RiskViolation};
    pub use crate::venue::{SimulatedVenue, VenueAdapter};
}
