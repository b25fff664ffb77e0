//! Foundation types for the execution core

pub mod errors;
pub mod events;
pub mod order;
pub mod types;

pub use errors::{reason, CoreResult, ExecutionError};
pub use events::{EngineEvent, EventBus, LifecycleEvent, LifecycleState, TransitionCause};
pub use order::{FillError, Order, Trade};
pub use types::{
    AccountId, LiquidityFlag, OrderId, OrderType, Side, Symbol, TimeInForce, TradeId, VenueId,
};
