//! Error taxonomy for the execution core
//!
//! Five failure classes with distinct propagation rules:
//! - `Validation` / `Risk`: terminal, returned to the caller synchronously
//! - `Venue`: transient, retried with backoff and counted by the circuit breaker
//! - `Timeout`: venue never confirmed within the deadline, order goes Failed
//!   with a status-unknown annotation
//! - `Consistency`: invariant violation inside a book, fatal for that
//!   instrument. Never swallowed - the book is taken offline.

use crate::core::types::{OrderId, Symbol, VenueId};
use crate::risk::RiskViolation;
use std::time::Duration;
use thiserror::Error;

/// Machine-readable reason codes carried by every rejection
pub mod reason {
    pub const MALFORMED_ORDER: &str = "MALFORMED_ORDER";
    pub const UNKNOWN_ACCOUNT: &str = "UNKNOWN_ACCOUNT";
    pub const UNKNOWN_ORDER: &str = "UNKNOWN_ORDER";
    pub const DUPLICATE_ORDER: &str = "DUPLICATE_ORDER";
    pub const BOOK_OFFLINE: &str = "BOOK_OFFLINE";
    pub const BREAKER_OPEN: &str = "BREAKER_OPEN";
    pub const FOK_UNFILLABLE: &str = "FOK_UNFILLABLE";
    pub const MARKET_UNFILLABLE: &str = "MARKET_UNFILLABLE";
    pub const ORDER_TERMINAL: &str = "ORDER_TERMINAL";
    pub const VENUE_UNAVAILABLE: &str = "VENUE_UNAVAILABLE";
}

/// Top-level error type for all core operations
#[derive(Debug, Error)]
pub enum ExecutionError {
    /// Malformed or policy-violating order, rejected synchronously, no retry
    #[error("validation failed [{code}]: {detail}")]
    Validation { code: &'static str, detail: String },

    /// Pre-trade risk limit breach, rejected synchronously with the specific
    /// limit name and observed/limit values
    #[error("risk rejection: {0}")]
    Risk(RiskViolation),

    /// Transient downstream failure, retried with backoff
    #[error("venue {venue} error: {detail}")]
    Venue { venue: VenueId, detail: String },

    /// Venue did not confirm within the caller-supplied deadline
    #[error("venue {venue} timed out after {deadline:?} for order {order_id}, status unknown")]
    Timeout {
        venue: VenueId,
        order_id: OrderId,
        deadline: Duration,
    },

    /// Invariant violation inside an instrument's book. The book is taken
    /// offline rather than silently continuing (risk of double fills or
    /// phantom liquidity).
    #[error("consistency violation in book {symbol}: {detail}")]
    Consistency { symbol: Symbol, detail: String },
}

impl ExecutionError {
    pub fn validation(code: &'static str, detail: impl Into<String>) -> Self {
        ExecutionError::Validation {
            code,
            detail: detail.into(),
        }
    }

    pub fn venue(venue: VenueId, detail: impl Into<String>) -> Self {
        ExecutionError::Venue {
            venue,
            detail: detail.into(),
        }
    }

    /// Machine-readable reason code for this error
    pub fn code(&self) -> &'static str {
        match self {
            ExecutionError::Validation { code, .. } => code,
            ExecutionError::Risk(v) => v.code(),
            ExecutionError::Venue { .. } => "VENUE_ERROR",
            ExecutionError::Timeout { .. } => "VENUE_TIMEOUT",
            ExecutionError::Consistency { .. } => "CONSISTENCY_ERROR",
        }
    }

    /// Whether a retry against the venue may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, ExecutionError::Venue { .. })
    }
}

impl From<RiskViolation> for ExecutionError {
    fn from(v: RiskViolation) -> Self {
        ExecutionError::Risk(v)
    }
}

pub type CoreResult<T> = Result<T, ExecutionError>;
