//! Retry policy for venue calls

pub mod backoff;

pub use backoff::{Backoff, RetryPolicy};
