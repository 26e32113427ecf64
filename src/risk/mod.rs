//! Systemic risk controls
//!
//! A fixed-window volume breaker that pauses credit intake when aggregate
//! borrowing in the window would exceed the configured cap. Only an operator
//! can clear it.

mod breaker;

pub use breaker::{CircuitBreakerState, RiskController};
