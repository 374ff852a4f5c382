//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Connection attempt:
//!     → circuit_breaker.rs (fail fast while the server is known to be down)
//!     → On failure: backoff.rs (jittered delay before the next attempt)
//!     → retries.rs (bounded retry loop combining both)
//! ```
//!
//! # Design Decisions
//! - Each breaker guards one resource and is owned by its caller
//! - Rejections are values (`CircuitBreakerError`), not panics
//! - Backoff is capped so reconnects never stall indefinitely

pub mod backoff;
pub mod circuit_breaker;
pub mod retries;

pub use crate::config::{BackoffConfig, CircuitBreakerConfig};
pub use backoff::{calculate_backoff, ExponentialBackoff};
pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerError, CircuitBreakerMetrics, CircuitState, StateChange,
};
pub use retries::{retry_with_circuit_breaker, retry_with_circuit_breaker_or_else, RetryPolicy};
