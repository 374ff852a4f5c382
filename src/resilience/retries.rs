//! Retry logic on top of a circuit breaker.
//!
//! # Responsibilities
//! - Run an operation through a breaker up to `max_retries` times
//! - Wait with exponential backoff + jitter between failed attempts
//! - Stop immediately when the breaker rejects the call
//!
//! # Design Decisions
//! - An open or testing circuit is never hammered with retries
//! - The fallback runs once, after the last failure or the first rejection
//! - Jittered backoff prevents thundering herd

use std::fmt;
use std::future::Future;

use crate::config::BackoffConfig;
use crate::resilience::backoff::ExponentialBackoff;
use crate::resilience::circuit_breaker::{CircuitBreaker, CircuitBreakerError};

/// How often and how patiently to retry.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one. Zero is treated as one.
    pub max_retries: u32,
    pub backoff: BackoffConfig,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff: BackoffConfig::default(),
        }
    }
}

/// Retry `operation` through `breaker`, returning the last error when every
/// attempt fails.
pub async fn retry_with_circuit_breaker<R, E, F, Fut>(
    breaker: &CircuitBreaker<R>,
    policy: &RetryPolicy,
    mut operation: F,
) -> Result<R, CircuitBreakerError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<R, E>>,
    E: fmt::Display,
{
    let attempts = policy.max_retries.max(1);
    let mut backoff = ExponentialBackoff::from_config(&policy.backoff);
    let mut attempt = 1;

    loop {
        match breaker.execute(|| operation()).await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_rejection() => {
                tracing::debug!(attempt, error = %err, "Circuit rejected call, not retrying");
                return Err(err);
            }
            Err(err) if attempt >= attempts => {
                tracing::warn!(attempts, error = %err, "All retries failed");
                return Err(err);
            }
            Err(err) => {
                tracing::debug!(attempt, error = %err, "Attempt failed, backing off");
                backoff.wait().await;
                attempt += 1;
            }
        }
    }
}

/// Like [`retry_with_circuit_breaker`], but any terminal failure is replaced
/// by the result of `fallback`.
pub async fn retry_with_circuit_breaker_or_else<R, E, F, Fut, G, GFut>(
    breaker: &CircuitBreaker<R>,
    policy: &RetryPolicy,
    operation: F,
    fallback: G,
) -> Result<R, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<R, E>>,
    G: FnOnce() -> GFut,
    GFut: Future<Output = Result<R, E>>,
    E: fmt::Display,
{
    match retry_with_circuit_breaker(breaker, policy, operation).await {
        Ok(value) => Ok(value),
        Err(err) => {
            tracing::warn!(error = %err, "Using fallback");
            fallback().await
        }
    }
}
