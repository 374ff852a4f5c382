//! Circuit breaker guarding an async operation.
//!
//! # States
//! - Closed: normal operation, requests pass through
//! - Open: downstream assumed down, requests fail fast (or use the fallback)
//! - Half-Open: a single trial request decides the next state
//!
//! # State Transitions
//! ```text
//! Closed → Open: failure streak >= threshold (and volume threshold met)
//! Open → Half-Open: after recovery timeout since the last failure
//! Half-Open → Closed: trial request succeeds
//! Half-Open → Open: trial request fails
//! ```
//!
//! # Design Decisions
//! - One breaker per guarded resource, explicitly constructed (no globals)
//! - Fail fast in Open state (the operation is never invoked)
//! - Single probe in Half-Open; concurrent callers are rejected, not queued
//! - Success in Closed only decrements the failure streak (slow recovery of trust)

use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use thiserror::Error;
use tokio::time::Instant;

use crate::config::CircuitBreakerConfig;

use crate::clock::unix_millis;
use crate::observability::metrics;

/// Breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CircuitState::Closed => "CLOSED",
            CircuitState::Open => "OPEN",
            CircuitState::HalfOpen => "HALF_OPEN",
        };
        f.write_str(name)
    }
}

/// One entry of the transition log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StateChange {
    pub from: CircuitState,
    pub to: CircuitState,
    /// Wall-clock time of the transition (ms since epoch).
    pub timestamp: u64,
    pub reason: String,
}

/// Point-in-time copy of a breaker's counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CircuitBreakerMetrics {
    pub total_requests: u64,
    /// Current consecutive-failure streak.
    pub failed_requests: u32,
    pub successful_requests: u64,
    /// Wall-clock time of the last failure (ms since epoch).
    pub last_failure_time: Option<u64>,
    pub state: CircuitState,
    pub state_changes: Vec<StateChange>,
}

/// Errors returned by [`CircuitBreaker::execute`].
#[derive(Debug, Error)]
pub enum CircuitBreakerError<E> {
    /// The circuit is open and no fallback was supplied.
    #[error("circuit breaker is OPEN")]
    Open { metrics: Box<CircuitBreakerMetrics> },

    /// A half-open trial is already in flight and no fallback was supplied.
    #[error("circuit breaker is testing recovery")]
    Testing { metrics: Box<CircuitBreakerMetrics> },

    /// The operation (or the fallback) failed.
    #[error(transparent)]
    Inner(E),
}

impl<E> CircuitBreakerError<E> {
    /// Metrics captured when the call was rejected.
    pub fn metrics(&self) -> Option<&CircuitBreakerMetrics> {
        match self {
            CircuitBreakerError::Open { metrics } | CircuitBreakerError::Testing { metrics } => {
                Some(metrics)
            }
            CircuitBreakerError::Inner(_) => None,
        }
    }

    /// Whether the breaker rejected the call without running the operation.
    pub fn is_rejection(&self) -> bool {
        !matches!(self, CircuitBreakerError::Inner(_))
    }
}

struct Counters {
    state: CircuitState,
    failures: u32,
    successes: u64,
    total_requests: u64,
    last_failure: Option<Instant>,
    last_failure_time: Option<u64>,
    half_open_attempts: u32,
    state_changes: Vec<StateChange>,
}

impl Counters {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            failures: 0,
            successes: 0,
            total_requests: 0,
            last_failure: None,
            last_failure_time: None,
            half_open_attempts: 0,
            state_changes: Vec::new(),
        }
    }

    fn transition(&mut self, to: CircuitState, reason: String) {
        let from = self.state;
        self.state = to;

        tracing::info!(from = %from, to = %to, reason = %reason, "Circuit breaker state change");
        metrics::record_circuit_state(to);

        self.state_changes.push(StateChange {
            from,
            to,
            timestamp: unix_millis(),
            reason,
        });
    }

    fn snapshot(&self) -> CircuitBreakerMetrics {
        CircuitBreakerMetrics {
            total_requests: self.total_requests,
            failed_requests: self.failures,
            successful_requests: self.successes,
            last_failure_time: self.last_failure_time,
            state: self.state,
            state_changes: self.state_changes.clone(),
        }
    }
}

fn lock(counters: &Mutex<Counters>) -> MutexGuard<'_, Counters> {
    counters.lock().unwrap_or_else(PoisonError::into_inner)
}

enum Admission {
    Proceed { trial: bool },
    Reject(Rejection),
}

enum Rejection {
    Open(Box<CircuitBreakerMetrics>),
    Testing(Box<CircuitBreakerMetrics>),
}

impl Rejection {
    fn into_error<E>(self) -> CircuitBreakerError<E> {
        match self {
            Rejection::Open(metrics) => CircuitBreakerError::Open { metrics },
            Rejection::Testing(metrics) => CircuitBreakerError::Testing { metrics },
        }
    }
}

/// Frees the half-open probe slot if the trial future is dropped before it completes.
struct ProbeGuard<'a> {
    counters: &'a Mutex<Counters>,
    armed: bool,
}

impl ProbeGuard<'_> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for ProbeGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut counters = lock(self.counters);
        if counters.state == CircuitState::HalfOpen {
            counters.half_open_attempts = 0;
        }
    }
}

/// Circuit breaker over operations producing `R`.
pub struct CircuitBreaker<R> {
    config: CircuitBreakerConfig,
    counters: Mutex<Counters>,
    _result: PhantomData<fn() -> R>,
}

impl<R> CircuitBreaker<R> {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            counters: Mutex::new(Counters::new()),
            _result: PhantomData,
        }
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    pub fn state(&self) -> CircuitState {
        lock(&self.counters).state
    }

    /// Snapshot of the counters and transition log.
    pub fn metrics(&self) -> CircuitBreakerMetrics {
        lock(&self.counters).snapshot()
    }

    /// Zero every counter and force the circuit closed.
    pub fn reset(&self) {
        let mut counters = lock(&self.counters);
        counters.failures = 0;
        counters.successes = 0;
        counters.total_requests = 0;
        counters.last_failure = None;
        counters.last_failure_time = None;
        counters.half_open_attempts = 0;
        counters.transition(CircuitState::Closed, "Manual reset".to_string());
    }

    /// Count a failure observed outside `execute`, such as a guarded
    /// resource failing after the call that acquired it succeeded.
    pub fn record_failure(&self) {
        self.on_failure();
    }

    /// Run `operation` through the breaker.
    pub async fn execute<F, Fut, E>(&self, operation: F) -> Result<R, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<R, E>>,
        E: fmt::Display,
    {
        self.run(operation, None::<fn() -> std::future::Ready<Result<R, E>>>)
            .await
    }

    /// Run `operation` through the breaker, substituting `fallback` when the
    /// circuit rejects the call or the operation fails.
    pub async fn execute_with_fallback<F, Fut, G, GFut, E>(
        &self,
        operation: F,
        fallback: G,
    ) -> Result<R, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<R, E>>,
        G: FnOnce() -> GFut,
        GFut: Future<Output = Result<R, E>>,
        E: fmt::Display,
    {
        self.run(operation, Some(fallback)).await
    }

    async fn run<F, Fut, G, GFut, E>(
        &self,
        operation: F,
        fallback: Option<G>,
    ) -> Result<R, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<R, E>>,
        G: FnOnce() -> GFut,
        GFut: Future<Output = Result<R, E>>,
        E: fmt::Display,
    {
        let trial = match self.admit(fallback.is_some()) {
            Admission::Proceed { trial } => trial,
            Admission::Reject(rejection) => {
                return match fallback {
                    Some(fallback) => fallback().await.map_err(CircuitBreakerError::Inner),
                    None => Err(rejection.into_error()),
                };
            }
        };

        let probe = ProbeGuard {
            counters: &self.counters,
            armed: trial,
        };
        let result = operation().await;
        probe.disarm();

        match result {
            Ok(value) => {
                self.on_success();
                Ok(value)
            }
            Err(err) => {
                self.on_failure();
                match fallback {
                    Some(fallback) => {
                        tracing::warn!(error = %err, "Operation failed, using fallback");
                        fallback().await.map_err(CircuitBreakerError::Inner)
                    }
                    None => Err(CircuitBreakerError::Inner(err)),
                }
            }
        }
    }

    fn admit(&self, has_fallback: bool) -> Admission {
        let mut counters = lock(&self.counters);
        counters.total_requests += 1;

        if counters.state == CircuitState::Open {
            let recovered = counters
                .last_failure
                .is_some_and(|at| at.elapsed() >= self.config.recovery_timeout());

            if recovered {
                counters.transition(CircuitState::HalfOpen, "Recovery timeout reached".to_string());
            } else {
                if has_fallback {
                    tracing::warn!("Circuit OPEN, using fallback");
                }
                return Admission::Reject(Rejection::Open(Box::new(counters.snapshot())));
            }
        }

        if counters.state == CircuitState::HalfOpen {
            counters.half_open_attempts += 1;
            if counters.half_open_attempts > 1 {
                tracing::debug!("Trial request in flight, rejecting concurrent call");
                return Admission::Reject(Rejection::Testing(Box::new(counters.snapshot())));
            }
            return Admission::Proceed { trial: true };
        }

        Admission::Proceed { trial: false }
    }

    fn on_success(&self) {
        let mut counters = lock(&self.counters);
        counters.successes += 1;

        match counters.state {
            CircuitState::HalfOpen => {
                counters.transition(CircuitState::Closed, "Test request succeeded".to_string());
                counters.failures = 0;
                counters.half_open_attempts = 0;
            }
            CircuitState::Closed => {
                counters.failures = counters.failures.saturating_sub(1);
            }
            CircuitState::Open => {}
        }
    }

    fn on_failure(&self) {
        let mut counters = lock(&self.counters);
        counters.failures = counters.failures.saturating_add(1);
        counters.last_failure = Some(Instant::now());
        counters.last_failure_time = Some(unix_millis());

        match counters.state {
            CircuitState::HalfOpen => {
                counters.transition(CircuitState::Open, "Test request failed".to_string());
                counters.half_open_attempts = 0;
            }
            CircuitState::Closed => {
                let threshold = self.config.failure_threshold;
                let volume = self.config.volume_threshold;
                let has_min_volume = volume == 0 || counters.total_requests >= volume;

                if counters.failures >= threshold && has_min_volume {
                    let reason = format!(
                        "Failure threshold reached: {}/{}",
                        counters.failures, threshold
                    );
                    counters.transition(CircuitState::Open, reason);
                }
            }
            CircuitState::Open => {}
        }
    }
}

impl<R> fmt::Debug for CircuitBreaker<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let counters = lock(&self.counters);
        f.debug_struct("CircuitBreaker")
            .field("state", &counters.state)
            .field("failures", &counters.failures)
            .field("failure_threshold", &self.config.failure_threshold)
            .finish()
    }
}
