//! Client error type.

use thiserror::Error;

use crate::config::validation::join_errors;
use crate::config::ValidationError;
use crate::resilience::{CircuitBreakerError, CircuitBreakerMetrics};
use crate::transport::TransportError;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid configuration: {}", join_errors(.0))]
    InvalidConfig(Vec<ValidationError>),

    /// A connection attempt failed or an open connection was lost.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Reconnect budget exhausted; `connect()` must be called again.
    #[error("max reconnection attempts ({max}) reached")]
    MaxReconnectAttempts { max: u32 },

    #[error("circuit breaker is open")]
    CircuitOpen(Box<CircuitBreakerMetrics>),

    #[error("circuit breaker is testing recovery")]
    CircuitTesting(Box<CircuitBreakerMetrics>),

    /// A message handler returned an error or panicked.
    #[error("message handler failed: {0}")]
    Handler(String),

    /// `disconnect()` was called while connecting.
    #[error("connection aborted")]
    Aborted,
}

impl ClientError {
    /// Whether the client gave up (as opposed to a transient failure).
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ClientError::InvalidConfig(_)
                | ClientError::MaxReconnectAttempts { .. }
                | ClientError::CircuitOpen(_)
                | ClientError::CircuitTesting(_)
        )
    }
}

impl From<CircuitBreakerError<ClientError>> for ClientError {
    fn from(err: CircuitBreakerError<ClientError>) -> Self {
        match err {
            CircuitBreakerError::Open { metrics } => ClientError::CircuitOpen(metrics),
            CircuitBreakerError::Testing { metrics } => ClientError::CircuitTesting(metrics),
            CircuitBreakerError::Inner(inner) => inner,
        }
    }
}
