//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, threshold below buffer size)
//! - Check the stream URL is an absolute http(s) URL
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: config → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use thiserror::Error;
use url::Url;

use crate::config::schema::{SseConfig, TailConfig};

/// A single semantic problem with a configuration value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Render a list of validation errors on one line.
pub fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Validate a full `sse-tail` configuration.
pub fn validate_config(config: &TailConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = match validate_stream(&config.stream) {
        Ok(()) => Vec::new(),
        Err(errors) => errors,
    };

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("'{}' is not a socket address", config.observability.metrics_address),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Validate the settings of one streaming client.
pub fn validate_stream(config: &SseConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    match Url::parse(&config.url) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => {}
        Ok(url) => errors.push(ValidationError::new(
            "stream.url",
            format!("unsupported scheme '{}'", url.scheme()),
        )),
        Err(e) => errors.push(ValidationError::new(
            "stream.url",
            format!("'{}' is not a valid URL: {}", config.url, e),
        )),
    }

    if config.buffer_size == 0 {
        errors.push(ValidationError::new("stream.buffer_size", "must be greater than 0"));
    }
    if config.backpressure_threshold >= config.buffer_size {
        errors.push(ValidationError::new(
            "stream.backpressure_threshold",
            format!(
                "must be below buffer_size ({} >= {})",
                config.backpressure_threshold, config.buffer_size
            ),
        ));
    }
    if config.reconnect_timeout_ms == 0 {
        errors.push(ValidationError::new("stream.reconnect_timeout_ms", "must be greater than 0"));
    }
    if config.heartbeat_interval_ms == 0 {
        errors.push(ValidationError::new("stream.heartbeat_interval_ms", "must be greater than 0"));
    }
    if config.connect_timeout_ms == 0 {
        errors.push(ValidationError::new("stream.connect_timeout_ms", "must be greater than 0"));
    }
    if config.backoff_base_ms == 0 {
        errors.push(ValidationError::new("stream.backoff_base_ms", "must be greater than 0"));
    }
    if !(config.backoff_factor >= 1.0 && config.backoff_factor.is_finite()) {
        errors.push(ValidationError::new(
            "stream.backoff_factor",
            format!("must be a finite number >= 1 (got {})", config.backoff_factor),
        ));
    }
    if config.breaker_config().failure_threshold == 0 {
        errors.push(ValidationError::new(
            "stream.circuit_breaker.failure_threshold",
            "must be greater than 0",
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
