//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the stream
//! client and the `sse-tail` tool. All types derive Serde traits for
//! deserialization from config files.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Path appended to the API base URL by the content-generation factory.
pub const GENERATE_STREAM_PATH: &str = "/api/generate/stream";

/// Root configuration for `sse-tail`.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct TailConfig {
    /// Stream client settings.
    pub stream: SseConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Settings for one streaming client.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SseConfig {
    /// Event-stream endpoint.
    pub url: String,

    /// Upper bound for reconnect backoff in milliseconds.
    pub reconnect_timeout_ms: u64,

    /// Connection failures tolerated before giving up.
    pub max_reconnect_attempts: u32,

    /// Hard cap on buffered, undelivered messages.
    pub buffer_size: usize,

    /// Buffer length at which the oldest messages are shed.
    pub backpressure_threshold: usize,

    /// Liveness check period in milliseconds.
    pub heartbeat_interval_ms: u64,

    /// Deadline for a single connection attempt in milliseconds.
    pub connect_timeout_ms: u64,

    /// First reconnect delay in milliseconds.
    pub backoff_base_ms: u64,

    /// Growth factor between consecutive reconnect delays.
    pub backoff_factor: f64,

    /// Extra request headers sent with every connection attempt.
    pub headers: BTreeMap<String, String>,

    /// Breaker guarding connection attempts.
    /// Derived from `reconnect_timeout_ms` when absent.
    pub circuit_breaker: Option<CircuitBreakerConfig>,
}

impl Default for SseConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            reconnect_timeout_ms: 5_000,
            max_reconnect_attempts: 10,
            buffer_size: 100,
            backpressure_threshold: 50,
            heartbeat_interval_ms: 30_000,
            connect_timeout_ms: 10_000,
            backoff_base_ms: 1_000,
            backoff_factor: 2.0,
            headers: BTreeMap::new(),
            circuit_breaker: None,
        }
    }
}

impl SseConfig {
    /// Default settings pointed at `url`.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// Settings tuned for the content-generation stream endpoint.
    pub fn content_generation(base_url: &str) -> Self {
        Self {
            url: format!("{}{}", base_url.trim_end_matches('/'), GENERATE_STREAM_PATH),
            reconnect_timeout_ms: 5_000,
            max_reconnect_attempts: 3,
            buffer_size: 50,
            backpressure_threshold: 25,
            heartbeat_interval_ms: 30_000,
            ..Self::default()
        }
    }

    pub fn reconnect_timeout(&self) -> Duration {
        Duration::from_millis(self.reconnect_timeout_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Breaker settings for this client.
    pub fn breaker_config(&self) -> CircuitBreakerConfig {
        self.circuit_breaker.clone().unwrap_or_else(|| CircuitBreakerConfig {
            recovery_timeout_ms: self.reconnect_timeout_ms.saturating_mul(2),
            ..CircuitBreakerConfig::default()
        })
    }

    /// Backoff settings for reconnects; the ceiling is the reconnect timeout.
    pub fn backoff_config(&self) -> BackoffConfig {
        BackoffConfig {
            base_delay_ms: self.backoff_base_ms,
            max_delay_ms: self.reconnect_timeout_ms,
            factor: self.backoff_factor,
        }
    }
}

/// Circuit breaker configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the circuit.
    pub failure_threshold: u32,

    /// Time the circuit stays open before a trial request, in milliseconds.
    pub recovery_timeout_ms: u64,

    /// Minimum total requests before the circuit may open (0 disables).
    pub volume_threshold: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout_ms: 60_000,
            volume_threshold: 10,
        }
    }
}

impl CircuitBreakerConfig {
    pub fn recovery_timeout(&self) -> Duration {
        Duration::from_millis(self.recovery_timeout_ms)
    }
}

/// Exponential backoff configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct BackoffConfig {
    /// Delay before the first retry in milliseconds.
    pub base_delay_ms: u64,

    /// Ceiling for the un-jittered delay in milliseconds.
    pub max_delay_ms: u64,

    /// Multiplier applied per attempt.
    pub factor: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 1_000,
            max_delay_ms: 60_000,
            factor: 2.0,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable the Prometheus metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_generation_defaults() {
        let config = SseConfig::content_generation("https://api.example.com/");
        assert_eq!(config.url, "https://api.example.com/api/generate/stream");
        assert_eq!(config.max_reconnect_attempts, 3);
        assert_eq!(config.buffer_size, 50);
        assert_eq!(config.backpressure_threshold, 25);
    }

    #[test]
    fn test_breaker_derived_from_reconnect_timeout() {
        let config = SseConfig::new("http://localhost/stream");
        let breaker = config.breaker_config();
        assert_eq!(breaker.failure_threshold, 5);
        assert_eq!(breaker.volume_threshold, 10);
        assert_eq!(breaker.recovery_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: TailConfig = toml::from_str(
            r#"
            [stream]
            url = "http://localhost:3000/events"
            buffer_size = 20
            backpressure_threshold = 10

            [stream.circuit_breaker]
            failure_threshold = 2
            "#,
        )
        .unwrap();

        assert_eq!(config.stream.buffer_size, 20);
        assert_eq!(config.stream.heartbeat_interval_ms, 30_000);
        let breaker = config.stream.breaker_config();
        assert_eq!(breaker.failure_threshold, 2);
        assert_eq!(breaker.recovery_timeout_ms, 60_000);
        assert_eq!(config.observability.log_format, LogFormat::Pretty);
    }
}
