//! Resilient Server-Sent-Events client.
//!
//! # Architecture Overview
//!
//! ```text
//!     Consumer                ┌──────────────────────────────────────────────┐
//!     ───────────────────────▶│                  SseClient                    │
//!     connect / on_message    │                                              │
//!                             │  ┌──────────────┐    ┌───────────────────┐   │
//!                             │  │   circuit    │───▶│     transport     │───┼──── Server
//!                             │  │   breaker    │    │ (HTTP + parser)   │   │
//!                             │  └──────┬───────┘    └─────────┬─────────┘   │
//!                             │         │ failure              │ events      │
//!                             │         ▼                      ▼             │
//!                             │  ┌──────────────┐    ┌───────────────────┐   │
//!                             │  │   backoff    │    │  message buffer   │   │
//!                             │  │  (reconnect) │    │  (backpressure)   │   │
//!                             │  └──────────────┘    └─────────┬─────────┘   │
//!     ◀───────────────────────┼────────────────────────────────┘             │
//!     handlers, in order      │                                              │
//!                             │  Cross-cutting: config, observability        │
//!                             └──────────────────────────────────────────────┘
//! ```

// Core subsystems
pub mod client;
pub mod sse;
pub mod transport;

// Cross-cutting concerns
pub mod clock;
pub mod config;
pub mod observability;
pub mod resilience;

pub use client::{ClientError, ConnectionState, HandlerError, SseClient, SseMetrics, Subscription};
pub use config::{SseConfig, TailConfig};
pub use resilience::{CircuitBreaker, CircuitBreakerError, CircuitState, ExponentialBackoff};
pub use sse::{ContentChunk, GenerationEvent, SseMessage};
pub use transport::{HttpTransport, Transport, TransportError};
