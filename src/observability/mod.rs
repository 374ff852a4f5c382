//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Client, breaker and transport produce:
//!     → logging.rs (structured log events via `tracing`)
//!     → metrics.rs (counters and gauges via `metrics`)
//!
//! Consumers:
//!     → stderr (pretty or JSON lines)
//!     → Metrics endpoint (Prometheus scrape, optional)
//! ```
//!
//! # Design Decisions
//! - Recording is always on; without an installed recorder it is a no-op
//! - Subscriber and exporter are installed by the binary, never by the library

pub mod logging;
pub mod metrics;
