//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → TailConfig (validated, immutable)
//!     → SseConfig handed to each SseClient
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; a client keeps the settings it was built with
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{
    BackoffConfig, CircuitBreakerConfig, LogFormat, ObservabilityConfig, SseConfig, TailConfig,
};
pub use validation::{validate_config, validate_stream, ValidationError};
