//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::TailConfig;
use crate::config::validation::{join_errors, validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<TailConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    let config: TailConfig = toml::from_str(&content)?;

    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(name: &str, content: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("{}-{}.toml", name, std::process::id()));
        let mut file = fs::File::create(&path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_load_valid_file() {
        let path = write_temp(
            "sse-tail-valid",
            r#"
            [stream]
            url = "http://127.0.0.1:3000/api/generate/stream"
            max_reconnect_attempts = 3

            [observability]
            log_level = "debug"
            log_format = "json"
            "#,
        );

        let config = load_config(&path).unwrap();
        assert_eq!(config.stream.max_reconnect_attempts, 3);
        assert_eq!(config.observability.log_level, "debug");
        let _ = fs::remove_file(path);
    }

    #[test]
    fn test_load_rejects_invalid_values() {
        let path = write_temp(
            "sse-tail-invalid",
            r#"
            [stream]
            url = "http://127.0.0.1:3000/events"
            buffer_size = 5
            backpressure_threshold = 8
            "#,
        );

        let err = load_config(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
        assert!(err.to_string().contains("backpressure_threshold"));
        let _ = fs::remove_file(path);
    }

    #[test]
    fn test_load_missing_file() {
        let err = load_config(Path::new("/definitely/not/here.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }

    #[test]
    fn test_load_malformed_toml() {
        let path = write_temp("sse-tail-malformed", "[stream\nurl = ");
        let err = load_config(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
        let _ = fs::remove_file(path);
    }
}
