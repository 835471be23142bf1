//! Configuration management for pagefetch
//!
//! Settings are layered from:
//! 1. Default values (embedded in structs)
//! 2. TOML configuration file
//! 3. Environment variables (highest priority)
//!
//! # Usage
//!
//! ```no_run
//! use pagefetch::config::Config;
//!
//! let config = Config::load().expect("Failed to load configuration");
//! println!("Writing {} files", config.output.extension());
//! ```
//!
//! # Environment Variables
//!
//! Any key can be overridden with `PAGEFETCH__<section>__<key>`:
//! - `PAGEFETCH__HTTP__REQUEST_TIMEOUT_SECS=30`
//! - `PAGEFETCH__SCHEDULER__MAX_CONCURRENT=2`
//! - `PAGEFETCH__OUTPUT__ENCODER=avif`
//!
//! # Configuration File
//!
//! By default, the configuration is loaded from `config/pagefetch.toml`.
//! This can be overridden using the `PAGEFETCH_CONFIG` environment variable.

mod models;
mod sources;
mod validation;

pub use crate::humanize::ByteSize;
pub use models::{Config, HttpSettings, SchedulerSettings};
pub use validation::ValidationError;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Configuration validation failed: {0}")]
    ValidationError(#[from] ValidationError),
}

impl Config {
    /// Load configuration from all sources (file + environment)
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration file is malformed or a value
    /// fails validation.
    pub fn load() -> Result<Self, ConfigError> {
        let config = sources::load()?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: std::path::PathBuf) -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        let config = sources::load_from_sources(path)?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Re-run validation after values were overridden in code
    pub fn validate(&self) -> Result<(), ConfigError> {
        validation::validate(self)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::{Encoder, FormatError};
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_load_minimal_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        fs::write(&config_path, "[output]\nencoder = \"png\"\ncompression_level = 9\n").unwrap();

        let config = Config::load_from_path(config_path).unwrap();
        assert_eq!(config.output.encoder, Encoder::Png);
        assert_eq!(config.output.compression_level, Some(9));
        assert_eq!(config.scheduler.max_retries, 3);
    }

    #[test]
    fn test_validation_catches_bad_quality() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        fs::write(&config_path, "[output]\nencoder = \"jpeg\"\nquality = 0\n").unwrap();

        let result = Config::load_from_path(config_path);
        assert!(matches!(
            result.unwrap_err(),
            ConfigError::ValidationError(ValidationError::Output(
                FormatError::QualityOutOfRange { .. }
            ))
        ));
    }

    #[test]
    fn test_malformed_file_is_load_error() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        fs::write(&config_path, "[scheduler]\nmax_retries = \"lots\"\n").unwrap();

        let result = Config::load_from_path(config_path);
        assert!(matches!(result.unwrap_err(), ConfigError::LoadError(_)));
    }

    #[test]
    fn test_full_config_example() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        let toml_content = r#"
[http]
request_timeout_secs = 15
connect_timeout_secs = 5
user_agent = "reader/1.0"
max_image_bytes = "16MB"

[scheduler]
concurrency_cap = 2
max_retries = 1
retry_delay_ms = 100

[output]
encoder = "avif"
quality = 60
effort = 9
        "#;

        fs::write(&config_path, toml_content).unwrap();

        let config = Config::load_from_path(config_path).unwrap();
        let http = config.http.to_http_config();
        assert_eq!(http.user_agent, "reader/1.0");
        assert_eq!(http.max_image_bytes.as_u64(), 16 * 1024 * 1024);

        let scheduler = config.scheduler.to_scheduler_config();
        assert!(scheduler.max_concurrent <= 2);
        assert_eq!(scheduler.max_retries, 1);
        assert_eq!(scheduler.retry_delay.as_millis(), 100);

        assert_eq!(config.output.extension(), "avif");
        assert_eq!(config.output.effort, Some(9));
    }
}
