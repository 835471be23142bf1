use super::models::Config;
use crate::format::FormatError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Timeout must be positive: {field} = 0")]
    ZeroTimeout { field: &'static str },

    #[error("scheduler.concurrency_cap must be at least 1")]
    ZeroConcurrencyCap,

    #[error("scheduler.max_concurrent must be at least 1")]
    ZeroMaxConcurrent,

    #[error("http.max_image_bytes must be positive")]
    ZeroImageLimit,

    #[error("Invalid [output] section: {0}")]
    Output(#[from] FormatError),
}

/// Validate the entire configuration
pub fn validate(config: &Config) -> Result<(), ValidationError> {
    validate_http(config)?;
    validate_scheduler(config)?;
    config.output.validate()?;
    Ok(())
}

fn validate_http(config: &Config) -> Result<(), ValidationError> {
    if config.http.request_timeout_secs == 0 {
        return Err(ValidationError::ZeroTimeout {
            field: "http.request_timeout_secs",
        });
    }
    if config.http.connect_timeout_secs == 0 {
        return Err(ValidationError::ZeroTimeout {
            field: "http.connect_timeout_secs",
        });
    }
    if config.http.max_image_bytes.as_u64() == 0 {
        return Err(ValidationError::ZeroImageLimit);
    }
    Ok(())
}

fn validate_scheduler(config: &Config) -> Result<(), ValidationError> {
    if config.scheduler.concurrency_cap == 0 {
        return Err(ValidationError::ZeroConcurrencyCap);
    }
    if config.scheduler.max_concurrent == Some(0) {
        return Err(ValidationError::ZeroMaxConcurrent);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::Encoder;

    #[test]
    fn test_defaults_are_valid() {
        assert!(validate(&Config::default()).is_ok());
    }

    #[test]
    fn test_zero_timeout() {
        let mut config = Config::default();
        config.http.connect_timeout_secs = 0;
        assert!(matches!(
            validate(&config),
            Err(ValidationError::ZeroTimeout {
                field: "http.connect_timeout_secs"
            })
        ));
    }

    #[test]
    fn test_zero_concurrency() {
        let mut config = Config::default();
        config.scheduler.concurrency_cap = 0;
        assert!(matches!(
            validate(&config),
            Err(ValidationError::ZeroConcurrencyCap)
        ));

        let mut config = Config::default();
        config.scheduler.max_concurrent = Some(0);
        assert!(matches!(
            validate(&config),
            Err(ValidationError::ZeroMaxConcurrent)
        ));
    }

    #[test]
    fn test_output_rules_apply() {
        let mut config = Config::default();
        config.output.encoder = Encoder::Avif;
        config.output.quality = 101;
        assert!(matches!(
            validate(&config),
            Err(ValidationError::Output(FormatError::QualityOutOfRange { .. }))
        ));

        let mut config = Config::default();
        config.output.encoder = Encoder::Png;
        config.output.compression_level = Some(12);
        assert!(matches!(
            validate(&config),
            Err(ValidationError::Output(FormatError::CompressionOutOfRange(12)))
        ));
    }
}
