use crate::config::types::{Config, HeadersConfig, HttpConfig, RateLimitConfig, RetryConfig};
use crate::error::ConfigError;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_retry_config(&config.retry)?;
    validate_rate_limit_config(&config.rate_limit)?;
    validate_headers_config(&config.headers)?;
    validate_http_config(&config.http)?;
    Ok(())
}

/// Validates retry configuration
fn validate_retry_config(config: &RetryConfig) -> Result<(), ConfigError> {
    if config.max_retries < 1 {
        return Err(ConfigError::Validation(format!(
            "max-retries must be >= 1, got {}",
            config.max_retries
        )));
    }

    if config.backoff_factor < 1.0 {
        return Err(ConfigError::Validation(format!(
            "backoff-factor must be >= 1.0, got {}",
            config.backoff_factor
        )));
    }

    if !(0.0..=1.0).contains(&config.jitter) {
        return Err(ConfigError::Validation(format!(
            "jitter must be between 0.0 and 1.0, got {}",
            config.jitter
        )));
    }

    if config.initial_delay_ms > config.max_delay_ms {
        return Err(ConfigError::Validation(format!(
            "initial-delay-ms ({}ms) must not exceed max-delay-ms ({}ms)",
            config.initial_delay_ms, config.max_delay_ms
        )));
    }

    Ok(())
}

/// Validates rate limit configuration
fn validate_rate_limit_config(config: &RateLimitConfig) -> Result<(), ConfigError> {
    if config.concurrency < 1 {
        return Err(ConfigError::Validation(format!(
            "concurrency must be >= 1, got {}",
            config.concurrency
        )));
    }

    if config.requests_per_second <= 0.0 || !config.requests_per_second.is_finite() {
        return Err(ConfigError::Validation(format!(
            "requests-per-second must be a positive number, got {}",
            config.requests_per_second
        )));
    }

    Ok(())
}

/// Validates header configuration
fn validate_headers_config(config: &HeadersConfig) -> Result<(), ConfigError> {
    for agent in &config.user_agents {
        if agent.trim().is_empty() {
            return Err(ConfigError::Validation(
                "user-agents must not contain empty strings".to_string(),
            ));
        }
    }

    for name in config.default_headers.keys() {
        if name.trim().is_empty() {
            return Err(ConfigError::Validation(
                "default-headers must not contain empty header names".to_string(),
            ));
        }
    }

    Ok(())
}

/// Validates HTTP client configuration
fn validate_http_config(config: &HttpConfig) -> Result<(), ConfigError> {
    if config.request_timeout_secs < 1 {
        return Err(ConfigError::Validation(format!(
            "request-timeout-secs must be >= 1, got {}",
            config.request_timeout_secs
        )));
    }

    Ok(())
}
