//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, ports valid, limits non-zero)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;
use thiserror::Error;

use crate::config::schema::ProxyConfig;

/// Upper bound accepted for `fetch.max_redirects`.
pub const MAX_REDIRECT_LIMIT: usize = 20;

/// A single semantic problem with a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("listener.port must be non-zero")]
    ZeroPort,

    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },

    #[error("fetch.max_redirects {0} exceeds limit of {limit}", limit = MAX_REDIRECT_LIMIT)]
    TooManyRedirects(usize),

    #[error("fetch.user_agent must not be empty")]
    EmptyUserAgent,

    #[error("observability.metrics_address '{0}' is not a socket address")]
    MetricsAddress(String),
}

/// Validate a configuration, collecting every violation.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.port == 0 {
        errors.push(ValidationError::ZeroPort);
    }
    if config.listener.max_request_body_bytes == 0 {
        errors.push(ValidationError::Zero { field: "listener.max_request_body_bytes" });
    }
    if config.fetch.timeout_secs == 0 {
        errors.push(ValidationError::Zero { field: "fetch.timeout_secs" });
    }
    if config.fetch.max_response_bytes == 0 {
        errors.push(ValidationError::Zero { field: "fetch.max_response_bytes" });
    }
    if config.fetch.max_redirects > MAX_REDIRECT_LIMIT {
        errors.push(ValidationError::TooManyRedirects(config.fetch.max_redirects));
    }
    if config.fetch.user_agent.trim().is_empty() {
        errors.push(ValidationError::EmptyUserAgent);
    }
    if config.rendered.ready_timeout_ms == 0 {
        errors.push(ValidationError::Zero { field: "rendered.ready_timeout_ms" });
    }
    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::MetricsAddress(
            config.observability.metrics_address.clone(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&ProxyConfig::default()).is_ok());
    }

    #[test]
    fn test_collects_all_errors() {
        let mut config = ProxyConfig::default();
        config.listener.port = 0;
        config.fetch.timeout_secs = 0;
        config.fetch.max_redirects = 50;
        config.fetch.user_agent = "  ".into();

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 4);
        assert!(errors.contains(&ValidationError::ZeroPort));
        assert!(errors.contains(&ValidationError::Zero { field: "fetch.timeout_secs" }));
        assert!(errors.contains(&ValidationError::TooManyRedirects(50)));
        assert!(errors.contains(&ValidationError::EmptyUserAgent));
    }

    #[test]
    fn test_metrics_address_checked_only_when_enabled() {
        let mut config = ProxyConfig::default();
        config.observability.metrics_address = "nope".into();
        assert!(validate_config(&config).is_ok());

        config.observability.metrics_enabled = true;
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors, vec![ValidationError::MetricsAddress("nope".into())]);
    }
}
