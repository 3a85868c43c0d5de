//! Configuration loading from disk and environment.

use std::fs;
use std::path::Path;

use crate::config::schema::ProxyConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    Env { var: &'static str, value: String },
    Validation(Vec<ValidationError>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Parse(e) => write!(f, "Parse error: {}", e),
            ConfigError::Env { var, value } => {
                write!(f, "Invalid value '{}' for environment variable {}", value, var)
            }
            ConfigError::Validation(errors) => {
                write!(f, "Validation failed: ")?;
                for (i, err) in errors.iter().enumerate() {
                    if i > 0 { write!(f, ", ")?; }
                    write!(f, "{}", err)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<ProxyConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(ConfigError::Io)?;
    let config: ProxyConfig = toml::from_str(&content).map_err(ConfigError::Parse)?;

    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Apply overrides from the process environment.
pub fn apply_env_overrides(config: &mut ProxyConfig) -> Result<(), ConfigError> {
    apply_overrides_from(config, |name| std::env::var(name).ok())
}

/// Apply overrides using an arbitrary variable lookup.
///
/// Recognized variables: `PORT`, `PROXY_USER_AGENT`, `PROXY_MAX_RESPONSE_BYTES`,
/// `PROXY_FETCH_TIMEOUT_SECS`, `PROXY_FETCH_STRATEGY`.
pub fn apply_overrides_from<F>(config: &mut ProxyConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(port) = lookup("PORT") {
        config.listener.port = parse_var("PORT", &port)?;
    }
    if let Some(agent) = lookup("PROXY_USER_AGENT") {
        config.fetch.user_agent = agent;
    }
    if let Some(limit) = lookup("PROXY_MAX_RESPONSE_BYTES") {
        config.fetch.max_response_bytes = parse_var("PROXY_MAX_RESPONSE_BYTES", &limit)?;
    }
    if let Some(secs) = lookup("PROXY_FETCH_TIMEOUT_SECS") {
        config.fetch.timeout_secs = parse_var("PROXY_FETCH_TIMEOUT_SECS", &secs)?;
    }
    if let Some(strategy) = lookup("PROXY_FETCH_STRATEGY") {
        config.fetch.strategy = parse_var("PROXY_FETCH_STRATEGY", &strategy)?;
    }
    Ok(())
}

fn parse_var<T: std::str::FromStr>(var: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Env {
        var,
        value: value.to_string(),
    })
}
