//! Configuration loading from disk and environment.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::RelayConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid environment variable {name}: {message}")]
    Env { name: &'static str, message: String },

    #[error("Validation failed: {}", join(.0))]
    Validation(Vec<ValidationError>),
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load and validate configuration from a TOML file, with environment
/// overrides applied on top.
pub fn load_config(path: &Path) -> Result<RelayConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    let config: RelayConfig = toml::from_str(&content)?;
    finish(config)
}

/// Like [`load_config`], but starts from defaults when no path is given.
pub fn load_or_default(path: Option<&Path>) -> Result<RelayConfig, ConfigError> {
    match path {
        Some(path) => load_config(path),
        None => finish(RelayConfig::default()),
    }
}

fn finish(mut config: RelayConfig) -> Result<RelayConfig, ConfigError> {
    apply_env_overrides(&mut config, |name| std::env::var(name).ok())?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Apply the deployment environment variables that take precedence over the
/// file.
pub fn apply_env_overrides(
    config: &mut RelayConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<(), ConfigError> {
    if let Some(address) = lookup("REDIS_ADDRESS") {
        config.queue.address = address;
    }
    if let Some(stream) = lookup("REDIS_STREAM_NAME") {
        config.queue.stream = stream;
    }
    if let Some(limit) = lookup("REQUEST_SIZE_LIMIT") {
        config.ingress.size_limit = limit.trim().parse().map_err(|_| ConfigError::Env {
            name: "REQUEST_SIZE_LIMIT",
            message: format!("{limit:?} is not a byte count"),
        })?;
    }
    if let Some(destination) = lookup("DESTINATION_HOST") {
        config.ingress.destination = Some(destination).filter(|d| !d.is_empty());
    }
    if let Some(bind) = lookup("RELAY_BIND_ADDRESS") {
        config.listener.bind_address = bind;
    }
    Ok(())
}
