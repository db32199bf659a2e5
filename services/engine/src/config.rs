//! services/engine/src/config.rs
//!
//! Defines the engine's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use std::time::Duration;
use tracing::Level;
use uuid::Uuid;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub backend_base_url: String,
    pub backend_token: String,
    pub business_id: Uuid,
    pub log_level: Level,
    /// How long a command waits for a server acknowledgment before the
    /// optimistic write is rolled back.
    pub command_timeout: Duration,
    /// Bounded retry count for the fetch behind a cache miss.
    pub fetch_retry_limit: u32,
    pub reconnect_base_delay: Duration,
    pub reconnect_max_delay: Duration,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination.
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        // --- Backend Connection Settings ---
        let backend_base_url = std::env::var("BACKEND_BASE_URL")
            .map_err(|_| ConfigError::MissingVar("BACKEND_BASE_URL".to_string()))?;

        let backend_token = std::env::var("BACKEND_TOKEN")
            .map_err(|_| ConfigError::MissingVar("BACKEND_TOKEN".to_string()))?;

        let business_id_str = std::env::var("BUSINESS_ID")
            .map_err(|_| ConfigError::MissingVar("BUSINESS_ID".to_string()))?;
        let business_id = Uuid::parse_str(&business_id_str).map_err(|e| {
            ConfigError::InvalidValue("BUSINESS_ID".to_string(), e.to_string())
        })?;

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        // --- Command and Retry Settings ---
        let command_timeout =
            Duration::from_secs(parse_var_or("COMMAND_TIMEOUT_SECS", 10)?);
        let fetch_retry_limit = parse_var_or("FETCH_RETRY_LIMIT", 3)? as u32;
        let reconnect_base_delay =
            Duration::from_millis(parse_var_or("RECONNECT_BASE_DELAY_MS", 500)?);
        let reconnect_max_delay =
            Duration::from_secs(parse_var_or("RECONNECT_MAX_DELAY_SECS", 30)?);

        Ok(Self {
            backend_base_url,
            backend_token,
            business_id,
            log_level,
            command_timeout,
            fetch_retry_limit,
            reconnect_base_delay,
            reconnect_max_delay,
        })
    }
}

/// Reads an optional numeric variable, falling back to `default`.
fn parse_var_or(name: &str, default: u64) -> Result<u64, ConfigError> {
    match std::env::var(name) {
        Ok(raw) => raw.parse::<u64>().map_err(|_| {
            ConfigError::InvalidValue(
                name.to_string(),
                format!("'{}' is not a non-negative integer", raw),
            )
        }),
        Err(_) => Ok(default),
    }
}
