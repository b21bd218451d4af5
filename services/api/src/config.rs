//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The
//! `.env` file is used for local development. There are no CLI flags.

use std::net::SocketAddr;
use tracing::Level;

/// Default base URL for the generation API: Google's OpenAI-compatible
/// Gemini endpoint.
pub const DEFAULT_GENAI_API_BASE: &str =
    "https://generativelanguage.googleapis.com/v1beta/openai";

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
    pub bind_address: SocketAddr,
    pub database_url: String,
    pub log_level: Level,
    pub genai_api_key: Option<String>,
    pub genai_api_base: String,
    pub default_model: String,
    pub default_temperature: f64,
    pub auth_username: String,
    pub auth_password: String,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for
    /// development, but this is skipped in test environments to ensure
    /// tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination.
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        // --- Load Server and Database Settings ---
        let bind_address_str =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
        let bind_address = bind_address_str
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string()))?;

        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| ConfigError::MissingVar("DATABASE_URL".to_string()))?;

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        // --- Load Generation API Settings ---
        let genai_api_key = std::env::var("GENAI_API_KEY").ok();
        let genai_api_base = std::env::var("GENAI_API_BASE")
            .unwrap_or_else(|_| DEFAULT_GENAI_API_BASE.to_string());
        let default_model = std::env::var("GENAI_DEFAULT_MODEL")
            .unwrap_or_else(|_| "gemini-2.0-flash".to_string());
        let default_temperature = match std::env::var("GENAI_DEFAULT_TEMPERATURE") {
            Ok(raw) => raw.parse::<f64>().map_err(|_| {
                ConfigError::InvalidValue(
                    "GENAI_DEFAULT_TEMPERATURE".to_string(),
                    format!("'{}' is not a number", raw),
                )
            })?,
            Err(_) => 0.7,
        };

        // --- Load Access Gate Secrets ---
        let auth_username = std::env::var("AUTH_USERNAME")
            .map_err(|_| ConfigError::MissingVar("AUTH_USERNAME".to_string()))?;
        let auth_password = std::env::var("AUTH_PASSWORD")
            .map_err(|_| ConfigError::MissingVar("AUTH_PASSWORD".to_string()))?;

        Ok(Self {
            bind_address,
            database_url,
            log_level,
            genai_api_key,
            genai_api_base,
            default_model,
            default_temperature,
            auth_username,
            auth_password,
        })
    }
}
