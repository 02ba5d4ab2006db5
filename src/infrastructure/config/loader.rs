//! Layered configuration loading: defaults, YAML file, then environment.

use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use std::path::Path;
use thiserror::Error;

use crate::domain::models::config::Config;

/// Project-local configuration directory.
pub const CONFIG_DIR: &str = ".agentry";

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    /// `logging.level` is not a tracing level.
    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    /// `logging.format` is neither `json` nor `pretty`.
    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    /// `database.path` is empty.
    #[error("Database path cannot be empty")]
    EmptyDatabasePath,

    /// `database.max_connections` is zero.
    #[error("Invalid max_connections: {0}. Must be at least 1")]
    InvalidMaxConnections(u32),

    /// A default transport timeout is zero.
    #[error("Invalid {transport} timeout: {value}ms. Must be positive")]
    InvalidTimeout {
        /// Transport the timeout belongs to.
        transport: &'static str,
        /// Configured value.
        value: u64,
    },

    /// `dispatch.error_message_cap` is zero.
    #[error("Invalid error_message_cap: {0}. Must be at least 1")]
    InvalidErrorMessageCap(usize),

    /// `stream.channel_capacity` is zero.
    #[error("Invalid stream channel_capacity: {0}. Must be at least 1")]
    InvalidChannelCapacity(usize),

    /// `metrics.ring_capacity` is zero.
    #[error("Invalid metrics ring_capacity: {0}. Must be at least 1")]
    InvalidRingCapacity(usize),

    /// Any other invalid setting.
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. .agentry/config.yaml
    /// 3. .agentry/local.yaml
    /// 4. Environment variables (AGENTRY_* prefix, `__` separates sections)
    pub fn load() -> Result<Config> {
        Self::load_from_dir(CONFIG_DIR)
    }

    /// Same precedence as [`ConfigLoader::load`], rooted at `dir`.
    pub fn load_from_dir(dir: impl AsRef<Path>) -> Result<Config> {
        let dir = dir.as_ref();
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(dir.join("config.yaml")))
            .merge(Yaml::file(dir.join("local.yaml")))
            .merge(Env::prefixed("AGENTRY_").split("__"))
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path.as_ref()))
            .extract()
            .context(format!(
                "Failed to load config from {}",
                path.as_ref().display()
            ))?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate configuration after loading
    ///
    /// Cache TTL and poll interval are clamped on use rather than rejected.
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        if config.database.path.is_empty() {
            return Err(ConfigError::EmptyDatabasePath);
        }

        if config.database.max_connections == 0 {
            return Err(ConfigError::InvalidMaxConnections(
                config.database.max_connections,
            ));
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.to_lowercase().as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }

        let valid_log_formats = ["json", "pretty"];
        if !valid_log_formats.contains(&config.logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }

        let dispatch = &config.dispatch;
        for (transport, value) in [
            ("api", dispatch.api_timeout_ms),
            ("external", dispatch.external_timeout_ms),
            ("llm", dispatch.llm_timeout_ms),
        ] {
            if value == 0 {
                return Err(ConfigError::InvalidTimeout { transport, value });
            }
        }

        if dispatch.error_message_cap == 0 {
            return Err(ConfigError::InvalidErrorMessageCap(dispatch.error_message_cap));
        }

        if dispatch
            .extra_allowed_headers
            .iter()
            .any(|h| h.trim().is_empty() || h.contains(char::is_whitespace))
        {
            return Err(ConfigError::ValidationFailed(
                "extra_allowed_headers entries must be non-empty header names".to_string(),
            ));
        }

        if config.stream.channel_capacity == 0 {
            return Err(ConfigError::InvalidChannelCapacity(
                config.stream.channel_capacity,
            ));
        }

        if config.metrics.ring_capacity == 0 {
            return Err(ConfigError::InvalidRingCapacity(config.metrics.ring_capacity));
        }

        if config.anthropic.base_url.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "anthropic base_url cannot be empty".to_string(),
            ));
        }

        Ok(())
    }
}
