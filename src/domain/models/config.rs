//! Runtime configuration model.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Lower bound of the registry cache TTL.
pub const MIN_CACHE_TTL_MS: u64 = 1_000;
/// Upper bound of the registry cache TTL.
pub const MAX_CACHE_TTL_MS: u64 = 600_000;
/// Lower bound of the invalidation poll interval.
pub const MIN_POLL_INTERVAL_MS: u64 = 1_000;

/// Main configuration structure for Agentry
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Transport dispatch configuration
    #[serde(default)]
    pub dispatch: DispatcherConfig,

    /// Agent registry cache configuration
    #[serde(default)]
    pub registry: RegistryConfig,

    /// Stream channel configuration
    #[serde(default)]
    pub stream: StreamConfig,

    /// Metrics ring buffer configuration
    #[serde(default)]
    pub metrics: MetricsConfig,

    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Anthropic Messages API configuration for managed generation
    #[serde(default)]
    pub anthropic: AnthropicConfig,
}

/// Transport dispatcher configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DispatcherConfig {
    /// Default timeout for HTTP API agents
    #[serde(default = "default_transport_timeout_ms")]
    pub api_timeout_ms: u64,

    /// Default timeout for remote JSON-RPC agents
    #[serde(default = "default_transport_timeout_ms")]
    pub external_timeout_ms: u64,

    /// Default timeout for managed generation
    #[serde(default = "default_transport_timeout_ms")]
    pub llm_timeout_ms: u64,

    /// Headers forwarded in addition to the built-in allow-list
    #[serde(default, deserialize_with = "string_or_list")]
    pub extra_allowed_headers: Vec<String>,

    /// Retry policy for HTTP and JSON-RPC transports
    #[serde(default)]
    pub retry: RetryConfig,

    /// Maximum length of an error message surfaced to callers
    #[serde(default = "default_error_message_cap")]
    pub error_message_cap: usize,
}

const fn default_transport_timeout_ms() -> u64 {
    30_000
}

const fn default_error_message_cap() -> usize {
    160
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            api_timeout_ms: default_transport_timeout_ms(),
            external_timeout_ms: default_transport_timeout_ms(),
            llm_timeout_ms: default_transport_timeout_ms(),
            extra_allowed_headers: Vec::new(),
            retry: RetryConfig::default(),
            error_message_cap: default_error_message_cap(),
        }
    }
}

/// Environment variables carry header lists as `a,b,c`; files carry a YAML list.
fn string_or_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StringOrList {
        One(String),
        Many(Vec<String>),
    }

    Ok(match StringOrList::deserialize(deserializer)? {
        StringOrList::One(s) => s
            .split(',')
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .map(str::to_string)
            .collect(),
        StringOrList::Many(v) => v,
    })
}

/// Retry policy configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RetryConfig {
    /// Retries after the first attempt
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base backoff in milliseconds, doubled per attempt
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
}

const fn default_max_retries() -> u32 {
    2
}

const fn default_backoff_base_ms() -> u64 {
    200
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            backoff_base_ms: default_backoff_base_ms(),
        }
    }
}

/// Registry cache configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RegistryConfig {
    /// Cache entry lifetime, clamped to 1s..=10min
    #[serde(default = "default_cache_ttl_ms")]
    pub cache_ttl_ms: u64,

    /// Invalidation poll interval, at least 1s
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Whether the CLI starts the invalidation poller
    #[serde(default = "default_true")]
    pub poll_enabled: bool,
}

const fn default_cache_ttl_ms() -> u64 {
    60_000
}

const fn default_poll_interval_ms() -> u64 {
    15_000
}

const fn default_true() -> bool {
    true
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            cache_ttl_ms: default_cache_ttl_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            poll_enabled: true,
        }
    }
}

impl RegistryConfig {
    /// Cache TTL clamped to the supported range.
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_millis(self.cache_ttl_ms.clamp(MIN_CACHE_TTL_MS, MAX_CACHE_TTL_MS))
    }

    /// Poll interval, never below the minimum.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(MIN_POLL_INTERVAL_MS))
    }
}

/// Stream channel configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct StreamConfig {
    /// Events buffered before the producer waits
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

const fn default_channel_capacity() -> usize {
    64
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            channel_capacity: default_channel_capacity(),
        }
    }
}

/// Metrics recorder configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct MetricsConfig {
    /// Samples retained per (transport, agent) series
    #[serde(default = "default_ring_capacity")]
    pub ring_capacity: usize,
}

const fn default_ring_capacity() -> usize {
    256
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            ring_capacity: default_ring_capacity(),
        }
    }
}

/// Database configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DatabaseConfig {
    /// Path to `SQLite` database file
    #[serde(default = "default_database_path")]
    pub path: String,

    /// Maximum number of database connections in pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_database_path() -> String {
    ".agentry/agentry.db".to_string()
}

const fn default_max_connections() -> u32 {
    10
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
            max_connections: default_max_connections(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Directory for rolling log files; stdout only when unset
    #[serde(default)]
    pub log_dir: Option<String>,

    /// Number of daily log files to keep
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

const fn default_retention_days() -> u32 {
    30
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            log_dir: None,
            retention_days: default_retention_days(),
        }
    }
}

/// Anthropic Messages API configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct AnthropicConfig {
    /// API key; falls back to `ANTHROPIC_API_KEY`
    #[serde(default)]
    pub api_key: Option<String>,

    /// API base URL
    #[serde(default = "default_anthropic_base_url")]
    pub base_url: String,

    /// Model used when the agent does not name one
    #[serde(default = "default_anthropic_model")]
    pub default_model: String,

    /// Default output token cap
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_anthropic_base_url() -> String {
    "https://api.anthropic.com".to_string()
}

fn default_anthropic_model() -> String {
    "claude-sonnet-4-5".to_string()
}

const fn default_max_tokens() -> u32 {
    4096
}

impl Default for AnthropicConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_anthropic_base_url(),
            default_model: default_anthropic_model(),
            max_tokens: default_max_tokens(),
        }
    }
}
