//! Configuration management for workspace-sync
//!
//! This module handles loading, parsing, and validating application
//! configuration from YAML files and environment variables.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// Remote workspace API configuration
    #[serde(default)]
    pub remote: RemoteConfig,

    /// Retry configuration for remote API calls
    #[serde(default)]
    pub retry: RetryConfig,

    /// Circuit breaker configuration
    #[serde(default)]
    pub breaker: BreakerConfig,

    /// Scheduler configuration
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Read cache configuration
    #[serde(default)]
    pub cache: CacheConfig,

    /// Monitor and alerting configuration
    #[serde(default)]
    pub monitor: MonitorConfig,

    /// Local database configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// HTTP control surface configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::FileRead(format!("Failed to read config file: {}", e)))?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        // First, expand environment variables in the YAML string
        let expanded = expand_env_vars(yaml);
        serde_yaml::from_str(&expanded)
            .map_err(|e| ConfigError::Parse(format!("Failed to parse YAML: {}", e)))
    }

    /// Load configuration from environment variables with prefix WORKSPACE_SYNC_
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Config::default();

        // Remote config from env
        if let Ok(base_url) = std::env::var("WORKSPACE_SYNC_REMOTE_BASE_URL") {
            config.remote.base_url = base_url;
        }
        if let Ok(token) = std::env::var("WORKSPACE_SYNC_REMOTE_API_TOKEN") {
            config.remote.api_token = Some(token);
        }

        // Server config from env
        if let Ok(host) = std::env::var("WORKSPACE_SYNC_SERVER_HOST") {
            config.server.host = host;
        }
        if let Ok(port) = std::env::var("WORKSPACE_SYNC_SERVER_PORT") {
            config.server.port = port
                .parse()
                .map_err(|_| ConfigError::Parse("Invalid port number".to_string()))?;
        }

        // Database config from env
        if let Ok(path) = std::env::var("WORKSPACE_SYNC_DATABASE_PATH") {
            config.database.path = path;
        }

        // Logging config from env
        if let Ok(level) = std::env::var("WORKSPACE_SYNC_LOG_LEVEL") {
            config.logging.level = level;
        }

        Ok(config)
    }

    /// Validate values that serde defaults cannot express
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.remote.base_url.is_empty() {
            return Err(ConfigError::MissingRequired("remote.base_url".to_string()));
        }
        if self.retry.backoff_multiplier < 1.0 {
            return Err(ConfigError::InvalidValue(
                "retry.backoff_multiplier must be >= 1.0".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.retry.jitter_ratio) {
            return Err(ConfigError::InvalidValue(
                "retry.jitter_ratio must be within 0.0..=1.0".to_string(),
            ));
        }
        if self.breaker.failure_threshold == 0 {
            return Err(ConfigError::InvalidValue(
                "breaker.failure_threshold must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Remote workspace API configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RemoteConfig {
    /// Base URL of the workspace API
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Bearer token for the integration (use `${VAR}` expansion in YAML)
    pub api_token: Option<String>,

    /// Value for the API version header sent with every request
    #[serde(default = "default_api_version")]
    pub api_version: String,

    /// Request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub timeout_secs: u64,

    /// Page size used for paginated queries (remote caps at 100)
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_token: None,
            api_version: default_api_version(),
            timeout_secs: default_request_timeout(),
            page_size: default_page_size(),
        }
    }
}

fn default_base_url() -> String {
    "https://api.workspace.example.com/v1".to_string()
}

fn default_api_version() -> String {
    "2022-06-28".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

fn default_page_size() -> u32 {
    100
}

/// Retry configuration for remote API calls
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (total attempts = max_retries + 1)
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Initial backoff duration in milliseconds
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Maximum backoff duration in milliseconds
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Backoff multiplier
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Fraction of the computed delay added as random jitter (0.0..=1.0)
    #[serde(default = "default_jitter_ratio")]
    pub jitter_ratio: f64,

    /// HTTP status codes eligible for retry
    #[serde(default = "default_retryable_status_codes")]
    pub retryable_status_codes: Vec<u16>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter_ratio: default_jitter_ratio(),
            retryable_status_codes: default_retryable_status_codes(),
        }
    }
}

fn default_max_retries() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    500
}

fn default_max_delay_ms() -> u64 {
    60_000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_jitter_ratio() -> f64 {
    0.25
}

fn default_retryable_status_codes() -> Vec<u16> {
    vec![429, 500, 502, 503, 504]
}

/// Circuit breaker configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BreakerConfig {
    /// Breaker identity; keys its state in the shared coordination store
    #[serde(default = "default_breaker_name")]
    pub name: String,

    /// Consecutive failures required to open the breaker
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// Seconds the breaker stays open before permitting a trial call
    #[serde(default = "default_recovery_timeout")]
    pub recovery_timeout_secs: u64,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            name: default_breaker_name(),
            failure_threshold: default_failure_threshold(),
            recovery_timeout_secs: default_recovery_timeout(),
        }
    }
}

fn default_breaker_name() -> String {
    "workspace-api".to_string()
}

fn default_failure_threshold() -> u32 {
    5
}

fn default_recovery_timeout() -> u64 {
    60
}

/// Scheduler configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SchedulerConfig {
    /// Lease TTL in seconds; an expired lease frees a crashed run's slot
    #[serde(default = "default_lease_ttl")]
    pub lease_ttl_secs: u64,

    /// Age in seconds past which a non-terminal run is treated as stuck
    /// rather than legitimately in progress
    #[serde(default = "default_stuck_run_age")]
    pub stuck_run_age_secs: u64,

    /// TTL for force-sync markers in seconds
    #[serde(default = "default_force_marker_ttl")]
    pub force_marker_ttl_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            lease_ttl_secs: default_lease_ttl(),
            stuck_run_age_secs: default_stuck_run_age(),
            force_marker_ttl_secs: default_force_marker_ttl(),
        }
    }
}

fn default_lease_ttl() -> u64 {
    300
}

fn default_stuck_run_age() -> u64 {
    3600
}

fn default_force_marker_ttl() -> u64 {
    300
}

/// Read cache configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CacheConfig {
    /// Entry TTL in seconds
    #[serde(default = "default_cache_ttl")]
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_cache_ttl(),
        }
    }
}

fn default_cache_ttl() -> u64 {
    300
}

/// Monitor and alerting configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MonitorConfig {
    /// Overdue factor (x sync interval) at which a database turns warning
    #[serde(default = "default_warning_overdue_factor")]
    pub warning_overdue_factor: f64,

    /// Overdue factor (x sync interval) at which a database turns critical
    #[serde(default = "default_critical_overdue_factor")]
    pub critical_overdue_factor: f64,

    /// Consecutive failed runs at which a database turns critical
    #[serde(default = "default_max_consecutive_failures")]
    pub max_consecutive_failures: u32,

    /// 24h success rate below which a database turns warning (percent)
    #[serde(default = "default_success_rate_threshold")]
    pub success_rate_threshold: f64,

    /// Seconds during which repeat alerts of the same severity are suppressed
    #[serde(default = "default_alert_suppression")]
    pub alert_suppression_secs: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            warning_overdue_factor: default_warning_overdue_factor(),
            critical_overdue_factor: default_critical_overdue_factor(),
            max_consecutive_failures: default_max_consecutive_failures(),
            success_rate_threshold: default_success_rate_threshold(),
            alert_suppression_secs: default_alert_suppression(),
        }
    }
}

fn default_warning_overdue_factor() -> f64 {
    2.0
}

fn default_critical_overdue_factor() -> f64 {
    4.0
}

fn default_max_consecutive_failures() -> u32 {
    3
}

fn default_success_rate_threshold() -> f64 {
    80.0
}

fn default_alert_suppression() -> u64 {
    1800
}

/// Local database configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DatabaseConfig {
    /// Path to SQLite database file
    #[serde(default = "default_database_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
        }
    }
}

fn default_database_path() -> String {
    "/data/db/workspace-sync.db".to_string()
}

/// HTTP control surface configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    /// Host address to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

/// Configuration error types
#[derive(Debug, thiserror::Error, Clone, PartialEq)]
pub enum ConfigError {
    /// Error reading configuration file
    #[error("Failed to read configuration file: {0}")]
    FileRead(String),

    /// Error parsing configuration
    #[error("Failed to parse configuration: {0}")]
    Parse(String),

    /// Invalid configuration value
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),

    /// Missing required configuration
    #[error("Missing required configuration: {0}")]
    MissingRequired(String),
}

/// Expand environment variables in a string
///
/// Supports `${VAR_NAME}` syntax
fn expand_env_vars(input: &str) -> String {
    let re = regex_lite::Regex::new(r"\$\{([^}]+)\}")
        .expect("Invalid regex pattern for environment variable expansion");

    re.replace_all(input, |caps: &regex_lite::Captures| {
        let var_name = &caps[1];
        std::env::var(var_name).unwrap_or_else(|_| caps[0].to_string())
    })
    .into_owned()
}
