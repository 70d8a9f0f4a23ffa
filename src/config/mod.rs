//! Configuration management for cf-list-sync
//!
//! This module handles loading, parsing, and validating application
//! configuration from YAML files. The Cloudflare API token is deliberately
//! not part of the file format; it is read from the `CLOUDFLARE_API_TOKEN`
//! environment variable at startup.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::source::SourceFormat;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// Accounts and the lists to synchronize within each
    #[serde(default)]
    pub accounts: Vec<AccountConfig>,

    /// Whether to anonymize account ids and emails in reports
    #[serde(default)]
    pub anonymize: bool,

    /// Source feed cache configuration
    #[serde(default)]
    pub cache: CacheConfig,

    /// Retry configuration for source feed fetches
    #[serde(default)]
    pub retry: RetryConfig,

    /// Batch sync configuration
    #[serde(default)]
    pub sync: SyncConfig,

    /// HTTP transport configuration
    #[serde(default)]
    pub http: HttpConfig,

    /// Run report configuration
    #[serde(default)]
    pub reports: ReportConfig,

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
        // Expand environment variables before parsing
        let expanded = expand_env_vars(yaml);
        serde_yaml::from_str(&expanded)
            .map_err(|e| ConfigError::Parse(format!("Failed to parse YAML: {}", e)))
    }
}

/// A Cloudflare account with its managed list targets
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AccountConfig {
    /// Cloudflare account id
    pub id: String,

    /// Lists to synchronize within this account
    #[serde(default)]
    pub lists: Vec<ListTarget>,
}

/// A single managed list to synchronize
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ListTarget {
    /// Name of the managed list as it appears in Cloudflare
    pub name: String,

    /// URL of the source feed providing the desired membership
    pub sync_from: String,

    /// Source feed format
    #[serde(rename = "type", default)]
    pub format: SourceFormat,
}

/// Source feed cache configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CacheConfig {
    /// Directory holding the last-known-good copy of each source feed
    #[serde(default = "default_cache_dir")]
    pub dir: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: default_cache_dir(),
        }
    }
}

fn default_cache_dir() -> String {
    "/var/cache/cf-list-sync".to_string()
}

/// Retry configuration for source feed fetches
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetryConfig {
    /// Maximum number of retry attempts after the initial try
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Initial backoff duration in seconds
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_secs: u64,

    /// Maximum backoff duration in seconds
    #[serde(default = "default_max_backoff")]
    pub max_backoff_secs: u64,

    /// Backoff multiplier
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Lower bound of the additive random jitter in seconds
    #[serde(default = "default_jitter_min")]
    pub jitter_min_secs: u64,

    /// Upper bound of the additive random jitter in seconds
    #[serde(default = "default_jitter_max")]
    pub jitter_max_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_secs: default_initial_backoff(),
            max_backoff_secs: default_max_backoff(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter_min_secs: default_jitter_min(),
            jitter_max_secs: default_jitter_max(),
        }
    }
}

fn default_max_retries() -> u32 {
    3
}

fn default_initial_backoff() -> u64 {
    5
}

fn default_max_backoff() -> u64 {
    60
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_jitter_min() -> u64 {
    0
}

fn default_jitter_max() -> u64 {
    5
}

/// Batch sync configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SyncConfig {
    /// Maximum number of members a managed list may hold
    #[serde(default = "default_max_list_size")]
    pub max_list_size: usize,

    /// Maximum number of members per write batch
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Base pre-emptive throttle delay in milliseconds
    #[serde(default)]
    pub throttle_base_ms: u64,

    /// Maximum pre-emptive throttle delay in milliseconds
    #[serde(default = "default_throttle_max_ms")]
    pub throttle_max_ms: u64,

    /// Fallback wait in seconds when a 429 carries no Retry-After header
    #[serde(default = "default_rate_limit_wait")]
    pub rate_limit_wait_secs: u64,

    /// Absolute cap on any single rate-limit wait, in seconds
    #[serde(default = "default_rate_limit_max_wait")]
    pub rate_limit_max_wait_secs: u64,

    /// Maximum number of retries for a single batch while rate limited
    #[serde(default = "default_batch_max_retries")]
    pub batch_max_retries: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_list_size: default_max_list_size(),
            chunk_size: default_chunk_size(),
            throttle_base_ms: 0,
            throttle_max_ms: default_throttle_max_ms(),
            rate_limit_wait_secs: default_rate_limit_wait(),
            rate_limit_max_wait_secs: default_rate_limit_max_wait(),
            batch_max_retries: default_batch_max_retries(),
        }
    }
}

fn default_max_list_size() -> usize {
    10_000
}

fn default_chunk_size() -> usize {
    1_000
}

fn default_throttle_max_ms() -> u64 {
    30_000
}

fn default_rate_limit_wait() -> u64 {
    10
}

fn default_rate_limit_max_wait() -> u64 {
    120
}

fn default_batch_max_retries() -> u32 {
    5
}

/// HTTP transport configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HttpConfig {
    /// Per-request timeout in seconds, applied uniformly to all HTTP calls
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Base URL of the Cloudflare API
    #[serde(default = "default_api_base")]
    pub api_base: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout(),
            api_base: default_api_base(),
        }
    }
}

fn default_timeout() -> u64 {
    30
}

fn default_api_base() -> String {
    "https://api.cloudflare.com/client/v4".to_string()
}

/// Run report configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReportConfig {
    /// Whether to write a markdown report after each run
    #[serde(default = "default_reports_enabled")]
    pub enabled: bool,

    /// Directory to write reports into
    #[serde(default = "default_reports_dir")]
    pub dir: String,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            enabled: default_reports_enabled(),
            dir: default_reports_dir(),
        }
    }
}

fn default_reports_enabled() -> bool {
    true
}

fn default_reports_dir() -> String {
    "reports".to_string()
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
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
