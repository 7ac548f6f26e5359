//! `wp_config` - Configuration parsing and validation for wfm-poller
//!
//! This crate provides:
//! - TOML configuration parsing
//! - Default value handling
//! - Environment variable overrides (including the legacy `FIVE9_*` / `SUPABASE_*` names)
//! - Path expansion (`~/` to home directory)
//! - Auto-discovery from standard config paths

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::info;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Failed to serialize TOML: {0}")]
    SerializeError(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),

    #[error("Missing required field: {0}")]
    MissingField(String),
}

/// Top-level configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct WpConfig {
    /// Global settings
    pub global: GlobalConfig,

    /// Five9 Supervisor API settings
    pub five9: Five9Config,

    /// Snapshot store settings
    pub store: StoreConfig,

    /// Retention window settings
    pub retention: RetentionConfig,

    /// Web service settings
    pub web: WebConfig,
}

/// Global configuration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalConfig {
    /// Poll interval for the built-in daemon loop, in seconds
    pub poll_interval_secs: u64,

    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,

    /// Enable JSON logging
    pub json_logs: bool,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 60,
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}

/// Five9 Supervisor web service settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Five9Config {
    /// API username
    pub username: String,

    /// API password (never written back out by `config show`)
    #[serde(skip_serializing)]
    pub password: String,

    /// Supervisor SOAP endpoint
    pub soap_url: String,

    /// Service namespace used for the `ser:` prefix
    pub namespace: String,

    /// Fixed UTC offset of the Five9 domain clock, in hours (no DST)
    pub tz_offset_hours: i64,

    /// Per-call timeout in seconds
    pub timeout_secs: u64,

    /// Statistic type requested from `getStatistics`
    pub statistic_type: String,

    /// `viewSettings.rollingPeriod` sent with `setSessionParameters`
    pub rolling_period: String,

    /// `viewSettings.statisticsRange` sent with `setSessionParameters`
    pub statistics_range: String,
}

impl Default for Five9Config {
    fn default() -> Self {
        Self {
            username: String::new(),
            password: String::new(),
            soap_url: "https://api.five9.com/wssupervisor/v14/SupervisorWebService".to_string(),
            namespace: "http://service.supervisor.ws.five9.com/".to_string(),
            tz_offset_hours: -8,
            timeout_secs: 30,
            statistic_type: "AgentState".to_string(),
            rolling_period: "Today".to_string(),
            statistics_range: "CurrentDay".to_string(),
        }
    }
}

impl Five9Config {
    /// Per-call timeout as Duration
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Which store backend receives snapshots
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// Supabase / PostgREST over HTTPS
    #[default]
    Supabase,
    /// Local `DuckDB` file
    Duckdb,
}

impl std::str::FromStr for StoreBackend {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "supabase" => Ok(StoreBackend::Supabase),
            "duckdb" => Ok(StoreBackend::Duckdb),
            other => Err(format!("unknown store backend: {other}")),
        }
    }
}

/// Snapshot store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Backend selection
    pub backend: StoreBackend,

    /// Supabase project URL
    pub url: String,

    /// Supabase service role key (never written back out by `config show`)
    #[serde(skip_serializing)]
    pub api_key: String,

    /// Target table / collection name
    pub table: String,

    /// Path to `DuckDB` database file
    pub db_path: PathBuf,

    /// Per-request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            url: String::new(),
            api_key: String::new(),
            table: "five9_agent_snapshots".to_string(),
            db_path: default_db_path(),
            timeout_secs: 30,
        }
    }
}

impl StoreConfig {
    /// Per-request timeout as Duration
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Retention configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    /// Rows whose `snapshot_ts` is older than this many hours are purged
    pub max_age_hours: u64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self { max_age_hours: 48 }
    }
}

/// Web service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebConfig {
    /// Bind address
    pub bind_address: String,

    /// Port
    pub port: u16,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 10000,
        }
    }
}

/// Default database path using XDG directories
fn default_db_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("wfm-poller")
        .join("snapshots.duckdb")
}

/// Expand tilde in path to home directory
#[must_use]
pub fn expand_path(path: &Path) -> PathBuf {
    let path_str = path.to_string_lossy();
    if let Some(stripped) = path_str.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    } else if path_str == "~" && let Some(home) = dirs::home_dir() {
        return home;
    }
    path.to_path_buf()
}

impl WpConfig {
    /// Standard config file paths, in order of precedence
    #[must_use]
    pub fn config_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from("wfm-poller.toml")];

        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("wfm-poller").join("wfm-poller.toml"));
        }

        paths.push(PathBuf::from("/etc/wfm-poller/wfm-poller.toml"));

        paths
    }

    /// Discover and load configuration from standard paths.
    ///
    /// Returns defaults if no config file is found.
    ///
    /// # Errors
    /// Returns a [`ConfigError`] if a discovered config file cannot be loaded.
    pub fn discover() -> Result<Self, ConfigError> {
        for path in Self::config_paths() {
            if path.exists() {
                info!(path = %path.display(), "Loading config from");
                return Self::load(&path);
            }
        }

        info!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Discover config and apply environment variable overrides.
    ///
    /// # Errors
    /// Returns a [`ConfigError`] if config discovery or validation fails.
    pub fn discover_with_env() -> Result<Self, ConfigError> {
        let mut config = Self::discover()?;
        config.apply_env_overrides();
        config.expand_all_paths();
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific TOML file.
    ///
    /// # Errors
    /// Returns a [`ConfigError`] if the file cannot be read, parsed, or validated.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate configuration from TOML text.
    ///
    /// # Errors
    /// Returns a [`ConfigError`] if the text cannot be parsed or validated.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let mut config: WpConfig = toml::from_str(content)?;
        config.expand_all_paths();
        config.validate()?;
        Ok(config)
    }

    /// Load configuration with environment variable overrides.
    ///
    /// # Errors
    /// Returns a [`ConfigError`] if the file cannot be read, parsed, or validated.
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        config.expand_all_paths();
        config.validate()?;
        Ok(config)
    }

    /// Serialize back to TOML (secrets are omitted)
    ///
    /// # Errors
    /// Returns a [`ConfigError`] if serialization fails.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Expand all paths in configuration (resolve `~/` to home directory)
    pub fn expand_all_paths(&mut self) {
        self.store.db_path = expand_path(&self.store.db_path);
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary key lookup
    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(val) = lookup("FIVE9_USER") {
            self.five9.username = val;
        }
        if let Some(val) = lookup("FIVE9_PASS") {
            self.five9.password = val;
        }
        if let Some(val) = lookup("SUPABASE_URL") {
            self.store.url = val;
        }
        if let Some(val) = lookup("SUPABASE_KEY") {
            self.store.api_key = val;
        }
        if let Some(val) = lookup("PORT")
            && let Ok(port) = val.parse()
        {
            self.web.port = port;
        }
        if let Some(val) = lookup("WP_LOG_LEVEL") {
            self.global.log_level = val;
        }
        if let Some(val) = lookup("WP_DB_PATH") {
            self.store.db_path = expand_path(&PathBuf::from(val));
        }
        if let Some(val) = lookup("WP_POLL_INTERVAL")
            && let Ok(secs) = val.parse()
        {
            self.global.poll_interval_secs = secs;
        }
        if let Some(val) = lookup("WP_STORE_BACKEND")
            && let Ok(backend) = val.parse()
        {
            self.store.backend = backend;
        }
    }

    /// Validate configuration.
    ///
    /// # Errors
    /// Returns a [`ConfigError`] when validation rules are violated.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.global.poll_interval_secs == 0 {
            return Err(ConfigError::ValidationError("poll_interval_secs must be > 0".to_string()));
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.global.log_level.to_lowercase().as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.global.log_level,
                valid_levels.join(", ")
            )));
        }

        if self.five9.timeout_secs == 0 {
            return Err(ConfigError::ValidationError("five9.timeout_secs must be > 0".to_string()));
        }

        if !(-14..=14).contains(&self.five9.tz_offset_hours) {
            return Err(ConfigError::ValidationError(format!(
                "five9.tz_offset_hours must be between -14 and 14, got {}",
                self.five9.tz_offset_hours
            )));
        }

        if self.store.timeout_secs == 0 {
            return Err(ConfigError::ValidationError("store.timeout_secs must be > 0".to_string()));
        }

        if self.store.table.trim().is_empty() {
            return Err(ConfigError::MissingField("store.table".to_string()));
        }

        if self.retention.max_age_hours == 0 {
            return Err(ConfigError::ValidationError(
                "retention.max_age_hours must be > 0".to_string(),
            ));
        }

        if self.web.port == 0 {
            return Err(ConfigError::ValidationError("web.port must be > 0".to_string()));
        }

        Ok(())
    }

    /// Get poll interval as Duration
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.global.poll_interval_secs)
    }
}
