//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and environment variable overrides.

use chrono::Duration;
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::storage::BackendKind;
use crate::timing::{AlertThresholds, Schedule};

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub api: ApiSection,

    #[serde(default)]
    pub schedule: ScheduleConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Feed store configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_backend")]
    pub backend: BackendKind,

    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// API prefix for the http backend, e.g. `http://localhost:8787/api`
    #[serde(default)]
    pub remote_url: Option<String>,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_backend() -> BackendKind {
    BackendKind::Sql
}

fn default_data_dir() -> String {
    dirs::data_local_dir()
        .map(|p| p.join("feedtrack").to_string_lossy().to_string())
        .unwrap_or_else(|| "./feedtrack_data".to_string())
}

fn default_request_timeout() -> u64 {
    10
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            data_dir: default_data_dir(),
            remote_url: None,
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl StorageConfig {
    /// Data directory with a leading `~/` expanded
    pub fn data_root(&self) -> PathBuf {
        match self.data_dir.strip_prefix("~/") {
            Some(rest) => dirs::home_dir()
                .map(|home| home.join(rest))
                .unwrap_or_else(|| PathBuf::from(&self.data_dir)),
            None => PathBuf::from(&self.data_dir),
        }
    }

    /// JSON file used by the blob backend
    pub fn blob_path(&self) -> PathBuf {
        self.data_root().join("feeds.json")
    }

    /// Database used by the kv backend
    pub fn kv_path(&self) -> PathBuf {
        self.data_root().join("feeds_kv.db")
    }

    /// Database used by the sql backend
    pub fn sql_path(&self) -> PathBuf {
        self.data_root().join("feeds.db")
    }
}

/// API server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ApiSection {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8787
}

impl Default for ApiSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Feeding schedule and display windows
#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleConfig {
    #[serde(default = "default_interval")]
    pub interval_minutes: i64,

    #[serde(default = "default_warning")]
    pub warning_minutes: i64,

    #[serde(default = "default_danger")]
    pub danger_minutes: i64,

    #[serde(default = "default_amount")]
    pub default_amount_ml: u32,

    #[serde(default = "default_recent_window")]
    pub recent_window_hours: i64,

    #[serde(default = "default_summary_days")]
    pub summary_days: u32,
}

fn default_interval() -> i64 {
    240 // 4 hours
}

fn default_warning() -> i64 {
    165 // 2h45m
}

fn default_danger() -> i64 {
    240
}

fn default_amount() -> u32 {
    120
}

fn default_recent_window() -> i64 {
    48
}

fn default_summary_days() -> u32 {
    3
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            interval_minutes: default_interval(),
            warning_minutes: default_warning(),
            danger_minutes: default_danger(),
            default_amount_ml: default_amount(),
            recent_window_hours: default_recent_window(),
            summary_days: default_summary_days(),
        }
    }
}

impl ScheduleConfig {
    /// Convert to the derivation engine's schedule
    pub fn to_schedule(&self) -> Schedule {
        Schedule {
            interval: Duration::minutes(self.interval_minutes),
            thresholds: AlertThresholds {
                warning: Duration::minutes(self.warning_minutes),
                danger: Duration::minutes(self.danger_minutes),
            },
            default_amount: self.default_amount_ml.max(1),
            recent_window: Duration::hours(self.recent_window_hours),
            summary_days: self.summary_days.max(1),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Self::parse(&content).map_err(|error| ConfigError::Parse {
            path: path.to_path_buf(),
            error,
        })
    }

    /// Parse configuration from TOML text
    pub fn parse(content: &str) -> Result<Self, String> {
        toml::from_str(content).map_err(|e| e.to_string())
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    }

    /// Load configuration with environment variable overrides
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from default locations or environment
    pub fn load_default() -> Self {
        let config_paths = [
            dirs::config_dir().map(|p| p.join("feedtrack").join("config.toml")),
            Some(PathBuf::from("/etc/feedtrack/config.toml")),
            Some(PathBuf::from("./config.toml")),
        ];

        for path in config_paths.iter().flatten() {
            if path.exists() {
                match Self::load_with_env(path) {
                    Ok(config) => {
                        tracing::info!("Loaded config from {:?}", path);
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load config from {:?}: {}", path, e);
                    }
                }
            }
        }

        tracing::info!("Using default config with environment overrides");
        Self::from_env()
    }

    /// Apply environment variable overrides to an existing config
    fn apply_env_overrides(&mut self) {
        // Storage overrides
        if let Ok(backend) = std::env::var("FEEDTRACK_BACKEND") {
            match backend.parse() {
                Ok(kind) => self.storage.backend = kind,
                Err(e) => tracing::warn!("Ignoring FEEDTRACK_BACKEND: {}", e),
            }
        }
        if let Ok(data_dir) = std::env::var("FEEDTRACK_DATA_DIR") {
            self.storage.data_dir = data_dir;
        }
        if let Ok(url) = std::env::var("FEEDTRACK_REMOTE_URL") {
            self.storage.remote_url = Some(url);
        }

        // API overrides
        if let Ok(host) = std::env::var("FEEDTRACK_API_HOST") {
            self.api.host = host;
        }
        if let Ok(port) = std::env::var("FEEDTRACK_API_PORT") {
            if let Ok(p) = port.parse() {
                self.api.port = p;
            }
        }

        // Logging overrides
        if let Ok(level) = std::env::var("FEEDTRACK_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("FEEDTRACK_LOG_FORMAT") {
            self.logging.format = format;
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    r#"# Feedtrack Configuration
#
# Environment variables override these settings:
# - FEEDTRACK_BACKEND
# - FEEDTRACK_DATA_DIR
# - FEEDTRACK_REMOTE_URL
# - FEEDTRACK_API_HOST
# - FEEDTRACK_API_PORT
# - FEEDTRACK_LOG_LEVEL
# - FEEDTRACK_LOG_FORMAT

[storage]
# Where feeds live: memory, blob, kv, sql, http
backend = "sql"

# Directory for the blob/kv/sql files
data_dir = "~/.local/share/feedtrack"

# API prefix used by the http backend
# remote_url = "http://localhost:8787/api"

# HTTP backend request timeout in seconds
request_timeout_secs = 10

[api]
# API server host
host = "0.0.0.0"

# API server port
port = 8787

[schedule]
# Expected time between feeds (minutes)
interval_minutes = 240

# Elapsed time that turns the timer amber (minutes)
warning_minutes = 165

# Elapsed time that turns the timer red (minutes)
danger_minutes = 240

# Amount used for the seed record of an empty log (ml)
default_amount_ml = 120

# How far back the timeline reaches (hours)
recent_window_hours = 48

# Days covered by the daily summary
summary_days = 3

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty (for development) or json (for production)
format = "pretty"
"#
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_parses() {
        let config = Config::parse(&generate_default_config()).unwrap();
        assert_eq!(config.storage.backend, BackendKind::Sql);
        assert_eq!(config.api.port, 8787);
        assert_eq!(config.schedule.default_amount_ml, 120);
        assert_eq!(config.logging.format, "pretty");
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let config = Config::parse("[schedule]\nwarning_minutes = 150\n").unwrap();
        assert_eq!(config.schedule.warning_minutes, 150);
        assert_eq!(config.schedule.danger_minutes, 240);
        assert_eq!(config.storage.backend, BackendKind::Sql);
    }

    #[test]
    fn test_unknown_backend_rejected() {
        assert!(Config::parse("[storage]\nbackend = \"mongo\"\n").is_err());
    }

    #[test]
    fn test_schedule_conversion() {
        let schedule = ScheduleConfig::default().to_schedule();
        assert_eq!(schedule.interval, Duration::hours(4));
        assert_eq!(
            schedule.thresholds.warning,
            Duration::hours(2) + Duration::minutes(45)
        );
        assert_eq!(schedule.thresholds.danger, Duration::hours(4));
    }

    #[test]
    fn test_storage_paths_under_data_dir() {
        let config = StorageConfig {
            data_dir: "/tmp/ft".to_string(),
            ..Default::default()
        };
        assert_eq!(config.sql_path(), PathBuf::from("/tmp/ft/feeds.db"));
        assert_eq!(config.blob_path(), PathBuf::from("/tmp/ft/feeds.json"));
    }

    #[test]
    fn test_load_missing_file() {
        let err = Config::load(Path::new("/nonexistent/feedtrack.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
