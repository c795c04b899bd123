//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and environment variable overrides.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,

    #[serde(default)]
    pub poller: PollerConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Backend endpoints consumed by the client
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Where the client navigates after an unrecoverable auth failure
    #[serde(default = "default_login_path")]
    pub login_path: String,

    #[serde(default = "default_token_path")]
    pub token_path: String,

    #[serde(default = "default_refresh_path")]
    pub refresh_path: String,

    #[serde(default = "default_events_path")]
    pub events_path: String,

    #[serde(default = "default_usage_path")]
    pub usage_path: String,

    /// Unset means requests are not independently time-bounded
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
}

fn default_base_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_login_path() -> String {
    "/login/".to_string()
}

fn default_token_path() -> String {
    "/api/token/".to_string()
}

fn default_refresh_path() -> String {
    "/api/token/refresh/".to_string()
}

fn default_events_path() -> String {
    "/events/".to_string()
}

fn default_usage_path() -> String {
    "/api/usage-data/".to_string()
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            login_path: default_login_path(),
            token_path: default_token_path(),
            refresh_path: default_refresh_path(),
            events_path: default_events_path(),
            usage_path: default_usage_path(),
            request_timeout_secs: None,
        }
    }
}

impl ApiConfig {
    /// Config pointing every endpoint at the given server
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }
}

/// Event poller timing
#[derive(Debug, Clone, Deserialize)]
pub struct PollerConfig {
    /// Delay after a successful poll
    #[serde(default = "default_poll_interval")]
    pub interval_secs: u64,

    /// Delay after a failed poll
    #[serde(default = "default_poll_backoff")]
    pub backoff_secs: u64,

    /// Also send the access token as a `token` query parameter
    #[serde(default = "default_token_in_query")]
    pub token_in_query: bool,

    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

fn default_poll_interval() -> u64 {
    5
}

fn default_poll_backoff() -> u64 {
    10
}

fn default_token_in_query() -> bool {
    true
}

fn default_channel_capacity() -> usize {
    64
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_poll_interval(),
            backoff_secs: default_poll_backoff(),
            token_in_query: default_token_in_query(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

impl PollerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn backoff(&self) -> Duration {
        Duration::from_secs(self.backoff_secs)
    }
}

/// Where the cookie jar and local store are persisted
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    #[serde(default = "default_cookie_file")]
    pub cookie_file: String,

    #[serde(default = "default_local_file")]
    pub local_file: String,
}

fn default_data_dir() -> String {
    dirs::data_local_dir()
        .map(|p| p.join("guardian").to_string_lossy().to_string())
        .unwrap_or_else(|| "./guardian_data".to_string())
}

fn default_cookie_file() -> String {
    "cookies.json".to_string()
}

fn default_local_file() -> String {
    "local_storage.json".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            cookie_file: default_cookie_file(),
            local_file: default_local_file(),
        }
    }
}

impl StorageConfig {
    /// Storage rooted at `dir` with default file names
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            data_dir: dir.as_ref().to_string_lossy().to_string(),
            ..Self::default()
        }
    }

    /// `data_dir` with a leading `~` expanded to the home directory
    pub fn data_path(&self) -> PathBuf {
        let dir = self.data_dir.as_str();
        let rest = if dir == "~" {
            Some("")
        } else {
            dir.strip_prefix("~/")
        };

        match (rest, dirs::home_dir()) {
            (Some(rest), Some(home)) => home.join(rest),
            _ => PathBuf::from(dir),
        }
    }

    pub fn cookie_path(&self) -> PathBuf {
        self.data_path().join(&self.cookie_file)
    }

    pub fn local_path(&self) -> PathBuf {
        self.data_path().join(&self.local_file)
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

        Self::parse(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })
    }

    fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
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
            dirs::config_dir().map(|p| p.join("guardian").join("config.toml")),
            Some(PathBuf::from("./guardian.toml")),
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

        tracing::debug!("Using default config with environment overrides");
        Self::from_env()
    }

    /// Apply environment variable overrides to an existing config
    fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("GUARDIAN_BASE_URL") {
            self.api.base_url = url;
        }

        if let Ok(data_dir) = std::env::var("GUARDIAN_DATA_DIR") {
            self.storage.data_dir = data_dir;
        }

        // Poller overrides
        if let Ok(secs) = std::env::var("GUARDIAN_POLL_INTERVAL") {
            if let Ok(s) = secs.parse() {
                self.poller.interval_secs = s;
            }
        }
        if let Ok(secs) = std::env::var("GUARDIAN_POLL_BACKOFF") {
            if let Ok(s) = secs.parse() {
                self.poller.backoff_secs = s;
            }
        }

        // Logging overrides
        if let Ok(level) = std::env::var("GUARDIAN_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("GUARDIAN_LOG_FORMAT") {
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
    r#"# Guardian Dashboard Configuration
#
# Environment variables override these settings:
# - GUARDIAN_BASE_URL
# - GUARDIAN_DATA_DIR
# - GUARDIAN_POLL_INTERVAL
# - GUARDIAN_POLL_BACKOFF
# - GUARDIAN_LOG_LEVEL
# - GUARDIAN_LOG_FORMAT

[api]
# Dashboard server
base_url = "http://localhost:8000"

# Where to send the user when the session cannot be recovered
login_path = "/login/"

# Token issuance and refresh endpoints
token_path = "/api/token/"
refresh_path = "/api/token/refresh/"

# Update stream polled by `guardian watch`
events_path = "/events/"

# Per-device usage data (device id is appended)
usage_path = "/api/usage-data/"

# Optional request timeout in seconds (unset = wait indefinitely)
# request_timeout_secs = 30

[poller]
# Seconds between polls after a successful poll
interval_secs = 5

# Seconds before the next poll after a failed poll
backoff_secs = 10

# Also pass the access token as ?token= on the events endpoint
token_in_query = true

[storage]
# Directory holding the cookie jar and local store
data_dir = "~/.local/share/guardian"
cookie_file = "cookies.json"
local_file = "local_storage.json"

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
    fn test_defaults_match_dashboard_endpoints() {
        let config = Config::default();
        assert_eq!(config.api.login_path, "/login/");
        assert_eq!(config.api.refresh_path, "/api/token/refresh/");
        assert_eq!(config.api.events_path, "/events/");
        assert_eq!(config.poller.interval(), Duration::from_secs(5));
        assert_eq!(config.poller.backoff(), Duration::from_secs(10));
        assert!(config.api.request_timeout().is_none());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = Config::parse(
            r#"
            [api]
            base_url = "https://dashboard.example"

            [poller]
            backoff_secs = 30
            "#,
        )
        .unwrap();

        assert_eq!(config.api.base_url, "https://dashboard.example");
        assert_eq!(config.api.token_path, "/api/token/");
        assert_eq!(config.poller.interval_secs, 5);
        assert_eq!(config.poller.backoff_secs, 30);
        assert!(config.poller.token_in_query);
    }

    #[test]
    fn test_generated_config_parses() {
        let config = Config::parse(&generate_default_config()).unwrap();
        assert_eq!(config.api.usage_path, "/api/usage-data/");
        assert_eq!(config.storage.cookie_file, "cookies.json");
        assert_eq!(config.logging.format, "pretty");
    }

    #[test]
    fn test_load_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::load(&dir.path().join("missing.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_storage_paths() {
        let storage = StorageConfig::new("/tmp/guardian");
        assert_eq!(storage.cookie_path(), PathBuf::from("/tmp/guardian/cookies.json"));
        assert_eq!(
            storage.local_path(),
            PathBuf::from("/tmp/guardian/local_storage.json")
        );
    }

    #[test]
    fn test_generated_data_dir_expands_home() {
        let config = Config::parse(&generate_default_config()).unwrap();
        let path = config.storage.cookie_path();

        assert!(!path.starts_with("~"));
        if let Some(home) = dirs::home_dir() {
            assert_eq!(path, home.join(".local/share/guardian/cookies.json"));
        }
    }
}
