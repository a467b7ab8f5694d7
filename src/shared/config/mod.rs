//! Application configuration module
//!
//! Layered configuration for the sync client: built-in defaults, then an
//! optional TOML file, then environment variables.
//!
//! ```toml
//! server_url = "https://survey.example.org/api"
//! request_timeout_secs = 60
//! data_dir = "/var/lib/fieldsync"
//! ```

use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default API base URL, including the `/api` prefix every route shares
pub const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:8080/api";

/// Default per-request timeout in seconds
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

const ENV_API_URL: &str = "FIELDSYNC_API_URL";
const ENV_DATA_DIR: &str = "FIELDSYNC_DATA_DIR";
const ENV_TIMEOUT: &str = "FIELDSYNC_TIMEOUT_SECS";

/// Application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// API base URL
    pub server_url: String,
    /// Transport timeout applied to every request
    pub request_timeout_secs: u64,
    /// Directory holding the local database
    pub data_dir: PathBuf,
    /// Token refresh endpoint, relative to `server_url`
    pub refresh_path: String,
    /// Login endpoint, relative to `server_url`
    pub login_path: String,
    /// URL fragments that never carry a bearer token
    pub auth_exempt_markers: Vec<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            request_timeout_secs: DEFAULT_TIMEOUT_SECS,
            data_dir: default_data_dir(),
            refresh_path: "/refresh_token".to_string(),
            login_path: "/login".to_string(),
            auth_exempt_markers: vec![
                "login".to_string(),
                "change_password_for_expired".to_string(),
            ],
        }
    }
}

impl AppConfig {
    /// Create a new AppConfigBuilder
    pub fn builder() -> AppConfigBuilder {
        AppConfigBuilder::default()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = reqwest::Url::parse(&self.server_url)
            .map_err(|e| ConfigError::InvalidUrl(format!("{}: {}", self.server_url, e)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidUrl(format!(
                "{}: unsupported scheme",
                self.server_url
            )));
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::MissingValue("request_timeout_secs"));
        }
        if self.refresh_path.is_empty() {
            return Err(ConfigError::MissingValue("refresh_path"));
        }
        if self.login_path.is_empty() {
            return Err(ConfigError::MissingValue("login_path"));
        }
        Ok(())
    }

    /// Default location of the config file
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("fieldsync").join("config.toml"))
    }

    /// Load defaults, the config file at `path` (or the default path) when it
    /// exists, then environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = AppConfig::builder();

        let file = path.map(Path::to_path_buf).or_else(Self::default_path);
        if let Some(file) = file.filter(|p| p.exists()) {
            let raw = std::fs::read_to_string(&file)?;
            builder = builder.merge_toml(&raw)?;
            tracing::debug!("[CONFIG] loaded {}", file.display());
        }

        builder.merge_env()?.build()
    }
}

/// Builder for AppConfig
#[derive(Debug, Default)]
pub struct AppConfigBuilder {
    server_url: Option<String>,
    request_timeout_secs: Option<u64>,
    data_dir: Option<PathBuf>,
    refresh_path: Option<String>,
    login_path: Option<String>,
    auth_exempt_markers: Option<Vec<String>>,
}

/// On-disk shape of the config file; every key is optional
#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    server_url: Option<String>,
    request_timeout_secs: Option<u64>,
    data_dir: Option<PathBuf>,
    refresh_path: Option<String>,
    login_path: Option<String>,
    auth_exempt_markers: Option<Vec<String>>,
}

impl AppConfigBuilder {
    /// Set the server URL
    pub fn server_url(mut self, url: impl Into<String>) -> Self {
        self.server_url = Some(url.into());
        self
    }

    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.request_timeout_secs = Some(secs);
        self
    }

    pub fn data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = Some(dir.into());
        self
    }

    pub fn refresh_path(mut self, path: impl Into<String>) -> Self {
        self.refresh_path = Some(path.into());
        self
    }

    pub fn login_path(mut self, path: impl Into<String>) -> Self {
        self.login_path = Some(path.into());
        self
    }

    pub fn auth_exempt_markers(mut self, markers: Vec<String>) -> Self {
        self.auth_exempt_markers = Some(markers);
        self
    }

    /// Overlay values from a TOML document
    pub fn merge_toml(mut self, raw: &str) -> Result<Self, ConfigError> {
        let file: FileConfig = toml::from_str(raw)?;
        self.server_url = file.server_url.or(self.server_url);
        self.request_timeout_secs = file.request_timeout_secs.or(self.request_timeout_secs);
        self.data_dir = file.data_dir.or(self.data_dir);
        self.refresh_path = file.refresh_path.or(self.refresh_path);
        self.login_path = file.login_path.or(self.login_path);
        self.auth_exempt_markers = file.auth_exempt_markers.or(self.auth_exempt_markers);
        Ok(self)
    }

    /// Overlay `FIELDSYNC_*` environment variables
    pub fn merge_env(mut self) -> Result<Self, ConfigError> {
        if let Ok(url) = std::env::var(ENV_API_URL) {
            self.server_url = Some(url);
        }
        if let Ok(dir) = std::env::var(ENV_DATA_DIR) {
            self.data_dir = Some(PathBuf::from(dir));
        }
        if let Ok(raw) = std::env::var(ENV_TIMEOUT) {
            let secs = raw
                .parse::<u64>()
                .map_err(|_| ConfigError::InvalidNumber(ENV_TIMEOUT, raw))?;
            self.request_timeout_secs = Some(secs);
        }
        Ok(self)
    }

    /// Build the configuration
    pub fn build(self) -> Result<AppConfig, ConfigError> {
        let defaults = AppConfig::default();
        let config = AppConfig {
            server_url: self
                .server_url
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or(defaults.server_url),
            request_timeout_secs: self
                .request_timeout_secs
                .unwrap_or(defaults.request_timeout_secs),
            data_dir: self.data_dir.unwrap_or(defaults.data_dir),
            refresh_path: self.refresh_path.unwrap_or(defaults.refresh_path),
            login_path: self.login_path.unwrap_or(defaults.login_path),
            auth_exempt_markers: self
                .auth_exempt_markers
                .unwrap_or(defaults.auth_exempt_markers),
        };
        config.validate()?;
        Ok(config)
    }
}

fn default_data_dir() -> PathBuf {
    let mut path = dirs::data_dir().unwrap_or_else(std::env::temp_dir);
    path.push("fieldsync");
    path
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid URL: {0}")]
    InvalidUrl(String),
    #[error("missing value: {0}")]
    MissingValue(&'static str),
    #[error("invalid number in {0}: {1}")]
    InvalidNumber(&'static str, String),
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}
