use crate::shared::config::{AppConfig, AppConfigBuilder, ConfigError};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Database file name inside the data directory
const DB_FILE_NAME: &str = "local.db";

/// Client configuration wrapper.
#[derive(Debug, Clone, Default)]
pub struct Config {
    app: AppConfig,
}

impl Config {
    pub fn new(app: AppConfig) -> Self {
        Self { app }
    }

    /// Load from the config file and environment
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        AppConfig::load(path).map(Self::new)
    }

    pub fn with_builder(builder: AppConfigBuilder) -> Result<Self, ConfigError> {
        Ok(Self::new(builder.build()?))
    }

    pub fn app(&self) -> &AppConfig {
        &self.app
    }

    pub fn server_url(&self) -> &str {
        &self.app.server_url
    }

    /// Get the full URL for an API endpoint
    ///
    /// Absolute URLs pass through unchanged.
    pub fn api_url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        if path.starts_with('/') {
            format!("{}{}", self.server_url(), path)
        } else {
            format!("{}/{}", self.server_url(), path)
        }
    }

    pub fn refresh_url(&self) -> String {
        self.api_url(&self.app.refresh_path)
    }

    pub fn login_path(&self) -> &str {
        &self.app.login_path
    }

    /// Whether requests to `path` go out without a bearer token
    pub fn is_auth_exempt(&self, path: &str) -> bool {
        self.app
            .auth_exempt_markers
            .iter()
            .any(|marker| !marker.is_empty() && path.contains(marker.as_str()))
    }

    /// Whether `path` is the login endpoint; its 401s are credential failures
    pub fn is_login_path(&self, path: &str) -> bool {
        let marker = self.app.login_path.trim_start_matches('/');
        !marker.is_empty() && path.contains(marker)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.app.request_timeout_secs)
    }

    /// Path of the SQLite file backing the local store
    pub fn db_path(&self) -> PathBuf {
        self.app.data_dir.join(DB_FILE_NAME)
    }
}
