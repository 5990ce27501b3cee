//! Sync configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (TRIPSYNC_*)
//! 2. TOML config file (if TRIPSYNC_CONFIG_FILE set)
//! 3. Built-in defaults

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use url::Url;

mod validation;

pub use validation::ConfigError;

/// Sync configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (TRIPSYNC_*)
/// 2. TOML config file (if TRIPSYNC_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Base URL of the REST backend. Request paths are resolved against it.
    ///
    /// Set via TRIPSYNC_API_BASE_URL environment variable.
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// Path to the SQLite store.
    ///
    /// Set via TRIPSYNC_DB_PATH environment variable.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// HTTP request timeout in milliseconds.
    ///
    /// Set via TRIPSYNC_TIMEOUT_MS environment variable.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// User-Agent string for HTTP requests.
    ///
    /// Set via TRIPSYNC_USER_AGENT environment variable.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Attempts before a permanently rejected queued mutation is abandoned.
    /// Zero retries forever.
    ///
    /// Set via TRIPSYNC_MAX_REPLAY_ATTEMPTS environment variable.
    #[serde(default = "default_max_replay_attempts")]
    pub max_replay_attempts: u32,

    /// Age after which cached collections are reported as stale.
    ///
    /// Set via TRIPSYNC_STALE_AFTER_MINUTES environment variable.
    #[serde(default = "default_stale_after_minutes")]
    pub stale_after_minutes: i64,

    /// Interval between reachability probes in watch mode.
    ///
    /// Set via TRIPSYNC_PROBE_INTERVAL_MS environment variable.
    #[serde(default = "default_probe_interval_ms")]
    pub probe_interval_ms: u64,
}

fn default_api_base_url() -> String {
    "https://tripwise-api.onrender.com/api".into()
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./tripsync.sqlite")
}

fn default_timeout_ms() -> u64 {
    20_000
}

fn default_user_agent() -> String {
    "tripsync/0.1".into()
}

fn default_max_replay_attempts() -> u32 {
    5
}

fn default_stale_after_minutes() -> i64 {
    5
}

fn default_probe_interval_ms() -> u64 {
    5_000
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            db_path: default_db_path(),
            timeout_ms: default_timeout_ms(),
            user_agent: default_user_agent(),
            max_replay_attempts: default_max_replay_attempts(),
            stale_after_minutes: default_stale_after_minutes(),
            probe_interval_ms: default_probe_interval_ms(),
        }
    }
}

impl SyncConfig {
    /// Timeout as Duration for use with reqwest/tokio.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn probe_interval(&self) -> Duration {
        Duration::from_millis(self.probe_interval_ms)
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("TRIPSYNC_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("TRIPSYNC_")
                .ignore(&["CONFIG_FILE"])
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }

    /// Store scope derived from the API base URL, e.g. `https://api.example.com`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if the base URL does not parse.
    pub fn origin(&self) -> Result<String, ConfigError> {
        let url = self.base_url()?;
        Ok(url.origin().ascii_serialization())
    }

    /// Parsed API base URL.
    pub fn base_url(&self) -> Result<Url, ConfigError> {
        Url::parse(&self.api_base_url)
            .map_err(|e| ConfigError::Invalid { field: "api_base_url".into(), reason: e.to_string() })
    }
}
