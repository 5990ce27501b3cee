//! Configuration validation rules.
//!
//! This module provides validation logic for `SyncConfig` values
//! after they have been loaded from environment, files, or defaults.

use crate::config::SyncConfig;
use thiserror::Error;

/// Upper bound for `stale_after_minutes`: one year.
pub const MAX_STALE_AFTER_MINUTES: i64 = 525_600;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },

    #[error("missing required configuration: {field} ({hint})")]
    Missing { field: String, hint: String },
}

impl From<ConfigError> for crate::Error {
    fn from(err: ConfigError) -> Self {
        crate::Error::Config(err.to_string())
    }
}

impl SyncConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if:
    /// - `api_base_url` is not an http(s) URL
    /// - `timeout_ms` is less than 100ms or exceeds 5 minutes
    /// - `user_agent` is empty
    /// - `stale_after_minutes` is negative or exceeds one year
    /// - `probe_interval_ms` is less than 250ms
    ///
    /// Returns `ConfigError::Missing` if `db_path` is empty.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = self.base_url()?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(ConfigError::Invalid { field: "api_base_url".into(), reason: "must use http or https".into() });
        }

        if self.db_path.as_os_str().is_empty() {
            return Err(ConfigError::Missing {
                field: "db_path".into(),
                hint: "Set TRIPSYNC_DB_PATH environment variable".into(),
            });
        }

        if self.timeout_ms < 100 {
            return Err(ConfigError::Invalid { field: "timeout_ms".into(), reason: "must be at least 100ms".into() });
        }
        if self.timeout_ms > 300_000 {
            return Err(ConfigError::Invalid {
                field: "timeout_ms".into(),
                reason: "must not exceed 5 minutes (300000ms)".into(),
            });
        }

        if self.user_agent.is_empty() {
            return Err(ConfigError::Invalid { field: "user_agent".into(), reason: "must not be empty".into() });
        }

        if self.stale_after_minutes < 0 {
            return Err(ConfigError::Invalid {
                field: "stale_after_minutes".into(),
                reason: "must not be negative".into(),
            });
        }
        if self.stale_after_minutes > MAX_STALE_AFTER_MINUTES {
            return Err(ConfigError::Invalid {
                field: "stale_after_minutes".into(),
                reason: format!("must not exceed one year ({MAX_STALE_AFTER_MINUTES} minutes)"),
            });
        }

        if self.probe_interval_ms < 250 {
            return Err(ConfigError::Invalid {
                field: "probe_interval_ms".into(),
                reason: "must be at least 250ms".into(),
            });
        }

        if self.max_replay_attempts == 0 {
            tracing::warn!("max_replay_attempts is 0; rejected mutations will be retried forever");
        }

        Ok(())
    }
}
