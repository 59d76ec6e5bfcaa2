//! # Bulkflow Configuration System
//!
//! Layered configuration for the bulk processing pipeline.
//!
//! ## Architecture
//!
//! - **Base file**: `config/bulkflow.yaml` holds the defaults for every environment
//! - **Environment overrides**: optional `config/bulkflow.{environment}.yaml`
//! - **Process overrides**: `BULKFLOW__SECTION__KEY` environment variables
//! - **Explicit Validation**: invalid values are rejected at load time
//!
//! ## Usage
//!
//! ```rust,no_run
//! use bulkflow_core::config::ConfigManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load()?;
//! let session_defaults = manager.config().session.clone();
//! assert!(session_defaults.concurrency >= 1);
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use crate::constants::defaults;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigManager;

/// Root configuration structure mirroring `bulkflow.yaml`
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct BulkflowConfig {
    /// Defaults applied to sessions created without an explicit config
    pub session: SessionConfig,

    /// Lifecycle event channel settings
    pub events: EventsConfig,

    /// Structured logging settings
    pub logging: LoggingConfig,

    /// Import wizard settings
    pub import: ImportConfig,
}

impl BulkflowConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        self.session.validate()?;

        if self.events.channel_capacity == 0 {
            return Err(ConfigurationError::InvalidValue {
                field: "events.channel_capacity".to_string(),
                value: "0".to_string(),
                context: "event channel capacity must be at least 1".to_string(),
            });
        }

        Ok(())
    }
}

/// Run configuration of a single batch session
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Maximum number of items in `Processing` at once; 1 means strictly sequential
    pub concurrency: usize,

    /// Requeue items whose processing fails, up to `max_auto_retries` extra attempts
    pub auto_retry: bool,

    pub max_auto_retries: u32,

    /// Optional per-item deadline; exceeding it is recorded as a failure
    pub item_timeout_ms: Option<u64>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            concurrency: defaults::CONCURRENCY,
            auto_retry: false,
            max_auto_retries: defaults::MAX_AUTO_RETRIES,
            item_timeout_ms: None,
        }
    }
}

impl SessionConfig {
    /// One item at a time, in order
    pub fn sequential() -> Self {
        Self::default()
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_auto_retry(mut self, max_auto_retries: u32) -> Self {
        self.auto_retry = true;
        self.max_auto_retries = max_auto_retries;
        self
    }

    pub fn with_item_timeout(mut self, timeout: Duration) -> Self {
        self.item_timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    pub fn item_timeout(&self) -> Option<Duration> {
        self.item_timeout_ms.map(Duration::from_millis)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.concurrency == 0 {
            return Err(ConfigurationError::InvalidValue {
                field: "session.concurrency".to_string(),
                value: "0".to_string(),
                context: "concurrency must be at least 1".to_string(),
            });
        }

        if self.item_timeout_ms == Some(0) {
            return Err(ConfigurationError::InvalidValue {
                field: "session.item_timeout_ms".to_string(),
                value: "0".to_string(),
                context: "omit the timeout instead of setting it to zero".to_string(),
            });
        }

        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct EventsConfig {
    /// Capacity of the lifecycle broadcast channel; slow receivers lag past this
    pub channel_capacity: usize,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            channel_capacity: defaults::EVENT_CHANNEL_CAPACITY,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: defaults::LOG_LEVEL.to_string(),
            format: LogFormat::Pretty,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ImportConfig {
    /// Import the valid rows and skip invalid ones, instead of rejecting the whole import
    pub skip_invalid: bool,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self { skip_invalid: true }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = BulkflowConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.session.concurrency, 1);
        assert!(!config.session.auto_retry);
        assert!(config.import.skip_invalid);
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let config = SessionConfig::default().with_concurrency(0);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("session.concurrency"));
    }

    #[test]
    fn test_session_builders() {
        let config = SessionConfig::sequential()
            .with_concurrency(4)
            .with_auto_retry(3)
            .with_item_timeout(Duration::from_millis(250));

        assert_eq!(config.concurrency, 4);
        assert!(config.auto_retry);
        assert_eq!(config.max_auto_retries, 3);
        assert_eq!(config.item_timeout(), Some(Duration::from_millis(250)));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_channel_capacity_rejected() {
        let mut config = BulkflowConfig::default();
        config.events.channel_capacity = 0;
        assert!(config.validate().is_err());
    }
}
