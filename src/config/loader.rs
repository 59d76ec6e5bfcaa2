//! Configuration Loader
//!
//! Environment-aware configuration loading. Handles file discovery, environment
//! detection and layering of file and process-environment sources.

use super::error::{ConfigResult, ConfigurationError};
use super::BulkflowConfig;
use config::{Config, Environment, File, FileFormat};
use std::env;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use tracing::{debug, info, warn};

const BASE_CONFIG_FILE: &str = "bulkflow.yaml";
const ENV_PREFIX: &str = "BULKFLOW";

static GLOBAL_CONFIG: OnceLock<Arc<ConfigManager>> = OnceLock::new();

/// Loaded configuration plus the context it was loaded from
#[derive(Debug)]
pub struct ConfigManager {
    config: BulkflowConfig,
    environment: String,
    config_directory: PathBuf,
}

impl ConfigManager {
    /// Load configuration with environment auto-detection
    pub fn load() -> ConfigResult<Arc<ConfigManager>> {
        Self::load_from_directory(None)
    }

    /// Load configuration from a specific directory
    pub fn load_from_directory(config_dir: Option<PathBuf>) -> ConfigResult<Arc<ConfigManager>> {
        let environment = Self::detect_environment();
        Self::load_from_directory_with_env(config_dir, &environment)
    }

    /// Load configuration from a specific directory with explicit environment.
    /// Useful for testing without modifying global environment variables.
    pub fn load_from_directory_with_env(
        config_dir: Option<PathBuf>,
        environment: &str,
    ) -> ConfigResult<Arc<ConfigManager>> {
        let config_directory = config_dir.unwrap_or_else(Self::default_config_directory);

        debug!(
            environment = environment,
            directory = %config_directory.display(),
            "Loading configuration"
        );

        let base_file = Self::find_config_file(&config_directory)?;
        let config = Self::load_and_merge_config(&base_file, &config_directory, environment)?;
        config.validate()?;

        info!(
            environment = environment,
            concurrency = config.session.concurrency,
            auto_retry = config.session.auto_retry,
            event_capacity = config.events.channel_capacity,
            "Configuration loaded successfully"
        );

        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            config_directory,
        }))
    }

    /// Wrap an in-memory configuration (tests, embedding applications)
    pub fn from_config(config: BulkflowConfig) -> ConfigResult<Arc<ConfigManager>> {
        config.validate()?;
        Ok(Arc::new(ConfigManager {
            config,
            environment: Self::detect_environment(),
            config_directory: PathBuf::from("config"),
        }))
    }

    /// Get the loaded configuration
    pub fn config(&self) -> &BulkflowConfig {
        &self.config
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn config_directory(&self) -> &Path {
        &self.config_directory
    }

    /// Process-wide configuration, loaded on first use.
    ///
    /// Falls back to built-in defaults when no configuration can be loaded so
    /// that embedding applications never fail at startup for lack of a file.
    pub fn global() -> Arc<ConfigManager> {
        GLOBAL_CONFIG
            .get_or_init(|| match Self::load() {
                Ok(manager) => manager,
                Err(e) => {
                    warn!(error = %e, "Falling back to default configuration");
                    Arc::new(Self::fallback())
                }
            })
            .clone()
    }

    /// Initialize the global configuration from a directory; first initialization wins
    pub fn initialize_global(config_dir: Option<PathBuf>) -> ConfigResult<Arc<ConfigManager>> {
        let manager = Self::load_from_directory(config_dir)?;
        Ok(GLOBAL_CONFIG.get_or_init(|| manager).clone())
    }

    fn fallback() -> ConfigManager {
        ConfigManager {
            config: BulkflowConfig::default(),
            environment: Self::detect_environment(),
            config_directory: PathBuf::from("config"),
        }
    }

    /// Detect current environment: BULKFLOW_ENV || APP_ENV || 'development'
    pub(crate) fn detect_environment() -> String {
        env::var("BULKFLOW_ENV")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string())
            .to_lowercase()
    }

    fn default_config_directory() -> PathBuf {
        if let Ok(dir) = env::var("BULKFLOW_CONFIG_DIR") {
            return PathBuf::from(dir);
        }

        let manifest_config = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("config");
        if manifest_config.join(BASE_CONFIG_FILE).exists() {
            return manifest_config;
        }

        PathBuf::from("config")
    }

    fn find_config_file(config_directory: &Path) -> ConfigResult<PathBuf> {
        let candidates = [
            config_directory.join(BASE_CONFIG_FILE),
            config_directory.join("bulkflow.yml"),
        ];

        for candidate in &candidates {
            if candidate.is_file() {
                return Ok(candidate.clone());
            }
        }

        Err(ConfigurationError::ConfigFileNotFound {
            searched_paths: candidates.to_vec(),
        })
    }

    fn load_and_merge_config(
        base_file: &Path,
        config_directory: &Path,
        environment: &str,
    ) -> ConfigResult<BulkflowConfig> {
        let override_file = config_directory.join(format!("bulkflow.{environment}.yaml"));
        if override_file.is_file() {
            debug!(path = %override_file.display(), "Applying environment overrides");
        }

        let merged = Config::builder()
            .add_source(File::from(base_file).format(FileFormat::Yaml).required(true))
            .add_source(
                File::from(override_file.as_path())
                    .format(FileFormat::Yaml)
                    .required(false),
            )
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| ConfigurationError::LoadFailed {
                source_path: base_file.display().to_string(),
                error: e.to_string(),
            })?;

        merged
            .try_deserialize::<BulkflowConfig>()
            .map_err(|e| ConfigurationError::InvalidStructure(e.to_string()))
    }
}
