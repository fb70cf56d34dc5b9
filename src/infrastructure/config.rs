//! Configuration infrastructure
//!
//! Scraper settings are a single JSON document. The coordinator reads them
//! through [`ConfigProvider`] at the start of every run; a missing or broken
//! document never fails a run, the built-in defaults are used instead.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tracing::info;

use crate::domain::{Agency, RecordType, RunLimits};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("No scraper configuration is active")]
    NotConfigured,

    #[error("Failed to access configuration file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed configuration: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Complete scraper configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ScraperConfig {
    /// Upper bound on successfully fetched batches per run
    pub max_pages_per_run: u32,

    /// Consecutive fetch failures that fail a run
    pub max_consecutive_errors: u32,

    /// Consecutive `existing` outcomes that end a run early
    pub consecutive_existing_threshold: u32,

    /// Per-agency request ceiling shared by all runs
    pub requests_per_minute: u32,

    /// Sleep before every outbound request
    pub pause_between_pages_ms: u64,

    /// Deadline for a single fetch or detail call
    pub network_timeout_ms: u64,

    /// Feed URL templates keyed `"<agency>/<record_type>"` and
    /// `"<agency>/<record_type>/detail"`. Placeholders: `{page}`, `{from}`,
    /// `{to}`, `{id}`.
    pub endpoints: HashMap<String, String>,

    pub user_agent: String,

    pub logging: LoggingConfig,
}

/// Logging configuration settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "error", "warn", "info", "debug", "trace"
    pub level: String,

    /// Enable JSON formatted file logs
    pub json_format: bool,

    pub console_output: bool,

    pub file_output: bool,

    /// Directory for daily rolling log files; defaults to `<data dir>/logs`
    pub log_dir: Option<PathBuf>,

    /// Module-specific log level filters (e.g., "sqlx": "warn")
    pub module_filters: HashMap<String, String>,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            max_pages_per_run: defaults::MAX_PAGES_PER_RUN,
            max_consecutive_errors: defaults::MAX_CONSECUTIVE_ERRORS,
            consecutive_existing_threshold: defaults::CONSECUTIVE_EXISTING_THRESHOLD,
            requests_per_minute: defaults::REQUESTS_PER_MINUTE,
            pause_between_pages_ms: defaults::PAUSE_BETWEEN_PAGES_MS,
            network_timeout_ms: defaults::NETWORK_TIMEOUT_MS,
            endpoints: HashMap::new(),
            user_agent: defaults::USER_AGENT.to_string(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: defaults::LOG_LEVEL.to_string(),
            json_format: false,
            console_output: true,
            file_output: false,
            log_dir: None,
            module_filters: [("sqlx", "warn"), ("reqwest", "info"), ("hyper", "warn")]
                .into_iter()
                .map(|(module, level)| (module.to_string(), level.to_string()))
                .collect(),
        }
    }
}

impl ScraperConfig {
    /// Copy with values that would stall or spin a run pulled into range.
    #[must_use]
    pub fn sanitized(mut self) -> Self {
        self.max_consecutive_errors = self.max_consecutive_errors.max(1);
        self.requests_per_minute = self.requests_per_minute.max(1);
        self.network_timeout_ms = self.network_timeout_ms.max(1);
        self
    }

    #[must_use]
    pub const fn limits(&self) -> RunLimits {
        RunLimits {
            max_pages_per_run: self.max_pages_per_run,
            max_consecutive_errors: self.max_consecutive_errors,
            consecutive_existing_threshold: self.consecutive_existing_threshold,
            requests_per_minute: self.requests_per_minute,
            pause_between_pages_ms: self.pause_between_pages_ms,
            network_timeout_ms: self.network_timeout_ms,
        }
    }

    #[must_use]
    pub fn endpoint(&self, agency: Agency, record_type: RecordType) -> Option<&str> {
        self.endpoints
            .get(&format!("{agency}/{record_type}"))
            .map(String::as_str)
    }

    #[must_use]
    pub fn detail_endpoint(&self, agency: Agency, record_type: RecordType) -> Option<&str> {
        self.endpoints
            .get(&format!("{agency}/{record_type}/detail"))
            .map(String::as_str)
    }
}

/// Source of the active configuration
#[async_trait]
pub trait ConfigProvider: Send + Sync {
    async fn active_config(&self) -> Result<ScraperConfig, ConfigError>;
}

/// Fixed in-process configuration, or none at all
#[derive(Debug, Clone, Default)]
pub struct StaticConfigProvider {
    config: Option<ScraperConfig>,
}

impl StaticConfigProvider {
    #[must_use]
    pub const fn new(config: ScraperConfig) -> Self {
        Self { config: Some(config) }
    }

    /// A provider that reports [`ConfigError::NotConfigured`].
    #[must_use]
    pub const fn none() -> Self {
        Self { config: None }
    }
}

#[async_trait]
impl ConfigProvider for StaticConfigProvider {
    async fn active_config(&self) -> Result<ScraperConfig, ConfigError> {
        self.config.clone().ok_or(ConfigError::NotConfigured)
    }
}

/// JSON file on disk, re-read on every run so edits apply to the next one
#[derive(Debug, Clone)]
pub struct FileConfigProvider {
    config_path: PathBuf,
}

impl FileConfigProvider {
    pub fn new(config_path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: config_path.into(),
        }
    }

    /// Get the application configuration directory
    #[must_use]
    pub fn get_config_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(defaults::APP_DIR_NAME))
    }

    /// Get application data directory
    #[must_use]
    pub fn get_app_data_dir() -> Option<PathBuf> {
        dirs::data_local_dir().map(|dir| dir.join(defaults::APP_DIR_NAME))
    }

    /// Provider for `<config dir>/enforcement-scraper/scraper_config.json`.
    pub fn from_default_location() -> Result<Self, ConfigError> {
        let dir = Self::get_config_dir().ok_or(ConfigError::NotConfigured)?;
        Ok(Self::new(dir.join(defaults::CONFIG_FILE_NAME)))
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.config_path
    }

    pub async fn load_config(&self) -> Result<ScraperConfig, ConfigError> {
        let content = match fs::read_to_string(&self.config_path).await {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Err(ConfigError::NotConfigured),
            Err(err) => return Err(err.into()),
        };
        let config = serde_json::from_str::<ScraperConfig>(&content)?;
        info!("Loaded configuration from: {:?}", self.config_path);
        Ok(config)
    }

    /// Writes `config` as pretty JSON, creating the directory if needed.
    pub async fn save_config(&self, config: &ScraperConfig) -> Result<(), ConfigError> {
        if let Some(dir) = self.config_path.parent() {
            fs::create_dir_all(dir).await?;
        }
        fs::write(&self.config_path, serde_json::to_string_pretty(config)?).await?;
        info!("Saved configuration to: {:?}", self.config_path);
        Ok(())
    }
}

#[async_trait]
impl ConfigProvider for FileConfigProvider {
    async fn active_config(&self) -> Result<ScraperConfig, ConfigError> {
        self.load_config().await
    }
}

/// Default configuration values
pub mod defaults {
    pub const MAX_PAGES_PER_RUN: u32 = 10;

    pub const MAX_CONSECUTIVE_ERRORS: u32 = 3;

    pub const CONSECUTIVE_EXISTING_THRESHOLD: u32 = 10;

    /// One request every two seconds per agency
    pub const REQUESTS_PER_MINUTE: u32 = 30;

    pub const PAUSE_BETWEEN_PAGES_MS: u64 = 3_000;

    pub const NETWORK_TIMEOUT_MS: u64 = 30_000;

    pub const USER_AGENT: &str = concat!("enforcement-scraper/", env!("CARGO_PKG_VERSION"));

    pub const LOG_LEVEL: &str = "info";

    pub const APP_DIR_NAME: &str = "enforcement-scraper";

    pub const CONFIG_FILE_NAME: &str = "scraper_config.json";
}
