//! Logging system configuration and initialization
//!
//! This module provides the logging setup used by the runner:
//! - Console output for interactive runs
//! - Daily rolling file output through a non-blocking writer
//! - Structured JSON file logs (optional)
//! - Configuration based level control, overridable with `RUST_LOG`

use anyhow::{Result, anyhow};
use chrono::Utc;
use lazy_static::lazy_static;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::info;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{
    EnvFilter, Registry,
    fmt::{self, time::FormatTime},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

pub use crate::infrastructure::config::LoggingConfig;
use crate::infrastructure::config::{FileConfigProvider, defaults};

// Global guard to keep the log file writer alive
lazy_static! {
    static ref LOG_GUARDS: Mutex<Vec<tracing_appender::non_blocking::WorkerGuard>> = Mutex::new(Vec::new());
}

const LOG_FILE_PREFIX: &str = "enforcement-scraper.log";

/// Millisecond UTC timestamps, matching the timestamps stored on sessions
struct UtcTimeFormatter;

impl FormatTime for UtcTimeFormatter {
    fn format_time(&self, w: &mut fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ"))
    }
}

/// Directory for log files: configured, else `<data dir>/logs`, else `./logs`.
#[must_use]
pub fn get_log_directory(config: &LoggingConfig) -> PathBuf {
    config
        .log_dir
        .clone()
        .or_else(|| FileConfigProvider::get_app_data_dir().map(|dir| dir.join("logs")))
        .unwrap_or_else(|| PathBuf::from("logs"))
}

/// Initialize the logging system with default configuration
pub fn init_logging() -> Result<()> {
    init_logging_with_config(&LoggingConfig::default())
}

/// Filter for `config`; `RUST_LOG` wins when set.
///
/// Unless the level is `trace`, SQL statement logs and HTTP internals are
/// lowered so per-record scraping output stays readable.
pub fn build_env_filter(config: &LoggingConfig) -> Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }

    let mut filter = EnvFilter::try_new(&config.level)
        .map_err(|e| anyhow!("Invalid log level '{}': {}", config.level, e))?;

    if !config.level.to_lowercase().contains("trace") {
        for directive in ["sqlx::query=warn", "reqwest=info", "hyper=warn", "h2=warn"] {
            filter = filter.add_directive(directive.parse()?);
        }
    }
    for (module, level) in &config.module_filters {
        filter = filter.add_directive(
            format!("{module}={level}")
                .parse()
                .map_err(|e| anyhow!("Invalid module filter {}={}: {}", module, level, e))?,
        );
    }
    Ok(filter)
}

/// Initialize logging with custom configuration
pub fn init_logging_with_config(config: &LoggingConfig) -> Result<()> {
    let env_filter = build_env_filter(config)?;
    let registry = Registry::default().with(env_filter);

    let console_layer = config.console_output.then(|| {
        fmt::Layer::new()
            .with_writer(std::io::stderr)
            .with_timer(UtcTimeFormatter)
            .with_target(false)
    });

    let log_dir = get_log_directory(config);
    let (json_file_layer, plain_file_layer) = if config.file_output {
        std::fs::create_dir_all(&log_dir)
            .map_err(|e| anyhow!("Failed to create log directory {:?}: {}", log_dir, e))?;
        let (file_writer, file_guard) = non_blocking(rolling::daily(&log_dir, LOG_FILE_PREFIX));

        // Store the guard globally to prevent it from being dropped
        LOG_GUARDS
            .lock()
            .map_err(|_| anyhow!("Log guard registry poisoned"))?
            .push(file_guard);

        if config.json_format {
            let layer = fmt::Layer::new()
                .json()
                .with_writer(file_writer)
                .with_timer(UtcTimeFormatter)
                .with_target(true)
                .with_current_span(true)
                .with_ansi(false);
            (Some(layer), None)
        } else {
            let layer = fmt::Layer::new()
                .with_writer(file_writer)
                .with_timer(UtcTimeFormatter)
                .with_target(true)
                .with_ansi(false);
            (None, Some(layer))
        }
    } else {
        (None, None)
    };

    if console_layer.is_none() && !config.file_output {
        return Err(anyhow!("No logging output configured"));
    }

    registry
        .with(console_layer)
        .with(json_file_layer)
        .with(plain_file_layer)
        .try_init()
        .map_err(|e| anyhow!("Logging already initialized: {}", e))?;

    info!(
        level = %config.level,
        console = config.console_output,
        file = config.file_output,
        json = config.json_format,
        "Logging system initialized"
    );
    if config.file_output {
        info!("Log directory: {:?}", log_dir);
    }
    Ok(())
}

/// Log system information for diagnostics
pub fn log_system_info() {
    info!(
        version = env!("CARGO_PKG_VERSION"),
        os = std::env::consts::OS,
        arch = std::env::consts::ARCH,
        app = defaults::APP_DIR_NAME,
        "Enforcement scraper starting"
    );
}
