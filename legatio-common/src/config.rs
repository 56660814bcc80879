//! Bootstrap configuration loading
//!
//! Settings sources, highest priority first:
//! 1. Command-line arguments (handled by the binary)
//! 2. Environment variables (`LEGATIO_*`)
//! 3. TOML configuration file
//! 4. Compiled defaults
//!
//! A missing TOML file is not an error: the service logs a warning and
//! starts with defaults.

use crate::visa::VisaType;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming an explicit config file
pub const CONFIG_PATH_ENV: &str = "LEGATIO_CONFIG";
/// Overrides `uploads.max_concurrent_uploads`
pub const MAX_CONCURRENT_UPLOADS_ENV: &str = "LEGATIO_MAX_CONCURRENT_UPLOADS";
/// Overrides `polling.interval_secs`
pub const POLL_INTERVAL_ENV: &str = "LEGATIO_POLL_INTERVAL_SECS";

/// Bootstrap configuration loaded from TOML file
///
/// These settings cannot change during runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TomlConfig {
    /// HTTP server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// SQLite database for persisted applicant flags (optional)
    ///
    /// If not specified, flags live in memory for the life of the process.
    #[serde(default)]
    pub database_path: Option<PathBuf>,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub uploads: UploadsConfig,

    #[serde(default)]
    pub polling: PollingConfig,

    #[serde(default)]
    pub application: ApplicationConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error), overridden by RUST_LOG
    #[serde(default = "default_log_level")]
    pub level: String,
}

/// Upload queue configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadsConfig {
    /// Transfers allowed in flight at once (must be > 0)
    #[serde(default = "default_max_concurrent_uploads")]
    pub max_concurrent_uploads: usize,

    /// Per-transfer timeout; None lets transfers run until they settle
    #[serde(default)]
    pub transfer_timeout_secs: Option<u64>,
}

/// Status poller configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingConfig {
    #[serde(default = "default_poll_interval_secs")]
    pub interval_secs: u64,

    /// Per-poll timeout; a timed-out poll counts as a failed poll
    #[serde(default)]
    pub poll_timeout_secs: Option<u64>,
}

/// Application tracked by this service instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationConfig {
    #[serde(default = "default_application_id")]
    pub id: String,

    #[serde(default = "default_visa_type")]
    pub visa_type: VisaType,
}

fn default_port() -> u16 {
    5790
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_concurrent_uploads() -> usize {
    3
}

fn default_poll_interval_secs() -> u64 {
    10
}

fn default_application_id() -> String {
    "app-demo-001".to_string()
}

fn default_visa_type() -> VisaType {
    VisaType::Business
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            database_path: None,
            logging: LoggingConfig::default(),
            uploads: UploadsConfig::default(),
            polling: PollingConfig::default(),
            application: ApplicationConfig::default(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Default for UploadsConfig {
    fn default() -> Self {
        Self {
            max_concurrent_uploads: default_max_concurrent_uploads(),
            transfer_timeout_secs: None,
        }
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_poll_interval_secs(),
            poll_timeout_secs: None,
        }
    }
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            id: default_application_id(),
            visa_type: default_visa_type(),
        }
    }
}

impl TomlConfig {
    /// Reject values the services cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.uploads.max_concurrent_uploads == 0 {
            return Err(Error::Config(
                "uploads.max_concurrent_uploads must be greater than zero".to_string(),
            ));
        }
        if self.polling.interval_secs == 0 {
            return Err(Error::Config(
                "polling.interval_secs must be greater than zero".to_string(),
            ));
        }
        if self.application.id.trim().is_empty() {
            return Err(Error::Config("application.id must not be empty".to_string()));
        }
        Ok(())
    }

    /// Apply `LEGATIO_*` environment overrides on top of file values
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Some(value) = read_env_number(MAX_CONCURRENT_UPLOADS_ENV)? {
            info!("max_concurrent_uploads overridden by {}: {}", MAX_CONCURRENT_UPLOADS_ENV, value);
            self.uploads.max_concurrent_uploads = value as usize;
        }
        if let Some(value) = read_env_number(POLL_INTERVAL_ENV)? {
            info!("poll interval overridden by {}: {}s", POLL_INTERVAL_ENV, value);
            self.polling.interval_secs = value;
        }
        Ok(())
    }
}

fn read_env_number(name: &str) -> Result<Option<u64>> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|e| Error::Config(format!("{} is not a number ({:?}): {}", name, raw, e))),
        Err(_) => Ok(None),
    }
}

/// Resolve the config file location
///
/// 1. Explicit path (CLI argument)
/// 2. `LEGATIO_CONFIG` environment variable
/// 3. `<platform config dir>/legatio/tracker.toml`
pub fn resolve_config_path(cli_arg: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    dirs::config_dir().map(|d| d.join("legatio").join("tracker.toml"))
}

/// Parse a TOML config file
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))
}

/// Load configuration with graceful degradation
///
/// A missing file yields defaults (with a warning); a present but malformed
/// file is an error. Environment overrides and validation run in both cases.
pub fn load_config(path: Option<&Path>) -> Result<TomlConfig> {
    let mut config = match path {
        Some(path) if path.exists() => {
            info!("Loading configuration from {}", path.display());
            load_toml_config(path)?
        }
        Some(path) => {
            warn!("Config file {} not found, using defaults", path.display());
            TomlConfig::default()
        }
        None => {
            warn!("No config file location available, using defaults");
            TomlConfig::default()
        }
    };

    config.apply_env_overrides()?;
    config.validate()?;
    Ok(config)
}
