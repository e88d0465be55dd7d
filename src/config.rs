//! # Configuration Management
//!
//! This module handles loading and parsing configuration from the oscar-config.toml
//! file. It is read once at startup and covers dataset resolution, the
//! downstream notification channel, and logging.

use crate::catalog::{TimeUnits, DEFAULT_TIME_UNITS};
use crate::service::parse_timestamp;
use crate::ExtractionMode;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Default configuration file name, looked up in the working directory.
pub const CONFIG_FILE: &str = "oscar-config.toml";

/// Application configuration loaded from oscar-config.toml
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct Config {
    /// Dataset selection and access
    pub dataset: DatasetConfig,
    /// Downstream update channel
    #[serde(default)]
    pub notify: NotifyConfig,
    /// Log output
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Where snapshots come from and how they are read
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct DatasetConfig {
    /// Catalog document listing available `oscar_vel*.nc.gz` snapshots
    pub catalog_url: String,
    /// Base URL snapshot file names are appended to for download
    pub download_url: String,
    /// CF time-unit string of the dataset time axis
    pub time_units: String,
    /// Explicit snapshot file name; skips catalog selection when set
    pub filename: Option<String>,
    /// Date used to pick the snapshot (RFC 3339 or `YYYY-MM-DD`); now if unset
    pub reference_date: Option<String>,
    /// Local directory for downloaded snapshots
    pub data_dir: PathBuf,
    /// Read the maximum-extraction fields (`um`/`vm`) instead of `u`/`v`
    pub use_maximum: bool,
}

/// Downstream consumer settings
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct NotifyConfig {
    /// How long to wait for the consumer before dropping an update
    pub ready_timeout_ms: u64,
    /// Pending updates the channel can hold
    pub channel_capacity: usize,
}

/// Logging settings
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct LoggingConfig {
    /// trace, debug, info, warn or error
    pub level: String,
    /// Minimum seconds between two "no data" log lines
    pub no_data_interval_secs: u64,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        NotifyConfig {
            ready_timeout_ms: 500,
            channel_capacity: 16,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: "info".to_string(),
            no_data_interval_secs: 60,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            dataset: DatasetConfig {
                catalog_url: "https://podaac-opendap.jpl.nasa.gov/opendap/allData/oscar/preview/L4/oscar_third_deg/catalog.xml".to_string(),
                download_url: "https://podaac-opendap.jpl.nasa.gov/opendap/allData/oscar/preview/L4/oscar_third_deg".to_string(),
                time_units: DEFAULT_TIME_UNITS.to_string(),
                filename: None,
                reference_date: None,
                data_dir: PathBuf::from("/tmp/oscar"),
                use_maximum: false,
            },
            notify: NotifyConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from oscar-config.toml
    /// Falls back to default configuration if file doesn't exist or is invalid
    pub fn load() -> Self {
        Self::load_from_path(CONFIG_FILE)
    }

    /// Load configuration from specified path
    /// Falls back to default configuration if file doesn't exist or is invalid
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(contents) => match toml::from_str::<Config>(&contents) {
                Ok(config) => {
                    info!(path = %path.display(), "loaded configuration");
                    config
                }
                Err(e) => {
                    warn!(error = %e, "invalid config file format, using defaults");
                    Self::default()
                }
            },
            Err(_) => {
                info!(path = %path.display(), "no config file found, using defaults");
                Self::default()
            }
        }
    }

    /// Save current configuration to `path`
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), Box<dyn std::error::Error>> {
        let contents = toml::to_string_pretty(self)?;
        fs::write(path.as_ref(), contents)?;
        info!(path = %path.as_ref().display(), "configuration saved");
        Ok(())
    }

    pub fn mode(&self) -> ExtractionMode {
        ExtractionMode::from_flag(self.dataset.use_maximum)
    }

    pub fn time_units(&self) -> Result<TimeUnits, crate::catalog::CatalogError> {
        TimeUnits::parse(&self.dataset.time_units)
    }

    /// Reference date for snapshot selection; `None` if set but unparseable.
    pub fn reference_date(&self) -> Option<DateTime<Utc>> {
        match &self.dataset.reference_date {
            Some(s) => parse_timestamp(s),
            None => Some(Utc::now()),
        }
    }

    pub fn ready_timeout(&self) -> Duration {
        Duration::from_millis(self.notify.ready_timeout_ms)
    }

    pub fn no_data_interval(&self) -> Duration {
        Duration::from_secs(self.logging.no_data_interval_secs)
    }
}
