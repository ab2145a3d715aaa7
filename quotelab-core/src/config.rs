//! Run configuration, loadable from TOML.
//!
//! Every field has a default, so a config file only needs the values it
//! changes:
//!
//! ```toml
//! tickers = ["AAPL", "MSFT"]
//! range = "6mo"
//! indicators = ["sma", "rsi"]
//!
//! [indicator]
//! rsi_window = 10
//!
//! [store]
//! enabled = false
//! ```

use crate::data::{FetchSettings, TimeRangeSpec};
use crate::indicators::{IndicatorKind, IndicatorSelection, IndicatorSettings};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize settings: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("invalid settings: {0}")]
    Invalid(String),
}

/// Where and whether normalized series are persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    pub enabled: bool,
    pub path: PathBuf,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            path: PathBuf::from("data/database"),
        }
    }
}

/// Plain values come before the tables so the TOML output stays valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub tickers: Vec<String>,
    /// Upper bound on tickers per run.
    pub max_tickers: usize,
    pub range: TimeRangeSpec,
    pub indicators: IndicatorSelection,
    pub indicator: IndicatorSettings,
    pub fetch: FetchSettings,
    pub store: StoreSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            tickers: ["AAPL", "MSFT", "GOOG", "AMZN"]
                .into_iter()
                .map(String::from)
                .collect(),
            max_tickers: 10,
            range: TimeRangeSpec::default(),
            indicators: IndicatorSelection::all(),
            indicator: IndicatorSettings::default(),
            fetch: FetchSettings::default(),
            store: StoreSettings::default(),
        }
    }
}

impl Settings {
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_tickers == 0 {
            return Err(ConfigError::Invalid("max_tickers must be >= 1".into()));
        }
        if self.tickers.iter().all(|t| t.trim().is_empty()) {
            return Err(ConfigError::Invalid("at least one ticker is required".into()));
        }
        if self.tickers.len() > self.max_tickers {
            return Err(ConfigError::Invalid(format!(
                "{} tickers requested, at most {} allowed",
                self.tickers.len(),
                self.max_tickers
            )));
        }
        if self.fetch.timeout_secs == 0 {
            return Err(ConfigError::Invalid("fetch.timeout_secs must be >= 1".into()));
        }
        if self.fetch.retries > FetchSettings::MAX_RETRIES {
            return Err(ConfigError::Invalid(format!(
                "fetch.retries must be <= {}, got {}",
                FetchSettings::MAX_RETRIES,
                self.fetch.retries
            )));
        }
        // Building each transform checks its window and parameters.
        for kind in IndicatorKind::ALL {
            self.indicator
                .build(kind)
                .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        }
        Ok(())
    }
}
