//! Configuration structures for the quoted-spread workspace.

use std::path::{Path, PathBuf};

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::SpreadField;

/// Main configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Trading session definition.
    pub session: SessionConfig,
    /// Bucket grid for daily averaging.
    pub averaging: AveragingConfig,
    /// Quote retrieval limits.
    pub fetch: FetchConfig,
    /// Spread transform configuration.
    pub spread: SpreadConfig,
    /// Cross-day consolidation configuration.
    pub consolidation: ConsolidationConfig,
    /// Batch execution configuration.
    pub batch: BatchConfig,
    /// On-disk layout.
    pub storage: StorageConfig,
}

impl Config {
    /// Parse a JSON document; absent sections keep their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON config file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Check cross-field invariants.
    pub fn validate(&self) -> Result<()> {
        if self.session.open >= self.session.close {
            return Err(Error::config(format!(
                "session open {} must be before close {}",
                self.session.open, self.session.close
            )));
        }
        let avg = &self.averaging;
        if !(avg.bucket_seconds.is_finite() && avg.bucket_seconds > 0.0) {
            return Err(Error::config(format!(
                "averaging.bucket_seconds must be positive, got {}",
                avg.bucket_seconds
            )));
        }
        if !(avg.start_seconds.is_finite() && avg.end_seconds.is_finite())
            || avg.start_seconds >= avg.end_seconds
        {
            return Err(Error::config(format!(
                "averaging.start_seconds ({}) must be before end_seconds ({})",
                avg.start_seconds, avg.end_seconds
            )));
        }
        if self.fetch.page_size == 0 {
            return Err(Error::config("fetch.page_size must be at least 1"));
        }
        if self.fetch.max_requests == 0 {
            return Err(Error::config("fetch.max_requests must be at least 1"));
        }
        if let Some(secs) = self.consolidation.resample_seconds {
            if !(secs.is_finite() && secs >= 0.001) {
                return Err(Error::config(format!(
                    "consolidation.resample_seconds must be at least 1ms, got {secs}"
                )));
            }
        }
        Ok(())
    }
}

/// Trading session definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// IANA time zone of the exchange.
    pub timezone: String,
    /// Local session open.
    pub open: NaiveTime,
    /// Local session close.
    pub close: NaiveTime,
}

impl SessionConfig {
    /// Session length in seconds.
    pub fn length_seconds(&self) -> f64 {
        (self.close - self.open).num_milliseconds() as f64 / 1000.0
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            timezone: "America/New_York".to_string(),
            open: NaiveTime::from_hms_opt(9, 30, 0).unwrap_or_default(),
            close: NaiveTime::from_hms_opt(16, 0, 0).unwrap_or_default(),
        }
    }
}

/// Bucket grid for daily averaging.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AveragingConfig {
    /// Bucket width in seconds.
    pub bucket_seconds: f64,
    /// First bucket edge, seconds after open.
    pub start_seconds: f64,
    /// Last bucket edge, seconds after open.
    pub end_seconds: f64,
}

impl Default for AveragingConfig {
    fn default() -> Self {
        Self {
            bucket_seconds: 5.0,
            start_seconds: 0.0,
            end_seconds: 23_400.0,
        }
    }
}

/// Quote retrieval limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Maximum quotes returned per page.
    pub page_size: usize,
    /// Maximum page requests per symbol-day.
    pub max_requests: u32,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            page_size: 50_000,
            max_requests: 200,
        }
    }
}

/// What to do with quotes whose `bid + ask` is zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DegenerateSpreadPolicy {
    /// Keep the NaN sentinel; every bucket the sample holds over becomes NaN.
    #[default]
    Propagate,
    /// Drop the sample so the previous valid spread keeps holding.
    HoldPrevious,
}

/// Spread transform configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SpreadConfig {
    pub degenerate: DegenerateSpreadPolicy,
}

/// Handling of requested symbol-days that have no table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingPolicy {
    /// Fail on the first missing table.
    Raise,
    /// Log a warning, record the key and continue.
    #[default]
    WarnAndSkip,
    /// Record the key and continue without logging.
    SilentSkip,
}

/// Cross-day consolidation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsolidationConfig {
    /// Calendar instant that offset zero is mapped onto.
    pub reference_time: NaiveDateTime,
    /// Column taken from each symbol-day table.
    pub field: SpreadField,
    /// Optional secondary mean resampling interval in seconds.
    pub resample_seconds: Option<f64>,
    /// Missing table handling.
    pub missing: MissingPolicy,
}

impl Default for ConsolidationConfig {
    fn default() -> Self {
        let reference_time = NaiveDate::from_ymd_opt(2021, 1, 1)
            .and_then(|d| d.and_hms_opt(9, 30, 0))
            .unwrap_or_default();
        Self {
            reference_time,
            field: SpreadField::RelativeSpread,
            resample_seconds: Some(60.0),
            missing: MissingPolicy::WarnAndSkip,
        }
    }
}

/// Batch execution configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Number of parallel workers (0 = auto).
    pub workers: usize,
}

/// On-disk layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding `YYYY-MM-DD_SYMBOL.csv` files.
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.averaging.bucket_seconds, 5.0);
        assert_eq!(config.averaging.end_seconds, 23_400.0);
        assert_eq!(config.fetch.max_requests, 200);
        assert_eq!(config.consolidation.missing, MissingPolicy::WarnAndSkip);
        assert_eq!(config.session.length_seconds(), 23_400.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let json = r#"{
            "averaging": { "bucket_seconds": 10.0, "start_seconds": 0.0, "end_seconds": 600.0 },
            "consolidation": {
                "reference_time": "2021-01-01T09:30:00",
                "field": "bid",
                "resample_seconds": null,
                "missing": "raise"
            }
        }"#;
        let config = Config::from_json_str(json).unwrap();
        assert_eq!(config.averaging.bucket_seconds, 10.0);
        assert_eq!(config.consolidation.field, SpreadField::Bid);
        assert_eq!(config.consolidation.missing, MissingPolicy::Raise);
        assert!(config.consolidation.resample_seconds.is_none());
        assert_eq!(config.fetch.page_size, 50_000);
        assert_eq!(config.spread.degenerate, DegenerateSpreadPolicy::Propagate);
    }

    #[test]
    fn test_invalid_grid_rejected() {
        let json = r#"{ "averaging": { "bucket_seconds": 5.0, "start_seconds": 100.0, "end_seconds": 50.0 } }"#;
        let err = Config::from_json_str(json).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_zero_request_budget_rejected() {
        let json = r#"{ "fetch": { "page_size": 100, "max_requests": 0 } }"#;
        assert!(Config::from_json_str(json).is_err());
    }
}
