//! Pipeline configuration, loaded from TOML.
//!
//! Every section and field has a default, so an empty file (or no file at
//! all) is a valid configuration. Credentials are not part of the file: the
//! CLI reads them once from the environment into [`Credentials`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use divlab_core::data::TradingCalendar;
use divlab_core::domain::FilingType;
use divlab_core::net::{CircuitBreaker, RetryPolicy};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),

    #[error("missing credential: {0}")]
    MissingCredential(&'static str),
}

/// API keys, passed explicitly into the components that need them.
#[derive(Clone, Default, PartialEq)]
pub struct Credentials {
    pub dart_api_key: String,
    /// Accepted for the downstream embedding stage; unused here.
    pub openai_api_key: Option<String>,
}

impl Credentials {
    pub fn new(dart_api_key: Option<String>, openai_api_key: Option<String>) -> Result<Self, ConfigError> {
        let dart_api_key = dart_api_key
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .ok_or(ConfigError::MissingCredential("DART_API_KEY"))?;
        Ok(Self {
            dart_api_key,
            openai_api_key: openai_api_key.filter(|k| !k.trim().is_empty()),
        })
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("dart_api_key", &"<redacted>")
            .field("openai_api_key", &self.openai_api_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub rate_limit_wait_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 500,
            max_delay_ms: 30_000,
            rate_limit_wait_secs: 60,
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts.max(1),
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            rate_limit_wait: Duration::from_secs(self.rate_limit_wait_secs),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorConfig {
    /// OpenDART `pblntf_detail_ty` codes to collect.
    pub filing_types: Vec<String>,
    pub sub_range_days: u32,
    pub workers: usize,
    /// Minimum spacing between two requests of one worker.
    pub request_interval_ms: u64,
    pub page_size: u32,
    pub retry: RetryConfig,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            filing_types: vec!["I002".to_string()],
            sub_range_days: 7,
            workers: 10,
            request_interval_ms: 100,
            page_size: 100,
            retry: RetryConfig::default(),
        }
    }
}

impl CollectorConfig {
    pub fn filing_types(&self) -> Vec<FilingType> {
        self.filing_types.iter().map(|t| FilingType::new(t.as_str())).collect()
    }

    pub fn request_interval(&self) -> Duration {
        Duration::from_millis(self.request_interval_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PriceConfig {
    pub threads: usize,
    pub timeout_secs: u64,
    pub breaker_cooldown_secs: u64,
    pub breaker_threshold: u32,
    pub retry: RetryConfig,
}

impl Default for PriceConfig {
    fn default() -> Self {
        Self {
            threads: 4,
            timeout_secs: 30,
            breaker_cooldown_secs: 600,
            breaker_threshold: 5,
            retry: RetryConfig {
                max_attempts: 3,
                ..RetryConfig::default()
            },
        }
    }
}

impl PriceConfig {
    pub fn breaker(&self, name: &str) -> CircuitBreaker {
        CircuitBreaker::new(
            name,
            Duration::from_secs(self.breaker_cooldown_secs),
            self.breaker_threshold,
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    /// Half-window sizes to evaluate, in trading days.
    pub candidates: Vec<u32>,
    pub min_retention: f64,
    /// Events below this coverage are left out of scoring and features.
    pub min_coverage: f64,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            candidates: vec![5, 10, 20],
            min_retention: 0.85,
            min_coverage: 0.8,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalendarConfig {
    /// Exchange holidays that fall on weekdays.
    pub holidays: Vec<NaiveDate>,
}

impl CalendarConfig {
    pub fn calendar(&self) -> TradingCalendar {
        TradingCalendar::new(self.holidays.iter().copied())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SectorConfig {
    /// TOML sector table; every ticker is `Unclassified` when absent.
    pub file: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub collector: CollectorConfig,
    pub prices: PriceConfig,
    pub optimizer: OptimizerConfig,
    pub calendar: CalendarConfig,
    pub sectors: SectorConfig,
}

impl PipelineConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.collector.filing_types.is_empty() {
            return Err(ConfigError::Invalid("collector.filing_types is empty".into()));
        }
        if self.collector.sub_range_days == 0 {
            return Err(ConfigError::Invalid("collector.sub_range_days must be >= 1".into()));
        }
        if self.optimizer.candidates.is_empty() {
            return Err(ConfigError::Invalid("optimizer.candidates is empty".into()));
        }
        for (name, value) in [
            ("optimizer.min_retention", self.optimizer.min_retention),
            ("optimizer.min_coverage", self.optimizer.min_coverage),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::Invalid(format!("{name} must be in [0, 1], got {value}")));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_uses_defaults() {
        let config = PipelineConfig::from_toml("").unwrap();
        assert_eq!(config, PipelineConfig::default());
        assert_eq!(config.collector.sub_range_days, 7);
        assert_eq!(config.optimizer.candidates, vec![5, 10, 20]);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = PipelineConfig::from_toml(
            r#"
[collector]
workers = 3

[optimizer]
min_retention = 0.9

[calendar]
holidays = ["2024-02-09", "2024-02-12"]
"#,
        )
        .unwrap();
        assert_eq!(config.collector.workers, 3);
        assert_eq!(config.collector.filing_types, vec!["I002"]);
        assert_eq!(config.optimizer.min_retention, 0.9);
        assert_eq!(config.optimizer.min_coverage, 0.8);
        let cal = config.calendar.calendar();
        assert!(!cal.is_trading_day(NaiveDate::from_ymd_opt(2024, 2, 12).unwrap()));
    }

    #[test]
    fn out_of_range_threshold_is_invalid() {
        let err = PipelineConfig::from_toml("[optimizer]\nmin_coverage = 1.5\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn unknown_type_is_a_parse_error() {
        let err = PipelineConfig::from_toml("[collector]\nworkers = \"many\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn credentials_require_dart_key() {
        assert!(matches!(
            Credentials::new(None, None),
            Err(ConfigError::MissingCredential("DART_API_KEY"))
        ));
        assert!(Credentials::new(Some("  ".into()), None).is_err());
        let creds = Credentials::new(Some("abc".into()), Some(String::new())).unwrap();
        assert_eq!(creds.dart_api_key, "abc");
        assert_eq!(creds.openai_api_key, None);
        assert!(!format!("{creds:?}").contains("abc"));
    }

    #[test]
    fn retry_config_maps_to_policy() {
        let policy = RetryConfig::default().policy();
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.rate_limit_wait, Duration::from_secs(60));
    }
}
