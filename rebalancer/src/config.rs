//! TOML configuration loading and validation.

use std::path::{Path, PathBuf};

use etfbalance::{EngineConfig, FreshAllocationDiffs};
use serde::Deserialize;

use crate::error::{Error, Result};

/// Top-level configuration. Every section is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub feed: FeedConfig,
    pub currency: CurrencyConfig,
    pub rebalance: RebalanceConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeedConfig {
    #[serde(default)]
    pub provider: Provider,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    /// Quotes file for the snapshot provider.
    #[serde(default = "default_snapshot")]
    pub snapshot: String,
}

/// Where prices and FX rates come from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    #[default]
    Yahoo,
    Snapshot,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            provider: Provider::default(),
            base_url: default_base_url(),
            timeout_secs: default_timeout(),
            snapshot: default_snapshot(),
        }
    }
}

fn default_base_url() -> String {
    "https://query1.finance.yahoo.com".into()
}
fn default_timeout() -> u64 {
    10
}
fn default_snapshot() -> String {
    "quotes.json".into()
}

#[derive(Debug, Clone, Deserialize)]
pub struct CurrencyConfig {
    /// Currency of cash and reported values.
    #[serde(default = "default_base")]
    pub base: String,
    /// Currency prices are quoted in.
    #[serde(default = "default_quote")]
    pub quote: String,
    /// Rate used when the FX feed fails or returns a non-positive rate.
    #[serde(default = "default_fallback_rate")]
    pub fallback_rate: f64,
}

impl Default for CurrencyConfig {
    fn default() -> Self {
        Self {
            base: default_base(),
            quote: default_quote(),
            fallback_rate: default_fallback_rate(),
        }
    }
}

fn default_base() -> String {
    "KRW".into()
}
fn default_quote() -> String {
    "USD".into()
}
fn default_fallback_rate() -> f64 {
    1300.0
}

#[derive(Debug, Clone, Deserialize)]
pub struct RebalanceConfig {
    #[serde(default = "default_threshold")]
    pub threshold_pct: f64,
    /// Report fresh-allocation weight diffs against the new weights instead of 0.
    #[serde(default)]
    pub fresh_allocation_diffs: bool,
}

impl Default for RebalanceConfig {
    fn default() -> Self {
        Self {
            threshold_pct: default_threshold(),
            fresh_allocation_diffs: false,
        }
    }
}

fn default_threshold() -> f64 {
    etfbalance::DEFAULT_THRESHOLD_PCT
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_settings_path")]
    pub settings: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            settings: default_settings_path(),
        }
    }
}

fn default_settings_path() -> String {
    "./portfolio.json".into()
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_dir")]
    pub dir: String,
    #[serde(default = "default_audit_file")]
    pub audit_file: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            dir: default_log_dir(),
            audit_file: default_audit_file(),
        }
    }
}

fn default_log_dir() -> String {
    "./logs".into()
}
fn default_audit_file() -> String {
    "audit.jsonl".into()
}

impl Config {
    /// Load config from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| Error::ConfigRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_toml(&contents)
    }

    /// Load config, falling back to defaults when the file does not exist.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            log::info!("{} not found, using default config", path.display());
            Ok(Self::default())
        }
    }

    /// Parse and validate a TOML string.
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate config invariants.
    fn validate(&self) -> Result<()> {
        let t = self.rebalance.threshold_pct;
        if !t.is_finite() || t < 0.0 {
            return Err(Error::Config(format!(
                "threshold_pct must be >= 0 and finite, got {t}"
            )));
        }
        let r = self.currency.fallback_rate;
        if !r.is_finite() || r <= 0.0 {
            return Err(Error::Config(format!(
                "fallback_rate must be > 0 and finite, got {r}"
            )));
        }
        if self.feed.timeout_secs == 0 {
            return Err(Error::Config("timeout_secs must be > 0".into()));
        }
        for code in [&self.currency.base, &self.currency.quote] {
            if code.len() != 3 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
                return Err(Error::Config(format!(
                    "currency code '{code}' must be three letters"
                )));
            }
        }
        if self.feed.provider == Provider::Yahoo && self.feed.base_url.is_empty() {
            return Err(Error::Config("feed base_url must not be empty".into()));
        }
        Ok(())
    }

    /// Engine settings derived from `[rebalance]`.
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            threshold_pct: self.rebalance.threshold_pct,
            fresh_allocation_diffs: if self.rebalance.fresh_allocation_diffs {
                FreshAllocationDiffs::AgainstNewWeights
            } else {
                FreshAllocationDiffs::Zero
            },
        }
    }

    /// Full path to the audit log file.
    pub fn audit_path(&self) -> PathBuf {
        Path::new(&self.logging.dir).join(&self.logging.audit_file)
    }

    pub fn settings_path(&self) -> PathBuf {
        PathBuf::from(&self.storage.settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn example_toml() -> &'static str {
        r#"
[feed]
provider = "snapshot"
base_url = "https://query1.finance.yahoo.com"
timeout_secs = 5
snapshot = "fixtures/quotes.json"

[currency]
base = "KRW"
quote = "USD"
fallback_rate = 1350.0

[rebalance]
threshold_pct = 1.0
fresh_allocation_diffs = true

[storage]
settings = "./data/portfolio.json"

[logging]
dir = "./logs"
audit_file = "audit.jsonl"
"#
    }

    #[test]
    fn parse_example_config() {
        let config = Config::from_toml(example_toml()).unwrap();
        assert_eq!(config.feed.provider, Provider::Snapshot);
        assert_eq!(config.feed.timeout_secs, 5);
        assert_eq!(config.currency.fallback_rate, 1350.0);
        assert_eq!(config.rebalance.threshold_pct, 1.0);
        assert_eq!(
            config.engine_config().fresh_allocation_diffs,
            FreshAllocationDiffs::AgainstNewWeights
        );
    }

    #[test]
    fn shipped_example_config_parses() {
        let config = Config::from_toml(include_str!("../../config.example.toml")).unwrap();
        assert_eq!(config.feed.provider, Provider::Yahoo);
        assert_eq!(config.audit_path(), PathBuf::from("./logs/audit.jsonl"));
    }

    #[test]
    fn empty_file_uses_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.feed.provider, Provider::Yahoo);
        assert_eq!(config.currency.base, "KRW");
        assert_eq!(config.currency.quote, "USD");
        assert_eq!(config.currency.fallback_rate, 1300.0);
        assert_eq!(config.rebalance.threshold_pct, 0.5);
        assert_eq!(config.engine_config(), EngineConfig::default());
        assert_eq!(config.settings_path(), PathBuf::from("./portfolio.json"));
    }

    #[test]
    fn partial_section_fills_defaults() {
        let config = Config::from_toml("[currency]\nfallback_rate = 1400.0\n").unwrap();
        assert_eq!(config.currency.fallback_rate, 1400.0);
        assert_eq!(config.currency.base, "KRW");
    }

    #[test]
    fn validate_catches_bad_threshold() {
        let mut config = Config::default();
        config.rebalance.threshold_pct = -0.5;
        assert!(config.validate().is_err());
        config.rebalance.threshold_pct = f64::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_catches_bad_rate() {
        let mut config = Config::default();
        config.currency.fallback_rate = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_catches_bad_currency() {
        let mut config = Config::default();
        config.currency.base = "WON!".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_catches_zero_timeout() {
        let mut config = Config::default();
        config.feed.timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn unknown_provider_rejected() {
        assert!(Config::from_toml("[feed]\nprovider = \"bloomberg\"\n").is_err());
    }

    #[test]
    fn audit_path() {
        let config = Config::from_toml(example_toml()).unwrap();
        assert_eq!(config.audit_path(), PathBuf::from("./logs/audit.jsonl"));
    }

    #[test]
    fn missing_file_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_or_default(&dir.path().join("nope.toml")).unwrap();
        assert_eq!(config.currency.fallback_rate, 1300.0);
    }

    #[test]
    fn missing_file_is_error_for_load() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            Config::load(&dir.path().join("nope.toml")),
            Err(Error::ConfigRead { .. })
        ));
    }
}
