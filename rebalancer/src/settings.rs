//! Saved portfolio settings (portfolio.json): holdings, cash and cash policy.
//!
//! The file is rewritten in full on every save. Files written by the older
//! browser version (`etfList` + positional `targetRatios`) are migrated on load.

use std::path::Path;

use chrono::{DateTime, Utc};
use etfbalance::error::validate_weight;
use etfbalance::{
    AdditionalCash, Holding, Quantity, Ticker, ValidationError, attach_targets, validate_holdings,
};
use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Everything the user entered, as persisted between runs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersistedSettings {
    #[serde(default)]
    pub holdings: Vec<Holding>,
    /// Cash already held, in base currency.
    #[serde(default)]
    pub cash_balance: f64,
    #[serde(default)]
    pub additional_cash: AdditionalCash,
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
}

/// Settings shape written by the browser version of the calculator.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacySettings {
    #[serde(default)]
    etf_list: Vec<LegacyEtf>,
    #[serde(default)]
    cash_balance: f64,
    #[serde(default = "legacy_use_additional_cash")]
    use_additional_cash: bool,
    #[serde(default)]
    additional_cash_type: Option<String>,
    #[serde(default)]
    additional_cash_percent: f64,
    #[serde(default)]
    additional_cash_fixed: f64,
    #[serde(default)]
    target_ratios: Vec<f64>,
    #[serde(default)]
    last_updated: Option<DateTime<Utc>>,
}

fn legacy_use_additional_cash() -> bool {
    true
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyEtf {
    #[serde(default)]
    ticker: String,
    #[serde(default)]
    quantity: f64,
    #[serde(default)]
    target_weight: f64,
}

impl LegacySettings {
    fn migrate(self) -> PersistedSettings {
        // targetRatios wins when present; it was what the editor showed
        let weights: Vec<f64> = if self.target_ratios.is_empty() {
            self.etf_list.iter().map(|e| e.target_weight).collect()
        } else {
            self.target_ratios
        };

        let mut lines = Vec::with_capacity(self.etf_list.len());
        let mut kept_weights = Vec::with_capacity(weights.len());
        for (i, etf) in self.etf_list.iter().enumerate() {
            match Ticker::new(&etf.ticker) {
                Ok(ticker) => {
                    lines.push((ticker, legacy_quantity(etf.quantity)));
                    kept_weights.push(weights.get(i).copied().unwrap_or(0.0));
                }
                Err(_) => warn!("dropping legacy holding #{i} with empty ticker"),
            }
        }

        let additional_cash = if !self.use_additional_cash {
            AdditionalCash::None
        } else {
            match self.additional_cash_type.as_deref() {
                Some("percent") => AdditionalCash::Percent(self.additional_cash_percent),
                Some("fixed") => AdditionalCash::Fixed(self.additional_cash_fixed),
                _ => AdditionalCash::None,
            }
        };

        PersistedSettings {
            holdings: attach_targets(lines, &kept_weights),
            cash_balance: self.cash_balance,
            additional_cash,
            last_updated: self.last_updated,
        }
    }
}

/// Quantities were free-form numbers in the legacy file.
fn legacy_quantity(raw: f64) -> Quantity {
    if raw.is_finite() && raw > 0.0 {
        raw.floor() as Quantity
    } else {
        0
    }
}

impl PersistedSettings {
    /// Load settings. Returns `Ok(None)` when nothing has been saved yet.
    pub fn load(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(path).map_err(|e| Error::SettingsIo {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_json(&contents).map(Some)
    }

    /// Load settings, or start from an empty portfolio.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        Ok(Self::load(path)?.unwrap_or_default())
    }

    /// Parse either the current or the legacy JSON shape.
    pub fn from_json(json: &str) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_str(json)?;
        let settings = if value.get("etfList").is_some() {
            info!("migrating legacy settings format");
            serde_json::from_value::<LegacySettings>(value)?.migrate()
        } else {
            serde_json::from_value::<PersistedSettings>(value)?
        };
        validate_holdings(&settings.holdings)?;
        Ok(settings)
    }

    /// Write settings, stamping `last_updated` and creating parent directories.
    pub fn save(&mut self, path: &Path) -> Result<()> {
        validate_holdings(&self.holdings)?;
        self.last_updated = Some(Utc::now());

        let io_err = |e: std::io::Error| Error::SettingsIo {
            path: path.to_path_buf(),
            source: e,
        };
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(io_err)?;
            }
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).map_err(io_err)?;
        Ok(())
    }

    /// Delete saved settings. Returns whether a file was removed.
    pub fn clear(path: &Path) -> Result<bool> {
        match std::fs::remove_file(path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(Error::SettingsIo {
                path: path.to_path_buf(),
                source: e,
            }),
        }
    }

    /// Tickers in entry order.
    pub fn tickers(&self) -> Vec<Ticker> {
        self.holdings.iter().map(|h| h.ticker.clone()).collect()
    }

    pub fn holding(&self, ticker: &Ticker) -> Option<&Holding> {
        self.holdings.iter().find(|h| &h.ticker == ticker)
    }

    /// Append a new holding. Fails if the ticker is already present.
    pub fn add_holding(
        &mut self,
        ticker: Ticker,
        quantity: Quantity,
        target_weight: f64,
    ) -> std::result::Result<(), ValidationError> {
        if self.holding(&ticker).is_some() {
            return Err(ValidationError::DuplicateTicker(ticker.to_string()));
        }
        validate_weight(target_weight)?;
        self.holdings.push(Holding::new(ticker, quantity, target_weight));
        Ok(())
    }

    /// Update the given fields of a holding, adding it if absent.
    ///
    /// Returns `true` if the holding already existed.
    pub fn upsert_holding(
        &mut self,
        ticker: Ticker,
        quantity: Option<Quantity>,
        target_weight: Option<f64>,
    ) -> std::result::Result<bool, ValidationError> {
        if let Some(w) = target_weight {
            validate_weight(w)?;
        }
        match self.holdings.iter_mut().find(|h| h.ticker == ticker) {
            Some(h) => {
                if let Some(q) = quantity {
                    h.quantity = q;
                }
                if let Some(w) = target_weight {
                    h.target_weight = w;
                }
                Ok(true)
            }
            None => {
                self.holdings.push(Holding::new(
                    ticker,
                    quantity.unwrap_or(0),
                    target_weight.unwrap_or(0.0),
                ));
                Ok(false)
            }
        }
    }

    /// Remove a holding. Returns `false` if it was not there.
    pub fn remove_holding(&mut self, ticker: &Ticker) -> bool {
        let before = self.holdings.len();
        self.holdings.retain(|h| &h.ticker != ticker);
        self.holdings.len() != before
    }

    pub fn set_cash(&mut self, amount: f64) -> std::result::Result<(), ValidationError> {
        if !amount.is_finite() || amount < 0.0 {
            return Err(ValidationError::InvalidAmount(amount.to_string()));
        }
        self.cash_balance = amount;
        Ok(())
    }

    pub fn set_additional_cash(
        &mut self,
        policy: AdditionalCash,
    ) -> std::result::Result<(), ValidationError> {
        match policy {
            AdditionalCash::Percent(v) | AdditionalCash::Fixed(v)
                if !v.is_finite() || v < 0.0 =>
            {
                Err(ValidationError::InvalidAmount(policy.to_string()))
            }
            _ => {
                self.additional_cash = policy;
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(s: &str) -> Ticker {
        Ticker::new(s).unwrap()
    }

    #[test]
    fn current_format_parses() {
        let json = r#"{
            "holdings": [
                { "ticker": "schd", "quantity": 10, "target_weight": 60 },
                { "ticker": "QQQ", "quantity": 3 }
            ],
            "cash_balance": 500000,
            "additional_cash": { "type": "percent", "value": 10 }
        }"#;
        let s = PersistedSettings::from_json(json).unwrap();
        assert_eq!(s.holdings.len(), 2);
        assert_eq!(s.holdings[0].ticker, t("SCHD"));
        assert_eq!(s.holdings[0].target_weight, 60.0);
        assert_eq!(s.holdings[1].target_weight, 0.0);
        assert_eq!(s.cash_balance, 500_000.0);
        assert_eq!(s.additional_cash, AdditionalCash::Percent(10.0));
        assert!(s.last_updated.is_none());
    }

    #[test]
    fn empty_object_is_default() {
        let s = PersistedSettings::from_json("{}").unwrap();
        assert_eq!(s, PersistedSettings::default());
    }

    #[test]
    fn duplicate_tickers_rejected_on_load() {
        let json = r#"{"holdings":[{"ticker":"VOO","quantity":1},{"ticker":"voo","quantity":2}]}"#;
        assert!(matches!(
            PersistedSettings::from_json(json),
            Err(Error::Invalid(ValidationError::DuplicateTicker(_)))
        ));
    }

    #[test]
    fn legacy_format_migrates() {
        let json = r#"{
            "etfList": [
                { "ticker": "SCHD", "quantity": 10, "targetWeight": 0 },
                { "ticker": "QQQ", "quantity": 2.9, "targetWeight": 0 },
                { "ticker": "TQQQ", "quantity": -1, "targetWeight": 0 }
            ],
            "cashBalance": 1000000,
            "useAdditionalCash": true,
            "additionalCashType": "fixed",
            "additionalCashPercent": 5,
            "additionalCashFixed": 2000000,
            "targetRatios": [50, 30],
            "lastUpdated": "2025-03-01T09:30:00.000Z"
        }"#;
        let s = PersistedSettings::from_json(json).unwrap();
        let summary: Vec<_> = s
            .holdings
            .iter()
            .map(|h| (h.ticker.as_str(), h.quantity, h.target_weight))
            .collect();
        assert_eq!(
            summary,
            vec![("SCHD", 10, 50.0), ("QQQ", 2, 30.0), ("TQQQ", 0, 0.0)]
        );
        assert_eq!(s.cash_balance, 1_000_000.0);
        assert_eq!(s.additional_cash, AdditionalCash::Fixed(2_000_000.0));
        assert!(s.last_updated.is_some());
    }

    #[test]
    fn legacy_without_ratios_uses_inline_weights() {
        let json = r#"{
            "etfList": [{ "ticker": "VOO", "quantity": 1, "targetWeight": 100 }],
            "useAdditionalCash": false,
            "additionalCashType": "percent",
            "additionalCashPercent": 10
        }"#;
        let s = PersistedSettings::from_json(json).unwrap();
        assert_eq!(s.holdings[0].target_weight, 100.0);
        assert_eq!(s.additional_cash, AdditionalCash::None);
    }

    #[test]
    fn legacy_skips_blank_tickers_without_shifting_weights() {
        let json = r#"{
            "etfList": [
                { "ticker": "", "quantity": 5 },
                { "ticker": "VTI", "quantity": 1 }
            ],
            "targetRatios": [40, 60]
        }"#;
        let s = PersistedSettings::from_json(json).unwrap();
        assert_eq!(s.holdings.len(), 1);
        assert_eq!(s.holdings[0].target_weight, 60.0);
    }

    #[test]
    fn add_rejects_duplicate_and_bad_weight() {
        let mut s = PersistedSettings::default();
        s.add_holding(t("VOO"), 3, 40.0).unwrap();
        assert!(matches!(
            s.add_holding(t("voo"), 1, 10.0),
            Err(ValidationError::DuplicateTicker(_))
        ));
        assert!(matches!(
            s.add_holding(t("VTI"), 1, 120.0),
            Err(ValidationError::InvalidWeight(_))
        ));
        assert_eq!(s.holdings.len(), 1);
    }

    #[test]
    fn upsert_updates_only_given_fields() {
        let mut s = PersistedSettings::default();
        assert!(!s.upsert_holding(t("VOO"), Some(3), None).unwrap());
        assert_eq!(s.holdings[0].target_weight, 0.0);

        assert!(s.upsert_holding(t("VOO"), None, Some(55.5)).unwrap());
        assert_eq!(s.holdings[0].quantity, 3);
        assert_eq!(s.holdings[0].target_weight, 55.5);

        assert!(s.upsert_holding(t("VOO"), Some(1), Some(f64::NAN)).is_err());
        assert_eq!(s.holdings[0].quantity, 3);
    }

    #[test]
    fn remove_holding() {
        let mut s = PersistedSettings::default();
        s.add_holding(t("VOO"), 1, 50.0).unwrap();
        s.add_holding(t("VTI"), 1, 50.0).unwrap();
        assert!(s.remove_holding(&t("VOO")));
        assert!(!s.remove_holding(&t("VOO")));
        assert_eq!(s.tickers(), vec![t("VTI")]);
    }

    #[test]
    fn cash_and_policy_validation() {
        let mut s = PersistedSettings::default();
        s.set_cash(63.0).unwrap();
        assert!(s.set_cash(-1.0).is_err());
        assert!(s.set_cash(f64::INFINITY).is_err());
        assert_eq!(s.cash_balance, 63.0);

        s.set_additional_cash(AdditionalCash::Fixed(1_000.0)).unwrap();
        assert!(s.set_additional_cash(AdditionalCash::Percent(-5.0)).is_err());
        assert_eq!(s.additional_cash, AdditionalCash::Fixed(1_000.0));
        s.set_additional_cash(AdditionalCash::None).unwrap();
        assert_eq!(s.additional_cash, AdditionalCash::None);
    }

    #[test]
    fn save_load_clear() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("portfolio.json");

        assert!(PersistedSettings::load(&path).unwrap().is_none());

        let mut s = PersistedSettings::default();
        s.add_holding(t("SCHD"), 10, 100.0).unwrap();
        s.set_additional_cash(AdditionalCash::Percent(5.0)).unwrap();
        s.save(&path).unwrap();
        assert!(s.last_updated.is_some());

        let loaded = PersistedSettings::load(&path).unwrap().unwrap();
        assert_eq!(loaded, s);

        assert!(PersistedSettings::clear(&path).unwrap());
        assert!(!PersistedSettings::clear(&path).unwrap());
        assert_eq!(
            PersistedSettings::load_or_default(&path).unwrap(),
            PersistedSettings::default()
        );
    }

    #[test]
    fn corrupt_file_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("portfolio.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            PersistedSettings::load(&path),
            Err(Error::SettingsParse(_))
        ));
    }
}
