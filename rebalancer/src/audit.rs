//! JSONL audit trail logging.
//!
//! Every plan run and settings edit appends events to an audit.jsonl file,
//! one JSON object per line.

use std::fs::{self, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;

use etfbalance::{PriceBook, RebalanceScenario, Ticker};

use crate::error::Result;
use crate::settings::PersistedSettings;

/// An audit event written to the JSONL trail.
#[derive(Debug, Clone, Serialize)]
pub struct AuditEvent {
    pub event: &'static str,
    pub ts: DateTime<Utc>,
    #[serde(flatten)]
    pub data: serde_json::Value,
}

/// Append-only audit logger.
pub struct AuditLog {
    writer: BufWriter<std::fs::File>,
}

impl AuditLog {
    /// Open (or create) the audit log file for appending.
    pub fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new().create(true).append(true).open(path)?;

        Ok(Self {
            writer: BufWriter::new(file),
        })
    }

    /// Log an event with arbitrary JSON data.
    pub fn log(&mut self, event: &'static str, data: serde_json::Value) -> Result<()> {
        let entry = AuditEvent {
            event,
            ts: Utc::now(),
            data,
        };
        let json = serde_json::to_string(&entry)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        writeln!(self.writer, "{json}")?;
        self.writer.flush()?;
        Ok(())
    }
}

/// Convenience: log a plan run start event.
pub fn log_run_started(audit: &mut AuditLog, settings_file: &str, provider: &str) -> Result<()> {
    audit.log(
        "run_started",
        serde_json::json!({
            "settings_file": settings_file,
            "provider": provider,
        }),
    )
}

/// Convenience: log the fetched quotes and which tickers came back empty.
pub fn log_quotes(audit: &mut AuditLog, tickers: &[Ticker], prices: &PriceBook) -> Result<()> {
    let mut quote_data = serde_json::Map::new();
    let mut missing = Vec::new();
    for ticker in tickers {
        match prices.get(ticker) {
            Some(q) => {
                quote_data.insert(
                    ticker.to_string(),
                    serde_json::json!({
                        "price": q.price,
                        "currency": q.currency,
                        "as_of": q.as_of,
                    }),
                );
            }
            None => missing.push(ticker.as_str()),
        }
    }

    audit.log(
        "quotes_fetched",
        serde_json::json!({
            "quotes": quote_data,
            "missing": missing,
        }),
    )
}

/// Convenience: log the FX rate used for conversion.
pub fn log_fx_rate(audit: &mut AuditLog, pair: &str, rate: f64, fallback: bool) -> Result<()> {
    audit.log(
        "fx_rate",
        serde_json::json!({
            "pair": pair,
            "rate": rate,
            "fallback": fallback,
        }),
    )
}

/// Convenience: log the computed scenario summary and its orders.
pub fn log_scenario(audit: &mut AuditLog, scenario: &RebalanceScenario) -> Result<()> {
    let order_data: Vec<_> = scenario
        .orders()
        .map(|t| {
            serde_json::json!({
                "ticker": t.ticker.as_str(),
                "action": t.action().to_string(),
                "shares": t.quantity_diff.unsigned_abs(),
                "price": t.price,
            })
        })
        .collect();

    audit.log(
        "scenario_computed",
        serde_json::json!({
            "kind": scenario.kind,
            "needs_rebalancing": scenario.needs_rebalancing,
            "total_value": scenario.total_asset_value_base,
            "additional_cash": scenario.additional_cash,
            "remaining_cash": scenario.remaining_cash,
            "shortfall": scenario.additional_cash_needed,
            "max_weight_diff": scenario.max_weight_diff,
            "orders": order_data,
        }),
    )
}

/// Convenience: log a settings edit.
pub fn log_settings_saved(
    audit: &mut AuditLog,
    command: &str,
    settings: &PersistedSettings,
) -> Result<()> {
    audit.log(
        "settings_saved",
        serde_json::json!({
            "command": command,
            "holdings": settings.holdings.len(),
            "cash_balance": settings.cash_balance,
            "additional_cash": settings.additional_cash.to_string(),
        }),
    )
}

/// Convenience: log a settings reset.
pub fn log_settings_cleared(audit: &mut AuditLog, settings_file: &str) -> Result<()> {
    audit.log(
        "settings_cleared",
        serde_json::json!({ "settings_file": settings_file }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn audit_log_writes_jsonl() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test_audit.jsonl");

        {
            let mut log = AuditLog::open(&path).unwrap();
            log.log("test_event", serde_json::json!({})).unwrap();
            log.log("test_data", serde_json::json!({"key": "value"}))
                .unwrap();
        }

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);

        // Each line should be valid JSON
        for line in &lines {
            let _: serde_json::Value = serde_json::from_str(line).unwrap();
        }

        // First line should have "test_event"
        assert!(lines[0].contains("\"event\":\"test_event\""));
    }

    #[test]
    fn audit_log_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("subdir").join("deep").join("audit.jsonl");

        let mut log = AuditLog::open(&path).unwrap();
        log_settings_cleared(&mut log, "./portfolio.json").unwrap();

        assert!(path.exists());
        let contents = std::fs::read_to_string(&path).unwrap();
        let event: serde_json::Value = serde_json::from_str(contents.trim()).unwrap();
        assert_eq!(event["event"], "settings_cleared");
        assert_eq!(event["settings_file"], "./portfolio.json");
    }

    #[test]
    fn quotes_event_lists_missing_tickers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        let schd = Ticker::new("SCHD").unwrap();
        let tqqq = Ticker::new("TQQQ").unwrap();
        let mut prices = PriceBook::default();
        prices.insert(
            schd.clone(),
            etfbalance::PriceQuote::new(80.0, "USD", Utc::now()),
        );

        {
            let mut log = AuditLog::open(&path).unwrap();
            log_quotes(&mut log, &[schd, tqqq], &prices).unwrap();
            log_fx_rate(&mut log, "USDKRW", 1300.0, true).unwrap();
        }

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<serde_json::Value> = contents
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines[0]["event"], "quotes_fetched");
        assert_eq!(lines[0]["quotes"]["SCHD"]["price"], 80.0);
        assert_eq!(lines[0]["missing"], serde_json::json!(["TQQQ"]));
        assert_eq!(lines[1]["event"], "fx_rate");
        assert_eq!(lines[1]["fallback"], true);
        assert!(lines[1]["ts"].is_string());
    }
}
