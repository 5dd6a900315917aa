//! Core types: Ticker, Holding, PriceQuote, PriceBook

use std::fmt;

use chrono::{DateTime, Utc};
use rustc_hash::FxHashMap;

use crate::error::ValidationError;

/// Number of whole shares. Never negative.
pub type Quantity = u64;

/// Exchange symbol, trimmed and upper-cased on construction.
///
/// `Ticker::new(" schd ")` and `Ticker::new("SCHD")` are the same ticker.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "String", into = "String"))]
pub struct Ticker(String);

impl Ticker {
    /// Normalize and validate a ticker symbol.
    pub fn new(raw: &str) -> Result<Self, ValidationError> {
        let normalized = raw.trim().to_uppercase();
        if normalized.is_empty() {
            return Err(ValidationError::EmptyTicker);
        }
        Ok(Ticker(normalized))
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Ticker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Pass through so width/alignment flags work in tables
        f.pad(&self.0)
    }
}

impl TryFrom<String> for Ticker {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Ticker::new(&value)
    }
}

impl From<Ticker> for String {
    fn from(t: Ticker) -> Self {
        t.0
    }
}

impl std::str::FromStr for Ticker {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ticker::new(s)
    }
}

/// One portfolio line: what is owned and what share of the portfolio it should be.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Holding {
    pub ticker: Ticker,
    pub quantity: Quantity,
    /// Desired allocation in percent (0–100).
    #[cfg_attr(feature = "serde", serde(default))]
    pub target_weight: f64,
}

impl Holding {
    pub fn new(ticker: Ticker, quantity: Quantity, target_weight: f64) -> Self {
        Self {
            ticker,
            quantity,
            target_weight,
        }
    }
}

/// Zip a positional target-weight array onto `(ticker, quantity)` lines.
///
/// Lines without a corresponding weight get a target of 0; surplus weights
/// are dropped.
pub fn attach_targets(lines: Vec<(Ticker, Quantity)>, weights: &[f64]) -> Vec<Holding> {
    lines
        .into_iter()
        .enumerate()
        .map(|(i, (ticker, quantity))| {
            let target = weights.get(i).copied().unwrap_or(0.0);
            Holding::new(ticker, quantity, target)
        })
        .collect()
}

/// Sum of all target weights. Not required to be 100, but worth showing.
pub fn target_weight_sum(holdings: &[Holding]) -> f64 {
    holdings
        .iter()
        .map(|h| h.target_weight)
        .filter(|w| w.is_finite())
        .sum()
}

/// Last traded price of one ticker, in its native (quote) currency.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PriceQuote {
    pub price: f64,
    pub currency: String,
    pub as_of: DateTime<Utc>,
}

impl PriceQuote {
    pub fn new(price: f64, currency: impl Into<String>, as_of: DateTime<Utc>) -> Self {
        Self {
            price,
            currency: currency.into(),
            as_of,
        }
    }

    /// Price usable for valuation: non-finite or non-positive prices are unknown (0).
    #[inline]
    pub fn usable_price(&self) -> f64 {
        if self.price.is_finite() && self.price > 0.0 {
            self.price
        } else {
            0.0
        }
    }
}

/// Quotes keyed by ticker, as supplied by a price feed.
pub type PriceBook = FxHashMap<Ticker, PriceQuote>;

/// Price of `ticker` in quote currency, 0 if absent or unusable.
#[inline]
pub fn price_of(prices: &PriceBook, ticker: &Ticker) -> f64 {
    prices.get(ticker).map_or(0.0, PriceQuote::usable_price)
}
