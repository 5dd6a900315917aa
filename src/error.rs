//! Validation errors for caller-side input.
//!
//! The engine itself never fails; these guard the edges where raw user input
//! becomes holdings, weights and amounts.

use rustc_hash::FxHashSet;

use crate::types::Holding;

/// Errors returned when validating user-entered portfolio data.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ValidationError {
    #[error("ticker must not be empty")]
    EmptyTicker,

    #[error("duplicate ticker: {0}")]
    DuplicateTicker(String),

    #[error("invalid quantity: {0}")]
    InvalidQuantity(String),

    #[error("invalid target weight: {0}")]
    InvalidWeight(String),

    #[error("invalid amount: {0}")]
    InvalidAmount(String),
}

/// Check a holdings list before it is saved or rebalanced.
///
/// Rejects duplicate tickers and target weights outside 0–100.
pub fn validate_holdings(holdings: &[Holding]) -> Result<(), ValidationError> {
    let mut seen = FxHashSet::default();
    for h in holdings {
        if !seen.insert(&h.ticker) {
            return Err(ValidationError::DuplicateTicker(h.ticker.to_string()));
        }
        validate_weight(h.target_weight)?;
    }
    Ok(())
}

/// A target weight must be a finite percentage in 0–100.
pub fn validate_weight(weight: f64) -> Result<(), ValidationError> {
    if !weight.is_finite() || !(0.0..=100.0).contains(&weight) {
        return Err(ValidationError::InvalidWeight(format!(
            "{weight} is outside 0-100"
        )));
    }
    Ok(())
}

/// Parse an amount typed with optional thousands separators (`"1,000,000"`).
///
/// Anything unparsable, non-finite or negative becomes 0.
pub fn parse_amount(raw: &str) -> f64 {
    let cleaned: String = raw.chars().filter(|c| *c != ',' && !c.is_whitespace()).collect();
    match cleaned.parse::<f64>() {
        Ok(v) if v.is_finite() && v > 0.0 => v,
        _ => 0.0,
    }
}

/// Like [`parse_amount`], but reports garbage instead of coercing it.
///
/// Used where a typo should be surfaced rather than silently zeroed.
pub fn parse_amount_strict(raw: &str) -> Result<f64, ValidationError> {
    let cleaned: String = raw.chars().filter(|c| *c != ',' && !c.is_whitespace()).collect();
    match cleaned.parse::<f64>() {
        Ok(v) if v.is_finite() && v >= 0.0 => Ok(v),
        _ => Err(ValidationError::InvalidAmount(raw.to_string())),
    }
}
