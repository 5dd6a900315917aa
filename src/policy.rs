//! Additional-cash policy: hypothetical new money injected before targets are computed.

use std::fmt;

/// How much extra cash to add to the pool before sizing target positions.
///
/// | Variant | Meaning |
/// |---------|---------|
/// | `None` | rebalance with what is already there |
/// | `Percent(p)` | add `p`% of total asset value (`5.0` = 5%) |
/// | `Fixed(a)` | add a literal amount `a` in base currency |
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(
    feature = "serde",
    serde(tag = "type", content = "value", rename_all = "lowercase")
)]
pub enum AdditionalCash {
    #[default]
    None,
    Percent(f64),
    Fixed(f64),
}

impl AdditionalCash {
    /// Fraction of `total_asset_value` to inject.
    ///
    /// `Fixed` is converted to a ratio of the same total it will later be
    /// multiplied by, so the injected amount comes back out exactly. Returns
    /// 0 for a zero total and for non-finite or negative payloads.
    pub fn effective_ratio(&self, total_asset_value: f64) -> f64 {
        let ratio = match *self {
            AdditionalCash::None => 0.0,
            AdditionalCash::Percent(p) => p / 100.0,
            AdditionalCash::Fixed(amount) => {
                if total_asset_value > 0.0 && total_asset_value.is_finite() {
                    amount / total_asset_value
                } else {
                    0.0
                }
            }
        };
        if ratio.is_finite() && ratio > 0.0 {
            ratio
        } else {
            0.0
        }
    }

    /// Base-currency amount injected on top of `total_asset_value`.
    #[inline]
    pub fn injected(&self, total_asset_value: f64) -> f64 {
        total_asset_value * self.effective_ratio(total_asset_value)
    }

    /// The literal amount of a `Fixed` policy, if positive.
    pub fn fixed_amount(&self) -> Option<f64> {
        match *self {
            AdditionalCash::Fixed(amount) if amount.is_finite() && amount > 0.0 => Some(amount),
            _ => None,
        }
    }
}

impl fmt::Display for AdditionalCash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AdditionalCash::None => write!(f, "none"),
            AdditionalCash::Percent(p) => write!(f, "{p}% of total assets"),
            AdditionalCash::Fixed(a) => write!(f, "{a:.0} fixed"),
        }
    }
}
