//! Engine output: per-holding trades and the scenario summary.

use std::fmt;

use crate::types::{Quantity, Ticker};

/// Direction of a trade row, derived from its quantity diff.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Action {
    Buy,
    Sell,
    Hold,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Buy => write!(f, "BUY"),
            Action::Sell => write!(f, "SELL"),
            Action::Hold => write!(f, "HOLD"),
        }
    }
}

/// Which branch of the engine produced a scenario.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum ScenarioKind {
    /// Every holding is within threshold; nothing to trade.
    Hold,
    /// Empty portfolio funded by a fixed cash amount.
    FreshAllocation,
    /// Existing holdings resized toward target weights.
    Adjustment,
}

/// One output row: where a holding is and where it should go.
///
/// Values are in base currency, `price` is in quote currency, weights are percent.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Trade {
    pub ticker: Ticker,
    pub current_quantity: Quantity,
    pub new_quantity: Quantity,
    pub quantity_diff: i64,
    pub current_value: f64,
    pub new_value: f64,
    pub current_weight: f64,
    pub new_weight: f64,
    pub target_weight: f64,
    pub price: f64,
}

impl Trade {
    /// Absolute post-trade deviation from target, in percentage points.
    #[inline]
    pub fn weight_diff(&self) -> f64 {
        (self.new_weight - self.target_weight).abs()
    }

    pub fn action(&self) -> Action {
        match self.quantity_diff {
            d if d > 0 => Action::Buy,
            d if d < 0 => Action::Sell,
            _ => Action::Hold,
        }
    }

    /// Base-currency value of the shares bought or sold.
    pub fn trade_value_base(&self, fx_rate: f64) -> f64 {
        self.quantity_diff.unsigned_abs() as f64 * self.price * fx_rate
    }
}

/// A holding whose post-trade weight still misses its target by at least the threshold.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct OutOfRange {
    pub ticker: Ticker,
    pub target_weight: f64,
    pub final_weight: f64,
    pub difference: f64,
}

/// Complete result of one engine run. Recomputed from scratch on every call.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RebalanceScenario {
    pub kind: ScenarioKind,
    pub trades: Vec<Trade>,
    /// Total asset value (cash included) in quote currency.
    pub total_asset_value: f64,
    /// Total asset value (cash included) in base currency.
    pub total_asset_value_base: f64,
    /// Cash injected by the additional-cash policy (base currency).
    pub additional_cash: f64,
    /// Pool the targets were sized against: total + injected cash (base currency).
    pub total_available: f64,
    pub total_buy_value: f64,
    pub total_sell_value: f64,
    /// Cash on hand plus sale proceeds.
    pub available_cash: f64,
    pub additional_cash_needed: f64,
    pub remaining_cash: f64,
    pub max_weight_diff: f64,
    pub total_weight_diff: f64,
    pub needs_rebalancing: bool,
}

impl RebalanceScenario {
    /// Trades that still miss their target by `threshold` points or more after rebalancing.
    pub fn out_of_range(&self, threshold: f64) -> Vec<OutOfRange> {
        self.trades
            .iter()
            .filter(|t| t.weight_diff() >= threshold)
            .map(|t| OutOfRange {
                ticker: t.ticker.clone(),
                target_weight: t.target_weight,
                final_weight: t.new_weight,
                difference: t.new_weight - t.target_weight,
            })
            .collect()
    }

    /// Sum of post-trade weights, in percent of `total_available`.
    pub fn allocated_weight(&self) -> f64 {
        self.trades.iter().map(|t| t.new_weight).sum()
    }

    /// Trades that actually buy or sell something.
    pub fn orders(&self) -> impl Iterator<Item = &Trade> {
        self.trades.iter().filter(|t| t.quantity_diff != 0)
    }
}

/// Format a base-currency amount with thousands separators, no decimals.
pub fn format_amount(value: f64) -> String {
    if !value.is_finite() {
        return "0".into();
    }
    let rounded = value.round();
    let digits = format!("{:.0}", rounded.abs());
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    if rounded < 0.0 {
        out.insert(0, '-');
    }
    out
}

impl fmt::Display for RebalanceScenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "REBALANCE PLAN:")?;
        writeln!(
            f,
            "  {:8} {:>8} {:>10} {:>9} {:>9} {:>12} {:>9} {:>16}",
            "Ticker", "Qty", "Price", "Current%", "Target%", "Adjust", "After%", "Value"
        )?;
        for t in &self.trades {
            let adjust = match t.action() {
                Action::Hold => "-".to_string(),
                action => format!("{action} {}", t.quantity_diff.unsigned_abs()),
            };
            writeln!(
                f,
                "  {:8} {:>8} {:>10.2} {:>8.2}% {:>8.2}% {:>12} {:>8.2}% {:>16}",
                t.ticker,
                t.current_quantity,
                t.price,
                t.current_weight,
                t.target_weight,
                adjust,
                t.new_weight,
                format_amount(t.new_value),
            )?;
        }

        writeln!(f)?;
        writeln!(f, "  Total value:        {:>16}", format_amount(self.total_asset_value_base))?;
        writeln!(f, "  Remaining cash:     {:>16}", format_amount(self.remaining_cash))?;
        if self.additional_cash > 0.0 {
            writeln!(f, "  Additional cash:    {:>16}", format_amount(self.additional_cash))?;
        }
        if self.additional_cash_needed > 0.0 {
            writeln!(
                f,
                "  Shortfall:          {:>16}",
                format_amount(self.additional_cash_needed)
            )?;
        }
        writeln!(
            f,
            "  Rebalancing:        {:>16}",
            if self.needs_rebalancing { "needed" } else { "not needed" }
        )?;
        if self.needs_rebalancing {
            writeln!(f, "  Max weight diff:    {:>15.2}%", self.max_weight_diff)?;
            writeln!(f, "  Total weight diff:  {:>15.2}%", self.total_weight_diff)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trade(sym: &str, current: Quantity, new: Quantity, new_weight: f64, target: f64) -> Trade {
        Trade {
            ticker: Ticker::new(sym).unwrap(),
            current_quantity: current,
            new_quantity: new,
            quantity_diff: new as i64 - current as i64,
            current_value: 0.0,
            new_value: 0.0,
            current_weight: 0.0,
            new_weight,
            target_weight: target,
            price: 10.0,
        }
    }

    fn scenario(trades: Vec<Trade>) -> RebalanceScenario {
        RebalanceScenario {
            kind: ScenarioKind::Adjustment,
            trades,
            total_asset_value: 0.0,
            total_asset_value_base: 1_234_567.0,
            additional_cash: 0.0,
            total_available: 0.0,
            total_buy_value: 0.0,
            total_sell_value: 0.0,
            available_cash: 0.0,
            additional_cash_needed: 0.0,
            remaining_cash: 0.0,
            max_weight_diff: 0.0,
            total_weight_diff: 0.0,
            needs_rebalancing: true,
        }
    }

    #[test]
    fn action_from_diff() {
        assert_eq!(trade("A", 1, 5, 0.0, 0.0).action(), Action::Buy);
        assert_eq!(trade("A", 5, 1, 0.0, 0.0).action(), Action::Sell);
        assert_eq!(trade("A", 3, 3, 0.0, 0.0).action(), Action::Hold);
    }

    #[test]
    fn trade_value_uses_abs_diff() {
        let t = trade("A", 5, 2, 0.0, 0.0);
        assert_eq!(t.trade_value_base(1300.0), 3.0 * 10.0 * 1300.0);
    }

    #[test]
    fn out_of_range_filters_by_threshold() {
        let s = scenario(vec![
            trade("SCHD", 0, 7, 72.8, 80.0),
            trade("QQQ", 0, 0, 0.0, 15.0),
            trade("VOO", 0, 1, 4.9, 5.0),
        ]);
        let out = s.out_of_range(0.5);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].ticker.as_str(), "SCHD");
        assert!((out[0].difference + 7.2).abs() < 1e-9);
        assert_eq!(out[1].final_weight, 0.0);
    }

    #[test]
    fn orders_skip_holds() {
        let s = scenario(vec![trade("A", 1, 1, 0.0, 0.0), trade("B", 0, 2, 0.0, 0.0)]);
        let orders: Vec<_> = s.orders().collect();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].ticker.as_str(), "B");
    }

    #[test]
    fn amount_grouping() {
        assert_eq!(format_amount(0.0), "0");
        assert_eq!(format_amount(999.4), "999");
        assert_eq!(format_amount(1000.0), "1,000");
        assert_eq!(format_amount(3_796_000.0), "3,796,000");
        assert_eq!(format_amount(-1_234_567.0), "-1,234,567");
        assert_eq!(format_amount(f64::NAN), "0");
    }

    #[test]
    fn display_format() {
        let s = scenario(vec![trade("SCHD", 10, 29, 80.0, 80.0)]);
        let out = format!("{s}");
        assert!(out.contains("SCHD"));
        assert!(out.contains("BUY 19"));
        assert!(out.contains("1,234,567"));
        assert!(out.contains("needed"));
    }
}
