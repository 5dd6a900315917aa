//! Rebalance calculation engine.
//!
//! Given holdings (with target weights), a price book, a cash balance, an FX
//! rate and an additional-cash policy, decide whether the portfolio needs
//! rebalancing and, if so, size every position to its target.
//!
//! The computation is pure and total: malformed numbers (NaN, infinities,
//! negatives) and missing prices degrade to 0 instead of aborting, and no
//! percentage is ever computed against a zero denominator.
//!
//! Three branches:
//!
//! | Branch | When | Result |
//! |--------|------|--------|
//! | Fresh allocation | all quantities 0 and `Fixed(a)` with `a > 0` | `a` split by target weight |
//! | Hold | every `|current% - target%|` below threshold | unchanged quantities |
//! | Adjustment | otherwise | floor-sized targets against cash + injected cash |

use crate::policy::AdditionalCash;
use crate::scenario::{RebalanceScenario, ScenarioKind, Trade};
use crate::types::{Holding, PriceBook, Quantity, Ticker, price_of};

/// Deviation (percentage points) at or above which a holding triggers a rebalance.
pub const DEFAULT_THRESHOLD_PCT: f64 = 0.5;

/// How weight diffs are reported for a fresh allocation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum FreshAllocationDiffs {
    /// Report 0: an empty portfolio has no current weight to diff against.
    #[default]
    Zero,
    /// Diff the newly established weights against their targets.
    AgainstNewWeights,
}

/// Tunables for the engine.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EngineConfig {
    /// Rebalance when any holding deviates from target by at least this many points.
    pub threshold_pct: f64,
    pub fresh_allocation_diffs: FreshAllocationDiffs,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            threshold_pct: DEFAULT_THRESHOLD_PCT,
            fresh_allocation_diffs: FreshAllocationDiffs::Zero,
        }
    }
}

/// Stateless rebalance calculator.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct RebalanceEngine {
    config: EngineConfig,
}

/// Valuation of one holding before any trade.
struct Line<'a> {
    holding: &'a Holding,
    target: f64,
    price: f64,
    price_base: f64,
    current_value: f64,
    current_weight: f64,
}

impl RebalanceEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    /// Engine with a custom threshold and otherwise default settings.
    pub fn with_threshold(threshold_pct: f64) -> Self {
        Self::new(EngineConfig {
            threshold_pct,
            ..EngineConfig::default()
        })
    }

    #[inline]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Threshold in effect; a non-finite or negative setting falls back to the default.
    #[inline]
    pub fn threshold(&self) -> f64 {
        let t = self.config.threshold_pct;
        if t.is_finite() && t >= 0.0 {
            t
        } else {
            DEFAULT_THRESHOLD_PCT
        }
    }

    /// Whether [`compute`](Self::compute) would propose trades: a fresh
    /// allocation, or any holding off target by at least the threshold.
    pub fn needs_rebalancing(
        &self,
        holdings: &[Holding],
        prices: &PriceBook,
        cash_balance: f64,
        fx_rate: f64,
        policy: AdditionalCash,
    ) -> bool {
        if fresh_amount(holdings, policy).is_some() {
            return true;
        }
        let fx = sanitize(fx_rate);
        let (lines, _) = value_lines(holdings, prices, sanitize(cash_balance), fx);
        lines
            .iter()
            .any(|l| (l.current_weight - l.target).abs() >= self.threshold())
    }

    /// Compute the full rebalance scenario. Never panics.
    ///
    /// - `cash_balance`: cash already held, in base currency
    /// - `fx_rate`: base-currency units per one quote-currency unit
    pub fn compute(
        &self,
        holdings: &[Holding],
        prices: &PriceBook,
        cash_balance: f64,
        fx_rate: f64,
        policy: AdditionalCash,
    ) -> RebalanceScenario {
        let cash = sanitize(cash_balance);
        let fx = sanitize(fx_rate);

        if let Some(amount) = fresh_amount(holdings, policy) {
            return self.fresh_allocation(holdings, prices, fx, amount);
        }

        let (lines, total) = value_lines(holdings, prices, cash, fx);
        let deviations: Vec<f64> = lines
            .iter()
            .map(|l| (l.current_weight - l.target).abs())
            .collect();

        let threshold = self.threshold();
        if !deviations.iter().any(|d| *d >= threshold) {
            return hold(&lines, &deviations, total, cash, fx);
        }

        adjust(&lines, total, cash, fx, policy)
    }

    /// Empty portfolio: split a fixed amount directly by target weight.
    fn fresh_allocation(
        &self,
        holdings: &[Holding],
        prices: &PriceBook,
        fx: f64,
        amount: f64,
    ) -> RebalanceScenario {
        let trades: Vec<Trade> = holdings
            .iter()
            .map(|h| {
                let (price, price_base) = priced(prices, &h.ticker, fx);
                let target = sanitize(h.target_weight);
                let new_quantity = floor_shares(amount * target / 100.0, price_base);
                let new_value = new_quantity as f64 * price_base;
                Trade {
                    ticker: h.ticker.clone(),
                    current_quantity: 0,
                    new_quantity,
                    quantity_diff: to_diff(new_quantity, 0),
                    current_value: 0.0,
                    new_value,
                    current_weight: 0.0,
                    new_weight: percent(new_value, amount),
                    target_weight: target,
                    price,
                }
            })
            .collect();

        let allocated: f64 = trades.iter().map(|t| t.new_value).sum();
        let (max_weight_diff, total_weight_diff) = match self.config.fresh_allocation_diffs {
            FreshAllocationDiffs::Zero => (0.0, 0.0),
            FreshAllocationDiffs::AgainstNewWeights => {
                summarize(trades.iter().map(Trade::weight_diff))
            }
        };

        RebalanceScenario {
            kind: ScenarioKind::FreshAllocation,
            trades,
            total_asset_value: to_quote(amount, fx),
            total_asset_value_base: amount,
            additional_cash: amount,
            total_available: amount,
            total_buy_value: allocated,
            total_sell_value: 0.0,
            available_cash: amount,
            additional_cash_needed: (allocated - amount).max(0.0),
            remaining_cash: (amount - allocated).max(0.0),
            max_weight_diff,
            total_weight_diff,
            needs_rebalancing: true,
        }
    }
}

/// Compute a scenario with the default engine (0.5-point threshold).
pub fn compute_scenario(
    holdings: &[Holding],
    prices: &PriceBook,
    cash_balance: f64,
    fx_rate: f64,
    policy: AdditionalCash,
) -> RebalanceScenario {
    RebalanceEngine::default().compute(holdings, prices, cash_balance, fx_rate, policy)
}

/// Empty portfolio funded by a fixed amount: the amount to split.
fn fresh_amount(holdings: &[Holding], policy: AdditionalCash) -> Option<f64> {
    policy
        .fixed_amount()
        .filter(|_| holdings.iter().all(|h| h.quantity == 0))
}

/// Quote and base price of `ticker`. A base price that overflows is unknown (0, 0).
fn priced(prices: &PriceBook, ticker: &Ticker, fx: f64) -> (f64, f64) {
    let price = price_of(prices, ticker);
    let price_base = price * fx;
    if price_base.is_finite() {
        (price, price_base)
    } else {
        (0.0, 0.0)
    }
}

/// Value every holding and return the lines plus total base value (cash included).
fn value_lines<'a>(
    holdings: &'a [Holding],
    prices: &PriceBook,
    cash: f64,
    fx: f64,
) -> (Vec<Line<'a>>, f64) {
    let mut lines: Vec<Line<'a>> = holdings
        .iter()
        .map(|h| {
            let (mut price, mut price_base) = priced(prices, &h.ticker, fx);
            let mut current_value = h.quantity as f64 * price_base;
            if !current_value.is_finite() {
                (price, price_base, current_value) = (0.0, 0.0, 0.0);
            }
            Line {
                holding: h,
                target: sanitize(h.target_weight),
                price,
                price_base,
                current_value,
                current_weight: 0.0,
            }
        })
        .collect();

    let total = cash + lines.iter().map(|l| l.current_value).sum::<f64>();
    for line in &mut lines {
        line.current_weight = percent(line.current_value, total);
    }
    (lines, total)
}

/// Within threshold: report the portfolio as-is.
fn hold(
    lines: &[Line<'_>],
    deviations: &[f64],
    total: f64,
    cash: f64,
    fx: f64,
) -> RebalanceScenario {
    let trades = lines
        .iter()
        .map(|l| Trade {
            ticker: l.holding.ticker.clone(),
            current_quantity: l.holding.quantity,
            new_quantity: l.holding.quantity,
            quantity_diff: 0,
            current_value: l.current_value,
            new_value: l.current_value,
            current_weight: l.current_weight,
            new_weight: l.current_weight,
            target_weight: l.target,
            price: l.price,
        })
        .collect();

    let (max_weight_diff, total_weight_diff) = summarize(deviations.iter().copied());

    RebalanceScenario {
        kind: ScenarioKind::Hold,
        trades,
        total_asset_value: to_quote(total, fx),
        total_asset_value_base: total,
        additional_cash: 0.0,
        total_available: total,
        total_buy_value: 0.0,
        total_sell_value: 0.0,
        available_cash: cash,
        additional_cash_needed: 0.0,
        remaining_cash: cash,
        max_weight_diff,
        total_weight_diff,
        needs_rebalancing: false,
    }
}

/// Size every holding against the total plus injected cash, then reconcile cash.
fn adjust(
    lines: &[Line<'_>],
    total: f64,
    cash: f64,
    fx: f64,
    policy: AdditionalCash,
) -> RebalanceScenario {
    let additional_cash = policy.injected(total);
    let total_available = total + additional_cash;

    let trades: Vec<Trade> = lines
        .iter()
        .map(|l| {
            let target_value = total_available * l.target / 100.0;
            let new_quantity = floor_shares(target_value, l.price_base);
            let new_value = new_quantity as f64 * l.price_base;
            Trade {
                ticker: l.holding.ticker.clone(),
                current_quantity: l.holding.quantity,
                new_quantity,
                quantity_diff: to_diff(new_quantity, l.holding.quantity),
                current_value: l.current_value,
                new_value,
                current_weight: l.current_weight,
                new_weight: percent(new_value, total_available),
                target_weight: l.target,
                price: l.price,
            }
        })
        .collect();

    let (max_weight_diff, total_weight_diff) = summarize(trades.iter().map(Trade::weight_diff));

    // Sells fund buys before any shortfall is reported.
    let (mut total_buy_value, mut total_sell_value) = (0.0, 0.0);
    for (trade, line) in trades.iter().zip(lines) {
        let value = trade.quantity_diff.unsigned_abs() as f64 * line.price_base;
        if trade.quantity_diff > 0 {
            total_buy_value += value;
        } else if trade.quantity_diff < 0 {
            total_sell_value += value;
        }
    }
    let available_cash = cash + total_sell_value;

    RebalanceScenario {
        kind: ScenarioKind::Adjustment,
        trades,
        total_asset_value: to_quote(total, fx),
        total_asset_value_base: total,
        additional_cash,
        total_available,
        total_buy_value,
        total_sell_value,
        available_cash,
        additional_cash_needed: (total_buy_value - available_cash).max(0.0),
        remaining_cash: (available_cash - total_buy_value).max(0.0),
        max_weight_diff,
        total_weight_diff,
        needs_rebalancing: true,
    }
}

/// Whole shares affordable with `value`; 0 when the price is unknown.
#[inline]
fn floor_shares(value: f64, price_base: f64) -> Quantity {
    if price_base > 0.0 && value > 0.0 {
        // Saturating cast: huge ratios clamp to u64::MAX, NaN to 0
        (value / price_base).floor() as Quantity
    } else {
        0
    }
}

/// `part / whole` in percent, 0 for a zero (or broken) denominator.
#[inline]
fn percent(part: f64, whole: f64) -> f64 {
    if whole > 0.0 && whole.is_finite() {
        part / whole * 100.0
    } else {
        0.0
    }
}

#[inline]
fn to_quote(base: f64, fx: f64) -> f64 {
    if fx > 0.0 { base / fx } else { 0.0 }
}

#[inline]
fn to_diff(new: Quantity, current: Quantity) -> i64 {
    (new as i128 - current as i128).clamp(i64::MIN as i128, i64::MAX as i128) as i64
}

/// Non-finite and negative inputs become 0.
#[inline]
fn sanitize(x: f64) -> f64 {
    if x.is_finite() && x > 0.0 { x } else { 0.0 }
}

/// (max, sum) of a set of deviations; (0, 0) when empty.
fn summarize(diffs: impl Iterator<Item = f64>) -> (f64, f64) {
    diffs.fold((0.0_f64, 0.0_f64), |(max, sum), d| (max.max(d), sum + d))
}
