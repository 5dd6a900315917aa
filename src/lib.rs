//! # etfbalance
//!
//! A deterministic rebalancing engine for small ETF portfolios.
//!
//! Feed it holdings (each carrying its target weight), a price book in the
//! quote currency, a cash balance and FX rate in the base currency, and an
//! additional-cash policy. It tells you whether the portfolio has drifted
//! past the threshold and, if so, how many whole shares to buy or sell.
//!
//! ## Quick Start
//!
//! ```
//! use chrono::Utc;
//! use etfbalance::{AdditionalCash, Holding, PriceBook, PriceQuote, Ticker, compute_scenario};
//!
//! let sym = |s: &str| Ticker::new(s).unwrap();
//! let holdings = vec![
//!     Holding::new(sym("SCHD"), 10, 80.0),
//!     Holding::new(sym("QQQ"), 5, 15.0),
//!     Holding::new(sym("TQQQ"), 2, 5.0),
//! ];
//!
//! let mut prices = PriceBook::default();
//! for (t, p) in [("SCHD", 80.0), ("QQQ", 400.0), ("TQQQ", 60.0)] {
//!     prices.insert(sym(t), PriceQuote::new(p, "USD", Utc::now()));
//! }
//!
//! // 0 KRW cash, 1300 KRW per USD, no extra money
//! let scenario = compute_scenario(&holdings, &prices, 0.0, 1300.0, AdditionalCash::None);
//!
//! assert!(scenario.needs_rebalancing);
//! assert_eq!(scenario.trades[0].new_quantity, 29); // SCHD
//! assert_eq!(scenario.trades[1].new_quantity, 1);  // QQQ
//! assert_eq!(scenario.trades[2].new_quantity, 2);  // TQQQ
//! ```
//!
//! ## Numeric policy
//!
//! - Share counts are always floored, never rounded: the engine under-buys
//!   rather than overspends.
//! - Missing or non-positive prices value a holding at 0 and allow 0 new shares.
//! - A zero total (or zero FX rate) turns every percentage into 0, never NaN.
//!
//! ## Additional cash
//!
//! | Policy | Injected before sizing |
//! |--------|------------------------|
//! | [`AdditionalCash::None`] | nothing |
//! | [`AdditionalCash::Percent`] | `p`% of total assets |
//! | [`AdditionalCash::Fixed`] | a literal base-currency amount |
//!
//! An empty portfolio with a fixed amount is a *fresh allocation*: the amount
//! is split straight across target weights ([`ScenarioKind::FreshAllocation`]).

pub mod engine;
pub mod error;
pub mod policy;
pub mod scenario;
pub mod types;

pub use engine::{
    DEFAULT_THRESHOLD_PCT, EngineConfig, FreshAllocationDiffs, RebalanceEngine, compute_scenario,
};
pub use error::{ValidationError, parse_amount, parse_amount_strict, validate_holdings};
pub use policy::AdditionalCash;
pub use scenario::{Action, OutOfRange, RebalanceScenario, ScenarioKind, Trade, format_amount};
pub use types::{
    Holding, PriceBook, PriceQuote, Quantity, Ticker, attach_targets, price_of, target_weight_sum,
};
