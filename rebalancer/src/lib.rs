//! etfbalance-rebalancer: terminal front end for the etfbalance engine.
//!
//! Keeps holdings, cash and the additional-cash policy in a JSON settings
//! file, fetches prices and the FX rate from Yahoo Finance (or a snapshot
//! file), and prints the buy/sell plan with an audit trail.

pub mod audit;
pub mod config;
pub mod error;
pub mod feed;
pub mod plan;
pub mod settings;
