//! CLI entry point for the ETF rebalancing calculator.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};

use etfbalance::{AdditionalCash, Quantity, parse_amount_strict};
use etfbalance_rebalancer::config::Config;
use etfbalance_rebalancer::error::{Error, Result};
use etfbalance_rebalancer::plan::{self, PlanOptions};

#[derive(Parser)]
#[command(name = "rebalancer")]
#[command(about = "ETF rebalancing calculator: target weights → buy/sell plan")]
#[command(version)]
struct Cli {
    /// Path to config.toml
    #[arg(long, default_value = "config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch prices and FX, then print the rebalance plan
    Plan {
        /// Print the plan as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show saved holdings, cash and additional-cash policy
    Show,

    /// Add a holding
    Add {
        ticker: String,

        /// Shares held
        #[arg(long, default_value_t = 0)]
        quantity: Quantity,

        /// Target weight in percent (0-100)
        #[arg(long, default_value_t = 0.0)]
        target: f64,
    },

    /// Change a holding's quantity and/or target weight
    Set {
        ticker: String,

        #[arg(long)]
        quantity: Option<Quantity>,

        #[arg(long)]
        target: Option<f64>,
    },

    /// Remove a holding
    Remove { ticker: String },

    /// Set the cash balance (base currency, commas allowed)
    Cash { amount: String },

    /// Set the additional-cash policy
    Extra {
        #[command(subcommand)]
        policy: ExtraPolicy,
    },

    /// Fetch and print prices and the FX rate
    Quotes,

    /// Check the price feed is reachable
    Status,

    /// Delete saved settings
    Reset {
        /// Skip confirmation prompt
        #[arg(long)]
        force: bool,
    },
}

#[derive(Subcommand)]
enum ExtraPolicy {
    /// No additional cash
    None,
    /// Add a percentage of total asset value
    Percent { percent: f64 },
    /// Add a fixed amount (base currency, commas allowed)
    Fixed { amount: String },
}

impl ExtraPolicy {
    fn into_policy(self) -> Result<AdditionalCash> {
        Ok(match self {
            ExtraPolicy::None => AdditionalCash::None,
            ExtraPolicy::Percent { percent } => AdditionalCash::Percent(percent),
            ExtraPolicy::Fixed { amount } => AdditionalCash::Fixed(parse_amount_strict(&amount)?),
        })
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_secs()
        .init();

    let cli = Cli::parse();

    let config = match Config::load_or_default(&cli.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading config: {e}");
            process::exit(1);
        }
    };

    let result = match cli.command {
        Command::Plan { json } => plan::run_plan(&config, &PlanOptions { json }),
        Command::Show => plan::show_settings(&config),
        Command::Add {
            ticker,
            quantity,
            target,
        } => plan::add_holding(&config, &ticker, quantity, target),
        Command::Set {
            ticker,
            quantity,
            target,
        } => plan::set_holding(&config, &ticker, quantity, target),
        Command::Remove { ticker } => plan::remove_holding(&config, &ticker),
        Command::Cash { amount } => plan::set_cash(&config, &amount),
        Command::Extra { policy } => policy
            .into_policy()
            .and_then(|p| plan::set_additional_cash(&config, p)),
        Command::Quotes => plan::show_quotes(&config),
        Command::Status => plan::check_status(&config),
        Command::Reset { force } => plan::reset(&config, force),
    };

    if let Err(e) = result {
        match &e {
            Error::Aborted(msg) => {
                eprintln!("{msg}");
                process::exit(0);
            }
            _ => {
                eprintln!("Error: {e}");
                process::exit(1);
            }
        }
    }
}
