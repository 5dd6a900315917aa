//! Command orchestration: settings → quotes → FX → scenario → output.
//!
//! Every settings edit is saved immediately and recorded in the audit trail.

use etfbalance::{
    AdditionalCash, OutOfRange, PriceBook, Quantity, RebalanceEngine, RebalanceScenario,
    ScenarioKind, Ticker, format_amount, parse_amount_strict, target_weight_sum,
};
use log::{info, warn};
use serde::Serialize;

use crate::audit::{self, AuditLog};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::feed::{self, FxRate, QuoteSource};
use crate::settings::PersistedSettings;

/// Options for a plan run.
pub struct PlanOptions {
    /// Print the plan as JSON instead of tables.
    pub json: bool,
}

/// Everything one plan run produced.
#[derive(Debug, Clone, Serialize)]
pub struct Plan {
    pub fx: FxRate,
    pub threshold_pct: f64,
    /// Tickers the feed returned no usable price for. Valued at 0.
    pub missing_prices: Vec<Ticker>,
    pub scenario: RebalanceScenario,
    pub out_of_range: Vec<OutOfRange>,
}

/// Fetch market data for `settings` and run the engine.
pub fn compute_plan(
    config: &Config,
    settings: &PersistedSettings,
    source: &dyn QuoteSource,
) -> Result<(Plan, PriceBook)> {
    let tickers = settings.tickers();
    let prices = source.quotes(&tickers)?;
    let fx = feed::resolve_rate(source, &config.currency);

    let engine = RebalanceEngine::new(config.engine_config());
    let scenario = engine.compute(
        &settings.holdings,
        &prices,
        settings.cash_balance,
        fx.rate,
        settings.additional_cash,
    );
    info!(
        "{} holdings, kind {:?}, {} orders",
        settings.holdings.len(),
        scenario.kind,
        scenario.orders().count()
    );

    let threshold_pct = engine.threshold();
    let missing_prices = tickers
        .into_iter()
        .filter(|t| etfbalance::price_of(&prices, t) == 0.0)
        .collect();
    let out_of_range = scenario.out_of_range(threshold_pct);

    Ok((
        Plan {
            fx,
            threshold_pct,
            missing_prices,
            scenario,
            out_of_range,
        },
        prices,
    ))
}

/// Compute and print a rebalance plan for the saved portfolio.
pub fn run_plan(config: &Config, opts: &PlanOptions) -> Result<()> {
    let settings_path = config.settings_path();
    let settings = PersistedSettings::load_or_default(&settings_path)?;
    if settings.holdings.is_empty() {
        println!("No holdings saved. Add one with `rebalancer add <TICKER>`.");
        return Ok(());
    }

    let source = feed::connect(config)?;
    let mut audit = AuditLog::open(&config.audit_path())?;
    audit::log_run_started(
        &mut audit,
        &settings_path.display().to_string(),
        source.name(),
    )?;

    let (plan, prices) = compute_plan(config, &settings, source.as_ref())?;
    audit::log_quotes(&mut audit, &settings.tickers(), &prices)?;
    audit::log_fx_rate(&mut audit, &plan.fx.pair, plan.fx.rate, plan.fx.fallback)?;
    audit::log_scenario(&mut audit, &plan.scenario)?;

    if opts.json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
        return Ok(());
    }

    display_plan(&plan, &settings);
    Ok(())
}

fn display_plan(plan: &Plan, settings: &PersistedSettings) {
    println!(
        "FX {}: {:.2}{}",
        plan.fx.pair,
        plan.fx.rate,
        if plan.fx.fallback { " (fallback)" } else { "" }
    );
    println!(
        "Cash: {}   Additional cash: {}",
        format_amount(settings.cash_balance),
        settings.additional_cash
    );
    if !plan.missing_prices.is_empty() {
        let names: Vec<&str> = plan.missing_prices.iter().map(Ticker::as_str).collect();
        println!("No price for: {} (valued at 0)", names.join(", "));
    }
    warn_target_sum(settings);
    println!();

    print!("{}", plan.scenario);

    match plan.scenario.kind {
        ScenarioKind::Hold => println!(
            "\nNo rebalancing needed: every holding is within {}% of target.",
            plan.threshold_pct
        ),
        ScenarioKind::FreshAllocation | ScenarioKind::Adjustment => {
            display_orders(&plan.scenario, plan.fx.rate);
            if !plan.out_of_range.is_empty() {
                println!("\nSTILL OFF TARGET (whole shares):");
                for o in &plan.out_of_range {
                    println!(
                        "  {:8} target {:>6.2}%  after {:>6.2}%  ({:+.2})",
                        o.ticker, o.target_weight, o.final_weight, o.difference
                    );
                }
            }
        }
    }
}

fn display_orders(scenario: &RebalanceScenario, fx_rate: f64) {
    let mut orders = scenario.orders().peekable();
    if orders.peek().is_none() {
        println!("\nNo whole-share trades possible at current prices.");
        return;
    }
    println!("\nORDERS:");
    for (i, t) in orders.enumerate() {
        println!(
            "  {:>3}  {:4} {:8} {:>8} @ {:>10.2} = {:>16}",
            i + 1,
            t.action().to_string(),
            t.ticker,
            t.quantity_diff.unsigned_abs(),
            t.price,
            format_amount(t.trade_value_base(fx_rate)),
        );
    }
}

fn warn_target_sum(settings: &PersistedSettings) {
    let sum = target_weight_sum(&settings.holdings);
    if (sum - 100.0).abs() > 1e-9 {
        println!("Warning: target weights sum to {sum:.2}%, not 100%");
    }
}

/// Print the saved settings.
pub fn show_settings(config: &Config) -> Result<()> {
    let path = config.settings_path();
    let Some(settings) = PersistedSettings::load(&path)? else {
        println!("No settings saved at {}.", path.display());
        return Ok(());
    };

    println!("PORTFOLIO ({}):", path.display());
    println!("  {:8} {:>8} {:>9}", "Ticker", "Qty", "Target%");
    for h in &settings.holdings {
        println!(
            "  {:8} {:>8} {:>8.2}%",
            h.ticker, h.quantity, h.target_weight
        );
    }
    println!(
        "  {:8} {:>8} {:>8.2}%",
        "",
        "",
        target_weight_sum(&settings.holdings)
    );
    println!();
    println!("Cash balance:     {}", format_amount(settings.cash_balance));
    println!("Additional cash:  {}", settings.additional_cash);
    if let Some(ts) = settings.last_updated {
        println!("Last updated:     {}", ts.format("%Y-%m-%d %H:%M:%S UTC"));
    }
    warn_target_sum(&settings);
    Ok(())
}

/// Fetch and print prices for the saved tickers and the FX rate.
pub fn show_quotes(config: &Config) -> Result<()> {
    let settings = PersistedSettings::load_or_default(&config.settings_path())?;
    let source = feed::connect(config)?;
    let tickers = settings.tickers();
    let prices = source.quotes(&tickers)?;

    println!("QUOTES ({}):", source.name());
    for ticker in &tickers {
        match prices.get(ticker) {
            Some(q) => println!(
                "  {:8} {:>10.2} {:3}  {}",
                ticker,
                q.price,
                q.currency,
                q.as_of.format("%Y-%m-%d %H:%M")
            ),
            None => println!("  {ticker:8} {:>10}", "n/a"),
        }
    }

    let fx = feed::resolve_rate(source.as_ref(), &config.currency);
    println!(
        "\nFX {}: {:.2}{}",
        fx.pair,
        fx.rate,
        if fx.fallback { " (fallback)" } else { "" }
    );
    Ok(())
}

/// Check that the configured feed answers.
pub fn check_status(config: &Config) -> Result<()> {
    let source = feed::connect(config)?;
    print!("Feed {}: ", source.name());
    let rate = source.fx_rate(&config.currency.quote, &config.currency.base)?;
    println!("OK");
    println!(
        "{}/{} = {rate:.2}",
        config.currency.quote, config.currency.base
    );
    Ok(())
}

// === Settings edits ===

/// Load, apply `edit`, save, audit. `edit` returns the message to print.
fn edit_settings<F>(config: &Config, command: &str, edit: F) -> Result<()>
where
    F: FnOnce(&mut PersistedSettings) -> Result<String>,
{
    let path = config.settings_path();
    let mut settings = PersistedSettings::load_or_default(&path)?;
    let message = edit(&mut settings)?;
    settings.save(&path)?;

    let mut audit = AuditLog::open(&config.audit_path())?;
    audit::log_settings_saved(&mut audit, command, &settings)?;

    println!("{message}");
    Ok(())
}

pub fn add_holding(
    config: &Config,
    ticker: &str,
    quantity: Quantity,
    target_weight: f64,
) -> Result<()> {
    let ticker = Ticker::new(ticker)?;
    edit_settings(config, "add", |s| {
        s.add_holding(ticker.clone(), quantity, target_weight)?;
        Ok(format!(
            "Added {ticker}: {quantity} shares, target {target_weight}%"
        ))
    })
}

pub fn set_holding(
    config: &Config,
    ticker: &str,
    quantity: Option<Quantity>,
    target_weight: Option<f64>,
) -> Result<()> {
    if quantity.is_none() && target_weight.is_none() {
        return Err(Error::Settings(
            "nothing to change: pass --quantity and/or --target".into(),
        ));
    }
    let ticker = Ticker::new(ticker)?;
    edit_settings(config, "set", |s| {
        let existed = s.upsert_holding(ticker.clone(), quantity, target_weight)?;
        if !existed {
            warn!("{ticker} was not in the portfolio, added it");
        }
        let Some(h) = s.holding(&ticker) else {
            return Err(Error::Settings(format!("{ticker} missing after update")));
        };
        Ok(format!(
            "{ticker}: {} shares, target {}%",
            h.quantity, h.target_weight
        ))
    })
}

pub fn remove_holding(config: &Config, ticker: &str) -> Result<()> {
    let ticker = Ticker::new(ticker)?;
    edit_settings(config, "remove", |s| {
        if s.remove_holding(&ticker) {
            Ok(format!("Removed {ticker}"))
        } else {
            Err(Error::Settings(format!("{ticker} is not in the portfolio")))
        }
    })
}

/// Set the cash balance from user text such as `"1,000,000"`.
pub fn set_cash(config: &Config, raw: &str) -> Result<()> {
    let amount = parse_amount_strict(raw)?;
    edit_settings(config, "cash", |s| {
        s.set_cash(amount)?;
        Ok(format!("Cash balance: {}", format_amount(amount)))
    })
}

pub fn set_additional_cash(config: &Config, policy: AdditionalCash) -> Result<()> {
    edit_settings(config, "extra", |s| {
        s.set_additional_cash(policy)?;
        Ok(format!("Additional cash: {policy}"))
    })
}

/// Delete saved settings, asking first unless `force`.
pub fn reset(config: &Config, force: bool) -> Result<()> {
    let path = config.settings_path();
    if !path.exists() {
        println!("No settings saved at {}.", path.display());
        return Ok(());
    }

    if !force {
        let confirmed = dialoguer::Confirm::new()
            .with_prompt(format!("Delete {}?", path.display()))
            .default(false)
            .interact()
            .map_err(|e| Error::Aborted(format!("confirmation prompt failed: {e}")))?;

        if !confirmed {
            return Err(Error::Aborted("Reset cancelled.".into()));
        }
    }

    PersistedSettings::clear(&path)?;
    let mut audit = AuditLog::open(&config.audit_path())?;
    audit::log_settings_cleared(&mut audit, &path.display().to_string())?;
    println!("Settings cleared.");
    Ok(())
}
