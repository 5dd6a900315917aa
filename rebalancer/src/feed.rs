//! Market data sources: last prices per ticker and the quote→base FX rate.
//!
//! Two implementations sit behind [`QuoteSource`]:
//!
//! - [`YahooFeed`]: blocking HTTP against the Yahoo Finance chart endpoint
//! - [`SnapshotFeed`]: a JSON file of prices and a rate (offline use, tests)

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use etfbalance::{PriceBook, PriceQuote, Ticker};
use log::{debug, warn};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};

use crate::config::{Config, CurrencyConfig, Provider};
use crate::error::Result;

/// Errors that can occur while fetching market data.
#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("HTTP {status} from {url}")]
    Http { status: u16, url: String },

    #[error("unexpected response: {0}")]
    Parse(String),

    #[error("no quote for {0}")]
    NotFound(String),

    #[error("snapshot error: {0}")]
    Snapshot(String),
}

pub type FeedResult<T> = std::result::Result<T, FeedError>;

/// Minimal market-data API needed by the rebalancer.
pub trait QuoteSource {
    /// Last prices for `tickers`. Tickers without a quote are left out of the book.
    fn quotes(&self, tickers: &[Ticker]) -> FeedResult<PriceBook>;

    /// Units of `base` per one unit of `quote` (e.g. KRW per USD).
    fn fx_rate(&self, quote: &str, base: &str) -> FeedResult<f64>;

    /// Human-readable name for logs and status output.
    fn name(&self) -> &str;
}

/// Build the source selected by `[feed] provider`.
pub fn connect(config: &Config) -> Result<Box<dyn QuoteSource>> {
    match config.feed.provider {
        Provider::Yahoo => {
            let feed = YahooFeed::new(
                &config.feed.base_url,
                Duration::from_secs(config.feed.timeout_secs),
            )?;
            Ok(Box::new(feed))
        }
        Provider::Snapshot => {
            let feed = SnapshotFeed::load(Path::new(&config.feed.snapshot))?;
            Ok(Box::new(feed))
        }
    }
}

/// FX rate chosen for a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FxRate {
    /// `QUOTE/BASE`, e.g. `USD/KRW`.
    pub pair: String,
    pub rate: f64,
    /// True when the configured fallback was used instead of a live rate.
    pub fallback: bool,
}

/// Fetch the FX rate, falling back to the configured rate on failure or a non-positive value.
pub fn resolve_rate(source: &dyn QuoteSource, currency: &CurrencyConfig) -> FxRate {
    let pair = format!("{}/{}", currency.quote, currency.base);
    let live = match source.fx_rate(&currency.quote, &currency.base) {
        Ok(rate) if rate.is_finite() && rate > 0.0 => Some(rate),
        Ok(rate) => {
            warn!("{} returned unusable {pair} rate {rate}", source.name());
            None
        }
        Err(e) => {
            warn!("{pair} lookup failed: {e}");
            None
        }
    };

    match live {
        Some(rate) => FxRate {
            pair,
            rate,
            fallback: false,
        },
        None => {
            warn!("using fallback {pair} rate {}", currency.fallback_rate);
            FxRate {
                pair,
                rate: currency.fallback_rate,
                fallback: true,
            }
        }
    }
}

// ============================================================================
// Yahoo Finance
// ============================================================================

/// Blocking Yahoo Finance chart client.
pub struct YahooFeed {
    client: Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: Chart,
}

#[derive(Debug, Deserialize)]
struct Chart {
    #[serde(default)]
    result: Option<Vec<ChartResult>>,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    meta: ChartMeta,
}

/// The part of a chart response the rebalancer reads.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartMeta {
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub regular_market_price: Option<f64>,
    /// Epoch seconds of the last trade.
    #[serde(default)]
    pub regular_market_time: Option<i64>,
}

/// Extract the meta block of the first chart result.
pub fn parse_chart(body: &str) -> FeedResult<ChartMeta> {
    let resp: ChartResponse =
        serde_json::from_str(body).map_err(|e| FeedError::Parse(e.to_string()))?;
    resp.chart
        .result
        .and_then(|mut r| if r.is_empty() { None } else { Some(r.swap_remove(0)) })
        .map(|r| r.meta)
        .ok_or_else(|| FeedError::Parse("chart has no result".into()))
}

impl ChartMeta {
    /// Convert to a quote, if the response carries a usable price.
    pub fn to_quote(&self) -> Option<PriceQuote> {
        let price = self.regular_market_price.filter(|p| p.is_finite() && *p > 0.0)?;
        let as_of = self
            .regular_market_time
            .and_then(|t| Utc.timestamp_opt(t, 0).single())
            .unwrap_or_else(Utc::now);
        let currency = self.currency.clone().unwrap_or_else(|| "USD".into());
        Some(PriceQuote::new(price, currency, as_of))
    }
}

impl YahooFeed {
    /// Create a client against `base_url` (no trailing slash needed).
    pub fn new(base_url: &str, timeout: Duration) -> FeedResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("etfbalance-rebalancer/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FeedError::Connection(format!("client setup failed: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn chart_url(&self, symbol: &str) -> String {
        format!(
            "{}/v8/finance/chart/{symbol}?interval=1d&range=1d",
            self.base_url
        )
    }

    /// GET the chart for one symbol.
    fn chart(&self, symbol: &str) -> FeedResult<ChartMeta> {
        let url = self.chart_url(symbol);
        debug!("GET {url}");
        let resp = self
            .client
            .get(&url)
            .send()
            .map_err(|e| FeedError::Connection(format!("{symbol}: {e}")))?;

        if !resp.status().is_success() {
            return Err(FeedError::Http {
                status: resp.status().as_u16(),
                url,
            });
        }

        let body = resp
            .text()
            .map_err(|e| FeedError::Connection(format!("{symbol}: {e}")))?;
        parse_chart(&body)
    }
}

impl QuoteSource for YahooFeed {
    fn quotes(&self, tickers: &[Ticker]) -> FeedResult<PriceBook> {
        let mut book = PriceBook::default();
        let mut last_connection_error = None;

        for ticker in tickers {
            match self.chart(ticker.as_str()) {
                Ok(meta) => match meta.to_quote() {
                    Some(quote) => {
                        book.insert(ticker.clone(), quote);
                    }
                    None => warn!("no price in chart response for {ticker}"),
                },
                Err(e @ FeedError::Connection(_)) => {
                    warn!("failed to fetch {ticker}: {e}");
                    last_connection_error = Some(e);
                }
                Err(e) => warn!("failed to fetch {ticker}: {e}"),
            }
        }

        // Nothing came back and the network is the reason: surface it.
        if book.is_empty() {
            if let Some(e) = last_connection_error {
                return Err(e);
            }
        }
        log_missing(&book, tickers);
        Ok(book)
    }

    fn fx_rate(&self, quote: &str, base: &str) -> FeedResult<f64> {
        let pair = format!("{quote}{base}=X");
        self.chart(&pair)?
            .regular_market_price
            .filter(|r| r.is_finite() && *r > 0.0)
            .ok_or(FeedError::NotFound(pair))
    }

    fn name(&self) -> &str {
        "yahoo"
    }
}

// ============================================================================
// Snapshot file
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
struct Snapshot {
    #[serde(default)]
    rate: f64,
    #[serde(default)]
    prices: BTreeMap<String, SnapshotQuote>,
}

#[derive(Debug, Clone, Deserialize)]
struct SnapshotQuote {
    price: f64,
    #[serde(default = "default_currency")]
    currency: String,
    #[serde(default)]
    as_of: Option<DateTime<Utc>>,
}

fn default_currency() -> String {
    "USD".into()
}

/// Prices and one FX rate read from a JSON file.
///
/// ```json
/// { "rate": 1300.0, "prices": { "SCHD": { "price": 80.0, "currency": "USD" } } }
/// ```
#[derive(Debug, Clone)]
pub struct SnapshotFeed {
    rate: f64,
    book: PriceBook,
}

impl SnapshotFeed {
    pub fn load(path: &Path) -> FeedResult<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| FeedError::Snapshot(format!("{}: {e}", path.display())))?;
        Self::from_json(&contents)
    }

    pub fn from_json(json: &str) -> FeedResult<Self> {
        let snap: Snapshot =
            serde_json::from_str(json).map_err(|e| FeedError::Snapshot(e.to_string()))?;
        let now = Utc::now();
        let mut book = PriceBook::default();
        for (sym, q) in snap.prices {
            let ticker =
                Ticker::new(&sym).map_err(|e| FeedError::Snapshot(format!("{sym:?}: {e}")))?;
            book.insert(
                ticker,
                PriceQuote::new(q.price, q.currency, q.as_of.unwrap_or(now)),
            );
        }
        Ok(Self {
            rate: snap.rate,
            book,
        })
    }
}

impl QuoteSource for SnapshotFeed {
    fn quotes(&self, tickers: &[Ticker]) -> FeedResult<PriceBook> {
        let book: PriceBook = tickers
            .iter()
            .filter_map(|t| self.book.get(t).map(|q| (t.clone(), q.clone())))
            .collect();
        log_missing(&book, tickers);
        Ok(book)
    }

    fn fx_rate(&self, quote: &str, base: &str) -> FeedResult<f64> {
        if self.rate.is_finite() && self.rate > 0.0 {
            Ok(self.rate)
        } else {
            Err(FeedError::NotFound(format!("{quote}{base}")))
        }
    }

    fn name(&self) -> &str {
        "snapshot"
    }
}

fn log_missing(book: &PriceBook, tickers: &[Ticker]) {
    let missing: Vec<&str> = tickers
        .iter()
        .filter(|t| !book.contains_key(*t))
        .map(Ticker::as_str)
        .collect();
    if !missing.is_empty() {
        warn!("missing prices for tickers: {}", missing.join(", "));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(s: &str) -> Ticker {
        Ticker::new(s).unwrap()
    }

    const CHART: &str = r#"{
        "chart": {
            "result": [{
                "meta": {
                    "currency": "USD",
                    "symbol": "SCHD",
                    "regularMarketPrice": 27.53,
                    "regularMarketTime": 1760731200
                }
            }],
            "error": null
        }
    }"#;

    #[test]
    fn parse_chart_meta() {
        let meta = parse_chart(CHART).unwrap();
        assert_eq!(meta.symbol.as_deref(), Some("SCHD"));
        assert_eq!(meta.regular_market_price, Some(27.53));
        let quote = meta.to_quote().unwrap();
        assert_eq!(quote.price, 27.53);
        assert_eq!(quote.currency, "USD");
        assert_eq!(quote.as_of.timestamp(), 1_760_731_200);
    }

    #[test]
    fn parse_chart_without_result() {
        let body = r#"{"chart":{"result":null,"error":{"code":"Not Found"}}}"#;
        assert!(matches!(parse_chart(body), Err(FeedError::Parse(_))));
        let body = r#"{"chart":{"result":[]}}"#;
        assert!(parse_chart(body).is_err());
    }

    #[test]
    fn parse_chart_garbage() {
        assert!(matches!(parse_chart("<html>"), Err(FeedError::Parse(_))));
    }

    #[test]
    fn meta_without_price_has_no_quote() {
        let meta = ChartMeta {
            symbol: Some("XYZ".into()),
            currency: None,
            regular_market_price: None,
            regular_market_time: None,
        };
        assert!(meta.to_quote().is_none());
        let zero = ChartMeta {
            regular_market_price: Some(0.0),
            ..meta
        };
        assert!(zero.to_quote().is_none());
    }

    #[test]
    fn chart_url_format() {
        let feed = YahooFeed::new("https://example.test/", Duration::from_secs(1)).unwrap();
        assert_eq!(
            feed.chart_url("USDKRW=X"),
            "https://example.test/v8/finance/chart/USDKRW=X?interval=1d&range=1d"
        );
    }

    fn snapshot() -> SnapshotFeed {
        SnapshotFeed::from_json(
            r#"{
                "rate": 1300.0,
                "prices": {
                    "schd": { "price": 80.0 },
                    "QQQ": { "price": 400.0, "currency": "USD", "as_of": "2026-10-16T20:00:00Z" }
                }
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn snapshot_quotes_subset() {
        let feed = snapshot();
        let book = feed.quotes(&[t("SCHD"), t("TQQQ")]).unwrap();
        assert_eq!(book.len(), 1);
        assert_eq!(book[&t("SCHD")].price, 80.0);
        assert_eq!(book[&t("SCHD")].currency, "USD");
    }

    #[test]
    fn snapshot_rate() {
        assert_eq!(snapshot().fx_rate("USD", "KRW").unwrap(), 1300.0);
        let no_rate = SnapshotFeed::from_json(r#"{"prices":{}}"#).unwrap();
        assert!(matches!(no_rate.fx_rate("USD", "KRW"), Err(FeedError::NotFound(_))));
    }

    #[test]
    fn shipped_example_snapshot_loads() {
        let feed = SnapshotFeed::from_json(include_str!("../../quotes.example.json")).unwrap();
        let book = feed.quotes(&[t("SCHD"), t("QQQ"), t("TQQQ")]).unwrap();
        assert_eq!(book.len(), 3);
        assert_eq!(book[&t("QQQ")].as_of.to_rfc3339(), "2026-10-16T20:00:00+00:00");
    }

    #[test]
    fn snapshot_rejects_empty_ticker() {
        assert!(SnapshotFeed::from_json(r#"{"rate":1.0,"prices":{" ":{"price":1.0}}}"#).is_err());
    }

    #[test]
    fn resolve_rate_falls_back() {
        let currency = CurrencyConfig::default();
        let no_rate = SnapshotFeed::from_json(r#"{"prices":{}}"#).unwrap();
        let fx = resolve_rate(&no_rate, &currency);
        assert_eq!(fx.rate, 1300.0);
        assert!(fx.fallback);
        assert_eq!(fx.pair, "USD/KRW");

        let custom = SnapshotFeed::from_json(r#"{"rate":1385.5}"#).unwrap();
        let fx = resolve_rate(&custom, &currency);
        assert_eq!(fx.rate, 1385.5);
        assert!(!fx.fallback);
    }
}
