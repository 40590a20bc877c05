//! Financial Modeling Prep HTTP client.
//!
//! Implements the scanner's provider traits: daily price history, S&P 500
//! and penny-stock universes, analyst grades, and batch quotes. Every request
//! passes a sliding-window rate limiter and a bounded-retry policy; a symbol
//! whose retries are exhausted surfaces as `Unavailable`, which the
//! orchestrator treats as a per-symbol skip.

pub mod retry;

pub use retry::RetryPolicy;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use reqwest::Client;
use scanner_core::{
    GradeChange, PriceBar, QuoteSnapshot, RatingsProvider, QuoteProvider, ScanError,
    SeriesProvider, SymbolSeries, UniverseSource,
};
use serde::Deserialize;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

const DEFAULT_BASE_URL: &str = "https://financialmodelingprep.com";
/// FMP returns full history; 300 trailing bars cover the longest lookback
/// (252-day HV rank) with margin.
const DEFAULT_BAR_LIMIT: usize = 300;
/// Batch size for the quote endpoint.
const QUOTE_CHUNK: usize = 50;

/// Sliding-window rate limiter: at most `max_requests` per `window`.
#[derive(Clone)]
struct RateLimiter {
    timestamps: Arc<Mutex<VecDeque<Instant>>>,
    max_requests: usize,
    window: Duration,
}

impl RateLimiter {
    fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            timestamps: Arc::new(Mutex::new(VecDeque::new())),
            max_requests,
            window,
        }
    }

    async fn acquire(&self) {
        loop {
            let mut ts = self.timestamps.lock().await;
            let now = Instant::now();

            while let Some(&front) = ts.front() {
                if now.duration_since(front) >= self.window {
                    ts.pop_front();
                } else {
                    break;
                }
            }

            if ts.len() < self.max_requests {
                ts.push_back(now);
                return;
            }

            let wait_until = ts.front().unwrap().checked_add(self.window).unwrap();
            let sleep_dur = wait_until.duration_since(now) + Duration::from_millis(50);
            drop(ts);
            tracing::debug!(
                "Rate limiter: waiting {:.1}s for FMP API slot",
                sleep_dur.as_secs_f64()
            );
            tokio::time::sleep(sleep_dur).await;
        }
    }
}

#[derive(Clone)]
pub struct FmpClient {
    api_key: String,
    client: Client,
    base_url: String,
    rate_limiter: RateLimiter,
    retry: RetryPolicy,
}

impl FmpClient {
    pub fn new(api_key: String) -> Self {
        let rate_limit: usize = std::env::var("FMP_RATE_LIMIT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(300);

        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            api_key,
            client,
            base_url: DEFAULT_BASE_URL.to_string(),
            rate_limiter: RateLimiter::new(rate_limit, Duration::from_secs(60)),
            retry: RetryPolicy::default(),
        }
    }

    /// Point the client at a different host (test servers).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Send a request through the rate limiter with bounded retries on
    /// rate-limit, server-error, and timeout responses.
    async fn send_request(
        &self,
        builder: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, ScanError> {
        let request = builder
            .build()
            .map_err(|e| ScanError::Api(e.to_string()))?;

        let mut last_error = String::new();
        for attempt in 0..self.retry.max_attempts {
            self.rate_limiter.acquire().await;
            let req_clone = request
                .try_clone()
                .ok_or_else(|| ScanError::Api("cannot clone request".to_string()))?;

            match self.client.execute(req_clone).await {
                Ok(response) => {
                    let status = response.status();
                    if status.as_u16() != 429 && !status.is_server_error() {
                        return Ok(response);
                    }
                    let server_hint = response
                        .headers()
                        .get(reqwest::header::RETRY_AFTER)
                        .and_then(|v| v.to_str().ok())
                        .and_then(|v| v.parse::<u64>().ok())
                        .map(Duration::from_secs);
                    let delay = self.retry.delay_for(attempt, server_hint);
                    last_error = format!("HTTP {}", status);
                    tracing::warn!(
                        "FMP {} on attempt {}/{}, backing off {:.1}s",
                        status,
                        attempt + 1,
                        self.retry.max_attempts,
                        delay.as_secs_f64()
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) if e.is_timeout() || e.is_connect() => {
                    let delay = self.retry.delay_for(attempt, None);
                    last_error = e.to_string();
                    tracing::warn!(
                        "FMP transport error on attempt {}/{}: {}, backing off {:.1}s",
                        attempt + 1,
                        self.retry.max_attempts,
                        e,
                        delay.as_secs_f64()
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(ScanError::Api(e.to_string())),
            }
        }

        Err(ScanError::Api(format!(
            "retry budget exhausted after {} attempts: {}",
            self.retry.max_attempts, last_error
        )))
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, ScanError> {
        let url = format!("{}{}", self.base_url, path);
        let mut builder = self.client.get(&url).query(query);
        builder = builder.query(&[("apikey", self.api_key.as_str())]);

        let response = self.send_request(builder).await?;
        if !response.status().is_success() {
            return Err(ScanError::Api(format!(
                "HTTP {}: {}",
                response.status(),
                response.text().await.unwrap_or_default()
            )));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| ScanError::Malformed(e.to_string()))
    }

    /// Daily price history for a symbol, oldest bar first, truncated to the
    /// trailing `limit` bars.
    pub async fn historical_prices(
        &self,
        symbol: &str,
        limit: usize,
    ) -> Result<Vec<PriceBar>, ScanError> {
        let path = format!("/api/v3/historical-price-full/{}", symbol);
        let response: HistoricalResponse = self.get_json(&path, &[]).await?;
        normalize_bars(symbol, response, limit)
    }

    /// Current S&P 500 membership.
    pub async fn sp500_constituents(&self) -> Result<Vec<String>, ScanError> {
        let entries: Vec<ConstituentEntry> = self
            .get_json("/api/v3/sp500_constituent", &[])
            .await
            .map_err(|e| ScanError::UniverseUnavailable(e.to_string()))?;
        if entries.is_empty() {
            return Err(ScanError::UniverseUnavailable(
                "empty S&P 500 constituent list".to_string(),
            ));
        }
        Ok(entries.into_iter().map(|e| e.symbol).collect())
    }

    /// NASDAQ/NYSE-listed names under $5 with at least $10M market cap,
    /// foreign-suffix tickers excluded.
    pub async fn penny_stock_universe(&self) -> Result<Vec<String>, ScanError> {
        let entries: Vec<ScreenerEntry> = self
            .get_json(
                "/api/v3/stock-screener",
                &[
                    ("marketCapMoreThan", "10000000"),
                    ("priceLowerThan", "5"),
                    ("limit", "1000"),
                ],
            )
            .await
            .map_err(|e| ScanError::UniverseUnavailable(e.to_string()))?;
        Ok(filter_screener_symbols(entries))
    }

    /// Analyst grade revisions for one symbol, newest first.
    pub async fn grades(&self, symbol: &str) -> Result<Vec<GradeChange>, ScanError> {
        let entries: Vec<GradeEntry> = self
            .get_json("/stable/grades", &[("symbol", symbol)])
            .await?;
        let fetch_date = Utc::now().date_naive();
        entries
            .into_iter()
            .map(|e| {
                let date = NaiveDate::parse_from_str(&e.date, "%Y-%m-%d")
                    .map_err(|err| ScanError::Malformed(format!("grade date {}: {}", e.date, err)))?;
                Ok(GradeChange {
                    symbol: e.symbol.unwrap_or_else(|| symbol.to_string()),
                    date,
                    grading_company: e.grading_company,
                    previous_grade: e.previous_grade,
                    new_grade: e.new_grade,
                    action: e.action.to_lowercase(),
                    fetch_date,
                })
            })
            .collect()
    }

    /// Snapshot quotes for a batch of symbols (chunked requests).
    pub async fn batch_quotes(&self, symbols: &[String]) -> Result<Vec<QuoteSnapshot>, ScanError> {
        let mut quotes = Vec::with_capacity(symbols.len());
        for chunk in symbols.chunks(QUOTE_CHUNK) {
            let path = format!("/api/v3/quote/{}", chunk.join(","));
            let entries: Vec<QuoteEntry> = self.get_json(&path, &[]).await?;
            quotes.extend(entries.into_iter().map(|e| QuoteSnapshot {
                symbol: e.symbol,
                price: e.price,
                change: e.change.unwrap_or(0.0),
                change_percent: e.changes_percentage.unwrap_or(0.0),
            }));
        }
        Ok(quotes)
    }
}

/// Sort the payload oldest-first and keep the trailing window. An empty or
/// missing history is `Unavailable`, never an empty series.
fn normalize_bars(
    symbol: &str,
    response: HistoricalResponse,
    limit: usize,
) -> Result<Vec<PriceBar>, ScanError> {
    let raw = match response.historical {
        Some(bars) if !bars.is_empty() => bars,
        _ => {
            return Err(ScanError::Unavailable {
                symbol: symbol.to_string(),
                reason: "no historical data".to_string(),
            })
        }
    };

    let mut bars = raw
        .into_iter()
        .map(|b| {
            let date = NaiveDate::parse_from_str(&b.date, "%Y-%m-%d")
                .map_err(|e| ScanError::Malformed(format!("bar date {}: {}", b.date, e)))?;
            Ok(PriceBar {
                date,
                open: b.open,
                high: b.high,
                low: b.low,
                close: b.close,
                volume: b.volume.max(0.0) as u64,
            })
        })
        .collect::<Result<Vec<_>, ScanError>>()?;

    bars.sort_by_key(|b| b.date);
    let start = bars.len().saturating_sub(limit);
    Ok(bars.split_off(start))
}

/// Keep NASDAQ/NYSE symbols without foreign suffixes.
fn filter_screener_symbols(entries: Vec<ScreenerEntry>) -> Vec<String> {
    entries
        .into_iter()
        .filter(|e| {
            matches!(e.exchange.as_deref(), Some("NASDAQ") | Some("NYSE"))
                && !e.symbol.contains('.')
                && !e.symbol.contains('-')
        })
        .map(|e| e.symbol)
        .collect()
}

#[async_trait]
impl SeriesProvider for FmpClient {
    /// HTTP failures, exhausted retries, and malformed payloads all surface
    /// as `Unavailable` for the symbol, which the orchestrator skips.
    async fn fetch(&self, symbol: &str, min_bars: usize) -> Result<SymbolSeries, ScanError> {
        let limit = min_bars.max(DEFAULT_BAR_LIMIT);
        let bars = self
            .historical_prices(symbol, limit)
            .await
            .map_err(|e| match e {
                ScanError::Api(reason) | ScanError::Malformed(reason) => ScanError::Unavailable {
                    symbol: symbol.to_string(),
                    reason,
                },
                other => other,
            })?;
        SymbolSeries::new(symbol, bars)
    }
}

#[async_trait]
impl RatingsProvider for FmpClient {
    async fn grades(&self, symbol: &str) -> Result<Vec<GradeChange>, ScanError> {
        FmpClient::grades(self, symbol).await
    }
}

#[async_trait]
impl QuoteProvider for FmpClient {
    async fn quotes(&self, symbols: &[String]) -> Result<Vec<QuoteSnapshot>, ScanError> {
        self.batch_quotes(symbols).await
    }
}

/// S&P 500 membership as a scan universe.
pub struct Sp500Universe(pub Arc<FmpClient>);

#[async_trait]
impl UniverseSource for Sp500Universe {
    async fn symbols(&self) -> Result<Vec<String>, ScanError> {
        self.0.sp500_constituents().await
    }
}

/// Penny-stock screener output as a scan universe.
pub struct PennyStockUniverse(pub Arc<FmpClient>);

#[async_trait]
impl UniverseSource for PennyStockUniverse {
    async fn symbols(&self) -> Result<Vec<String>, ScanError> {
        self.0.penny_stock_universe().await
    }
}

// Response structures

#[derive(Debug, Deserialize)]
struct HistoricalResponse {
    #[serde(default)]
    historical: Option<Vec<HistoricalBar>>,
}

#[derive(Debug, Deserialize)]
struct HistoricalBar {
    date: String,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    #[serde(default)]
    volume: f64,
}

#[derive(Debug, Deserialize)]
struct ConstituentEntry {
    symbol: String,
}

#[derive(Debug, Deserialize)]
struct ScreenerEntry {
    symbol: String,
    #[serde(default)]
    exchange: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GradeEntry {
    #[serde(default)]
    symbol: Option<String>,
    date: String,
    #[serde(rename = "gradingCompany")]
    grading_company: String,
    #[serde(rename = "previousGrade", default)]
    previous_grade: Option<String>,
    #[serde(rename = "newGrade", default)]
    new_grade: Option<String>,
    action: String,
}

#[derive(Debug, Deserialize)]
struct QuoteEntry {
    symbol: String,
    price: f64,
    #[serde(default)]
    change: Option<f64>,
    #[serde(rename = "changesPercentage", default)]
    changes_percentage: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_bars_sorts_oldest_first_and_truncates() {
        let payload = r#"{
            "symbol": "AAPL",
            "historical": [
                {"date": "2025-03-05", "open": 3.0, "high": 3.1, "low": 2.9, "close": 3.0, "volume": 300},
                {"date": "2025-03-04", "open": 2.0, "high": 2.1, "low": 1.9, "close": 2.0, "volume": 200},
                {"date": "2025-03-03", "open": 1.0, "high": 1.1, "low": 0.9, "close": 1.0, "volume": 100}
            ]
        }"#;
        let response: HistoricalResponse = serde_json::from_str(payload).unwrap();

        let bars = normalize_bars("AAPL", response, 2).unwrap();
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].date.to_string(), "2025-03-04");
        assert_eq!(bars[1].date.to_string(), "2025-03-05");
        assert_eq!(bars[1].volume, 300);
    }

    #[test]
    fn empty_history_is_unavailable_not_empty_series() {
        let response: HistoricalResponse =
            serde_json::from_str(r#"{"symbol": "XXXX", "historical": []}"#).unwrap();
        let err = normalize_bars("XXXX", response, 10).unwrap_err();
        assert!(matches!(err, ScanError::Unavailable { .. }));

        let response: HistoricalResponse = serde_json::from_str(r#"{}"#).unwrap();
        let err = normalize_bars("XXXX", response, 10).unwrap_err();
        assert!(matches!(err, ScanError::Unavailable { .. }));
    }

    #[test]
    fn screener_filter_keeps_clean_us_listings() {
        let entries = vec![
            ScreenerEntry {
                symbol: "ABCD".to_string(),
                exchange: Some("NASDAQ".to_string()),
            },
            ScreenerEntry {
                symbol: "EF.G".to_string(),
                exchange: Some("NYSE".to_string()),
            },
            ScreenerEntry {
                symbol: "HI-J".to_string(),
                exchange: Some("NYSE".to_string()),
            },
            ScreenerEntry {
                symbol: "KLMN".to_string(),
                exchange: Some("LSE".to_string()),
            },
            ScreenerEntry {
                symbol: "OPQR".to_string(),
                exchange: None,
            },
        ];

        assert_eq!(filter_screener_symbols(entries), vec!["ABCD".to_string()]);
    }

    #[test]
    fn grade_entries_parse_camel_case_payload() {
        let payload = r#"[
            {"symbol": "NVDA", "date": "2025-08-28", "gradingCompany": "Morgan Stanley",
             "previousGrade": "Equal-Weight", "newGrade": "Overweight", "action": "Upgrade"}
        ]"#;
        let entries: Vec<GradeEntry> = serde_json::from_str(payload).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].grading_company, "Morgan Stanley");
        assert_eq!(entries[0].new_grade.as_deref(), Some("Overweight"));
    }
}
