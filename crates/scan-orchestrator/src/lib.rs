//! Scan orchestration: iterate a symbol universe, run the fetch → indicators
//! → filters → score pipeline per symbol, rank, truncate.
//!
//! A per-symbol failure (fetch exhausted, short history, bad payload) is a
//! SKIP, never a scan abort; only failing to enumerate the universe is fatal.
//! Cancellation is cooperative at the per-symbol loop boundary: the in-flight
//! symbol finishes, the next never starts.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{Datelike, NaiveDate, Utc, Weekday};
use scanner_core::{
    CandidateRecord, GradeChange, QuoteProvider, QuoteSnapshot, RatingsProvider, ScanConfig,
    ScanError, ScanPolicy, ScanReport, SeriesProvider, UniverseSource,
};
use signal_engine::{evaluate_breakout, evaluate_premium_selling, rank_candidates, Direction,
    Evaluation, BREAKOUT_MIN_BARS};

/// Cooperative stop flag shared with whoever asked for the scan.
#[derive(Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Fixed symbol list as a universe.
pub struct StaticUniverse(pub Vec<String>);

#[async_trait::async_trait]
impl UniverseSource for StaticUniverse {
    async fn symbols(&self) -> Result<Vec<String>, ScanError> {
        Ok(self.0.clone())
    }
}

/// Gainers and losers from one pass over the quote universe.
#[derive(Debug, Clone)]
pub struct TopMovers {
    pub gainers: Vec<QuoteSnapshot>,
    pub losers: Vec<QuoteSnapshot>,
}

pub struct ScanOrchestrator {
    provider: Arc<dyn SeriesProvider>,
    config: ScanConfig,
    /// Inter-request pause to respect upstream rate limits.
    pause_between_symbols: Duration,
    cancel: CancelToken,
}

impl ScanOrchestrator {
    pub fn new(provider: Arc<dyn SeriesProvider>, config: ScanConfig) -> Self {
        Self {
            provider,
            config,
            pause_between_symbols: Duration::from_millis(600),
            cancel: CancelToken::new(),
        }
    }

    pub fn with_pause(mut self, pause: Duration) -> Self {
        self.pause_between_symbols = pause;
        self
    }

    /// Handle for requesting a cooperative stop.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    fn required_history(&self, policy: ScanPolicy) -> usize {
        match policy {
            ScanPolicy::PremiumSelling => self.config.min_history,
            ScanPolicy::BreakoutUp | ScanPolicy::BreakoutDown => BREAKOUT_MIN_BARS,
            ScanPolicy::RatingChange => 0,
        }
    }

    /// Run one price-based scan over the universe.
    pub async fn run_scan(
        &self,
        policy: ScanPolicy,
        universe: &dyn UniverseSource,
    ) -> Result<ScanReport, ScanError> {
        let symbols = universe.symbols().await?;
        let started_at = Utc::now();
        let min_bars = self.required_history(policy);

        tracing::info!(
            policy = policy.as_str(),
            symbols = symbols.len(),
            "starting scan"
        );

        let mut candidates = Vec::new();
        let mut soft_candidates = Vec::new();
        let mut scanned = 0usize;
        let mut skipped = 0usize;

        for symbol in &symbols {
            if self.cancel.is_cancelled() {
                tracing::info!("scan cancelled after {} symbols", scanned + skipped);
                break;
            }

            match self.evaluate_symbol(symbol, policy, min_bars).await {
                Ok(SymbolOutcome::Candidate(record)) => {
                    scanned += 1;
                    candidates.push(record);
                }
                Ok(SymbolOutcome::SoftCandidate(record)) => {
                    scanned += 1;
                    soft_candidates.push(record);
                }
                Ok(SymbolOutcome::Rejected) => scanned += 1,
                Err(e) => {
                    skipped += 1;
                    tracing::warn!(symbol = %symbol, "skipping: {}", e);
                }
            }

            tokio::time::sleep(self.pause_between_symbols).await;
        }

        let candidates = rank_candidates(candidates, self.config.top_n);
        let soft_candidates = rank_candidates(soft_candidates, self.config.top_n);

        tracing::info!(
            policy = policy.as_str(),
            scanned,
            skipped,
            candidates = candidates.len(),
            soft = soft_candidates.len(),
            "scan complete"
        );

        Ok(ScanReport {
            policy,
            candidates,
            soft_candidates,
            scanned,
            skipped,
            started_at,
            finished_at: Utc::now(),
        })
    }

    async fn evaluate_symbol(
        &self,
        symbol: &str,
        policy: ScanPolicy,
        min_bars: usize,
    ) -> Result<SymbolOutcome, ScanError> {
        let series = self.provider.fetch(symbol, min_bars).await?;

        if series.len() < min_bars {
            return Err(ScanError::InsufficientHistory {
                symbol: symbol.to_string(),
                have: series.len(),
                need: min_bars,
            });
        }

        Ok(match policy {
            ScanPolicy::PremiumSelling => match evaluate_premium_selling(&series, &self.config) {
                Evaluation::Pass(record) => SymbolOutcome::Candidate(record),
                Evaluation::SoftPass(record) => SymbolOutcome::SoftCandidate(record),
                Evaluation::Reject { stage, reason } => {
                    tracing::debug!(symbol, stage, %reason, "rejected");
                    SymbolOutcome::Rejected
                }
            },
            ScanPolicy::BreakoutUp => match evaluate_breakout(&series, Direction::Up) {
                Some(record) => SymbolOutcome::Candidate(record),
                None => SymbolOutcome::Rejected,
            },
            ScanPolicy::BreakoutDown => match evaluate_breakout(&series, Direction::Down) {
                Some(record) => SymbolOutcome::Candidate(record),
                None => SymbolOutcome::Rejected,
            },
            ScanPolicy::RatingChange => SymbolOutcome::Rejected,
        })
    }

    /// Rating-change scan: symbols whose latest grade action within the last
    /// 3 trading days is an upgrade or downgrade; the most recent `top_n`
    /// grade records per selected symbol are collected.
    pub async fn run_rating_scan(
        &self,
        ratings: &dyn RatingsProvider,
        universe: &dyn UniverseSource,
        records_per_symbol: usize,
    ) -> Result<Vec<GradeChange>, ScanError> {
        let symbols = universe.symbols().await?;
        let valid_dates = recent_trading_days(Utc::now().date_naive(), 3);

        let mut collected = Vec::new();
        for symbol in &symbols {
            if self.cancel.is_cancelled() {
                break;
            }

            let grades = match ratings.grades(symbol).await {
                Ok(grades) => grades,
                Err(e) => {
                    tracing::warn!(symbol = %symbol, "skipping ratings: {}", e);
                    continue;
                }
            };

            let Some(latest) = grades.first() else {
                continue;
            };
            if valid_dates.contains(&latest.date)
                && matches!(latest.action.as_str(), "upgrade" | "downgrade")
            {
                collected.extend(grades.into_iter().take(records_per_symbol));
            }

            tokio::time::sleep(self.pause_between_symbols).await;
        }

        tracing::info!(records = collected.len(), "rating scan complete");
        Ok(collected)
    }

    /// Top gainers and losers across the universe by one-day percent change.
    pub async fn run_top_movers(
        &self,
        quotes: &dyn QuoteProvider,
        universe: &dyn UniverseSource,
        top_n: usize,
    ) -> Result<TopMovers, ScanError> {
        let symbols = universe.symbols().await?;
        let snapshots = quotes.quotes(&symbols).await?;
        Ok(top_movers(snapshots, top_n))
    }
}

enum SymbolOutcome {
    Candidate(CandidateRecord),
    SoftCandidate(CandidateRecord),
    Rejected,
}

/// The most recent `count` weekdays, today included if it is one.
pub fn recent_trading_days(today: NaiveDate, count: usize) -> Vec<NaiveDate> {
    let mut days = Vec::with_capacity(count);
    let mut day = today;
    while days.len() < count {
        if !matches!(day.weekday(), Weekday::Sat | Weekday::Sun) {
            days.push(day);
        }
        day = day.pred_opt().expect("date underflow");
    }
    days
}

/// Split quotes into top-N gainers and top-N losers by percent change.
/// Both sides use a stable sort, so equal moves keep input order.
pub fn top_movers(quotes: Vec<QuoteSnapshot>, top_n: usize) -> TopMovers {
    let mut gainers = quotes.clone();
    gainers.sort_by(|a, b| {
        b.change_percent
            .partial_cmp(&a.change_percent)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    gainers.truncate(top_n);

    let mut losers = quotes;
    losers.sort_by(|a, b| {
        a.change_percent
            .partial_cmp(&b.change_percent)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    losers.truncate(top_n);

    TopMovers { gainers, losers }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scanner_core::{PriceBar, SymbolSeries};
    use std::collections::HashMap;

    struct FakeProvider {
        series: HashMap<String, Vec<f64>>,
        failing: Vec<String>,
    }

    #[async_trait::async_trait]
    impl SeriesProvider for FakeProvider {
        async fn fetch(&self, symbol: &str, _min_bars: usize) -> Result<SymbolSeries, ScanError> {
            if self.failing.iter().any(|s| s == symbol) {
                return Err(ScanError::Unavailable {
                    symbol: symbol.to_string(),
                    reason: "retry budget exhausted".to_string(),
                });
            }
            let closes = self
                .series
                .get(symbol)
                .ok_or_else(|| ScanError::Unavailable {
                    symbol: symbol.to_string(),
                    reason: "unknown symbol".to_string(),
                })?;
            let start = NaiveDate::from_ymd_opt(2024, 6, 3).unwrap();
            let bars = closes
                .iter()
                .enumerate()
                .map(|(i, &c)| PriceBar {
                    date: start + chrono::Duration::days(i as i64),
                    open: c,
                    high: c,
                    low: c,
                    close: c,
                    volume: 1_000_000,
                })
                .collect();
            SymbolSeries::new(symbol, bars)
        }
    }

    /// Grinds up to a fresh 20-day high: breakout-up score 2, retained.
    fn breakout_closes() -> Vec<f64> {
        (0..21).map(|i| 100.0 + 0.1 * i as f64).collect()
    }

    fn orchestrator(provider: FakeProvider) -> ScanOrchestrator {
        ScanOrchestrator::new(Arc::new(provider), ScanConfig::default())
            .with_pause(Duration::ZERO)
    }

    #[tokio::test]
    async fn failed_symbol_is_skipped_not_fatal() {
        let mut series = HashMap::new();
        series.insert("GOOD".to_string(), breakout_closes());
        series.insert("FLAT".to_string(), vec![100.0; 30]);
        let provider = FakeProvider {
            series,
            failing: vec!["BAD".to_string()],
        };
        let orch = orchestrator(provider);
        let universe = StaticUniverse(vec![
            "BAD".to_string(),
            "GOOD".to_string(),
            "FLAT".to_string(),
        ]);

        let report = orch
            .run_scan(ScanPolicy::BreakoutUp, &universe)
            .await
            .unwrap();

        assert_eq!(report.skipped, 1);
        assert_eq!(report.scanned, 2);
        assert_eq!(report.candidates.len(), 1);
        assert_eq!(report.candidates[0].symbol, "GOOD");
    }

    #[tokio::test]
    async fn short_history_is_skipped() {
        let mut series = HashMap::new();
        series.insert("TINY".to_string(), vec![100.0; 5]);
        let provider = FakeProvider {
            series,
            failing: vec![],
        };
        let orch = orchestrator(provider);
        let universe = StaticUniverse(vec!["TINY".to_string()]);

        let report = orch
            .run_scan(ScanPolicy::BreakoutUp, &universe)
            .await
            .unwrap();

        assert_eq!(report.skipped, 1);
        assert!(report.candidates.is_empty());
    }

    #[tokio::test]
    async fn cancellation_stops_before_next_symbol() {
        let mut series = HashMap::new();
        series.insert("GOOD".to_string(), breakout_closes());
        let provider = FakeProvider {
            series,
            failing: vec![],
        };
        let orch = orchestrator(provider);
        orch.cancel_token().cancel();
        let universe = StaticUniverse(vec!["GOOD".to_string()]);

        let report = orch
            .run_scan(ScanPolicy::BreakoutUp, &universe)
            .await
            .unwrap();

        assert_eq!(report.scanned + report.skipped, 0);
        assert!(report.candidates.is_empty());
    }

    #[test]
    fn trading_days_skip_weekends() {
        // Monday 2026-08-24 backwards: Mon, Fri, Thu.
        let monday = NaiveDate::from_ymd_opt(2026, 8, 24).unwrap();
        let days = recent_trading_days(monday, 3);
        assert_eq!(
            days,
            vec![
                NaiveDate::from_ymd_opt(2026, 8, 24).unwrap(),
                NaiveDate::from_ymd_opt(2026, 8, 21).unwrap(),
                NaiveDate::from_ymd_opt(2026, 8, 20).unwrap(),
            ]
        );
    }

    #[test]
    fn top_movers_splits_and_orders() {
        let quote = |symbol: &str, pct: f64| QuoteSnapshot {
            symbol: symbol.to_string(),
            price: 100.0,
            change: pct,
            change_percent: pct,
        };
        let quotes = vec![
            quote("A", 1.0),
            quote("B", -4.0),
            quote("C", 6.0),
            quote("D", -0.5),
        ];

        let movers = top_movers(quotes, 2);
        assert_eq!(movers.gainers[0].symbol, "C");
        assert_eq!(movers.gainers[1].symbol, "A");
        assert_eq!(movers.losers[0].symbol, "B");
        assert_eq!(movers.losers[1].symbol, "D");
    }
}
