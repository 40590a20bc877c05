use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::ScanError;

/// OHLCV bar for one trading day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
}

/// Ordered price history for one symbol, oldest bar first.
///
/// The series is never mutated after construction; derived values live in
/// indicator output, keyed back to the same bar positions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolSeries {
    pub symbol: String,
    bars: Vec<PriceBar>,
}

impl SymbolSeries {
    /// Build a series, enforcing strictly increasing dates. Missing trading
    /// days are tolerated; out-of-order or duplicate dates are not.
    pub fn new(symbol: impl Into<String>, bars: Vec<PriceBar>) -> Result<Self, ScanError> {
        let symbol = symbol.into();
        for pair in bars.windows(2) {
            if pair[1].date <= pair[0].date {
                return Err(ScanError::Malformed(format!(
                    "{}: bars out of order at {}",
                    symbol, pair[1].date
                )));
            }
        }
        Ok(Self { symbol, bars })
    }

    pub fn bars(&self) -> &[PriceBar] {
        &self.bars
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn closes(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.close).collect()
    }

    pub fn volumes(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.volume as f64).collect()
    }

    /// Last `n` bars as alert evidence (date, close, volume).
    pub fn evidence(&self, n: usize) -> Vec<EvidenceBar> {
        let start = self.bars.len().saturating_sub(n);
        self.bars[start..]
            .iter()
            .map(|b| EvidenceBar {
                date: b.date,
                close: b.close,
                volume: b.volume,
            })
            .collect()
    }
}

/// Supporting evidence attached to a candidate: the most recent closes and
/// volumes with their dates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceBar {
    pub date: NaiveDate,
    pub close: f64,
    pub volume: u64,
}

/// Which filter chain a scan runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScanPolicy {
    PremiumSelling,
    BreakoutUp,
    BreakoutDown,
    RatingChange,
}

impl ScanPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanPolicy::PremiumSelling => "premium-selling",
            ScanPolicy::BreakoutUp => "breakout-up",
            ScanPolicy::BreakoutDown => "breakout-down",
            ScanPolicy::RatingChange => "rating-change",
        }
    }
}

/// A symbol that passed enough filter stages to be ranked.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateRecord {
    pub symbol: String,
    /// Higher is better. Premium-selling: |drawdown| + iv_percentile / 10.
    /// Breakout policies: satisfied sub-signal count (0-5).
    pub score: f64,
    pub drawdown_pct: Option<f64>,
    pub iv_percentile: Option<f64>,
    /// Set only for soft-pass buckets (e.g. failed the strict IV gate).
    pub rejection_reason: Option<String>,
    /// Human-readable sub-signals that contributed to the score.
    pub breakdown: Vec<String>,
    pub evidence: Vec<EvidenceBar>,
    pub detected_at: DateTime<Utc>,
}

/// One analyst grade revision, as archived and alerted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradeChange {
    pub symbol: String,
    pub date: NaiveDate,
    pub grading_company: String,
    pub previous_grade: Option<String>,
    pub new_grade: Option<String>,
    pub action: String,
    pub fetch_date: NaiveDate,
}

/// Snapshot quote used by the top-movers report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuoteSnapshot {
    pub symbol: String,
    pub price: f64,
    pub change: f64,
    pub change_percent: f64,
}

/// Everything one scan run produced, handed to the sinks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanReport {
    pub policy: ScanPolicy,
    /// Rank-sorted descending by score, truncated to top_n.
    pub candidates: Vec<CandidateRecord>,
    /// Premium-selling only: passed every stage except the strict IV gate.
    pub soft_candidates: Vec<CandidateRecord>,
    pub scanned: usize,
    pub skipped: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(date: &str, close: f64) -> PriceBar {
        PriceBar {
            date: date.parse().unwrap(),
            open: close,
            high: close,
            low: close,
            close,
            volume: 1_000,
        }
    }

    #[test]
    fn series_rejects_out_of_order_dates() {
        let bars = vec![bar("2025-03-04", 10.0), bar("2025-03-03", 11.0)];
        assert!(SymbolSeries::new("TEST", bars).is_err());
    }

    #[test]
    fn series_rejects_duplicate_dates() {
        let bars = vec![bar("2025-03-04", 10.0), bar("2025-03-04", 11.0)];
        assert!(SymbolSeries::new("TEST", bars).is_err());
    }

    #[test]
    fn series_tolerates_gaps() {
        let bars = vec![bar("2025-03-04", 10.0), bar("2025-03-10", 11.0)];
        let series = SymbolSeries::new("TEST", bars).unwrap();
        assert_eq!(series.len(), 2);
    }

    #[test]
    fn evidence_takes_trailing_bars() {
        let bars = vec![
            bar("2025-03-03", 10.0),
            bar("2025-03-04", 11.0),
            bar("2025-03-05", 12.0),
        ];
        let series = SymbolSeries::new("TEST", bars).unwrap();
        let ev = series.evidence(2);
        assert_eq!(ev.len(), 2);
        assert_eq!(ev[0].close, 11.0);
        assert_eq!(ev[1].close, 12.0);
    }
}
