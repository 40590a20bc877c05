use async_trait::async_trait;

use crate::{GradeChange, QuoteSnapshot, ScanError, ScanReport, SymbolSeries};

/// Source of ordered price history for one symbol.
///
/// Implementations must yield bars oldest-to-newest and signal
/// `ScanError::Unavailable` on HTTP errors, malformed payloads, or empty
/// history — never an empty series standing in for "no data".
#[async_trait]
pub trait SeriesProvider: Send + Sync {
    async fn fetch(&self, symbol: &str, min_bars: usize) -> Result<SymbolSeries, ScanError>;
}

/// Source of analyst grade revisions for one symbol, newest first.
#[async_trait]
pub trait RatingsProvider: Send + Sync {
    async fn grades(&self, symbol: &str) -> Result<Vec<GradeChange>, ScanError>;
}

/// Source of snapshot quotes for a batch of symbols.
#[async_trait]
pub trait QuoteProvider: Send + Sync {
    async fn quotes(&self, symbols: &[String]) -> Result<Vec<QuoteSnapshot>, ScanError>;
}

/// Source of the symbol universe for a scan. Failure here is scan-fatal.
#[async_trait]
pub trait UniverseSource: Send + Sync {
    async fn symbols(&self) -> Result<Vec<String>, ScanError>;
}

/// Downstream consumer of a finished scan: persistence or notification.
/// Delivery is best-effort; a sink failure never invalidates the scan.
#[async_trait]
pub trait ResultSink: Send + Sync {
    async fn publish(&self, report: &ScanReport) -> Result<(), ScanError>;
    fn name(&self) -> &str;
}
