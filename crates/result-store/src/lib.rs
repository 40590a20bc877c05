//! SQLite archive for scan results and analyst grade revisions.
//!
//! Both tables keep a natural primary key and ingest with INSERT OR IGNORE,
//! so re-running a scan for the same day is idempotent: already-archived rows
//! are counted but not rewritten.

use std::sync::Arc;

use chrono::Utc;
use scanner_core::{GradeChange, ResultSink, ScanError, ScanReport};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;

pub struct ResultStore {
    pool: Arc<SqlitePool>,
}

impl ResultStore {
    /// Open (creating if needed) the archive at `url`, e.g. `sqlite:scan.db?mode=rwc`.
    pub async fn connect(url: &str) -> Result<Self, ScanError> {
        let pool = SqlitePool::connect(url)
            .await
            .map_err(|e| ScanError::Database(e.to_string()))?;
        Self::from_pool(pool).await
    }

    /// Throwaway in-memory archive. A single connection keeps every query on
    /// the same in-memory database.
    pub async fn in_memory() -> Result<Self, ScanError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| ScanError::Database(e.to_string()))?;
        Self::from_pool(pool).await
    }

    async fn from_pool(pool: SqlitePool) -> Result<Self, ScanError> {
        let store = Self {
            pool: Arc::new(pool),
        };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), ScanError> {
        sqlx::query("PRAGMA journal_mode=WAL")
            .execute(self.pool.as_ref())
            .await
            .map_err(|e| ScanError::Database(e.to_string()))?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS candidates (
                symbol TEXT NOT NULL,
                scan_date TEXT NOT NULL,
                policy TEXT NOT NULL,
                score REAL NOT NULL,
                drawdown_pct REAL,
                iv_percentile REAL,
                rejection_reason TEXT,
                breakdown TEXT NOT NULL,
                evidence TEXT NOT NULL,
                detected_at TEXT NOT NULL,
                PRIMARY KEY (symbol, scan_date, policy)
            )",
        )
        .execute(self.pool.as_ref())
        .await
        .map_err(|e| ScanError::Database(e.to_string()))?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS grade_changes (
                symbol TEXT NOT NULL,
                date TEXT NOT NULL,
                grading_company TEXT NOT NULL,
                previous_grade TEXT,
                new_grade TEXT,
                action TEXT NOT NULL,
                fetch_date TEXT NOT NULL,
                PRIMARY KEY (symbol, date, grading_company)
            )",
        )
        .execute(self.pool.as_ref())
        .await
        .map_err(|e| ScanError::Database(e.to_string()))?;

        Ok(())
    }

    /// Archive every candidate (hard and soft buckets) from a scan run.
    /// Returns the number of rows actually inserted.
    pub async fn insert_report(&self, report: &ScanReport) -> Result<u64, ScanError> {
        let scan_date = report.started_at.date_naive().to_string();
        let mut inserted = 0u64;

        for record in report.candidates.iter().chain(&report.soft_candidates) {
            let breakdown = serde_json::to_string(&record.breakdown)
                .map_err(|e| ScanError::Database(e.to_string()))?;
            let evidence = serde_json::to_string(&record.evidence)
                .map_err(|e| ScanError::Database(e.to_string()))?;

            let result = sqlx::query(
                "INSERT OR IGNORE INTO candidates \
                 (symbol, scan_date, policy, score, drawdown_pct, iv_percentile, \
                  rejection_reason, breakdown, evidence, detected_at) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&record.symbol)
            .bind(&scan_date)
            .bind(report.policy.as_str())
            .bind(record.score)
            .bind(record.drawdown_pct)
            .bind(record.iv_percentile)
            .bind(&record.rejection_reason)
            .bind(&breakdown)
            .bind(&evidence)
            .bind(record.detected_at.to_rfc3339())
            .execute(self.pool.as_ref())
            .await
            .map_err(|e| ScanError::Database(e.to_string()))?;

            inserted += result.rows_affected();
        }

        tracing::info!(
            policy = report.policy.as_str(),
            inserted,
            total = report.candidates.len() + report.soft_candidates.len(),
            "archived scan results"
        );
        Ok(inserted)
    }

    /// Archive grade revisions; duplicates from earlier fetches are ignored.
    pub async fn insert_grade_changes(&self, changes: &[GradeChange]) -> Result<u64, ScanError> {
        let mut inserted = 0u64;

        for change in changes {
            let result = sqlx::query(
                "INSERT OR IGNORE INTO grade_changes \
                 (symbol, date, grading_company, previous_grade, new_grade, action, fetch_date) \
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&change.symbol)
            .bind(change.date.to_string())
            .bind(&change.grading_company)
            .bind(&change.previous_grade)
            .bind(&change.new_grade)
            .bind(&change.action)
            .bind(change.fetch_date.to_string())
            .execute(self.pool.as_ref())
            .await
            .map_err(|e| ScanError::Database(e.to_string()))?;

            inserted += result.rows_affected();
        }

        tracing::info!(inserted, total = changes.len(), "archived grade changes");
        Ok(inserted)
    }

    /// Grade revisions fetched today, for the daily alert digest.
    pub async fn grade_changes_fetched_today(&self) -> Result<Vec<GradeChange>, ScanError> {
        let today = Utc::now().date_naive().to_string();
        let rows: Vec<(String, String, String, Option<String>, Option<String>, String, String)> =
            sqlx::query_as(
                "SELECT symbol, date, grading_company, previous_grade, new_grade, action, fetch_date \
                 FROM grade_changes WHERE fetch_date = ? ORDER BY symbol, date DESC",
            )
            .bind(&today)
            .fetch_all(self.pool.as_ref())
            .await
            .map_err(|e| ScanError::Database(e.to_string()))?;

        rows.into_iter()
            .map(|(symbol, date, grading_company, previous_grade, new_grade, action, fetch_date)| {
                Ok(GradeChange {
                    symbol,
                    date: date
                        .parse()
                        .map_err(|e| ScanError::Database(format!("bad date in archive: {e}")))?,
                    grading_company,
                    previous_grade,
                    new_grade,
                    action,
                    fetch_date: fetch_date
                        .parse()
                        .map_err(|e| ScanError::Database(format!("bad date in archive: {e}")))?,
                })
            })
            .collect()
    }
}

#[async_trait::async_trait]
impl ResultSink for ResultStore {
    async fn publish(&self, report: &ScanReport) -> Result<(), ScanError> {
        self.insert_report(report).await?;
        Ok(())
    }

    fn name(&self) -> &str {
        "sqlite-archive"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use scanner_core::{CandidateRecord, ScanPolicy};

    fn candidate(symbol: &str, score: f64) -> CandidateRecord {
        CandidateRecord {
            symbol: symbol.to_string(),
            score,
            drawdown_pct: Some(-4.5),
            iv_percentile: Some(62.0),
            rejection_reason: None,
            breakdown: vec!["down 4.5% over 3 days".to_string()],
            evidence: Vec::new(),
            detected_at: Utc::now(),
        }
    }

    fn report(candidates: Vec<CandidateRecord>) -> ScanReport {
        let now = Utc::now();
        ScanReport {
            policy: ScanPolicy::PremiumSelling,
            candidates,
            soft_candidates: Vec::new(),
            scanned: 10,
            skipped: 0,
            started_at: now,
            finished_at: now,
        }
    }

    fn grade(symbol: &str, company: &str) -> GradeChange {
        GradeChange {
            symbol: symbol.to_string(),
            date: NaiveDate::from_ymd_opt(2026, 8, 28).unwrap(),
            grading_company: company.to_string(),
            previous_grade: Some("Hold".to_string()),
            new_grade: Some("Buy".to_string()),
            action: "upgrade".to_string(),
            fetch_date: Utc::now().date_naive(),
        }
    }

    #[tokio::test]
    async fn reingest_same_day_is_idempotent() {
        let store = ResultStore::in_memory().await.unwrap();
        let report = report(vec![candidate("AAPL", 11.2), candidate("MSFT", 9.8)]);

        assert_eq!(store.insert_report(&report).await.unwrap(), 2);
        assert_eq!(store.insert_report(&report).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn grade_changes_dedupe_on_natural_key() {
        let store = ResultStore::in_memory().await.unwrap();
        let changes = vec![grade("TSLA", "Morgan Stanley"), grade("TSLA", "Barclays")];

        assert_eq!(store.insert_grade_changes(&changes).await.unwrap(), 2);
        assert_eq!(store.insert_grade_changes(&changes).await.unwrap(), 0);

        let today = store.grade_changes_fetched_today().await.unwrap();
        assert_eq!(today.len(), 2);
        assert_eq!(today[0].symbol, "TSLA");
    }
}
