//! Final ranking: stable sort descending by score, truncate to top-N.
//! Ties keep first-seen input order — the tie-break is deliberate, not an
//! accident of the sort routine.

use scanner_core::CandidateRecord;

/// Premium-selling score: drawdown magnitude blended with the IV percentile
/// scaled to a commensurate range, rounded to 2 decimals.
pub fn score_signal(drawdown_pct: f64, iv_percentile: f64) -> f64 {
    ((drawdown_pct.abs() + iv_percentile / 10.0) * 100.0).round() / 100.0
}

/// Rank candidates in place: stable descending sort, then truncate.
pub fn rank_candidates(mut candidates: Vec<CandidateRecord>, top_n: usize) -> Vec<CandidateRecord> {
    candidates.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    candidates.truncate(top_n);
    candidates
}
