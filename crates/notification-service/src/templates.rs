//! Markdown message bodies for Telegram alerts.
//!
//! Tabular messages use backtick-fenced fixed-width rows so columns line up
//! in the chat client's monospace rendering.

use scanner_core::{CandidateRecord, GradeChange, QuoteSnapshot, ScanPolicy, ScanReport};

/// Messages for one finished scan. Premium-selling runs can produce a second
/// message for the soft bucket; an empty hard bucket still sends a
/// "no signals" note so a silent day is distinguishable from a failed one.
pub fn scan_messages(report: &ScanReport) -> Vec<String> {
    match report.policy {
        ScanPolicy::PremiumSelling => premium_messages(report),
        ScanPolicy::BreakoutUp => vec![breakout_message(
            "Top Breakout Candidates (Up)",
            &report.candidates,
        )],
        ScanPolicy::BreakoutDown => vec![breakout_message(
            "Top Breakout Candidates (Down)",
            &report.candidates,
        )],
        ScanPolicy::RatingChange => Vec::new(),
    }
}

fn premium_messages(report: &ScanReport) -> Vec<String> {
    let mut messages = Vec::new();

    if report.candidates.is_empty() {
        messages.push("🚫 No signals passing all filters".to_string());
    } else {
        let mut lines =
            vec!["🔥 *Top Options Selling Candidates (Pass All Filters):* 🔥\n".to_string()];
        for c in &report.candidates {
            lines.push(format!(
                "{}: Drawdown {}%, IV Percentile {}, Score {}",
                c.symbol,
                c.drawdown_pct.unwrap_or(0.0),
                c.iv_percentile.unwrap_or(0.0),
                c.score,
            ));
        }
        messages.push(lines.join("\n"));
    }

    if !report.soft_candidates.is_empty() {
        let mut lines = vec!["⚠️ *Candidates Passing All But Strict IV Filter:* ⚠️\n".to_string()];
        for c in &report.soft_candidates {
            lines.push(format!(
                "{}: Drawdown {}%, IV Percentile {} (Below Strict Threshold), Score {}",
                c.symbol,
                c.drawdown_pct.unwrap_or(0.0),
                c.iv_percentile.unwrap_or(0.0),
                c.score,
            ));
        }
        messages.push(lines.join("\n"));
    }

    messages
}

fn breakout_message(title: &str, candidates: &[CandidateRecord]) -> String {
    if candidates.is_empty() {
        return format!("🚫 No {} today", title.to_lowercase());
    }
    let mut lines = vec![format!("*{title}:*\n")];
    for c in candidates {
        lines.push(format!(
            "{} (score {}): {}",
            c.symbol,
            c.score,
            c.breakdown.join("; "),
        ));
    }
    lines.join("\n")
}

/// Fixed-width digest of today's analyst grade revisions.
pub fn grade_change_table(changes: &[GradeChange]) -> String {
    let header = format!(
        "`{:<6} {:<10} {:<12} {:<6}`",
        "Symbol", "Date", "Company", "Action"
    );
    let rows = changes.iter().map(|c| {
        format!(
            "`{:<6} {:<10} {:<12} {:<6}`",
            c.symbol,
            c.date,
            truncate(&c.grading_company, 12),
            truncate(&c.action, 6),
        )
    });
    let mut lines = vec!["*Today's Stock Grading Updates:*\n".to_string(), header];
    lines.extend(rows);
    lines.join("\n")
}

/// Fixed-width quote table for top gainers or losers.
pub fn movers_table(title: &str, quotes: &[QuoteSnapshot]) -> String {
    let header = format!(
        "`{:<8} {:<10} {:<10} {:<8}`",
        "Symbol", "Price", "Change", "%age"
    );
    let rows = quotes.iter().map(|q| {
        format!(
            "`{:<8} {:<10.2} {:<10.2} {:<8.2}`",
            q.symbol, q.price, q.change, q.change_percent
        )
    });
    let mut lines = vec![format!("*{title}:*\n"), header];
    lines.extend(rows);
    lines.join("\n")
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
