//! Symmetric breakout scoring: five boolean sub-signals, one point each.
//! The down-variant mirrors every comparison. Symbols scoring at least 2 of 5
//! are retained; the `> 1` boundary decides output cardinality and is exact.

use chrono::Utc;
use indicators::{percent_change, rolling_max, rolling_min, sma};
use scanner_core::{CandidateRecord, SymbolSeries};

/// Polarity of the breakout scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
}

/// Minimum bars before a breakout score is computed at all.
pub const BREAKOUT_MIN_BARS: usize = 10;
/// Candidates are retained iff score exceeds this.
pub const BREAKOUT_RETAIN_ABOVE: u32 = 1;

/// Sub-signal count plus the human-readable breakdown of what fired.
#[derive(Debug, Clone)]
pub struct BreakoutScore {
    pub score: u32,
    pub breakdown: Vec<String>,
}

/// Score one series. Undefined indicator values (short history) simply leave
/// their sub-signal unsatisfied; they are never treated as zero prices.
pub fn breakout_score(closes: &[f64], volumes: &[f64], direction: Direction) -> BreakoutScore {
    let mut score = 0;
    let mut breakdown = Vec::new();
    let Some(&close) = closes.last() else {
        return BreakoutScore { score, breakdown };
    };

    let ma5 = sma(closes, 5).last().copied().flatten();
    let ma10 = sma(closes, 10).last().copied().flatten();
    if let (Some(ma5), Some(ma10)) = (ma5, ma10) {
        let fired = match direction {
            Direction::Up => close > ma5 && close > ma10,
            Direction::Down => close < ma5 && close < ma10,
        };
        if fired {
            score += 1;
            breakdown.push(
                match direction {
                    Direction::Up => "Price above MA5 & MA10",
                    Direction::Down => "Price below MA5 & MA10",
                }
                .to_string(),
            );
        }
    }

    let changes = percent_change(closes);
    if let Some(&last_change) = changes.last().and_then(|c| c.as_ref()) {
        let fired = match direction {
            Direction::Up => last_change > 5.0,
            Direction::Down => last_change < -5.0,
        };
        if fired {
            score += 1;
            breakdown.push(
                match direction {
                    Direction::Up => "Recent price surge >5%",
                    Direction::Down => "Recent price drop >5%",
                }
                .to_string(),
            );
        }
    }
    if changes.len() >= 2 {
        if let Some(prior_change) = changes[changes.len() - 2] {
            let fired = match direction {
                Direction::Up => prior_change > 3.0,
                Direction::Down => prior_change < -3.0,
            };
            if fired {
                score += 1;
                breakdown.push(
                    match direction {
                        Direction::Up => "Previous day surge >3%",
                        Direction::Down => "Previous day drop >3%",
                    }
                    .to_string(),
                );
            }
        }
    }

    let near_extreme = match direction {
        Direction::Up => rolling_max(closes, 20)
            .last()
            .copied()
            .flatten()
            .map(|high| close >= 0.95 * high),
        Direction::Down => rolling_min(closes, 20)
            .last()
            .copied()
            .flatten()
            .map(|low| close <= 1.05 * low),
    };
    if near_extreme == Some(true) {
        score += 1;
        breakdown.push(
            match direction {
                Direction::Up => "Near 20-day high breakout",
                Direction::Down => "Near 20-day low breakout",
            }
            .to_string(),
        );
    }

    if let (Some(&last_vol), Some(vol_ma5)) = (
        volumes.last(),
        sma(volumes, 5).last().copied().flatten(),
    ) {
        if last_vol > 1.5 * vol_ma5 {
            score += 1;
            breakdown.push("Volume surge >1.5x 5-day avg".to_string());
        }
    }

    BreakoutScore { score, breakdown }
}

/// Score a series and keep it only past the acceptance boundary.
pub fn evaluate_breakout(series: &SymbolSeries, direction: Direction) -> Option<CandidateRecord> {
    if series.len() < BREAKOUT_MIN_BARS {
        return None;
    }
    let closes = series.closes();
    let volumes = series.volumes();
    let result = breakout_score(&closes, &volumes, direction);

    tracing::debug!(
        symbol = %series.symbol,
        score = result.score,
        ?direction,
        "breakout score"
    );

    if result.score <= BREAKOUT_RETAIN_ABOVE {
        return None;
    }

    Some(CandidateRecord {
        symbol: series.symbol.clone(),
        score: result.score as f64,
        drawdown_pct: None,
        iv_percentile: None,
        rejection_reason: None,
        breakdown: result.breakdown,
        evidence: series.evidence(5),
        detected_at: Utc::now(),
    })
}
