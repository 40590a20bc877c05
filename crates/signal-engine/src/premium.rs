//! Premium-selling filter chain: finds names pulling back on elevated
//! volatility without tipping into a broken trend.
//!
//! Stages run in order and short-circuit on the first rejection. Symbols that
//! clear everything except the strict IV gate are kept in a softer bucket
//! instead of being discarded.

use chrono::Utc;
use indicators::{historical_volatility, hv_percentile, rsi, sma, window_return, HV_WINDOW};
use scanner_core::{CandidateRecord, ScanConfig, SymbolSeries};

use crate::ranking::score_signal;
use crate::StageOutcome;

/// Outcome of the full premium-selling chain for one symbol.
#[derive(Debug, Clone)]
pub enum Evaluation {
    Pass(CandidateRecord),
    /// Passed every stage except the strict IV gate.
    SoftPass(CandidateRecord),
    Reject { stage: &'static str, reason: String },
}

/// The pre-trade gate distinguishes a strict-IV failure from the rest so the
/// caller can bucket it separately.
#[derive(Debug, Clone)]
pub enum GateOutcome {
    Pass,
    Reject(String),
    StrictIvOnly(String),
}

/// Stage 1: closes strictly decreasing over the last 3 bars.
pub fn check_three_day_decline(closes: &[f64]) -> StageOutcome {
    if closes.len() < 3 {
        return StageOutcome::reject("fewer than 3 bars", None);
    }
    let n = closes.len();
    if closes[n - 1] < closes[n - 2] && closes[n - 2] < closes[n - 3] {
        StageOutcome::pass(None)
    } else {
        StageOutcome::reject("no 3-day decline", None)
    }
}

/// Stage 2: 3-bar return inside the configured band. Both bounds are
/// inclusive — a pullback exactly on the edge is still a pullback.
pub fn check_drawdown(closes: &[f64], config: &ScanConfig) -> StageOutcome {
    let Some(dd) = window_return(closes, 3) else {
        return StageOutcome::reject("fewer than 4 bars", None);
    };
    if config.drawdown_min <= dd && dd <= config.drawdown_max {
        StageOutcome::pass(Some(dd))
    } else {
        StageOutcome::reject(
            format!("3-day drawdown {:.2}% outside band", dd),
            Some(dd),
        )
    }
}

/// Stage 3: HV percentile over the soft floor. An undefined percentile
/// (too little volatility history) rejects rather than defaulting.
pub fn check_volatility_floor(ivp: Option<f64>, config: &ScanConfig) -> StageOutcome {
    match ivp {
        None => StageOutcome::reject("IV percentile undefined", None),
        Some(p) if p >= config.min_iv_percentile => StageOutcome::pass(Some(p)),
        Some(p) => StageOutcome::reject(format!("IV percentile too low ({:.1})", p), Some(p)),
    }
}

/// Stage 4, soft veto: a deep 10-bar drop combined with rising volatility
/// marks an accelerating selloff, even when the 3-day window alone looks
/// like an isolated dip.
pub fn check_regime(closes: &[f64], config: &ScanConfig) -> StageOutcome {
    let Some(ret_10d) = window_return(closes, 10) else {
        return StageOutcome::reject("fewer than 11 bars", None);
    };

    let hv = historical_volatility(closes, HV_WINDOW);
    let n = hv.len();
    if n < 15 {
        return StageOutcome::reject("insufficient history for HV trend", None);
    }
    let recent: Vec<f64> = hv[n - 5..].iter().copied().flatten().collect();
    let older: Vec<f64> = hv[n - 15..n - 5].iter().copied().flatten().collect();
    if recent.len() < 5 || older.len() < 10 {
        return StageOutcome::reject("insufficient history for HV trend", None);
    }
    let hv_trend = mean(&recent) - mean(&older);

    tracing::debug!(ret_10d, hv_trend, "regime filter");

    if ret_10d < config.max_10d_drop_for_regime && hv_trend > config.hv_trend_threshold {
        StageOutcome::reject("accelerating selloff", Some(hv_trend))
    } else {
        StageOutcome::pass(Some(hv_trend))
    }
}

/// Stage 5, hard pre-trade gate. Sub-checks are independently named so a
/// rejection is attributable; the strict IV sub-check runs last and is
/// reported separately for the soft bucket.
pub fn check_pre_trade(closes: &[f64], ivp: f64, config: &ScanConfig) -> GateOutcome {
    let close = match closes.last() {
        Some(&c) => c,
        None => return GateOutcome::Reject("empty series".to_string()),
    };

    match sma(closes, config.dma_window).last().copied().flatten() {
        None => {
            return GateOutcome::Reject(format!(
                "insufficient history for {}-bar SMA",
                config.dma_window
            ))
        }
        Some(dma) if close < dma => {
            return GateOutcome::Reject(format!("below {}-bar SMA", config.dma_window))
        }
        Some(_) => {}
    }

    match rsi(closes, 14).last().copied().flatten() {
        None => return GateOutcome::Reject("insufficient history for RSI".to_string()),
        Some(r) if r < config.rsi_min => {
            return GateOutcome::Reject(format!("RSI too low ({:.1})", r))
        }
        Some(_) => {}
    }

    match window_return(closes, 5) {
        None => return GateOutcome::Reject("fewer than 6 bars".to_string()),
        Some(ret_5d) if ret_5d < config.max_5d_drop => {
            return GateOutcome::Reject(format!("5-day drop too large ({:.1}%)", ret_5d))
        }
        Some(_) => {}
    }

    if ivp < config.iv_filter_strict {
        return GateOutcome::StrictIvOnly(format!("IV too low ({:.0})", ivp));
    }

    GateOutcome::Pass
}

/// Run the full chain over one symbol's series.
pub fn evaluate_premium_selling(series: &SymbolSeries, config: &ScanConfig) -> Evaluation {
    let closes = series.closes();

    let decline = check_three_day_decline(&closes);
    if !decline.passed {
        return Evaluation::Reject {
            stage: "three_day_decline",
            reason: decline.reason,
        };
    }

    let drawdown_stage = check_drawdown(&closes, config);
    if !drawdown_stage.passed {
        return Evaluation::Reject {
            stage: "drawdown_bound",
            reason: drawdown_stage.reason,
        };
    }
    let drawdown = drawdown_stage.value.unwrap_or(0.0);

    let ivp_value = hv_percentile(&closes);
    let floor = check_volatility_floor(ivp_value, config);
    if !floor.passed {
        return Evaluation::Reject {
            stage: "volatility_floor",
            reason: floor.reason,
        };
    }
    let ivp = floor.value.unwrap_or(0.0);

    let regime = check_regime(&closes, config);
    if !regime.passed {
        return Evaluation::Reject {
            stage: "regime_filter",
            reason: regime.reason,
        };
    }

    let candidate = |rejection_reason: Option<String>| CandidateRecord {
        symbol: series.symbol.clone(),
        score: score_signal(drawdown, ivp),
        drawdown_pct: Some(round2(drawdown)),
        iv_percentile: Some(round1(ivp)),
        rejection_reason,
        breakdown: vec![
            "3-day decline".to_string(),
            format!("3-day drawdown {:.2}%", drawdown),
            format!("IV percentile {:.1}", ivp),
        ],
        evidence: series.evidence(5),
        detected_at: Utc::now(),
    };

    match check_pre_trade(&closes, ivp, config) {
        GateOutcome::Pass => Evaluation::Pass(candidate(None)),
        GateOutcome::StrictIvOnly(reason) => Evaluation::SoftPass(candidate(Some(reason))),
        GateOutcome::Reject(reason) => Evaluation::Reject {
            stage: "pre_trade_gate",
            reason,
        },
    }
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

fn round1(x: f64) -> f64 {
    (x * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use scanner_core::PriceBar;

    fn series_from_closes(closes: &[f64]) -> SymbolSeries {
        let start = chrono::NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
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
        SymbolSeries::new("TEST", bars).unwrap()
    }

    #[test]
    fn three_day_decline_requires_strict_decrease() {
        assert!(check_three_day_decline(&[10.0, 9.0, 8.0]).passed);
        assert!(!check_three_day_decline(&[10.0, 9.0, 9.0]).passed);
        assert!(!check_three_day_decline(&[8.0, 9.0, 10.0]).passed);
    }

    #[test]
    fn drawdown_band_is_closed_interval() {
        let config = ScanConfig::default();

        // Exactly on drawdown_max (-3%).
        let at_max = [100.0, 99.0, 98.0, 97.0];
        let outcome = check_drawdown(&at_max, &config);
        assert!(outcome.passed);
        assert!((outcome.value.unwrap() - (-3.0)).abs() < 1e-9);

        // Exactly on drawdown_min (-9%).
        let at_min = [100.0, 97.0, 94.0, 91.0];
        let outcome = check_drawdown(&at_min, &config);
        assert!(outcome.passed);
        assert!((outcome.value.unwrap() - (-9.0)).abs() < 1e-9);

        // Just outside either bound.
        assert!(!check_drawdown(&[100.0, 99.5, 99.0, 98.0], &config).passed);
        assert!(!check_drawdown(&[100.0, 97.0, 94.0, 90.0], &config).passed);
    }

    #[test]
    fn volatility_floor_rejects_undefined() {
        let config = ScanConfig::default();
        assert!(!check_volatility_floor(None, &config).passed);
        assert!(!check_volatility_floor(Some(4.9), &config).passed);
        assert!(check_volatility_floor(Some(5.0), &config).passed);
    }

    #[test]
    fn regime_rejects_deep_drop_with_rising_volatility() {
        let config = ScanConfig::default();

        // Flat history, then an increasingly choppy 10-bar slide of -10%.
        let mut closes = vec![100.0; 50];
        closes.extend_from_slice(&[
            99.0, 98.5, 97.0, 96.5, 95.0, 94.0, 93.5, 92.0, 91.0, 90.0,
        ]);

        let outcome = check_regime(&closes, &config);
        assert!(!outcome.passed);
        assert_eq!(outcome.reason, "accelerating selloff");
    }

    #[test]
    fn regime_passes_deep_drop_with_flat_volatility() {
        let config = ScanConfig::default();

        // Constant log-return decline: HV is zero everywhere, trend is zero.
        let ratio = 0.9f64.powf(0.1);
        let closes: Vec<f64> = (0..60).map(|i| 100.0 * ratio.powi(i)).collect();

        let ret_10d = window_return(&closes, 10).unwrap();
        assert!(ret_10d < config.max_10d_drop_for_regime);
        assert!(check_regime(&closes, &config).passed);
    }

    fn engineered_pass_closes() -> Vec<f64> {
        // Long steady uptrend, then a clean 3-bar pullback of exactly -5%.
        // The pullback spikes HV(20) to its 252-day high, so the IV
        // percentile clears both the soft and strict floors.
        let mut closes: Vec<f64> = (0..277).map(|i| 100.0 + i as f64).collect();
        let peak = *closes.last().unwrap(); // 376.0
        closes.push(370.0);
        closes.push(363.0);
        closes.push(peak * 0.95); // 357.2, 3-bar return -5.00%
        closes
    }

    #[test]
    fn full_chain_accepts_engineered_pullback() {
        let config = ScanConfig::default();
        let series = series_from_closes(&engineered_pass_closes());

        match evaluate_premium_selling(&series, &config) {
            Evaluation::Pass(candidate) => {
                assert!((candidate.drawdown_pct.unwrap() - (-5.0)).abs() < 0.01);
                let ivp = candidate.iv_percentile.unwrap();
                assert!(ivp >= config.iv_filter_strict);
                let expected = ((5.0 + ivp / 10.0) * 100.0).round() / 100.0;
                assert!((candidate.score - expected).abs() < 0.02);
                assert_eq!(candidate.evidence.len(), 5);
                assert!(candidate.rejection_reason.is_none());
            }
            other => panic!("expected Pass, got {:?}", other),
        }
    }

    #[test]
    fn strict_iv_failure_lands_in_soft_bucket() {
        // Raise the strict floor above anything attainable; every other
        // stage still passes, so the symbol must soft-pass, not vanish.
        let config = ScanConfig {
            iv_filter_strict: 101.0,
            ..ScanConfig::default()
        };
        let series = series_from_closes(&engineered_pass_closes());

        match evaluate_premium_selling(&series, &config) {
            Evaluation::SoftPass(candidate) => {
                assert!(candidate.rejection_reason.unwrap().contains("IV too low"));
            }
            other => panic!("expected SoftPass, got {:?}", other),
        }
    }

    #[test]
    fn no_decline_rejects_at_first_stage() {
        let config = ScanConfig::default();
        let closes: Vec<f64> = (0..280).map(|i| 100.0 + i as f64).collect();
        let series = series_from_closes(&closes);

        match evaluate_premium_selling(&series, &config) {
            Evaluation::Reject { stage, .. } => assert_eq!(stage, "three_day_decline"),
            other => panic!("expected Reject, got {:?}", other),
        }
    }
}
