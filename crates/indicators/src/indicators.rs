//! Pure windowed functions over close-price and volume sequences.
//!
//! Every rolling function returns a vector aligned to its input: positions
//! without a full trailing window are `None`, never a numeric default.
//! Downstream filters treat `None` as "cannot evaluate", not as zero.

use statrs::statistics::Statistics;

/// Annualization factor for daily bars.
pub const TRADING_DAYS: f64 = 252.0;
/// Rolling window for historical volatility.
pub const HV_WINDOW: usize = 20;
/// Trailing lookback for the HV percentile rank.
pub const HV_RANK_LOOKBACK: usize = 252;
/// Minimum defined HV points for a statistically meaningful rank.
pub const HV_RANK_MIN_POINTS: usize = 100;

/// Log returns `ln(c[t] / c[t-1])`, undefined at the first position.
pub fn log_returns(closes: &[f64]) -> Vec<Option<f64>> {
    let mut out = vec![None; closes.len()];
    for t in 1..closes.len() {
        if closes[t - 1] > 0.0 && closes[t] > 0.0 {
            out[t] = Some((closes[t] / closes[t - 1]).ln());
        }
    }
    out
}

/// Annualized historical volatility: rolling sample std-dev of log returns
/// over `window` trailing points, scaled by sqrt(252).
pub fn historical_volatility(closes: &[f64], window: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; closes.len()];
    if window < 2 {
        return out;
    }
    let returns = log_returns(closes);
    for t in 0..closes.len() {
        if t + 1 < window + 1 {
            continue;
        }
        let trailing: Option<Vec<f64>> = returns[t + 1 - window..=t].iter().copied().collect();
        if let Some(vals) = trailing {
            let slice: &[f64] = &vals;
            out[t] = Some(slice.std_dev() * TRADING_DAYS.sqrt());
        }
    }
    out
}

/// RSI from rolling averages of gains and losses over `period` deltas.
/// Zero average loss means pure gains: RSI is defined as exactly 100 rather
/// than propagating the division by zero.
pub fn rsi(closes: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; closes.len()];
    if period == 0 {
        return out;
    }
    for t in period..closes.len() {
        let mut gain = 0.0;
        let mut loss = 0.0;
        for i in t + 1 - period..=t {
            let delta = closes[i] - closes[i - 1];
            if delta > 0.0 {
                gain += delta;
            } else {
                loss += -delta;
            }
        }
        let avg_gain = gain / period as f64;
        let avg_loss = loss / period as f64;
        out[t] = Some(if avg_loss == 0.0 {
            100.0
        } else {
            let rs = avg_gain / avg_loss;
            100.0 - 100.0 / (1.0 + rs)
        });
    }
    out
}

/// Simple moving average over a trailing window.
pub fn sma(closes: &[f64], window: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; closes.len()];
    if window == 0 {
        return out;
    }
    for t in 0..closes.len() {
        if t + 1 >= window {
            let slice = &closes[t + 1 - window..=t];
            out[t] = Some(slice.iter().sum::<f64>() / window as f64);
        }
    }
    out
}

/// Trailing rolling maximum.
pub fn rolling_max(closes: &[f64], window: usize) -> Vec<Option<f64>> {
    rolling_extreme(closes, window, f64::max)
}

/// Trailing rolling minimum.
pub fn rolling_min(closes: &[f64], window: usize) -> Vec<Option<f64>> {
    rolling_extreme(closes, window, f64::min)
}

fn rolling_extreme(closes: &[f64], window: usize, pick: fn(f64, f64) -> f64) -> Vec<Option<f64>> {
    let mut out = vec![None; closes.len()];
    if window == 0 {
        return out;
    }
    for t in 0..closes.len() {
        if t + 1 >= window {
            out[t] = closes[t + 1 - window..=t].iter().copied().reduce(pick);
        }
    }
    out
}

/// Percent change `(c[t] / c[t-1] - 1) * 100`, undefined at the first position.
pub fn percent_change(closes: &[f64]) -> Vec<Option<f64>> {
    let mut out = vec![None; closes.len()];
    for t in 1..closes.len() {
        if closes[t - 1] != 0.0 {
            out[t] = Some((closes[t] / closes[t - 1] - 1.0) * 100.0);
        }
    }
    out
}

/// Percent return over the last `bars_back` bars of the series.
pub fn window_return(closes: &[f64], bars_back: usize) -> Option<f64> {
    if bars_back == 0 || closes.len() < bars_back + 1 {
        return None;
    }
    let last = *closes.last()?;
    let base = closes[closes.len() - 1 - bars_back];
    if base == 0.0 {
        return None;
    }
    Some((last / base - 1.0) * 100.0)
}

/// Rank of `value` against `values`: percentage strictly below, 0-100.
/// Needs at least `HV_RANK_MIN_POINTS` values to be meaningful.
pub fn percentile_rank(values: &[f64], value: f64) -> Option<f64> {
    if values.len() < HV_RANK_MIN_POINTS {
        return None;
    }
    let below = values.iter().filter(|&&v| v < value).count();
    Some(below as f64 / values.len() as f64 * 100.0)
}

/// Percentile rank of the latest HV(20) value against its own trailing
/// 252 defined points. The rank window includes the current value itself,
/// so the result can never reach 100.
pub fn hv_percentile(closes: &[f64]) -> Option<f64> {
    let hv = historical_volatility(closes, HV_WINDOW);
    let defined: Vec<f64> = hv.into_iter().flatten().collect();
    if defined.is_empty() {
        return None;
    }
    let start = defined.len().saturating_sub(HV_RANK_LOOKBACK);
    let tail = &defined[start..];
    let current = *tail.last()?;
    percentile_rank(tail, current)
}
