use serde::{Deserialize, Serialize};

/// Numeric thresholds for one scan run.
///
/// A config is a value: it is cloned into the scan at start and never read
/// from process-wide state, so thresholds cannot change mid-run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Soft volatility floor: minimum HV percentile to consider at all.
    pub min_iv_percentile: f64,
    /// Hard volatility floor applied at the pre-trade gate.
    pub iv_filter_strict: f64,
    /// Acceptable 3-bar drawdown band, both bounds negative, closed interval.
    pub drawdown_min: f64,
    pub drawdown_max: f64,
    /// Trend-support SMA length.
    pub dma_window: usize,
    /// Oversold veto: minimum RSI.
    pub rsi_min: f64,
    /// Severity veto: most negative allowed 5-bar return.
    pub max_5d_drop: f64,
    /// Regime soft-veto pair: 10-bar drop bound and HV trend threshold.
    pub max_10d_drop_for_regime: f64,
    pub hv_trend_threshold: f64,
    /// Output truncation count.
    pub top_n: usize,
    /// Minimum series length to attempt evaluation.
    pub min_history: usize,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            min_iv_percentile: 5.0,
            iv_filter_strict: 50.0,
            drawdown_min: -9.0,
            drawdown_max: -3.0,
            dma_window: 50,
            rsi_min: 25.0,
            max_5d_drop: -7.0,
            max_10d_drop_for_regime: -7.0,
            hv_trend_threshold: 0.0,
            top_n: 3,
            min_history: 260,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_drawdown_band_is_negative_and_ordered() {
        let config = ScanConfig::default();
        assert!(config.drawdown_min < config.drawdown_max);
        assert!(config.drawdown_max < 0.0);
    }
}
