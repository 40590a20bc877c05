pub mod breakout;
pub mod premium;
pub mod ranking;

pub use breakout::*;
pub use premium::*;
pub use ranking::*;

/// Result of one filter stage: pass/fail, an attributable reason, and the
/// numeric evidence the stage looked at (if any).
#[derive(Debug, Clone)]
pub struct StageOutcome {
    pub passed: bool,
    pub reason: String,
    pub value: Option<f64>,
}

impl StageOutcome {
    pub fn pass(value: Option<f64>) -> Self {
        Self {
            passed: true,
            reason: "PASS".to_string(),
            value,
        }
    }

    pub fn reject(reason: impl Into<String>, value: Option<f64>) -> Self {
        Self {
            passed: false,
            reason: reason.into(),
            value,
        }
    }
}
