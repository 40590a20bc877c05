use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Data unavailable for {symbol}: {reason}")]
    Unavailable { symbol: String, reason: String },

    #[error("Insufficient history for {symbol}: have {have} bars, need {need}")]
    InsufficientHistory {
        symbol: String,
        have: usize,
        need: usize,
    },

    #[error("API error: {0}")]
    Api(String),

    #[error("Malformed payload: {0}")]
    Malformed(String),

    #[error("Universe unavailable: {0}")]
    UniverseUnavailable(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Notification error: {0}")]
    Notification(String),
}

impl ScanError {
    /// Per-symbol failures degrade to a SKIP; only universe enumeration
    /// failure aborts a scan.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ScanError::UniverseUnavailable(_))
    }
}
