//! Telegram delivery for scan alerts.
//!
//! Delivery is best-effort: a failed send is logged and reported as a
//! notification error, but callers treat it as non-fatal — the scan result
//! is already archived by the time anything is sent.

mod templates;

pub use templates::{grade_change_table, movers_table, scan_messages};

use async_trait::async_trait;
use scanner_core::{GradeChange, QuoteSnapshot, ResultSink, ScanError, ScanReport};

const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

/// Bot credentials, read from `TELEGRAM_BOT_TOKEN` / `TELEGRAM_CHAT_ID`.
#[derive(Debug, Clone)]
pub struct TelegramConfig {
    pub bot_token: String,
    pub chat_id: String,
}

impl TelegramConfig {
    /// Returns `None` when either variable is unset, meaning alerts are
    /// disabled rather than misconfigured.
    pub fn from_env() -> Option<Self> {
        let bot_token = std::env::var("TELEGRAM_BOT_TOKEN")
            .ok()
            .filter(|s| !s.is_empty())?;
        let chat_id = std::env::var("TELEGRAM_CHAT_ID")
            .ok()
            .filter(|s| !s.is_empty())?;
        Some(Self { bot_token, chat_id })
    }
}

pub struct TelegramNotifier {
    config: TelegramConfig,
    client: reqwest::Client,
    api_base: String,
}

impl TelegramNotifier {
    pub fn new(config: TelegramConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
            api_base: TELEGRAM_API_BASE.to_string(),
        }
    }

    /// Point at a different API host (local mock in tests).
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    /// Send one Markdown-formatted message to the configured chat.
    pub async fn send_markdown(&self, text: &str) -> Result<(), ScanError> {
        let url = format!(
            "{}/bot{}/sendMessage",
            self.api_base, self.config.bot_token
        );
        let payload = serde_json::json!({
            "chat_id": self.config.chat_id,
            "text": text,
            "parse_mode": "Markdown",
        });

        let response = self
            .client
            .post(&url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| ScanError::Notification(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ScanError::Notification(format!(
                "telegram returned {status}: {body}"
            )));
        }

        Ok(())
    }

    /// Digest of today's grade revisions; skipped when there are none.
    pub async fn send_grade_digest(&self, changes: &[GradeChange]) -> Result<(), ScanError> {
        if changes.is_empty() {
            tracing::info!("no grade changes today, skipping digest");
            return Ok(());
        }
        self.send_markdown(&grade_change_table(changes)).await
    }

    /// Gainers and losers tables as two separate messages.
    pub async fn send_movers(
        &self,
        gainers: &[QuoteSnapshot],
        losers: &[QuoteSnapshot],
    ) -> Result<(), ScanError> {
        self.send_markdown(&movers_table("Top Gainers", gainers))
            .await?;
        self.send_markdown(&movers_table("Top Losers", losers))
            .await
    }
}

#[async_trait]
impl ResultSink for TelegramNotifier {
    async fn publish(&self, report: &ScanReport) -> Result<(), ScanError> {
        for message in scan_messages(report) {
            self.send_markdown(&message).await?;
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "telegram"
    }
}
