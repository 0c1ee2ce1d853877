use async_trait::async_trait;
use serde_json::json;
use tracing::info;

use crate::error::{RemindBotError, Result};
use crate::interfaces::transport::Notifier;

const TELEGRAM_API: &str = "https://api.telegram.org";

/// Telegram delivery for reminder notifications. Every failure, transport or
/// API-level, surfaces as a dispatch error so the scheduler retries the item.
pub struct TelegramNotifier {
    http: reqwest::Client,
    token: String,
    base_url: String,
}

impl TelegramNotifier {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            token: token.into(),
            base_url: TELEGRAM_API.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send(&self, chat_id: i64, text: &str) -> Result<()> {
        let url = format!("{}/bot{}/sendMessage", self.base_url, self.token);
        let response = self
            .http
            .post(&url)
            .json(&json!({
                "chat_id": chat_id,
                "text": text,
                "parse_mode": "HTML",
            }))
            .send()
            .await
            .map_err(|e| RemindBotError::Dispatch(e.to_string()))?;

        if !response.status().is_success() {
            return Err(RemindBotError::Dispatch(format!(
                "telegram returned {}",
                response.status()
            )));
        }
        info!(chat_id, "notification delivered");
        Ok(())
    }
}

/// Notification body: header, task, optional user context, optional
/// enrichment line. Without enrichment this is the plain fallback text.
pub fn format_reminder(task: &str, context: Option<&str>, enrichment: Option<&str>) -> String {
    let mut text = format!("🔔 REMINDER 🔔\n\n📌 <b>{}</b>\n", capitalize(task));
    if let Some(context) = context {
        if !context.trim().is_empty() && context.trim().to_lowercase() != task.trim().to_lowercase()
        {
            text.push_str(&format!("💬 <i>{}</i>\n", context.trim()));
        }
    }
    if let Some(enrichment) = enrichment {
        text.push('\n');
        text.push_str(enrichment);
    }
    text
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}
