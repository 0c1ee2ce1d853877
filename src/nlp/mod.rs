use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::error::{RemindBotError, Result};
use crate::interfaces::nlp::{Interpretation, RecurrenceDraft, ReminderDraft, TaskInterpreter};
use crate::recurrence::RecurrenceKind;

const GEMINI_API: &str = "https://generativelanguage.googleapis.com";

/// Gemini-backed interpreter: turns free text into a structured reminder
/// candidate and produces the short enrichment line for notifications.
pub struct GeminiClient {
    http: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiClient {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: api_key.into(),
            model: model.into(),
            base_url: GEMINI_API.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent?key={}",
            self.base_url, self.model, self.api_key
        );
        let response = self
            .http
            .post(&url)
            .json(&json!({
                "contents": [{"parts": [{"text": prompt}]}]
            }))
            .send()
            .await
            .map_err(|e| RemindBotError::Dispatch(e.to_string()))?;

        if !response.status().is_success() {
            return Err(RemindBotError::Dispatch(format!(
                "gemini returned {}",
                response.status()
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| RemindBotError::Serialization(e.to_string()))?;
        body.pointer("/candidates/0/content/parts/0/text")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| {
                RemindBotError::Serialization("gemini response had no text candidate".to_string())
            })
    }

    fn build_parse_prompt(text: &str, now_local: NaiveDateTime) -> String {
        format!(
            r#"You schedule reminders. The current local date and time is {now}.
User message: "{text}"

Respond with ONE JSON object using exactly these fields:
- task: full reminder description (string)
- fire_at: first occurrence as 'YYYY-MM-DD HH:MM:SS' (string)
- context: the user's original message (string)
- is_recurring: true or false
- recurrence_kind: one of 'minute','hour','day','week','month','year', or null
- recurrence_interval: integer count of units between occurrences, or null
- weekdays: list of integers 0-6 (0=Monday) for weekly recurrence, or null
- recurrence_ends_at: end date as 'YYYY-MM-DD HH:MM:SS', or null

If no time was given, default to 00:00:00.
If the message is not a reminder, respond with: {{"error": "<short reason>"}}
Respond with the JSON object only."#,
            now = now_local.format("%Y-%m-%d %H:%M:%S"),
        )
    }

    /// Pulls the first top-level JSON object out of a model reply that may be
    /// wrapped in prose or code fences.
    fn extract_json(text: &str) -> Option<Value> {
        let start = text.find('{')?;
        let end = text.rfind('}')?;
        if end < start {
            return None;
        }
        serde_json::from_str(&text[start..=end]).ok()
    }

    fn draft_from_json(data: &Value, context_fallback: &str) -> Result<Interpretation> {
        if let Some(reason) = data.get("error").and_then(Value::as_str) {
            return Ok(Interpretation::NotAReminder {
                reason: reason.to_string(),
            });
        }

        let task = data
            .get("task")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| RemindBotError::Validation("interpreter returned no task".to_string()))?;
        let fire_at_local = data
            .get("fire_at")
            .and_then(Value::as_str)
            .and_then(parse_local_datetime)
            .ok_or_else(|| {
                RemindBotError::Validation("interpreter returned no usable fire time".to_string())
            })?;
        let context = data
            .get("context")
            .and_then(Value::as_str)
            .unwrap_or(context_fallback)
            .trim()
            .to_string();

        let recurrence = if data
            .get("is_recurring")
            .and_then(Value::as_bool)
            .unwrap_or(false)
        {
            let kind = data
                .get("recurrence_kind")
                .and_then(Value::as_str)
                .and_then(RecurrenceKind::parse)
                .ok_or_else(|| {
                    RemindBotError::Validation(
                        "recurring reminder without a valid recurrence kind".to_string(),
                    )
                })?;
            let interval = data
                .get("recurrence_interval")
                .and_then(Value::as_u64)
                .unwrap_or(1) as u32;
            let weekdays = data.get("weekdays").and_then(Value::as_array).map(|days| {
                days.iter()
                    .filter_map(Value::as_u64)
                    .map(|d| d as u8)
                    .collect::<Vec<_>>()
            });
            let ends_at_local = data
                .get("recurrence_ends_at")
                .and_then(Value::as_str)
                .and_then(parse_local_datetime);
            Some(RecurrenceDraft {
                kind,
                interval,
                weekdays: weekdays.filter(|d| !d.is_empty()),
                ends_at_local,
            })
        } else {
            None
        };

        Ok(Interpretation::Reminder(ReminderDraft {
            task: task.to_string(),
            fire_at_local,
            recurrence,
            context,
        }))
    }
}

#[async_trait]
impl TaskInterpreter for GeminiClient {
    async fn parse_reminder(
        &self,
        text: &str,
        now_local: NaiveDateTime,
    ) -> Result<Interpretation> {
        let prompt = Self::build_parse_prompt(text, now_local);
        let reply = self.generate(&prompt).await?;
        let Some(data) = Self::extract_json(&reply) else {
            warn!("interpreter reply contained no JSON object");
            return Ok(Interpretation::NotAReminder {
                reason: "could not understand the message".to_string(),
            });
        };
        let interpretation = Self::draft_from_json(&data, text)?;
        info!(recurring = matches!(&interpretation, Interpretation::Reminder(d) if d.recurrence.is_some()),
              "message interpreted");
        Ok(interpretation)
    }

    async fn reminder_message(&self, task: &str, context: Option<&str>) -> Result<String> {
        let context_line = context
            .map(|c| format!("Original user message: \"{c}\""))
            .unwrap_or_default();
        let prompt = format!(
            "Write one short, playful line (at most 20 words) to accompany this \
             reminder notification. Stay strictly on the reminder's topic, use a \
             fitting emoji, and reply with the line only, no quotes.\n\
             Reminder: \"{task}\"\n{context_line}"
        );
        let reply = self.generate(&prompt).await?;
        Ok(reply.trim().trim_matches('"').trim_matches('\'').to_string())
    }
}

fn parse_local_datetime(raw: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw.trim(), "%Y-%m-%d %H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(raw.trim(), "%Y-%m-%d %H:%M"))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_json_from_fenced_reply() {
        let reply = "```json\n{\"task\": \"water the plants\"}\n```";
        let value = GeminiClient::extract_json(reply).unwrap();
        assert_eq!(value["task"], "water the plants");
        assert!(GeminiClient::extract_json("no json here").is_none());
    }

    #[test]
    fn maps_recurring_draft_fields() {
        let data = serde_json::json!({
            "task": "drink water",
            "fire_at": "2026-04-01 08:00:00",
            "context": "drink water every 2 hours",
            "is_recurring": true,
            "recurrence_kind": "hour",
            "recurrence_interval": 2,
            "weekdays": null,
            "recurrence_ends_at": "2026-04-07 23:59:00",
        });
        let Interpretation::Reminder(draft) =
            GeminiClient::draft_from_json(&data, "fallback").unwrap()
        else {
            panic!("expected a reminder draft");
        };
        assert_eq!(draft.task, "drink water");
        let rec = draft.recurrence.unwrap();
        assert_eq!(rec.kind, RecurrenceKind::Hour);
        assert_eq!(rec.interval, 2);
        assert!(rec.ends_at_local.is_some());
    }

    #[test]
    fn error_field_classifies_as_not_a_reminder() {
        let data = serde_json::json!({"error": "that is a question"});
        let result = GeminiClient::draft_from_json(&data, "raw").unwrap();
        assert!(matches!(result, Interpretation::NotAReminder { .. }));
    }
}
