#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::NaiveDateTime;
use tokio::sync::Mutex;

use remind_bot::error::{RemindBotError, Result};
use remind_bot::interfaces::nlp::{Interpretation, TaskInterpreter};
use remind_bot::interfaces::transport::Notifier;

/// Captures outgoing notifications; optionally fails the next N sends.
pub struct RecordingNotifier {
    pub sent: Mutex<Vec<(i64, String)>>,
    fail_next: AtomicUsize,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail_next: AtomicUsize::new(0),
        }
    }

    pub fn fail_next_sends(&self, count: usize) {
        self.fail_next.store(count, Ordering::SeqCst);
    }

    pub async fn sent_count(&self) -> usize {
        self.sent.lock().await.len()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, chat_id: i64, text: &str) -> Result<()> {
        let remaining = self.fail_next.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_next.store(remaining - 1, Ordering::SeqCst);
            return Err(RemindBotError::Dispatch("simulated outage".to_string()));
        }
        self.sent.lock().await.push((chat_id, text.to_string()));
        Ok(())
    }
}

/// Interpreter stub: `message: None` makes enrichment fail so tests can
/// exercise the plain-text fallback.
pub struct StaticInterpreter {
    pub message: Option<String>,
}

impl StaticInterpreter {
    pub fn new(message: Option<&str>) -> Self {
        Self {
            message: message.map(str::to_string),
        }
    }
}

#[async_trait]
impl TaskInterpreter for StaticInterpreter {
    async fn parse_reminder(
        &self,
        _text: &str,
        _now_local: NaiveDateTime,
    ) -> Result<Interpretation> {
        Ok(Interpretation::NotAReminder {
            reason: "stub".to_string(),
        })
    }

    async fn reminder_message(&self, _task: &str, _context: Option<&str>) -> Result<String> {
        self.message
            .clone()
            .ok_or_else(|| RemindBotError::Dispatch("enrichment unavailable".to_string()))
    }
}
