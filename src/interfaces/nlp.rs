use async_trait::async_trait;
use chrono::NaiveDateTime;

use crate::error::Result;
use crate::recurrence::RecurrenceKind;

/// Recurrence fields as interpreted from free text. Times are still
/// user-local here; conversion to canonical UTC happens at the boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecurrenceDraft {
    pub kind: RecurrenceKind,
    pub interval: u32,
    pub weekdays: Option<Vec<u8>>,
    pub ends_at_local: Option<NaiveDateTime>,
}

/// Structured reminder candidate extracted from a user message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReminderDraft {
    pub task: String,
    pub fire_at_local: NaiveDateTime,
    pub recurrence: Option<RecurrenceDraft>,
    pub context: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Interpretation {
    Reminder(ReminderDraft),
    NotAReminder { reason: String },
}

/// Natural-language collaborator. The scheduler loop only ever uses
/// `reminder_message`; `parse_reminder` belongs to the request path.
#[async_trait]
pub trait TaskInterpreter: Send + Sync {
    async fn parse_reminder(&self, text: &str, now_local: NaiveDateTime)
        -> Result<Interpretation>;

    /// Short message body for an already-resolved reminder notification.
    async fn reminder_message(&self, task: &str, context: Option<&str>) -> Result<String>;
}
