pub mod admission;
pub mod config;
pub mod error;
pub mod interfaces;
pub mod nlp;
pub mod recurrence;
pub mod reminders;
pub mod scheduler;
pub mod transport;

pub use crate::config::Config;
pub use crate::error::{RemindBotError, Result};
pub use crate::recurrence::{advance, RecurrenceKind, RecurrenceRule};
pub use crate::reminders::{Reminder, ReminderChanges, ReminderStore};
pub use crate::scheduler::ReminderScheduler;
