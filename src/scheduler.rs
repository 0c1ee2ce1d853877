use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::error::Result;
use crate::interfaces::nlp::TaskInterpreter;
use crate::interfaces::transport::Notifier;
use crate::recurrence;
use crate::reminders::{Reminder, ReminderStore};
use crate::transport::format_reminder;

/// Background loop that polls the store for due reminders and dispatches
/// notifications. One instance per process; running two concurrently would
/// need a mutual-exclusion lease the deployment does not have.
pub struct ReminderScheduler {
    store: Arc<ReminderStore>,
    interpreter: Arc<dyn TaskInterpreter>,
    notifier: Arc<dyn Notifier>,
    tick_interval: Duration,
}

impl ReminderScheduler {
    pub fn new(
        store: Arc<ReminderStore>,
        interpreter: Arc<dyn TaskInterpreter>,
        notifier: Arc<dyn Notifier>,
        tick_interval: Duration,
    ) -> Self {
        Self {
            store,
            interpreter,
            notifier,
            tick_interval,
        }
    }

    /// Runs the loop until `shutdown` flips to true. A stop request is only
    /// honored between ticks; an in-flight tick always finishes its due set.
    pub fn spawn(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(self.tick_interval);
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            info!(interval_secs = self.tick_interval.as_secs(), "scheduler started");
            loop {
                tokio::select! {
                    _ = tick.tick() => self.tick().await,
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
            info!("scheduler stopped");
        })
    }

    /// One polling pass. Errors are contained per reminder: a failing item is
    /// logged and left untouched for the next tick, and never aborts the rest
    /// of the due set.
    pub async fn tick(&self) {
        let now = Utc::now();
        let due = match self.store.due_reminders(now).await {
            Ok(due) => due,
            Err(err) => {
                warn!(error = %err, "could not query due reminders");
                return;
            }
        };
        if due.is_empty() {
            return;
        }
        info!(count = due.len(), "processing due reminders");
        for reminder in due {
            if let Err(err) = self.process(&reminder).await {
                error!(
                    reminder_id = reminder.id,
                    chat_id = reminder.chat_id,
                    error = %err,
                    "due reminder left for retry"
                );
            }
        }
    }

    async fn process(&self, reminder: &Reminder) -> Result<()> {
        let message = self.compose_message(reminder).await;
        // Dispatch first; state only advances after a confirmed send so a
        // failure is retried instead of silently dropped.
        self.notifier.send(reminder.chat_id, &message).await?;

        let now = Utc::now();
        match &reminder.recurrence {
            Some(rule) => {
                let next = recurrence::advance(rule, reminder.fire_at);
                self.store.advance_recurring(reminder.id, next, now).await
            }
            None => self.store.mark_fired_oneshot(reminder.id).await,
        }
    }

    async fn compose_message(&self, reminder: &Reminder) -> String {
        match self
            .interpreter
            .reminder_message(&reminder.task, reminder.context.as_deref())
            .await
        {
            Ok(enrichment) => format_reminder(
                &reminder.task,
                reminder.context.as_deref(),
                Some(&enrichment),
            ),
            Err(err) => {
                warn!(
                    reminder_id = reminder.id,
                    error = %err,
                    "enrichment failed, sending plain notification"
                );
                format_reminder(&reminder.task, reminder.context.as_deref(), None)
            }
        }
    }
}
