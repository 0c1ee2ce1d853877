use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};

use crate::error::{RemindBotError, Result};

pub const MAX_ACTIVE_REMINDERS: usize = 200;
pub const MAX_CREATIONS_PER_WINDOW: usize = 20;
pub const CREATION_WINDOW_SECONDS: i64 = 60;

/// Per-chat ceilings on reminder creation: a cap on active reminders and a
/// sliding window on creation rate. Both checks and the window append happen
/// under one lock hold so two racing creates cannot both pass a ceiling that
/// only one should.
pub struct AdmissionGuard {
    max_active: usize,
    max_creations: usize,
    window_seconds: i64,
    recent: Mutex<HashMap<i64, VecDeque<DateTime<Utc>>>>,
}

impl Default for AdmissionGuard {
    fn default() -> Self {
        Self::new(
            MAX_ACTIVE_REMINDERS,
            MAX_CREATIONS_PER_WINDOW,
            CREATION_WINDOW_SECONDS,
        )
    }
}

impl AdmissionGuard {
    pub fn new(max_active: usize, max_creations: usize, window_seconds: i64) -> Self {
        Self {
            max_active,
            max_creations,
            window_seconds,
            recent: Mutex::new(HashMap::new()),
        }
    }

    /// Admits one creation for `chat_id` or explains why it is rejected.
    /// `active_count` is the chat's current non-deleted reminder count, read
    /// inside the same transaction as the insert this call guards.
    pub fn admit(&self, chat_id: i64, active_count: i64, now: DateTime<Utc>) -> Result<()> {
        if active_count >= self.max_active as i64 {
            return Err(RemindBotError::AdmissionDenied(format!(
                "chat {chat_id} already has {active_count} active reminders (limit {})",
                self.max_active
            )));
        }

        let mut recent = self
            .recent
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let window = recent.entry(chat_id).or_default();
        let cutoff = now - Duration::seconds(self.window_seconds);
        while window.front().is_some_and(|t| *t < cutoff) {
            window.pop_front();
        }
        if window.len() >= self.max_creations {
            return Err(RemindBotError::AdmissionDenied(format!(
                "chat {chat_id} created {} reminders in the last {}s (limit {})",
                window.len(),
                self.window_seconds,
                self.max_creations
            )));
        }
        window.push_back(now);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn active_ceiling_rejects_at_limit() {
        let guard = AdmissionGuard::new(200, 20, 60);
        let now = Utc::now();
        assert!(guard.admit(1, 199, now).is_ok());
        let err = guard.admit(1, 200, now).unwrap_err();
        assert!(matches!(err, RemindBotError::AdmissionDenied(_)));
    }

    #[test]
    fn rate_ceiling_rejects_twenty_first_in_window() {
        let guard = AdmissionGuard::new(200, 20, 60);
        let now = Utc::now();
        for _ in 0..20 {
            guard.admit(7, 0, now).unwrap();
        }
        let err = guard.admit(7, 0, now).unwrap_err();
        assert!(matches!(err, RemindBotError::AdmissionDenied(_)));
    }

    #[test]
    fn rate_window_slides() {
        let guard = AdmissionGuard::new(200, 20, 60);
        let start = Utc::now();
        for _ in 0..20 {
            guard.admit(7, 0, start).unwrap();
        }
        assert!(guard.admit(7, 0, start).is_err());
        // 61 seconds later the old stamps are pruned.
        assert!(guard.admit(7, 0, start + Duration::seconds(61)).is_ok());
    }

    #[test]
    fn chats_are_counted_independently() {
        let guard = AdmissionGuard::new(200, 1, 60);
        let now = Utc::now();
        guard.admit(1, 0, now).unwrap();
        assert!(guard.admit(1, 0, now).is_err());
        assert!(guard.admit(2, 0, now).is_ok());
    }
}
