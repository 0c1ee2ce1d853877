use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};

use crate::error::{RemindBotError, Result};

/// Boundary between user-local wall-clock time and the canonical UTC instants
/// the store persists. Only input validation and display cross this boundary.
pub trait TimeConverter: Send + Sync {
    fn to_canonical(&self, local: NaiveDateTime) -> Result<DateTime<Utc>>;
    fn to_local(&self, instant: DateTime<Utc>) -> NaiveDateTime;
}

/// Fixed-offset converter. The deployment this grew out of serves a single
/// UTC-3 region, so a constant offset is enough.
pub struct FixedOffsetConverter {
    offset: FixedOffset,
}

impl FixedOffsetConverter {
    pub fn new(offset_minutes: i32) -> Result<Self> {
        let offset = FixedOffset::east_opt(offset_minutes * 60).ok_or_else(|| {
            RemindBotError::Config(format!("invalid utc offset: {offset_minutes} minutes"))
        })?;
        Ok(Self { offset })
    }
}

impl TimeConverter for FixedOffsetConverter {
    fn to_canonical(&self, local: NaiveDateTime) -> Result<DateTime<Utc>> {
        self.offset
            .from_local_datetime(&local)
            .single()
            .map(|dt| dt.with_timezone(&Utc))
            .ok_or_else(|| RemindBotError::Validation(format!("unrepresentable local time {local}")))
    }

    fn to_local(&self, instant: DateTime<Utc>) -> NaiveDateTime {
        instant.with_timezone(&self.offset).naive_local()
    }
}
