use chrono::{DateTime, Datelike, Duration, Months, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{RemindBotError, Result};

/// Unit of time between occurrences of a recurring reminder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecurrenceKind {
    Minute,
    Hour,
    Day,
    Week,
    Month,
    Year,
}

impl RecurrenceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecurrenceKind::Minute => "minute",
            RecurrenceKind::Hour => "hour",
            RecurrenceKind::Day => "day",
            RecurrenceKind::Week => "week",
            RecurrenceKind::Month => "month",
            RecurrenceKind::Year => "year",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "minute" => Some(RecurrenceKind::Minute),
            "hour" => Some(RecurrenceKind::Hour),
            "day" => Some(RecurrenceKind::Day),
            "week" => Some(RecurrenceKind::Week),
            "month" => Some(RecurrenceKind::Month),
            "year" => Some(RecurrenceKind::Year),
            _ => None,
        }
    }

    /// Inclusive interval bounds that keep the scheduling density sane.
    pub fn interval_bounds(&self) -> (u32, u32) {
        match self {
            RecurrenceKind::Minute => (1, 1440),
            RecurrenceKind::Hour => (1, 168),
            RecurrenceKind::Day => (1, 365),
            RecurrenceKind::Week => (1, 52),
            RecurrenceKind::Month => (1, 24),
            RecurrenceKind::Year => (1, 10),
        }
    }
}

/// How a reminder's fire instant moves forward after each occurrence.
///
/// `weekdays` holds Monday-based indices (0 = Monday .. 6 = Sunday) and is
/// meaningful only for `kind = Week`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecurrenceRule {
    pub kind: RecurrenceKind,
    pub interval: u32,
    pub weekdays: Option<Vec<u8>>,
    pub ends_at: Option<DateTime<Utc>>,
}

impl RecurrenceRule {
    pub fn validate(&self) -> Result<()> {
        let (min, max) = self.kind.interval_bounds();
        if self.interval < min || self.interval > max {
            return Err(RemindBotError::Validation(format!(
                "recurrence interval {} out of bounds for {} ({min}..={max})",
                self.interval,
                self.kind.as_str()
            )));
        }
        if let Some(days) = &self.weekdays {
            if self.kind != RecurrenceKind::Week {
                return Err(RemindBotError::Validation(
                    "weekday sets only apply to weekly recurrence".to_string(),
                ));
            }
            if days.is_empty() {
                return Err(RemindBotError::Validation(
                    "weekday set must not be empty".to_string(),
                ));
            }
            if days.iter().any(|d| *d > 6) {
                return Err(RemindBotError::Validation(
                    "weekday indices must be 0 (Monday) through 6 (Sunday)".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// Computes the occurrence following `current`, or `None` once the rule's end
/// date is passed. Pure; persisting the result is the caller's job.
pub fn advance(rule: &RecurrenceRule, current: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let interval = i64::from(rule.interval);
    let next = match rule.kind {
        RecurrenceKind::Minute => current + Duration::minutes(interval),
        RecurrenceKind::Hour => current + Duration::hours(interval),
        RecurrenceKind::Day => current + Duration::days(interval),
        RecurrenceKind::Week => match &rule.weekdays {
            Some(days) if !days.is_empty() => next_weekday_match(rule.interval, days, current)?,
            _ => current + Duration::weeks(interval),
        },
        RecurrenceKind::Month => current.checked_add_months(Months::new(rule.interval))?,
        RecurrenceKind::Year => current.checked_add_months(Months::new(rule.interval * 12))?,
    };

    match rule.ends_at {
        Some(ends_at) if next > ends_at => None,
        _ => Some(next),
    }
}

/// Earliest instant strictly after `current` landing on one of `days`, where
/// `interval` counts weeks between matched weekday sets. The remainder of the
/// current week still belongs to week zero, so "every 2 weeks on Tue/Thu"
/// fired on a Tuesday hits that same Thursday before jumping two weeks ahead.
fn next_weekday_match(interval: u32, days: &[u8], current: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let interval = i64::from(interval.max(1));
    let base_week =
        current.date_naive() - Duration::days(current.weekday().num_days_from_monday() as i64);
    // A full matching week always occurs within interval + 1 weeks.
    for offset in 1..=(7 * (interval + 1)) {
        let candidate = current + Duration::days(offset);
        let candidate_week = candidate.date_naive()
            - Duration::days(candidate.weekday().num_days_from_monday() as i64);
        let weeks_apart = (candidate_week - base_week).num_days() / 7;
        if weeks_apart % interval == 0
            && days.contains(&(candidate.weekday().num_days_from_monday() as u8))
        {
            return Some(candidate);
        }
    }
    None
}
