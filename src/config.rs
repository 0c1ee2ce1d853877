use serde::{Deserialize, Serialize};

use crate::error::{RemindBotError, Result};

pub const DEFAULT_DB_PATH: &str = "./data/remind-bot.db";
pub const DEFAULT_TICK_SECONDS: u64 = 10;
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-1.5-flash";
pub const DEFAULT_UTC_OFFSET_MINUTES: i32 = -180;
pub const DEFAULT_UPCOMING_HORIZON_DAYS: i64 = 7;

/// Runtime configuration for the daemon. Values come from CLI flags and
/// environment variables; `validate` rejects a half-configured process at
/// startup instead of failing on first use.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub telegram_token: String,
    pub gemini_api_key: String,
    pub gemini_model: String,
    pub sqlite_path: String,
    pub tick_seconds: u64,
    pub utc_offset_minutes: i32,
    pub upcoming_horizon_days: i64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            telegram_token: String::new(),
            gemini_api_key: String::new(),
            gemini_model: DEFAULT_GEMINI_MODEL.to_string(),
            sqlite_path: DEFAULT_DB_PATH.to_string(),
            tick_seconds: DEFAULT_TICK_SECONDS,
            utc_offset_minutes: DEFAULT_UTC_OFFSET_MINUTES,
            upcoming_horizon_days: DEFAULT_UPCOMING_HORIZON_DAYS,
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        let mut missing = Vec::new();
        if self.telegram_token.trim().is_empty() {
            missing.push("telegram_token");
        }
        if self.gemini_api_key.trim().is_empty() {
            missing.push("gemini_api_key");
        }
        if !missing.is_empty() {
            return Err(RemindBotError::Config(format!(
                "missing required settings: {}",
                missing.join(", ")
            )));
        }
        if self.tick_seconds == 0 {
            return Err(RemindBotError::Config(
                "tick_seconds must be at least 1".to_string(),
            ));
        }
        if self.upcoming_horizon_days <= 0 {
            return Err(RemindBotError::Config(
                "upcoming_horizon_days must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
