use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::EnvFilter;

use remind_bot::config::{self, Config};
use remind_bot::error::{RemindBotError, Result};
use remind_bot::nlp::GeminiClient;
use remind_bot::reminders::ReminderStore;
use remind_bot::scheduler::ReminderScheduler;
use remind_bot::transport::TelegramNotifier;

#[derive(Parser, Debug)]
#[command(name = "remind-bot")]
#[command(about = "Reminder bot daemon: stores reminders and fires notifications")]
struct Cli {
    #[arg(long, default_value = config::DEFAULT_DB_PATH)]
    db: String,

    #[arg(long, env = "TELEGRAM_TOKEN", hide_env_values = true)]
    telegram_token: String,

    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    gemini_api_key: String,

    #[arg(long, env = "GEMINI_MODEL", default_value = config::DEFAULT_GEMINI_MODEL)]
    gemini_model: String,

    #[arg(long, env = "SCHEDULER_INTERVAL", default_value_t = config::DEFAULT_TICK_SECONDS)]
    tick_seconds: u64,

    #[arg(long, default_value_t = config::DEFAULT_UTC_OFFSET_MINUTES)]
    utc_offset_minutes: i32,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = Config {
        telegram_token: cli.telegram_token,
        gemini_api_key: cli.gemini_api_key,
        gemini_model: cli.gemini_model,
        sqlite_path: cli.db,
        tick_seconds: cli.tick_seconds,
        utc_offset_minutes: cli.utc_offset_minutes,
        ..Config::default()
    };
    config.validate()?;

    let store = Arc::new(ReminderStore::new(&config.sqlite_path).await?);
    let interpreter = Arc::new(GeminiClient::new(
        &config.gemini_api_key,
        &config.gemini_model,
    ));
    let notifier = Arc::new(TelegramNotifier::new(&config.telegram_token));
    let scheduler = Arc::new(ReminderScheduler::new(
        store,
        interpreter,
        notifier,
        Duration::from_secs(config.tick_seconds),
    ));

    let (stop_tx, stop_rx) = watch::channel(false);
    let handle = scheduler.spawn(stop_rx);
    info!(db = %config.sqlite_path, "remind-bot daemon running");

    tokio::signal::ctrl_c()
        .await
        .map_err(|e| RemindBotError::Config(e.to_string()))?;
    info!("shutdown requested");
    let _ = stop_tx.send(true);
    let _ = handle.await;
    Ok(())
}
