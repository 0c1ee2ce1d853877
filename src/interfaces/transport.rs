use async_trait::async_trait;

use crate::error::Result;

/// Outbound notification delivery. Any error is treated as transient by the
/// scheduler loop and retried on the next tick.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, chat_id: i64, text: &str) -> Result<()>;
}
