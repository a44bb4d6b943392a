//! Log-only notification delivery.

use async_trait::async_trait;
use tracing::info;

use super::{NotificationChannel, NotifyError};
use crate::episode::PendingNotification;

/// Writes notifications to the structured log instead of an external
/// endpoint. The default channel for dry runs and local setups.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogChannel;

impl LogChannel {
    /// Create a log channel.
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl NotificationChannel for LogChannel {
    fn name(&self) -> &'static str {
        "log"
    }

    async fn deliver(&self, notification: &PendingNotification) -> Result<(), NotifyError> {
        info!(
            client_id = %notification.client_id,
            episode_id = %notification.episode_id,
            kind = notification.kind.to_db_str(),
            summary = %notification.summary,
            "notification"
        );
        Ok(())
    }
}
