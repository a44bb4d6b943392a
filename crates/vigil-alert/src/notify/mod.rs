//! Notification delivery channels.

mod log;
mod webhook;

pub use log::LogChannel;
pub use webhook::WebhookChannel;

use async_trait::async_trait;
use thiserror::Error;

use crate::episode::PendingNotification;

/// Errors from notification delivery.
#[derive(Debug, Error)]
pub enum NotifyError {
    /// HTTP transport failure.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The endpoint answered with a non-success status.
    #[error("Delivery rejected with status {status}")]
    Rejected {
        /// HTTP status code.
        status: u16,
    },

    /// Channel-specific failure.
    #[error("Channel error: {0}")]
    Channel(String),
}

impl NotifyError {
    /// Whether retrying the delivery may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http(_) => true,
            Self::Rejected { status } => *status == 429 || *status >= 500,
            Self::Channel(_) => false,
        }
    }
}

/// An outbound channel that accepts rendered notifications.
///
/// Delivery is at-least-once: a channel may see the same notification
/// twice after a crash between delivery and bookkeeping, so receivers
/// key on the episode id and kind.
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    /// Channel name for logs and reports.
    fn name(&self) -> &'static str;

    /// Deliver a single notification.
    async fn deliver(&self, notification: &PendingNotification) -> Result<(), NotifyError>;
}
