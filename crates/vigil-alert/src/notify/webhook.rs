//! Webhook notification delivery.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::debug;

use super::{NotificationChannel, NotifyError};
use crate::episode::PendingNotification;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Posts notifications as JSON to a configured HTTP endpoint.
#[derive(Debug, Clone)]
pub struct WebhookChannel {
    client: reqwest::Client,
    endpoint: String,
}

impl WebhookChannel {
    /// Create a channel posting to the given endpoint URL.
    ///
    /// # Errors
    ///
    /// [`NotifyError::Http`] if the HTTP client cannot be constructed.
    pub fn new(endpoint: impl Into<String>) -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }
}

/// JSON body posted for one notification.
fn payload(notification: &PendingNotification) -> Value {
    json!({
        "client_id": notification.client_id,
        "episode_id": notification.episode_id,
        "kind": notification.kind,
        "summary": notification.summary,
    })
}

#[async_trait]
impl NotificationChannel for WebhookChannel {
    fn name(&self) -> &'static str {
        "webhook"
    }

    async fn deliver(&self, notification: &PendingNotification) -> Result<(), NotifyError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&payload(notification))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(NotifyError::Rejected {
                status: status.as_u16(),
            });
        }
        debug!(
            client_id = %notification.client_id,
            kind = notification.kind.to_db_str(),
            "webhook delivered"
        );
        Ok(())
    }
}
