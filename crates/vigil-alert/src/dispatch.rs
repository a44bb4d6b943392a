//! Outbox dispatch.
//!
//! Notifications are queued in the outbox inside the transition commit
//! and drained strictly afterwards. A delivery failure never reverts a
//! committed transition; the row stays queued for the next drain.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;
use tracing::{error, info, warn};
use vigil_data::RetryPolicy;

use crate::notify::{NotificationChannel, NotifyError};
use crate::store::{EpisodeStore, StoreError};

/// Delivery attempts per outbox row, across drains, before the row is
/// escalated instead of retried.
pub const DEFAULT_ATTEMPT_CAP: u32 = 10;

const DEFAULT_BATCH_SIZE: usize = 100;

/// Outcome counts for one outbox drain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Notifications delivered and marked as such.
    pub delivered: usize,

    /// Notifications that failed this drain and stay queued.
    pub deferred: usize,

    /// Notifications past the attempt cap, reported as operational
    /// failures and left queued for intervention.
    pub escalated: usize,
}

/// Errors from draining the outbox.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The store failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Drains committed notifications from the outbox to a channel.
#[derive(Clone)]
pub struct OutboxDispatcher {
    store: Arc<dyn EpisodeStore>,
    channel: Arc<dyn NotificationChannel>,
    retry: RetryPolicy,
    attempt_cap: u32,
    batch_size: usize,
}

impl fmt::Debug for OutboxDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutboxDispatcher")
            .field("channel", &self.channel.name())
            .field("retry", &self.retry)
            .field("attempt_cap", &self.attempt_cap)
            .finish_non_exhaustive()
    }
}

impl OutboxDispatcher {
    /// Create a dispatcher draining `store` into `channel`.
    pub fn new(store: Arc<dyn EpisodeStore>, channel: Arc<dyn NotificationChannel>) -> Self {
        Self {
            store,
            channel,
            retry: RetryPolicy::default(),
            attempt_cap: DEFAULT_ATTEMPT_CAP,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    /// Override the in-drain retry policy.
    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Override the cross-drain attempt cap.
    #[must_use]
    pub fn with_attempt_cap(mut self, attempt_cap: u32) -> Self {
        self.attempt_cap = attempt_cap.max(1);
        self
    }

    /// Deliver all queued notifications, oldest first.
    ///
    /// # Errors
    ///
    /// [`DispatchError::Store`] when outbox bookkeeping fails. Channel
    /// failures are not errors; they are counted in the report.
    pub async fn drain(&self) -> Result<DispatchReport, DispatchError> {
        let pending = self.store.pending_notifications(self.batch_size)?;
        let mut report = DispatchReport::default();

        for notification in pending {
            if notification.attempts >= self.attempt_cap {
                error!(
                    client_id = %notification.client_id,
                    episode_id = %notification.episode_id,
                    attempts = notification.attempts,
                    "notification exceeded delivery attempts, needs operator attention"
                );
                report.escalated += 1;
                continue;
            }

            let outcome = self
                .retry
                .run("notification delivery", NotifyError::is_transient, || {
                    self.channel.deliver(&notification)
                })
                .await;

            match outcome {
                Ok(()) => {
                    self.store.mark_delivered(notification.id)?;
                    info!(
                        client_id = %notification.client_id,
                        kind = notification.kind.to_db_str(),
                        channel = self.channel.name(),
                        "notification delivered"
                    );
                    report.delivered += 1;
                }
                Err(err) => {
                    let attempts = self.store.record_attempt(notification.id)?;
                    warn!(
                        client_id = %notification.client_id,
                        attempts,
                        error = %err,
                        "notification delivery failed, leaving queued"
                    );
                    report.deferred += 1;
                }
            }
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::episode::{BreachEpisode, NotificationKind, PendingNotification};
    use crate::store::{QueuedNotification, SqliteEpisodeStore, TransitionCommit};
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    struct FakeChannel {
        failures_left: AtomicU32,
        transient: bool,
        delivered: Mutex<Vec<NotificationKind>>,
    }

    impl FakeChannel {
        fn reliable() -> Self {
            Self {
                failures_left: AtomicU32::new(0),
                transient: false,
                delivered: Mutex::new(Vec::new()),
            }
        }

        fn failing(failures: u32, transient: bool) -> Self {
            Self {
                failures_left: AtomicU32::new(failures),
                transient,
                delivered: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl NotificationChannel for FakeChannel {
        fn name(&self) -> &'static str {
            "fake"
        }

        async fn deliver(&self, notification: &PendingNotification) -> Result<(), NotifyError> {
            let failing = self
                .failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if failing {
                return if self.transient {
                    Err(NotifyError::Rejected { status: 503 })
                } else {
                    Err(NotifyError::Channel("endpoint misconfigured".to_string()))
                };
            }
            self.delivered.lock().push(notification.kind);
            Ok(())
        }
    }

    fn fast_retry() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(4),
            multiplier: 2.0,
        }
    }

    fn store_with_queued() -> Arc<SqliteEpisodeStore> {
        let store = Arc::new(SqliteEpisodeStore::in_memory().unwrap());
        let episode =
            BreachEpisode::open("acme", NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
        store
            .commit(&TransitionCommit {
                expected_version: None,
                episode: &episode,
                event: "opened",
                as_of: episode.opened_at,
                notification: Some(QueuedNotification {
                    kind: NotificationKind::Opened,
                    summary: "risk above band",
                }),
            })
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_drain_delivers_and_marks() {
        let store = store_with_queued();
        let channel = Arc::new(FakeChannel::reliable());
        let dispatcher = OutboxDispatcher::new(store.clone(), channel.clone());

        let report = dispatcher.drain().await.unwrap();
        assert_eq!(report.delivered, 1);
        assert_eq!(report.deferred, 0);
        assert!(store.pending_notifications(10).unwrap().is_empty());
        assert_eq!(*channel.delivered.lock(), vec![NotificationKind::Opened]);

        // Nothing left for the next drain.
        let report = dispatcher.drain().await.unwrap();
        assert_eq!(report, DispatchReport::default());
    }

    #[tokio::test]
    async fn test_transient_failure_retried_within_drain() {
        let store = store_with_queued();
        let channel = Arc::new(FakeChannel::failing(1, true));
        let dispatcher =
            OutboxDispatcher::new(store.clone(), channel.clone()).with_retry_policy(fast_retry());

        let report = dispatcher.drain().await.unwrap();
        assert_eq!(report.delivered, 1);
        assert!(store.pending_notifications(10).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_delivery_stays_queued() {
        let store = store_with_queued();
        let channel = Arc::new(FakeChannel::failing(u32::MAX, false));
        let dispatcher =
            OutboxDispatcher::new(store.clone(), channel.clone()).with_retry_policy(fast_retry());

        let report = dispatcher.drain().await.unwrap();
        assert_eq!(report.delivered, 0);
        assert_eq!(report.deferred, 1);

        let pending = store.pending_notifications(10).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].attempts, 1);
    }

    #[tokio::test]
    async fn test_attempt_cap_escalates() {
        let store = store_with_queued();
        let pending = store.pending_notifications(10).unwrap();
        for _ in 0..DEFAULT_ATTEMPT_CAP {
            store.record_attempt(pending[0].id).unwrap();
        }

        let channel = Arc::new(FakeChannel::reliable());
        let dispatcher = OutboxDispatcher::new(store.clone(), channel.clone());

        let report = dispatcher.drain().await.unwrap();
        assert_eq!(report.escalated, 1);
        assert_eq!(report.delivered, 0);
        // The channel was never asked; the row stays queued.
        assert!(channel.delivered.lock().is_empty());
        assert_eq!(store.pending_notifications(10).unwrap().len(), 1);
    }
}
