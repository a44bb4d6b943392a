//! Breach-episode deduplication.
//!
//! One deduplicator instance serves all clients; per-client state lives
//! entirely in the [`EpisodeStore`]. Each evaluation is applied as a
//! read-decide-commit sequence against the versioned episode record, so
//! a sustained breach notifies once when it opens and once when it
//! resolves no matter how many cycles, processes or retries observe it.
//!
//! Transitions:
//!
//! - no episode + breached: open an episode, queue an `opened`
//!   notification
//! - open episode + breached: update `last_seen`, queue nothing
//! - open episode + within band: close the episode, queue a `resolved`
//!   notification
//! - no episode + within band: no write at all
//! - skipped evaluation: state is preserved verbatim, nothing is
//!   written or queued
//!
//! A lost conditional write means another run committed first; the
//! decision is recomputed against the committed state rather than
//! retried blindly.

use std::fmt;
use std::sync::Arc;

use chrono::NaiveDate;
use thiserror::Error;
use tracing::{info, warn};

use crate::episode::{BreachEpisode, ComplianceState, NotificationKind};
use crate::evaluator::EvaluationOutcome;
use crate::store::{
    EpisodeStore, QueuedNotification, StoreError, TransitionCommit, VersionedEpisode,
};

/// Commit attempts before a contended client cycle is deferred.
pub const DEFAULT_MAX_COMMIT_ATTEMPTS: u32 = 4;

/// The applied episode transition for one evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// A new episode opened; an `opened` notification was queued.
    Opened(BreachEpisode),

    /// An already-open episode saw another breach; only `last_seen`
    /// moved, nothing was queued.
    StillBreached(BreachEpisode),

    /// An open episode closed; a `resolved` notification was queued.
    Resolved(BreachEpisode),

    /// Within band with no open episode; nothing was written.
    Clear,

    /// The evaluation was skipped; episode state was not touched.
    Skipped {
        /// Why the evaluation was skipped.
        reason: String,
    },
}

impl Transition {
    /// The notification kind this transition queued, if any.
    pub const fn notified(&self) -> Option<NotificationKind> {
        match self {
            Self::Opened(_) => Some(NotificationKind::Opened),
            Self::Resolved(_) => Some(NotificationKind::Resolved),
            Self::StillBreached(_) | Self::Clear | Self::Skipped { .. } => None,
        }
    }
}

/// Errors from applying an evaluation to episode state.
#[derive(Debug, Error)]
pub enum DedupError {
    /// The store failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Every commit attempt lost to concurrent writers; the cycle is
    /// deferred rather than forced.
    #[error("Episode write for {client_id} conflicted {attempts} times, deferring")]
    ConflictExhausted {
        /// Client whose episode row stayed contended.
        client_id: String,
        /// Attempts made.
        attempts: u32,
    },
}

/// Applies compliance evaluations to per-client breach episodes.
#[derive(Clone)]
pub struct BreachDeduplicator {
    store: Arc<dyn EpisodeStore>,
    max_attempts: u32,
}

impl fmt::Debug for BreachDeduplicator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BreachDeduplicator")
            .field("max_attempts", &self.max_attempts)
            .finish_non_exhaustive()
    }
}

impl BreachDeduplicator {
    /// Create a deduplicator over the given store.
    pub fn new(store: Arc<dyn EpisodeStore>) -> Self {
        Self {
            store,
            max_attempts: DEFAULT_MAX_COMMIT_ATTEMPTS,
        }
    }

    /// Override the commit attempt budget. At least one attempt is
    /// always made.
    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Apply one evaluation outcome for a client and date.
    ///
    /// `summary` is the rendered notification body used if this
    /// evaluation opens or resolves an episode.
    ///
    /// # Errors
    ///
    /// [`DedupError::ConflictExhausted`] when every commit attempt lost
    /// to a concurrent writer; [`DedupError::Store`] on store failure.
    pub fn apply(
        &self,
        client_id: &str,
        as_of: NaiveDate,
        outcome: &EvaluationOutcome,
        summary: &str,
    ) -> Result<Transition, DedupError> {
        let observed = match outcome {
            EvaluationOutcome::Skipped { reason } => {
                info!(client_id, reason, "evaluation skipped, episode state untouched");
                return Ok(Transition::Skipped {
                    reason: reason.clone(),
                });
            }
            EvaluationOutcome::Breached(_) => ComplianceState::Breached,
            EvaluationOutcome::WithinBand => ComplianceState::WithinBand,
        };

        for attempt in 1..=self.max_attempts {
            let current = self.store.load(client_id)?;
            let Some(decision) = plan(client_id, as_of, observed, current.as_ref()) else {
                return Ok(Transition::Clear);
            };

            let commit = TransitionCommit {
                expected_version: decision.expected_version,
                episode: &decision.episode,
                event: decision.kind.event(),
                as_of,
                notification: decision
                    .kind
                    .notify()
                    .map(|kind| QueuedNotification { kind, summary }),
            };
            match self.store.commit(&commit) {
                Ok(version) => {
                    info!(
                        client_id,
                        event = decision.kind.event(),
                        version,
                        as_of = %as_of,
                        "episode transition committed"
                    );
                    let Decision { episode, kind, .. } = decision;
                    return Ok(match kind {
                        TransitionKind::Opened => Transition::Opened(episode),
                        TransitionKind::Observed => Transition::StillBreached(episode),
                        TransitionKind::Resolved => Transition::Resolved(episode),
                    });
                }
                Err(err) if err.is_conflict() => {
                    warn!(client_id, attempt, "episode write conflicted, re-reading");
                }
                Err(err) => return Err(err.into()),
            }
        }

        Err(DedupError::ConflictExhausted {
            client_id: client_id.to_string(),
            attempts: self.max_attempts,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TransitionKind {
    Opened,
    Observed,
    Resolved,
}

impl TransitionKind {
    const fn event(self) -> &'static str {
        match self {
            Self::Opened => "opened",
            Self::Observed => "observed",
            Self::Resolved => "resolved",
        }
    }

    const fn notify(self) -> Option<NotificationKind> {
        match self {
            Self::Opened => Some(NotificationKind::Opened),
            Self::Resolved => Some(NotificationKind::Resolved),
            Self::Observed => None,
        }
    }
}

struct Decision {
    expected_version: Option<i64>,
    episode: BreachEpisode,
    kind: TransitionKind,
}

/// Decide the transition for an observed state against the current
/// record. `None` means nothing to write.
fn plan(
    client_id: &str,
    as_of: NaiveDate,
    observed: ComplianceState,
    current: Option<&VersionedEpisode>,
) -> Option<Decision> {
    let open = current.filter(|v| v.episode.is_open());
    match observed {
        ComplianceState::Breached => match open {
            Some(v) => {
                let mut episode = v.episode.clone();
                episode.last_seen = as_of;
                episode.last_state = ComplianceState::Breached;
                Some(Decision {
                    expected_version: Some(v.version),
                    episode,
                    kind: TransitionKind::Observed,
                })
            }
            // A closed record still carries a version; the fresh episode
            // replaces it under the same conditional write.
            None => Some(Decision {
                expected_version: current.map(|v| v.version),
                episode: BreachEpisode::open(client_id, as_of),
                kind: TransitionKind::Opened,
            }),
        },
        ComplianceState::WithinBand => {
            let v = open?;
            let mut episode = v.episode.clone();
            episode.closed_at = Some(as_of);
            episode.last_seen = as_of;
            episode.last_state = ComplianceState::WithinBand;
            Some(Decision {
                expected_version: Some(v.version),
                episode,
                kind: TransitionKind::Resolved,
            })
        }
    }
}
