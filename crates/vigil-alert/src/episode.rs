//! Breach episode records.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Compliance state recorded on an episode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplianceState {
    /// Risk inside the approved band.
    WithinBand,

    /// Risk outside the approved band.
    Breached,
}

impl ComplianceState {
    /// Convert to database string representation.
    pub const fn to_db_str(&self) -> &'static str {
        match self {
            Self::WithinBand => "within_band",
            Self::Breached => "breached",
        }
    }

    /// Parse from database string representation.
    pub fn from_db_str(s: &str) -> Option<Self> {
        match s {
            "within_band" => Some(Self::WithinBand),
            "breached" => Some(Self::Breached),
            _ => None,
        }
    }
}

/// Which transition a notification announces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    /// A breach episode opened.
    Opened,

    /// A breach episode resolved.
    Resolved,
}

impl NotificationKind {
    /// Convert to database string representation.
    pub const fn to_db_str(&self) -> &'static str {
        match self {
            Self::Opened => "opened",
            Self::Resolved => "resolved",
        }
    }

    /// Parse from database string representation.
    pub fn from_db_str(s: &str) -> Option<Self> {
        match s {
            "opened" => Some(Self::Opened),
            "resolved" => Some(Self::Resolved),
            _ => None,
        }
    }
}

/// A maximal contiguous span of breached evaluations for one client.
///
/// The current record per client is owned exclusively by the
/// deduplicator; an open episode has `closed_at == None`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreachEpisode {
    /// Client the episode belongs to.
    pub client_id: String,

    /// Stable identifier carried by every notification for this episode.
    pub episode_id: Uuid,

    /// Evaluation date the episode opened on.
    pub opened_at: NaiveDate,

    /// Evaluation date the episode resolved on, if it has.
    pub closed_at: Option<NaiveDate>,

    /// Most recent evaluation date that touched the episode.
    pub last_seen: NaiveDate,

    /// Compliance state observed at `last_seen`.
    pub last_state: ComplianceState,
}

impl BreachEpisode {
    /// Open a fresh episode for a breach first observed on `as_of`.
    pub fn open(client_id: impl Into<String>, as_of: NaiveDate) -> Self {
        Self {
            client_id: client_id.into(),
            episode_id: Uuid::new_v4(),
            opened_at: as_of,
            closed_at: None,
            last_seen: as_of,
            last_state: ComplianceState::Breached,
        }
    }

    /// Whether the episode is still open.
    pub const fn is_open(&self) -> bool {
        self.closed_at.is_none()
    }
}

/// An undelivered notification queued in the outbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingNotification {
    /// Outbox row id.
    pub id: i64,

    /// Client the notification targets.
    pub client_id: String,

    /// Episode the notification announces.
    pub episode_id: Uuid,

    /// Opened or resolved.
    pub kind: NotificationKind,

    /// Rendered summary body.
    pub summary: String,

    /// Delivery attempts made so far.
    pub attempts: u32,
}

/// One recorded episode transition, for audit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EpisodeEvent {
    /// Client the event belongs to.
    pub client_id: String,

    /// Episode the event touched.
    pub episode_id: Uuid,

    /// Transition name: `opened`, `observed` or `resolved`.
    pub event: String,

    /// Evaluation date the transition was decided for.
    pub as_of: NaiveDate,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_db_roundtrip() {
        for state in [ComplianceState::WithinBand, ComplianceState::Breached] {
            assert_eq!(ComplianceState::from_db_str(state.to_db_str()), Some(state));
        }
        assert_eq!(ComplianceState::from_db_str("bogus"), None);
    }

    #[test]
    fn test_kind_db_roundtrip() {
        for kind in [NotificationKind::Opened, NotificationKind::Resolved] {
            assert_eq!(NotificationKind::from_db_str(kind.to_db_str()), Some(kind));
        }
        assert_eq!(NotificationKind::from_db_str("bogus"), None);
    }

    #[test]
    fn test_open_episode() {
        let as_of = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let episode = BreachEpisode::open("acme", as_of);

        assert!(episode.is_open());
        assert_eq!(episode.opened_at, as_of);
        assert_eq!(episode.last_seen, as_of);
        assert_eq!(episode.last_state, ComplianceState::Breached);
    }
}
