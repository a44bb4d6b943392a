//! Durable episode state.
//!
//! The store holds the current [`BreachEpisode`] per client behind a
//! version token for conditional writes, an append-only transition log,
//! the notification outbox, and audit copies of estimates and risk
//! figures. Everything a transition produces commits in one transaction.

mod sqlite;

pub use sqlite::SqliteEpisodeStore;

use chrono::NaiveDate;
use thiserror::Error;
use vigil_risk::{PortfolioRiskFigure, VolatilityEstimate};

use crate::episode::{BreachEpisode, EpisodeEvent, NotificationKind, PendingNotification};

/// Errors from the episode store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying database failure.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// The conditional write lost to a concurrent writer. Not fatal;
    /// the caller re-reads and re-decides.
    #[error("Version conflict for client {client_id}")]
    VersionConflict {
        /// Client whose episode row was contended.
        client_id: String,
    },

    /// A stored record failed to parse back.
    #[error("Corrupt record for client {client_id}: {detail}")]
    Corrupt {
        /// Client whose record is unreadable.
        client_id: String,
        /// What failed to parse.
        detail: String,
    },
}

impl StoreError {
    /// Whether the error is a lost conditional write.
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::VersionConflict { .. })
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// The current episode record together with its version token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionedEpisode {
    /// Monotonic per-client version, bumped by every committed write.
    pub version: i64,

    /// The episode record.
    pub episode: BreachEpisode,
}

/// A notification queued as part of a transition commit.
#[derive(Debug, Clone, Copy)]
pub struct QueuedNotification<'a> {
    /// Opened or resolved.
    pub kind: NotificationKind,

    /// Rendered summary body.
    pub summary: &'a str,
}

/// One atomic episode transition: the new record, the audit event, and
/// any notification it produces.
#[derive(Debug, Clone)]
pub struct TransitionCommit<'a> {
    /// Version the current row must still carry; `None` means no row
    /// may exist yet for this client.
    pub expected_version: Option<i64>,

    /// Episode record to persist.
    pub episode: &'a BreachEpisode,

    /// Transition name for the audit log: `opened`, `observed` or
    /// `resolved`.
    pub event: &'static str,

    /// Evaluation date the transition was decided for.
    pub as_of: NaiveDate,

    /// Notification to queue in the outbox, if the transition emits one.
    pub notification: Option<QueuedNotification<'a>>,
}

/// Durable, versioned breach-episode state.
///
/// `load` returning `None` means the client has no history and is in
/// the no-episode state. `commit` is a conditional put: it succeeds
/// only if the stored version still matches [`TransitionCommit::expected_version`],
/// otherwise it fails with [`StoreError::VersionConflict`] and writes
/// nothing.
pub trait EpisodeStore: Send + Sync {
    /// Load the current episode record for a client.
    fn load(&self, client_id: &str) -> Result<Option<VersionedEpisode>>;

    /// Atomically persist a transition. Returns the new version.
    fn commit(&self, commit: &TransitionCommit<'_>) -> Result<i64>;

    /// Undelivered notifications, oldest first.
    fn pending_notifications(&self, limit: usize) -> Result<Vec<PendingNotification>>;

    /// Mark an outbox row delivered.
    fn mark_delivered(&self, id: i64) -> Result<()>;

    /// Record a failed delivery attempt. Returns the new attempt count.
    fn record_attempt(&self, id: i64) -> Result<u32>;

    /// Transition history for a client, most recent first.
    fn episode_events(&self, client_id: &str, limit: usize) -> Result<Vec<EpisodeEvent>>;

    /// Store per-asset estimates for audit.
    fn record_estimates(&self, estimates: &[VolatilityEstimate]) -> Result<()>;

    /// Stored estimates for a symbol over an inclusive date range,
    /// oldest first.
    fn estimate_history(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<VolatilityEstimate>>;

    /// Store a portfolio risk figure for audit.
    fn record_risk_figure(&self, figure: &PortfolioRiskFigure) -> Result<()>;

    /// Most recent risk figure for a client.
    fn latest_risk_figure(&self, client_id: &str) -> Result<Option<PortfolioRiskFigure>>;

    /// Risk figures for a client over an inclusive date range, oldest
    /// first.
    fn risk_history(
        &self,
        client_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PortfolioRiskFigure>>;
}
