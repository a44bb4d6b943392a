//! SQLite-backed episode store.

use std::path::Path;
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, params};
use tracing::info;
use uuid::Uuid;
use vigil_risk::{PortfolioRiskFigure, VolatilityEstimate};

use super::{
    EpisodeStore, QueuedNotification, Result, StoreError, TransitionCommit, VersionedEpisode,
};
use crate::episode::{
    BreachEpisode, ComplianceState, EpisodeEvent, NotificationKind, PendingNotification,
};

/// Episode store backed by a single SQLite database.
///
/// The connection is shared behind a mutex, so clones of the store hit
/// the same database. Conditional writes are enforced with version
/// predicates inside one transaction per commit.
#[derive(Debug, Clone)]
pub struct SqliteEpisodeStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteEpisodeStore {
    /// Open or create the store at the given path.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(&path)?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.initialize_schema()?;
        info!(path = %path.as_ref().display(), "opened episode store");
        Ok(store)
    }

    /// Create an in-memory store (useful for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.initialize_schema()?;
        Ok(store)
    }

    /// Initialize the database schema.
    fn initialize_schema(&self) -> Result<()> {
        let conn = self.conn.lock();

        // Current episode record per client, updated in place under a
        // version predicate.
        conn.execute(
            "CREATE TABLE IF NOT EXISTS episodes (
                client_id  TEXT PRIMARY KEY,
                version    INTEGER NOT NULL,
                episode_id TEXT NOT NULL,
                opened_at  TEXT NOT NULL,
                closed_at  TEXT,
                last_seen  TEXT NOT NULL,
                last_state TEXT NOT NULL
            )",
            [],
        )?;

        // Append-only transition log
        conn.execute(
            "CREATE TABLE IF NOT EXISTS episode_events (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                client_id   TEXT NOT NULL,
                episode_id  TEXT NOT NULL,
                event       TEXT NOT NULL,
                as_of       TEXT NOT NULL,
                recorded_at TEXT NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_events_client ON episode_events(client_id)",
            [],
        )?;

        // Notification outbox, written in the same transaction as the
        // transition that produced it.
        conn.execute(
            "CREATE TABLE IF NOT EXISTS outbox (
                id           INTEGER PRIMARY KEY AUTOINCREMENT,
                client_id    TEXT NOT NULL,
                episode_id   TEXT NOT NULL,
                kind         TEXT NOT NULL,
                summary      TEXT NOT NULL,
                attempts     INTEGER NOT NULL DEFAULT 0,
                queued_at    TEXT NOT NULL,
                delivered_at TEXT
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_outbox_pending ON outbox(delivered_at)",
            [],
        )?;

        // Audit copies of computed results
        conn.execute(
            "CREATE TABLE IF NOT EXISTS volatility_estimates (
                symbol      TEXT NOT NULL,
                as_of       TEXT NOT NULL,
                sigma       REAL NOT NULL,
                sample_size INTEGER NOT NULL,
                recorded_at TEXT NOT NULL,
                PRIMARY KEY (symbol, as_of)
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS risk_figures (
                client_id   TEXT NOT NULL,
                as_of       TEXT NOT NULL,
                risk_value  REAL NOT NULL,
                recorded_at TEXT NOT NULL,
                PRIMARY KEY (client_id, as_of)
            )",
            [],
        )?;

        Ok(())
    }
}

impl EpisodeStore for SqliteEpisodeStore {
    fn load(&self, client_id: &str) -> Result<Option<VersionedEpisode>> {
        let conn = self.conn.lock();
        let row = conn
            .query_row(
                "SELECT version, episode_id, opened_at, closed_at, last_seen, last_state
                 FROM episodes WHERE client_id = ?1",
                params![client_id],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, Option<String>>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, String>(5)?,
                    ))
                },
            )
            .optional()?;

        let Some((version, episode_id, opened_at, closed_at, last_seen, last_state)) = row else {
            return Ok(None);
        };

        let episode = BreachEpisode {
            client_id: client_id.to_string(),
            episode_id: parse_uuid(client_id, &episode_id)?,
            opened_at: parse_date(client_id, &opened_at)?,
            closed_at: closed_at
                .as_deref()
                .map(|s| parse_date(client_id, s))
                .transpose()?,
            last_seen: parse_date(client_id, &last_seen)?,
            last_state: ComplianceState::from_db_str(&last_state).ok_or_else(|| {
                StoreError::Corrupt {
                    client_id: client_id.to_string(),
                    detail: format!("unknown compliance state {last_state}"),
                }
            })?,
        };
        Ok(Some(VersionedEpisode { version, episode }))
    }

    fn commit(&self, commit: &TransitionCommit<'_>) -> Result<i64> {
        let episode = commit.episode;
        let conn = self.conn.lock();
        let tx = conn.unchecked_transaction()?;

        let new_version = match commit.expected_version {
            None => {
                let inserted = tx.execute(
                    "INSERT OR IGNORE INTO episodes
                     (client_id, version, episode_id, opened_at, closed_at, last_seen, last_state)
                     VALUES (?1, 1, ?2, ?3, ?4, ?5, ?6)",
                    params![
                        episode.client_id,
                        episode.episode_id.to_string(),
                        episode.opened_at.to_string(),
                        episode.closed_at.map(|d| d.to_string()),
                        episode.last_seen.to_string(),
                        episode.last_state.to_db_str(),
                    ],
                )?;
                if inserted == 0 {
                    return Err(StoreError::VersionConflict {
                        client_id: episode.client_id.clone(),
                    });
                }
                1
            }
            Some(expected) => {
                let updated = tx.execute(
                    "UPDATE episodes
                     SET version = ?1, episode_id = ?2, opened_at = ?3, closed_at = ?4,
                         last_seen = ?5, last_state = ?6
                     WHERE client_id = ?7 AND version = ?8",
                    params![
                        expected + 1,
                        episode.episode_id.to_string(),
                        episode.opened_at.to_string(),
                        episode.closed_at.map(|d| d.to_string()),
                        episode.last_seen.to_string(),
                        episode.last_state.to_db_str(),
                        episode.client_id,
                        expected,
                    ],
                )?;
                if updated == 0 {
                    return Err(StoreError::VersionConflict {
                        client_id: episode.client_id.clone(),
                    });
                }
                expected + 1
            }
        };

        let recorded_at = Utc::now().to_rfc3339();
        tx.execute(
            "INSERT INTO episode_events (client_id, episode_id, event, as_of, recorded_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                episode.client_id,
                episode.episode_id.to_string(),
                commit.event,
                commit.as_of.to_string(),
                recorded_at,
            ],
        )?;

        if let Some(QueuedNotification { kind, summary }) = commit.notification {
            tx.execute(
                "INSERT INTO outbox (client_id, episode_id, kind, summary, attempts, queued_at)
                 VALUES (?1, ?2, ?3, ?4, 0, ?5)",
                params![
                    episode.client_id,
                    episode.episode_id.to_string(),
                    kind.to_db_str(),
                    summary,
                    recorded_at,
                ],
            )?;
        }

        tx.commit()?;
        Ok(new_version)
    }

    fn pending_notifications(&self, limit: usize) -> Result<Vec<PendingNotification>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, client_id, episode_id, kind, summary, attempts
             FROM outbox
             WHERE delivered_at IS NULL
             ORDER BY id ASC
             LIMIT ?1",
        )?;

        let rows = stmt.query_map(params![limit as i64], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, i64>(5)?,
            ))
        })?;

        let mut pending = Vec::new();
        for row in rows {
            let (id, client_id, episode_id, kind, summary, attempts) = row?;
            pending.push(PendingNotification {
                id,
                episode_id: parse_uuid(&client_id, &episode_id)?,
                kind: NotificationKind::from_db_str(&kind).ok_or_else(|| StoreError::Corrupt {
                    client_id: client_id.clone(),
                    detail: format!("unknown notification kind {kind}"),
                })?,
                client_id,
                summary,
                attempts: attempts as u32,
            });
        }
        Ok(pending)
    }

    fn mark_delivered(&self, id: i64) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE outbox SET delivered_at = ?1 WHERE id = ?2",
            params![Utc::now().to_rfc3339(), id],
        )?;
        Ok(())
    }

    fn record_attempt(&self, id: i64) -> Result<u32> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE outbox SET attempts = attempts + 1 WHERE id = ?1",
            params![id],
        )?;
        let attempts: i64 = conn.query_row(
            "SELECT attempts FROM outbox WHERE id = ?1",
            params![id],
            |row| row.get(0),
        )?;
        Ok(attempts as u32)
    }

    fn episode_events(&self, client_id: &str, limit: usize) -> Result<Vec<EpisodeEvent>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT episode_id, event, as_of FROM episode_events
             WHERE client_id = ?1
             ORDER BY id DESC
             LIMIT ?2",
        )?;

        let rows = stmt.query_map(params![client_id, limit as i64], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;

        let mut events = Vec::new();
        for row in rows {
            let (episode_id, event, as_of) = row?;
            events.push(EpisodeEvent {
                client_id: client_id.to_string(),
                episode_id: parse_uuid(client_id, &episode_id)?,
                event,
                as_of: parse_date(client_id, &as_of)?,
            });
        }
        Ok(events)
    }

    fn record_estimates(&self, estimates: &[VolatilityEstimate]) -> Result<()> {
        let conn = self.conn.lock();
        let tx = conn.unchecked_transaction()?;
        let recorded_at = Utc::now().to_rfc3339();

        for estimate in estimates {
            tx.execute(
                "INSERT OR REPLACE INTO volatility_estimates
                 (symbol, as_of, sigma, sample_size, recorded_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    estimate.symbol,
                    estimate.as_of.to_string(),
                    estimate.sigma,
                    estimate.sample_size as i64,
                    recorded_at,
                ],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    fn estimate_history(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<VolatilityEstimate>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT as_of, sigma, sample_size FROM volatility_estimates
             WHERE symbol = ?1 AND as_of >= ?2 AND as_of <= ?3
             ORDER BY as_of ASC",
        )?;

        let rows = stmt.query_map(params![symbol, start.to_string(), end.to_string()], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, f64>(1)?,
                row.get::<_, i64>(2)?,
            ))
        })?;

        let mut estimates = Vec::new();
        for row in rows {
            let (as_of, sigma, sample_size) = row?;
            estimates.push(VolatilityEstimate {
                symbol: symbol.to_string(),
                as_of: parse_date(symbol, &as_of)?,
                sigma,
                sample_size: sample_size as usize,
            });
        }
        Ok(estimates)
    }

    fn record_risk_figure(&self, figure: &PortfolioRiskFigure) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR REPLACE INTO risk_figures (client_id, as_of, risk_value, recorded_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                figure.client_id,
                figure.as_of.to_string(),
                figure.risk_value,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn latest_risk_figure(&self, client_id: &str) -> Result<Option<PortfolioRiskFigure>> {
        let conn = self.conn.lock();
        let row = conn
            .query_row(
                "SELECT as_of, risk_value FROM risk_figures
                 WHERE client_id = ?1
                 ORDER BY as_of DESC
                 LIMIT 1",
                params![client_id],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?)),
            )
            .optional()?;

        let Some((as_of, risk_value)) = row else {
            return Ok(None);
        };
        Ok(Some(PortfolioRiskFigure {
            client_id: client_id.to_string(),
            as_of: parse_date(client_id, &as_of)?,
            risk_value,
        }))
    }

    fn risk_history(
        &self,
        client_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PortfolioRiskFigure>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT as_of, risk_value FROM risk_figures
             WHERE client_id = ?1 AND as_of >= ?2 AND as_of <= ?3
             ORDER BY as_of ASC",
        )?;

        let rows = stmt.query_map(
            params![client_id, start.to_string(), end.to_string()],
            |row| Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?)),
        )?;

        let mut figures = Vec::new();
        for row in rows {
            let (as_of, risk_value) = row?;
            figures.push(PortfolioRiskFigure {
                client_id: client_id.to_string(),
                as_of: parse_date(client_id, &as_of)?,
                risk_value,
            });
        }
        Ok(figures)
    }
}

fn parse_date(client_id: &str, s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|e| StoreError::Corrupt {
        client_id: client_id.to_string(),
        detail: format!("bad date {s}: {e}"),
    })
}

fn parse_uuid(client_id: &str, s: &str) -> Result<Uuid> {
    Uuid::parse_str(s).map_err(|e| StoreError::Corrupt {
        client_id: client_id.to_string(),
        detail: format!("bad episode id {s}: {e}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::episode::NotificationKind;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn opened_commit<'a>(episode: &'a BreachEpisode, summary: &'a str) -> TransitionCommit<'a> {
        TransitionCommit {
            expected_version: None,
            episode,
            event: "opened",
            as_of: episode.opened_at,
            notification: Some(QueuedNotification {
                kind: NotificationKind::Opened,
                summary,
            }),
        }
    }

    #[test]
    fn test_store_initialization() {
        assert!(SqliteEpisodeStore::in_memory().is_ok());
    }

    #[test]
    fn test_load_missing_client() {
        let store = SqliteEpisodeStore::in_memory().unwrap();
        assert_eq!(store.load("acme").unwrap(), None);
    }

    #[test]
    fn test_commit_and_load_roundtrip() {
        let store = SqliteEpisodeStore::in_memory().unwrap();
        let episode = BreachEpisode::open("acme", date(2024, 3, 1));

        let version = store.commit(&opened_commit(&episode, "opened")).unwrap();
        assert_eq!(version, 1);

        let loaded = store.load("acme").unwrap().unwrap();
        assert_eq!(loaded.version, 1);
        assert_eq!(loaded.episode, episode);
    }

    #[test]
    fn test_conditional_insert_conflict() {
        let store = SqliteEpisodeStore::in_memory().unwrap();
        let episode = BreachEpisode::open("acme", date(2024, 3, 1));

        store.commit(&opened_commit(&episode, "opened")).unwrap();
        let err = store
            .commit(&opened_commit(&episode, "opened again"))
            .unwrap_err();
        assert!(err.is_conflict());
    }

    #[test]
    fn test_conditional_update_conflict() {
        let store = SqliteEpisodeStore::in_memory().unwrap();
        let mut episode = BreachEpisode::open("acme", date(2024, 3, 1));
        store.commit(&opened_commit(&episode, "opened")).unwrap();

        episode.last_seen = date(2024, 3, 2);
        let stale = TransitionCommit {
            expected_version: Some(7),
            episode: &episode,
            event: "observed",
            as_of: episode.last_seen,
            notification: None,
        };
        assert!(store.commit(&stale).unwrap_err().is_conflict());

        let fresh = TransitionCommit {
            expected_version: Some(1),
            episode: &episode,
            event: "observed",
            as_of: episode.last_seen,
            notification: None,
        };
        assert_eq!(store.commit(&fresh).unwrap(), 2);
    }

    #[test]
    fn test_conflicted_commit_writes_nothing() {
        let store = SqliteEpisodeStore::in_memory().unwrap();
        let episode = BreachEpisode::open("acme", date(2024, 3, 1));
        store.commit(&opened_commit(&episode, "first")).unwrap();

        let rival = BreachEpisode::open("acme", date(2024, 3, 1));
        assert!(store.commit(&opened_commit(&rival, "second")).is_err());

        // The losing commit must not leave an outbox row or event behind.
        let pending = store.pending_notifications(10).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].episode_id, episode.episode_id);
        assert_eq!(store.episode_events("acme", 10).unwrap().len(), 1);
    }

    #[test]
    fn test_outbox_lifecycle() {
        let store = SqliteEpisodeStore::in_memory().unwrap();
        let episode = BreachEpisode::open("acme", date(2024, 3, 1));
        store
            .commit(&opened_commit(&episode, "risk drift detected"))
            .unwrap();

        let pending = store.pending_notifications(10).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].kind, NotificationKind::Opened);
        assert_eq!(pending[0].summary, "risk drift detected");
        assert_eq!(pending[0].attempts, 0);

        assert_eq!(store.record_attempt(pending[0].id).unwrap(), 1);
        assert_eq!(store.record_attempt(pending[0].id).unwrap(), 2);

        store.mark_delivered(pending[0].id).unwrap();
        assert!(store.pending_notifications(10).unwrap().is_empty());
    }

    #[test]
    fn test_persistence_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.db");
        let episode = BreachEpisode::open("acme", date(2024, 3, 1));

        {
            let store = SqliteEpisodeStore::new(&path).unwrap();
            store.commit(&opened_commit(&episode, "opened")).unwrap();
        }

        let store = SqliteEpisodeStore::new(&path).unwrap();
        let loaded = store.load("acme").unwrap().unwrap();
        assert_eq!(loaded.version, 1);
        assert_eq!(loaded.episode.episode_id, episode.episode_id);
        assert!(loaded.episode.is_open());
        assert_eq!(store.pending_notifications(10).unwrap().len(), 1);
    }

    #[test]
    fn test_audit_records() {
        let store = SqliteEpisodeStore::in_memory().unwrap();
        let estimates = vec![
            VolatilityEstimate {
                symbol: "AAPL".to_string(),
                as_of: date(2024, 3, 1),
                sigma: 0.22,
                sample_size: 30,
            },
            VolatilityEstimate {
                symbol: "MSFT".to_string(),
                as_of: date(2024, 3, 1),
                sigma: 0.18,
                sample_size: 30,
            },
        ];
        store.record_estimates(&estimates).unwrap();
        // Re-recording the same key overwrites rather than failing.
        store.record_estimates(&estimates).unwrap();
        store
            .record_estimates(&[VolatilityEstimate {
                symbol: "AAPL".to_string(),
                as_of: date(2024, 3, 8),
                sigma: 0.24,
                sample_size: 31,
            }])
            .unwrap();

        let sigmas = store
            .estimate_history("AAPL", date(2024, 3, 1), date(2024, 3, 8))
            .unwrap();
        assert_eq!(sigmas.len(), 2);
        assert_eq!(sigmas[0].as_of, date(2024, 3, 1));
        assert_eq!(sigmas[0].sigma, 0.22);
        assert_eq!(sigmas[1].sample_size, 31);
        assert!(
            store
                .estimate_history("MSFT", date(2024, 4, 1), date(2024, 4, 30))
                .unwrap()
                .is_empty()
        );

        for (day, value) in [(1, 0.20), (4, 0.35), (5, 0.25)] {
            store
                .record_risk_figure(&PortfolioRiskFigure {
                    client_id: "acme".to_string(),
                    as_of: date(2024, 3, day),
                    risk_value: value,
                })
                .unwrap();
        }

        let latest = store.latest_risk_figure("acme").unwrap().unwrap();
        assert_eq!(latest.as_of, date(2024, 3, 5));
        assert_eq!(latest.risk_value, 0.25);
        assert_eq!(store.latest_risk_figure("unknown").unwrap(), None);

        let history = store
            .risk_history("acme", date(2024, 3, 1), date(2024, 3, 4))
            .unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].as_of, date(2024, 3, 1));
        assert_eq!(history[1].as_of, date(2024, 3, 4));
    }
}
