//! SQLite price archive.
//!
//! Every fetched observation is archived before the pipeline consumes it,
//! so any produced risk figure can be traced back to the exact inputs.
//! Latest write wins per (symbol, date), matching the normalizer's
//! duplicate policy.

use std::path::Path;
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, params};
use tracing::info;

use crate::error::{DataError, Result};
use crate::series::PriceObservation;

const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS prices (
    symbol     TEXT NOT NULL,
    date       TEXT NOT NULL,
    price      REAL NOT NULL,
    fetched_at TEXT NOT NULL,
    PRIMARY KEY (symbol, date)
);
";

/// Archive of raw fetched prices.
#[derive(Debug, Clone)]
pub struct PriceArchive {
    conn: Arc<Mutex<Connection>>,
}

/// Row counts for inspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchiveStats {
    /// Distinct symbols archived.
    pub symbols: usize,
    /// Total archived observations.
    pub observations: usize,
}

impl PriceArchive {
    /// Open (or create) an archive at the given path.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path.as_ref())?;
        let archive = Self::init(conn)?;
        info!(path = %path.as_ref().display(), "price archive opened");
        Ok(archive)
    }

    /// Open an in-memory archive. Used in tests.
    pub fn in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Archive raw observations for a symbol, overwriting any prior write
    /// for the same date. Returns the number of rows written.
    pub fn store_observations(
        &self,
        symbol: &str,
        observations: &[PriceObservation],
    ) -> Result<usize> {
        let fetched_at = Utc::now().to_rfc3339();
        let conn = self.conn.lock();
        let tx = conn.unchecked_transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT OR REPLACE INTO prices (symbol, date, price, fetched_at)
                 VALUES (?1, ?2, ?3, ?4)",
            )?;
            for obs in observations {
                stmt.execute(params![symbol, obs.date.to_string(), obs.price, fetched_at])?;
            }
        }
        tx.commit()?;
        Ok(observations.len())
    }

    /// Archived observations for a symbol within a date range, in date
    /// order.
    pub fn observations(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PriceObservation>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT date, price FROM prices
             WHERE symbol = ?1 AND date >= ?2 AND date <= ?3
             ORDER BY date",
        )?;
        let rows = stmt.query_map(
            params![symbol, start.to_string(), end.to_string()],
            |row| Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?)),
        )?;

        let mut observations = Vec::new();
        for row in rows {
            let (date, price) = row?;
            let date = NaiveDate::parse_from_str(&date, "%Y-%m-%d")
                .map_err(|e| DataError::Parse(format!("bad archived date {date}: {e}")))?;
            observations.push(PriceObservation::new(date, price));
        }
        Ok(observations)
    }

    /// Most recent archived date for a symbol.
    pub fn latest_date(&self, symbol: &str) -> Result<Option<NaiveDate>> {
        let conn = self.conn.lock();
        let date: Option<String> = conn
            .query_row(
                "SELECT MAX(date) FROM prices WHERE symbol = ?1",
                params![symbol],
                |row| row.get(0),
            )
            .optional()?
            .flatten();

        date.map(|d| {
            NaiveDate::parse_from_str(&d, "%Y-%m-%d")
                .map_err(|e| DataError::Parse(format!("bad archived date {d}: {e}")))
        })
        .transpose()
    }

    /// Archive-wide row counts.
    pub fn stats(&self) -> Result<ArchiveStats> {
        let conn = self.conn.lock();
        let symbols: i64 = conn.query_row(
            "SELECT COUNT(DISTINCT symbol) FROM prices",
            [],
            |row| row.get(0),
        )?;
        let observations: i64 =
            conn.query_row("SELECT COUNT(*) FROM prices", [], |row| row.get(0))?;

        Ok(ArchiveStats {
            symbols: symbols as usize,
            observations: observations as usize,
        })
    }
}
