//! Per-cycle evaluation reports.
//!
//! An evaluation cycle produces one [`ClientCycleRecord`] per configured
//! client plus outbox dispatch counts. The assembled [`CycleReport`]
//! renders as plain text for operators or serializes to JSON for
//! downstream tooling.

use std::fmt;
use std::path::Path;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur while producing a report.
#[derive(Debug, Error)]
pub enum ReportError {
    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Outcome of one client's evaluation cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleStatus {
    /// Risk inside the approved band, no open episode.
    WithinBand,

    /// Breach detected with no prior open episode; one opened.
    BreachOpened,

    /// Breach continues under an already-open episode.
    StillBreached,

    /// Risk returned inside the band; the open episode closed.
    BreachResolved,

    /// Evaluation skipped, typically for incomplete market data.
    Skipped,

    /// The client's roster entry failed validation.
    ConfigError,

    /// State-write conflicts exhausted the retry budget this cycle.
    DeliveryDeferred,

    /// The cycle aborted on an unexpected error.
    Failed,
}

impl CycleStatus {
    /// Human-readable label used in text reports.
    pub const fn label(&self) -> &'static str {
        match self {
            Self::WithinBand => "within band",
            Self::BreachOpened => "breach opened",
            Self::StillBreached => "still breached",
            Self::BreachResolved => "breach resolved",
            Self::Skipped => "skipped",
            Self::ConfigError => "config error",
            Self::DeliveryDeferred => "delivery deferred",
            Self::Failed => "failed",
        }
    }

    /// Whether this status represents an episode transition.
    pub const fn is_transition(&self) -> bool {
        matches!(self, Self::BreachOpened | Self::BreachResolved)
    }
}

impl fmt::Display for CycleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One client's line in a cycle report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientCycleRecord {
    /// Client identifier.
    pub client_id: String,

    /// Cycle outcome.
    pub status: CycleStatus,

    /// Aggregated risk figure, when one was produced.
    pub risk_value: Option<f64>,

    /// Lower band bound, when the client's band was resolved.
    pub band_lower: Option<f64>,

    /// Upper band bound, when the client's band was resolved.
    pub band_upper: Option<f64>,

    /// Free-form detail, e.g. a skip reason or error description.
    pub detail: Option<String>,
}

impl ClientCycleRecord {
    /// Create a record with no risk figure or detail.
    pub fn new(client_id: impl Into<String>, status: CycleStatus) -> Self {
        Self {
            client_id: client_id.into(),
            status,
            risk_value: None,
            band_lower: None,
            band_upper: None,
            detail: None,
        }
    }

    /// Attach the evaluated risk figure and band.
    #[must_use]
    pub fn with_risk(mut self, risk_value: f64, band_lower: f64, band_upper: f64) -> Self {
        self.risk_value = Some(risk_value);
        self.band_lower = Some(band_lower);
        self.band_upper = Some(band_upper);
        self
    }

    /// Attach free-form detail.
    #[must_use]
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// Report for one full evaluation cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleReport {
    /// Evaluation date the cycle ran for.
    pub as_of: NaiveDate,

    /// Report generation timestamp.
    pub generated_at: DateTime<Utc>,

    /// One record per processed client, in processing order.
    pub records: Vec<ClientCycleRecord>,

    /// Notifications delivered when the outbox drained.
    pub delivered: usize,

    /// Notifications still queued after transient delivery failures.
    pub deferred: usize,

    /// Notifications escalated after exceeding the attempt cap.
    pub escalated: usize,
}

impl CycleReport {
    /// Create an empty report for an evaluation date.
    pub fn new(as_of: NaiveDate) -> Self {
        Self {
            as_of,
            generated_at: Utc::now(),
            records: Vec::new(),
            delivered: 0,
            deferred: 0,
            escalated: 0,
        }
    }

    /// Append a client record.
    pub fn push(&mut self, record: ClientCycleRecord) {
        self.records.push(record);
    }

    /// Number of records with the given status.
    pub fn count(&self, status: CycleStatus) -> usize {
        self.records.iter().filter(|r| r.status == status).count()
    }

    /// Number of episode transitions committed this cycle.
    pub fn transitions(&self) -> usize {
        self.records
            .iter()
            .filter(|r| r.status.is_transition())
            .count()
    }

    /// Render the report as operator-facing plain text.
    pub fn render_text(&self) -> String {
        let mut output = String::new();

        output.push_str(&format!("Risk drift cycle for {}\n", self.as_of));
        output.push_str("==============================\n\n");

        for record in &self.records {
            output.push_str(&format!(
                "  {:<22} {:<18}",
                record.client_id,
                record.status.label()
            ));
            if let Some(risk) = record.risk_value {
                output.push_str(&format!(" risk {:>6.2}%", risk * 100.0));
            }
            if let (Some(lower), Some(upper)) = (record.band_lower, record.band_upper) {
                output.push_str(&format!(
                    "  band {:.2}%-{:.2}%",
                    lower * 100.0,
                    upper * 100.0
                ));
            }
            if let Some(detail) = &record.detail {
                output.push_str(&format!("  ({detail})"));
            }
            output.push('\n');
        }

        output.push_str(&format!(
            "\nClients: {} processed, {} skipped, {} config errors, {} failed\n",
            self.records.len(),
            self.count(CycleStatus::Skipped),
            self.count(CycleStatus::ConfigError),
            self.count(CycleStatus::Failed),
        ));
        output.push_str(&format!(
            "Transitions: {} opened, {} resolved, {} deferred\n",
            self.count(CycleStatus::BreachOpened),
            self.count(CycleStatus::BreachResolved),
            self.count(CycleStatus::DeliveryDeferred),
        ));
        output.push_str(&format!(
            "Notifications: {} delivered, {} deferred, {} escalated\n",
            self.delivered, self.deferred, self.escalated,
        ));

        output
    }

    /// Serialize the report as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns [`ReportError::Serialization`] if serialization fails.
    pub fn to_json(&self) -> Result<String, ReportError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Write the report as pretty-printed JSON to a file.
    ///
    /// # Errors
    ///
    /// Returns a [`ReportError`] if serialization or writing fails.
    pub fn save(&self, path: &Path) -> Result<(), ReportError> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }
}
