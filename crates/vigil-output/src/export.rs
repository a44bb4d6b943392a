//! Audit data export.
//!
//! Flat row types mirroring the audit tables (archived volatility
//! estimates, portfolio risk history, episode events), exportable as CSV
//! or JSON through the [`Exporter`] trait.

use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur during export operations.
#[derive(Debug, Error)]
pub enum ExportError {
    /// CSV serialization error.
    #[error("CSV serialization error: {0}")]
    Csv(#[from] csv::Error),

    /// JSON serialization error.
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Unrecognized format name.
    #[error("Invalid format: {0}")]
    InvalidFormat(String),
}

/// Export format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    /// Comma-separated values format.
    Csv,

    /// Compact JSON format.
    Json,

    /// Pretty-printed JSON format.
    PrettyJson,
}

impl ExportFormat {
    /// Get the file extension for this format.
    pub const fn extension(&self) -> &str {
        match self {
            Self::Csv => "csv",
            Self::Json | Self::PrettyJson => "json",
        }
    }
}

impl FromStr for ExportFormat {
    type Err = ExportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "csv" => Ok(Self::Csv),
            "json" => Ok(Self::Json),
            "pretty-json" | "pretty_json" => Ok(Self::PrettyJson),
            other => Err(ExportError::InvalidFormat(other.to_string())),
        }
    }
}

/// One archived volatility estimate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VolatilityExport {
    /// Asset symbol.
    pub symbol: String,

    /// Evaluation date.
    pub as_of: NaiveDate,

    /// Annualized volatility.
    pub sigma: f64,

    /// Returns the estimate was computed from.
    pub sample_size: usize,
}

impl VolatilityExport {
    /// Create a new volatility export row.
    pub const fn new(symbol: String, as_of: NaiveDate, sigma: f64, sample_size: usize) -> Self {
        Self {
            symbol,
            as_of,
            sigma,
            sample_size,
        }
    }
}

/// One recorded portfolio risk figure.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RiskFigureExport {
    /// Client identifier.
    pub client_id: String,

    /// Evaluation date.
    pub as_of: NaiveDate,

    /// Aggregated annualized volatility.
    pub risk_value: f64,
}

impl RiskFigureExport {
    /// Create a new risk figure export row.
    pub const fn new(client_id: String, as_of: NaiveDate, risk_value: f64) -> Self {
        Self {
            client_id,
            as_of,
            risk_value,
        }
    }
}

/// One episode audit event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EpisodeEventExport {
    /// Client identifier.
    pub client_id: String,

    /// Episode the event belongs to.
    pub episode_id: String,

    /// Event name (`opened`, `observed`, `resolved`).
    pub event: String,

    /// Evaluation date the event fired on.
    pub as_of: NaiveDate,
}

impl EpisodeEventExport {
    /// Create a new episode event export row.
    pub const fn new(
        client_id: String,
        episode_id: String,
        event: String,
        as_of: NaiveDate,
    ) -> Self {
        Self {
            client_id,
            episode_id,
            event,
            as_of,
        }
    }
}

/// Trait for exporting data in various formats.
pub trait Exporter {
    /// Export data to a string in the specified format.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    fn export_to_string(&self, format: ExportFormat) -> Result<String, ExportError>;

    /// Export data to a file in the specified format.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or file writing fails.
    fn export_to_file(&self, path: &Path, format: ExportFormat) -> Result<(), ExportError> {
        let content = self.export_to_string(format)?;
        let mut file = File::create(path)?;
        file.write_all(content.as_bytes())?;
        Ok(())
    }
}

fn csv_string<S: Serialize>(records: &[S]) -> Result<String, ExportError> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    for record in records {
        wtr.serialize(record)?;
    }
    let data = String::from_utf8(wtr.into_inner().map_err(|e| e.into_error())?).unwrap();
    Ok(data)
}

fn export_records<S: Serialize>(
    records: &[S],
    format: ExportFormat,
) -> Result<String, ExportError> {
    match format {
        ExportFormat::Csv => csv_string(records),
        ExportFormat::Json => Ok(serde_json::to_string(records)?),
        ExportFormat::PrettyJson => Ok(serde_json::to_string_pretty(records)?),
    }
}

impl Exporter for VolatilityExport {
    fn export_to_string(&self, format: ExportFormat) -> Result<String, ExportError> {
        match format {
            ExportFormat::Csv => csv_string(std::slice::from_ref(self)),
            ExportFormat::Json => Ok(serde_json::to_string(self)?),
            ExportFormat::PrettyJson => Ok(serde_json::to_string_pretty(self)?),
        }
    }
}

impl Exporter for Vec<VolatilityExport> {
    fn export_to_string(&self, format: ExportFormat) -> Result<String, ExportError> {
        export_records(self, format)
    }
}

impl Exporter for RiskFigureExport {
    fn export_to_string(&self, format: ExportFormat) -> Result<String, ExportError> {
        match format {
            ExportFormat::Csv => csv_string(std::slice::from_ref(self)),
            ExportFormat::Json => Ok(serde_json::to_string(self)?),
            ExportFormat::PrettyJson => Ok(serde_json::to_string_pretty(self)?),
        }
    }
}

impl Exporter for Vec<RiskFigureExport> {
    fn export_to_string(&self, format: ExportFormat) -> Result<String, ExportError> {
        export_records(self, format)
    }
}

impl Exporter for EpisodeEventExport {
    fn export_to_string(&self, format: ExportFormat) -> Result<String, ExportError> {
        match format {
            ExportFormat::Csv => csv_string(std::slice::from_ref(self)),
            ExportFormat::Json => Ok(serde_json::to_string(self)?),
            ExportFormat::PrettyJson => Ok(serde_json::to_string_pretty(self)?),
        }
    }
}

impl Exporter for Vec<EpisodeEventExport> {
    fn export_to_string(&self, format: ExportFormat) -> Result<String, ExportError> {
        export_records(self, format)
    }
}
