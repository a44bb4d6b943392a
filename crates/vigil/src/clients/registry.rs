//! TOML client roster.
//!
//! The roster file carries an optional global `[settings]` table plus one
//! `[[clients]]` entry per client. Parsing validates the file shape as a
//! whole; per-client semantic validation happens at resolve time, so one
//! malformed entry reports a configuration error for that client alone
//! instead of failing the batch.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Deserialize;
use thiserror::Error;
use vigil_alert::{BandError, ToleranceBand};
use vigil_risk::{PortfolioHolding, WEIGHT_SUM_TOLERANCE};

use super::ClientProfile;

/// Relative tolerance applied when a band entry gives only a target.
pub const DEFAULT_BAND_TOLERANCE: f64 = 0.10;

/// Errors loading or parsing a roster file.
#[derive(Debug, Error)]
pub enum RosterError {
    /// The roster file could not be read.
    #[error("Failed to read roster {path}: {source}")]
    Read {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The roster is not valid TOML of the expected shape.
    #[error("Failed to parse roster: {0}")]
    Parse(#[from] toml::de::Error),

    /// The roster defines no clients at all.
    #[error("Roster defines no clients")]
    Empty,

    /// Two entries share a client id.
    #[error("Duplicate client id {0}")]
    DuplicateClient(String),
}

/// Per-client configuration defects, reported at resolve time.
#[derive(Debug, Error)]
pub enum ClientConfigError {
    /// No entry with the requested id.
    #[error("Unknown client id {0}")]
    UnknownClient(String),

    /// The band entry does not describe a valid band.
    #[error("Client {client_id}: {source}")]
    Band {
        /// Client the defect belongs to.
        client_id: String,
        /// Underlying band error.
        #[source]
        source: BandError,
    },

    /// The entry lists no holdings.
    #[error("Client {client_id} has no holdings")]
    NoHoldings {
        /// Client the defect belongs to.
        client_id: String,
    },

    /// A holding weight is outside `[0, 1]` or not finite.
    #[error("Client {client_id}: holding {symbol} has invalid weight {weight}")]
    InvalidWeight {
        /// Client the defect belongs to.
        client_id: String,
        /// Holding symbol.
        symbol: String,
        /// Offending weight.
        weight: f64,
    },

    /// Holding weights do not sum to 1 within tolerance.
    #[error("Client {client_id}: holding weights sum to {sum:.4}, expected 1.0")]
    WeightSum {
        /// Client the defect belongs to.
        client_id: String,
        /// Actual weight sum.
        sum: f64,
    },
}

/// Global settings from the roster's `[settings]` table.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RosterSettings {
    /// Webhook endpoint notifications are POSTed to. `None` logs instead.
    pub webhook_url: Option<String>,

    /// Calendar days of price history fetched per evaluation.
    pub lookback_days: u32,

    /// Minimum returns required for a volatility estimate.
    pub min_samples: usize,

    /// Largest forward-fillable gap, in business days.
    pub max_gap_days: u32,

    /// Use correlation-adjusted aggregation instead of the weighted sum.
    pub correlation: bool,
}

impl Default for RosterSettings {
    fn default() -> Self {
        Self {
            webhook_url: None,
            lookback_days: 90,
            min_samples: 20,
            max_gap_days: 5,
            correlation: false,
        }
    }
}

/// Band entry: explicit bounds, or a target with relative tolerance.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(untagged)]
enum BandSpec {
    Bounds {
        lower: f64,
        upper: f64,
    },
    Target {
        target: f64,
        #[serde(default = "default_band_tolerance")]
        tolerance: f64,
    },
}

const fn default_band_tolerance() -> f64 {
    DEFAULT_BAND_TOLERANCE
}

impl BandSpec {
    fn resolve(self) -> Result<ToleranceBand, BandError> {
        match self {
            Self::Bounds { lower, upper } => ToleranceBand::new(lower, upper),
            Self::Target { target, tolerance } => ToleranceBand::around(target, tolerance),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct HoldingEntry {
    symbol: String,
    weight: f64,
}

#[derive(Debug, Clone, Deserialize)]
struct ClientEntry {
    id: String,
    #[serde(default)]
    name: Option<String>,
    band: BandSpec,
    #[serde(default)]
    holdings: Vec<HoldingEntry>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct RosterFile {
    settings: RosterSettings,
    clients: Vec<ClientEntry>,
}

/// Loaded roster: global settings plus per-client entries.
#[derive(Debug, Clone)]
pub struct ClientRegistry {
    settings: RosterSettings,
    entries: Vec<ClientEntry>,
}

impl ClientRegistry {
    /// Load a roster from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns a [`RosterError`] when the file cannot be read or the
    /// roster as a whole is malformed. Per-client defects are deferred to
    /// [`resolve`](Self::resolve).
    pub fn load(path: impl AsRef<Path>) -> Result<Self, RosterError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| RosterError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        text.parse()
    }

    /// Global settings.
    pub const fn settings(&self) -> &RosterSettings {
        &self.settings
    }

    /// Ids of all configured clients, in roster order.
    pub fn client_ids(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.id.clone()).collect()
    }

    /// Number of configured clients.
    pub const fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the roster holds no clients.
    pub const fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resolve one entry into a validated [`ClientProfile`].
    ///
    /// # Errors
    ///
    /// Returns a [`ClientConfigError`] naming the client when the entry is
    /// missing, its band is invalid, or its holdings fail validation.
    pub fn resolve(&self, client_id: &str) -> Result<ClientProfile, ClientConfigError> {
        let entry = self
            .entries
            .iter()
            .find(|e| e.id == client_id)
            .ok_or_else(|| ClientConfigError::UnknownClient(client_id.to_string()))?;

        let band = entry
            .band
            .resolve()
            .map_err(|source| ClientConfigError::Band {
                client_id: entry.id.clone(),
                source,
            })?;

        if entry.holdings.is_empty() {
            return Err(ClientConfigError::NoHoldings {
                client_id: entry.id.clone(),
            });
        }

        let mut sum = 0.0;
        for holding in &entry.holdings {
            if !holding.weight.is_finite() || !(0.0..=1.0).contains(&holding.weight) {
                return Err(ClientConfigError::InvalidWeight {
                    client_id: entry.id.clone(),
                    symbol: holding.symbol.clone(),
                    weight: holding.weight,
                });
            }
            sum += holding.weight;
        }
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(ClientConfigError::WeightSum {
                client_id: entry.id.clone(),
                sum,
            });
        }

        Ok(ClientProfile {
            client_id: entry.id.clone(),
            display_name: entry.name.clone().unwrap_or_else(|| entry.id.clone()),
            holdings: entry
                .holdings
                .iter()
                .map(|h| PortfolioHolding::new(h.symbol.clone(), h.weight))
                .collect(),
            band,
        })
    }
}

impl FromStr for ClientRegistry {
    type Err = RosterError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let file: RosterFile = toml::from_str(text)?;
        if file.clients.is_empty() {
            return Err(RosterError::Empty);
        }

        let mut seen = HashSet::new();
        for entry in &file.clients {
            if !seen.insert(entry.id.as_str()) {
                return Err(RosterError::DuplicateClient(entry.id.clone()));
            }
        }

        Ok(Self {
            settings: file.settings,
            entries: file.clients,
        })
    }
}
