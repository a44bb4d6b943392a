//! Client roster management for Vigil.
//!
//! This module provides the client domain: resolved portfolio profiles
//! and the registry that loads them from a TOML roster file.

pub mod registry;

pub use registry::{ClientConfigError, ClientRegistry, RosterError, RosterSettings};

use vigil_alert::ToleranceBand;
use vigil_risk::PortfolioHolding;

/// A fully resolved client: identity, holdings and approved band.
#[derive(Debug, Clone)]
pub struct ClientProfile {
    /// Stable client identifier, used as the state-store key.
    pub client_id: String,

    /// Human-readable name used in rendered summaries.
    pub display_name: String,

    /// Portfolio holdings; weights sum to 1 within tolerance.
    pub holdings: Vec<PortfolioHolding>,

    /// Approved tolerance band for portfolio volatility.
    pub band: ToleranceBand,
}

impl ClientProfile {
    /// Symbols of all holdings, in roster order.
    pub fn symbols(&self) -> Vec<String> {
        self.holdings.iter().map(|h| h.symbol.clone()).collect()
    }

    /// Whether the portfolio holds a symbol.
    pub fn holds(&self, symbol: &str) -> bool {
        self.holdings.iter().any(|h| h.symbol == symbol)
    }

    /// Number of holdings.
    pub const fn size(&self) -> usize {
        self.holdings.len()
    }
}
