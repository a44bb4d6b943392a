//! Price series types.
//!
//! A [`PriceSeries`] is the cleaned, time-ordered view of one asset's daily
//! prices that the rest of the pipeline consumes. Construction enforces the
//! series invariants (strictly increasing dates, positive finite prices) so
//! downstream return computation never has to re-validate.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{DataError, Result};

/// A single dated price for one asset.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceObservation {
    /// Observation date.
    pub date: NaiveDate,

    /// Closing price. Positive and finite in a constructed series.
    pub price: f64,
}

impl PriceObservation {
    /// Create a new observation.
    pub const fn new(date: NaiveDate, price: f64) -> Self {
        Self { date, price }
    }
}

/// A cleaned, time-ordered price series for one asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceSeries {
    /// Asset symbol.
    pub symbol: String,

    /// Observations in strictly increasing date order.
    observations: Vec<PriceObservation>,

    /// Number of observations synthesized by gap forward-filling.
    filled: usize,
}

impl PriceSeries {
    /// Build a series, validating the ordering and price invariants.
    ///
    /// # Errors
    ///
    /// Returns [`DataError::Parse`] if dates are not strictly increasing or
    /// any price is non-positive or non-finite.
    pub fn new(symbol: impl Into<String>, observations: Vec<PriceObservation>) -> Result<Self> {
        let symbol = symbol.into();

        for pair in observations.windows(2) {
            if pair[1].date <= pair[0].date {
                return Err(DataError::Parse(format!(
                    "{symbol}: dates not strictly increasing at {}",
                    pair[1].date
                )));
            }
        }
        if let Some(bad) = observations
            .iter()
            .find(|o| !o.price.is_finite() || o.price <= 0.0)
        {
            return Err(DataError::Parse(format!(
                "{symbol}: invalid price {} at {}",
                bad.price, bad.date
            )));
        }

        Ok(Self {
            symbol,
            observations,
            filled: 0,
        })
    }

    /// Build a series from pre-validated observations.
    ///
    /// Used by the normalizer, which establishes the invariants itself and
    /// tracks the number of forward-filled observations.
    pub(crate) fn from_normalized(
        symbol: String,
        observations: Vec<PriceObservation>,
        filled: usize,
    ) -> Self {
        Self {
            symbol,
            observations,
            filled,
        }
    }

    /// Observations in date order.
    pub fn observations(&self) -> &[PriceObservation] {
        &self.observations
    }

    /// Number of observations.
    pub const fn len(&self) -> usize {
        self.observations.len()
    }

    /// Whether the series is empty.
    pub const fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    /// Number of observations synthesized by forward-filling.
    pub const fn filled(&self) -> usize {
        self.filled
    }

    /// First observation date, if any.
    pub fn start_date(&self) -> Option<NaiveDate> {
        self.observations.first().map(|o| o.date)
    }

    /// Last observation date, if any.
    pub fn end_date(&self) -> Option<NaiveDate> {
        self.observations.last().map(|o| o.date)
    }

    /// Prices in date order.
    pub fn prices(&self) -> impl Iterator<Item = f64> + '_ {
        self.observations.iter().map(|o| o.price)
    }
}
