//! Price series normalization.
//!
//! Raw observations from a market data source arrive unordered, with
//! duplicate dates, occasional junk prices and holes where the source had
//! nothing. Normalization turns them into a [`PriceSeries`] fit for return
//! computation:
//!
//! - duplicate dates are resolved by keeping the latest write,
//! - non-positive or non-finite prices are dropped,
//! - short gaps (measured in business days between consecutive
//!   observations) are forward-filled from the prior close,
//! - a gap wider than the configured maximum marks the whole window as
//!   missing data for that asset.
//!
//! The transform is pure; the caller decides what a defect means (the
//! estimator treats it as a non-fatal missing-data outcome, not an abort).

use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate, Weekday};
use thiserror::Error;
use tracing::debug;

use crate::series::{PriceObservation, PriceSeries};

/// Defects that make a window unusable for estimation.
#[derive(Debug, Error)]
pub enum NormalizeError {
    /// No observations were supplied at all.
    #[error("{symbol}: no observations in window")]
    EmptyInput {
        /// Asset symbol.
        symbol: String,
    },

    /// Observations were supplied but none carried a usable price.
    #[error("{symbol}: no valid prices in window ({dropped} dropped)")]
    NoValidPrices {
        /// Asset symbol.
        symbol: String,
        /// Number of observations dropped as invalid.
        dropped: usize,
    },

    /// A hole between consecutive observations exceeded the fill limit.
    #[error(
        "{symbol}: gap of {gap_days} business days between {from} and {to} exceeds maximum {max_days}"
    )]
    GapTooWide {
        /// Asset symbol.
        symbol: String,
        /// Last observation before the gap.
        from: NaiveDate,
        /// First observation after the gap.
        to: NaiveDate,
        /// Missing business days between the two.
        gap_days: u32,
        /// Configured maximum fillable gap.
        max_days: u32,
    },
}

/// Normalizer configuration.
#[derive(Debug, Clone, Copy)]
pub struct NormalizerConfig {
    /// Largest gap, in business days strictly between two consecutive
    /// observations, that forward-filling may bridge.
    pub max_gap_days: u32,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self { max_gap_days: 5 }
    }
}

/// Cleans and aligns raw per-asset observations into a [`PriceSeries`].
#[derive(Debug, Clone, Copy, Default)]
pub struct PriceSeriesNormalizer {
    config: NormalizerConfig,
}

impl PriceSeriesNormalizer {
    /// Create a normalizer with the given configuration.
    pub const fn new(config: NormalizerConfig) -> Self {
        Self { config }
    }

    /// Normalize raw observations for one asset.
    ///
    /// # Errors
    ///
    /// Returns a [`NormalizeError`] when the window cannot yield a usable
    /// series; callers treat this as missing data for the asset.
    pub fn normalize(
        &self,
        symbol: &str,
        raw: &[PriceObservation],
    ) -> Result<PriceSeries, NormalizeError> {
        if raw.is_empty() {
            return Err(NormalizeError::EmptyInput {
                symbol: symbol.to_string(),
            });
        }

        // Latest write wins for duplicate dates, before validity filtering:
        // a junk late write deliberately shadows an earlier clean one.
        let mut by_date: BTreeMap<NaiveDate, f64> = BTreeMap::new();
        for obs in raw {
            by_date.insert(obs.date, obs.price);
        }

        let total = by_date.len();
        by_date.retain(|_, price| price.is_finite() && *price > 0.0);
        let dropped = total - by_date.len();
        if dropped > 0 {
            debug!(symbol, dropped, "dropped invalid prices during normalization");
        }
        if by_date.is_empty() {
            return Err(NormalizeError::NoValidPrices {
                symbol: symbol.to_string(),
                dropped,
            });
        }

        let mut observations = Vec::with_capacity(by_date.len());
        let mut filled = 0usize;
        let mut prev: Option<(NaiveDate, f64)> = None;

        for (date, price) in by_date {
            if let Some((prev_date, prev_price)) = prev {
                let missing = business_days_between(prev_date, date);
                if missing > self.config.max_gap_days {
                    return Err(NormalizeError::GapTooWide {
                        symbol: symbol.to_string(),
                        from: prev_date,
                        to: date,
                        gap_days: missing,
                        max_days: self.config.max_gap_days,
                    });
                }
                for fill_date in business_days(prev_date, date) {
                    observations.push(PriceObservation::new(fill_date, prev_price));
                    filled += 1;
                }
            }
            observations.push(PriceObservation::new(date, price));
            prev = Some((date, price));
        }

        Ok(PriceSeries::from_normalized(
            symbol.to_string(),
            observations,
            filled,
        ))
    }
}

/// Business days strictly between two dates.
fn business_days_between(start: NaiveDate, end: NaiveDate) -> u32 {
    business_days(start, end).count() as u32
}

/// Iterator over business days strictly between two dates.
fn business_days(start: NaiveDate, end: NaiveDate) -> impl Iterator<Item = NaiveDate> {
    start
        .iter_days()
        .skip(1)
        .take_while(move |d| *d < end)
        .filter(|d| !matches!(d.weekday(), Weekday::Sat | Weekday::Sun))
}
