//! Volatility estimation.
//!
//! Annualized sample standard deviation of periodic returns over a
//! trailing window. A constant series is a valid zero-volatility estimate;
//! too few returns is an insufficiency, never a fabricated number.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use vigil_data::PriceSeries;

use crate::returns::{ReturnKind, ReturnSeries, compute_returns};

/// Errors from volatility estimation.
#[derive(Debug, Error)]
pub enum EstimateError {
    /// Fewer valid returns than the configured minimum.
    #[error("{symbol}: insufficient samples: required {required}, got {actual}")]
    InsufficientSamples {
        /// Asset symbol.
        symbol: String,
        /// Minimum number of returns required.
        required: usize,
        /// Returns actually available.
        actual: usize,
    },

    /// Configuration rejected at construction.
    #[error("Invalid estimator configuration: {0}")]
    InvalidConfig(String),
}

/// Configuration for volatility estimation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct VolatilityConfig {
    /// How returns are computed from prices.
    pub return_kind: ReturnKind,

    /// Trailing number of returns used for the estimate.
    pub window: usize,

    /// Minimum number of returns required to produce an estimate.
    pub min_samples: usize,

    /// Annualization factor (default: sqrt(252) for daily data).
    pub annualization_factor: f64,
}

impl Default for VolatilityConfig {
    fn default() -> Self {
        Self {
            return_kind: ReturnKind::Simple,
            window: 30,
            min_samples: 20,
            annualization_factor: (252.0_f64).sqrt(),
        }
    }
}

/// An annualized volatility estimate for one asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolatilityEstimate {
    /// Asset symbol.
    pub symbol: String,

    /// Evaluation date the estimate belongs to.
    pub as_of: NaiveDate,

    /// Annualized standard deviation of returns. Non-negative.
    pub sigma: f64,

    /// Number of returns the estimate was computed from.
    pub sample_size: usize,
}

/// Estimates annualized volatility from a price series.
#[derive(Debug, Clone, Copy)]
pub struct VolatilityEstimator {
    config: VolatilityConfig,
}

impl Default for VolatilityEstimator {
    fn default() -> Self {
        Self {
            config: VolatilityConfig::default(),
        }
    }
}

impl VolatilityEstimator {
    /// Create an estimator, validating the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`EstimateError::InvalidConfig`] if `min_samples < 2` (the
    /// sample variance needs at least two returns), the window is smaller
    /// than `min_samples`, or the annualization factor is not positive.
    pub fn new(config: VolatilityConfig) -> Result<Self, EstimateError> {
        if config.min_samples < 2 {
            return Err(EstimateError::InvalidConfig(format!(
                "min_samples must be at least 2, got {}",
                config.min_samples
            )));
        }
        if config.window < config.min_samples {
            return Err(EstimateError::InvalidConfig(format!(
                "window {} is smaller than min_samples {}",
                config.window, config.min_samples
            )));
        }
        if !config.annualization_factor.is_finite() || config.annualization_factor <= 0.0 {
            return Err(EstimateError::InvalidConfig(format!(
                "annualization factor must be positive, got {}",
                config.annualization_factor
            )));
        }
        Ok(Self { config })
    }

    /// The active configuration.
    pub const fn config(&self) -> &VolatilityConfig {
        &self.config
    }

    /// Compute the return series this estimator would use.
    pub fn returns(&self, series: &PriceSeries) -> ReturnSeries {
        compute_returns(series, self.config.return_kind)
    }

    /// Estimate annualized volatility for a cleaned price series.
    ///
    /// # Errors
    ///
    /// Returns [`EstimateError::InsufficientSamples`] when fewer than the
    /// configured minimum number of returns is available.
    pub fn estimate(
        &self,
        series: &PriceSeries,
        as_of: NaiveDate,
    ) -> Result<VolatilityEstimate, EstimateError> {
        self.estimate_returns(&self.returns(series), as_of)
    }

    /// Estimate annualized volatility from a precomputed return series.
    pub fn estimate_returns(
        &self,
        returns: &ReturnSeries,
        as_of: NaiveDate,
    ) -> Result<VolatilityEstimate, EstimateError> {
        let window = returns.trailing(self.config.window);
        let n = window.len();
        if n < self.config.min_samples {
            return Err(EstimateError::InsufficientSamples {
                symbol: returns.symbol.clone(),
                required: self.config.min_samples,
                actual: n,
            });
        }

        let sigma = sample_std(window) * self.config.annualization_factor;

        Ok(VolatilityEstimate {
            symbol: returns.symbol.clone(),
            as_of,
            sigma,
            sample_size: n,
        })
    }
}

/// Sample standard deviation with the n−1 divisor.
///
/// Caller guarantees at least two values.
fn sample_std(values: &[f64]) -> f64 {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
    variance.sqrt()
}
