//! Correlation-adjusted portfolio volatility.
//!
//! Builds a covariance matrix from pairwise sample correlations of
//! date-aligned return series and the constituents' annualized sigmas,
//! then evaluates √(wᵀΣw). Correlations come from whatever window the
//! series share; magnitudes stay the estimator's.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use ndarray::{Array1, Array2};
use thiserror::Error;

use crate::returns::ReturnSeries;

/// Errors from correlation-adjusted aggregation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CorrelationError {
    /// The aligned return histories share too few observation dates.
    #[error("Insufficient return overlap: {actual} shared dates, need {required}")]
    InsufficientOverlap {
        /// Shared dates required.
        required: usize,
        /// Shared dates available.
        actual: usize,
    },

    /// Weight, sigma and return slices disagree in length.
    #[error("Dimension mismatch: {weights} weights, {sigmas} sigmas, {series} return series")]
    DimensionMismatch {
        /// Number of weights.
        weights: usize,
        /// Number of sigmas.
        sigmas: usize,
        /// Number of return series.
        series: usize,
    },
}

/// Compute √(wᵀΣw) with Σᵢⱼ = ρᵢⱼ·σᵢ·σⱼ.
///
/// Return series are aligned on their shared observation dates before
/// correlations are computed; a constant series correlates at zero with
/// everything. At least `min_overlap` shared dates are required, and
/// never fewer than two.
///
/// # Errors
///
/// [`CorrelationError::DimensionMismatch`] if the slices disagree in
/// length, [`CorrelationError::InsufficientOverlap`] if too few dates
/// are shared.
pub fn portfolio_sigma(
    weights: &[f64],
    sigmas: &[f64],
    returns: &[&ReturnSeries],
    min_overlap: usize,
) -> Result<f64, CorrelationError> {
    if weights.len() != sigmas.len() || weights.len() != returns.len() {
        return Err(CorrelationError::DimensionMismatch {
            weights: weights.len(),
            sigmas: sigmas.len(),
            series: returns.len(),
        });
    }

    let required = min_overlap.max(2);
    let maps: Vec<BTreeMap<NaiveDate, f64>> =
        returns.iter().map(|r| r.iter().collect()).collect();
    let Some((first, rest)) = maps.split_first() else {
        return Err(CorrelationError::InsufficientOverlap {
            required,
            actual: 0,
        });
    };
    let mut shared: Vec<NaiveDate> = first.keys().copied().collect();
    shared.retain(|d| rest.iter().all(|m| m.contains_key(d)));

    if shared.len() < required {
        return Err(CorrelationError::InsufficientOverlap {
            required,
            actual: shared.len(),
        });
    }

    let aligned: Vec<Vec<f64>> = maps
        .iter()
        .map(|m| shared.iter().map(|d| m[d]).collect())
        .collect();

    let n = weights.len();
    let covariance = Array2::from_shape_fn((n, n), |(i, j)| {
        let rho = if i == j {
            1.0
        } else {
            sample_correlation(&aligned[i], &aligned[j])
        };
        rho * sigmas[i] * sigmas[j]
    });
    let w = Array1::from_vec(weights.to_vec());
    let variance = w.dot(&covariance.dot(&w));

    Ok(variance.max(0.0).sqrt())
}

/// Pearson correlation of two equal-length samples. Zero when either
/// sample has no variance.
fn sample_correlation(x: &[f64], y: &[f64]) -> f64 {
    let n = x.len() as f64;
    let mean_x = x.iter().sum::<f64>() / n;
    let mean_y = y.iter().sum::<f64>() / n;

    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for (a, b) in x.iter().zip(y) {
        let dx = a - mean_x;
        let dy = b - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }
    if var_x <= 0.0 || var_y <= 0.0 {
        return 0.0;
    }
    cov / (var_x.sqrt() * var_y.sqrt())
}
