//! Portfolio risk aggregation.
//!
//! Combines per-asset volatility estimates and holding weights into one
//! portfolio figure. The default weighted sum is deliberately simple and
//! auditable; the correlation-adjusted method is an opt-in refinement that
//! falls back to the weighted sum whenever its inputs are not good enough.
//!
//! Incompleteness is loud: if any holding's constituent failed estimation,
//! the whole aggregate is an error rather than a quietly understated risk
//! figure.

use std::collections::HashMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::correlation;
use crate::returns::ReturnSeries;
use crate::volatility::VolatilityEstimate;

/// Tolerance for the holdings weight sum around 1.0.
pub const WEIGHT_SUM_TOLERANCE: f64 = 1e-4;

/// One asset position within a client portfolio.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioHolding {
    /// Asset symbol.
    pub symbol: String,

    /// Weight in the portfolio, in [0, 1].
    pub weight: f64,
}

impl PortfolioHolding {
    /// Create a new holding.
    pub fn new(symbol: impl Into<String>, weight: f64) -> Self {
        Self {
            symbol: symbol.into(),
            weight,
        }
    }
}

/// A portfolio-level risk figure for one client and evaluation date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioRiskFigure {
    /// Client identifier.
    pub client_id: String,

    /// Evaluation date.
    pub as_of: NaiveDate,

    /// Aggregated annualized volatility. Non-negative.
    pub risk_value: f64,
}

/// Per-asset estimation outcome fed into aggregation.
#[derive(Debug, Clone)]
pub enum AssetOutcome {
    /// Estimation succeeded.
    Ready {
        /// The volatility estimate.
        estimate: VolatilityEstimate,
        /// Returns the estimate was computed from, kept for
        /// correlation-adjusted aggregation.
        returns: ReturnSeries,
    },

    /// Too few valid returns in the window.
    Insufficient {
        /// Asset symbol.
        symbol: String,
        /// Minimum returns required.
        required: usize,
        /// Returns actually available.
        actual: usize,
    },

    /// The window is unusable (source failure, unfillable gap).
    Missing {
        /// Asset symbol.
        symbol: String,
        /// Why the data is missing.
        reason: String,
    },
}

impl AssetOutcome {
    /// Symbol the outcome refers to.
    pub fn symbol(&self) -> &str {
        match self {
            Self::Ready { estimate, .. } => &estimate.symbol,
            Self::Insufficient { symbol, .. } | Self::Missing { symbol, .. } => symbol,
        }
    }

    /// Human-readable shortfall, if the outcome is not usable.
    fn shortfall(&self) -> Option<String> {
        match self {
            Self::Ready { .. } => None,
            Self::Insufficient {
                symbol,
                required,
                actual,
            } => Some(format!(
                "{symbol}: insufficient samples ({actual} of {required})"
            )),
            Self::Missing { symbol, reason } => Some(format!("{symbol}: {reason}")),
        }
    }
}

/// Errors from portfolio aggregation.
#[derive(Debug, Error)]
pub enum AggregateError {
    /// One or more constituents could not be estimated.
    #[error("Incomplete risk aggregate for {client_id}: {}", shortfalls.join("; "))]
    Incomplete {
        /// Client identifier.
        client_id: String,
        /// Per-asset shortfall descriptions.
        shortfalls: Vec<String>,
    },

    /// Holding weights violate the portfolio invariants.
    #[error("Invalid weights for {client_id}: {reason}")]
    InvalidWeights {
        /// Client identifier.
        client_id: String,
        /// What was wrong.
        reason: String,
    },
}

/// Aggregation policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregationMethod {
    /// Holdings-weighted sum of constituent volatilities.
    #[default]
    WeightedSum,

    /// √(wᵀΣw) with Σ from pairwise sample correlations of aligned
    /// returns; falls back to the weighted sum when fewer than
    /// `min_overlap` aligned observations exist.
    CorrelationAdjusted {
        /// Minimum aligned return observations required.
        min_overlap: usize,
    },
}

/// Combines constituent volatilities into a portfolio risk figure.
#[derive(Debug, Clone, Copy, Default)]
pub struct RiskAggregator {
    method: AggregationMethod,
}

impl RiskAggregator {
    /// Create an aggregator using the given policy.
    pub const fn new(method: AggregationMethod) -> Self {
        Self { method }
    }

    /// The active policy.
    pub const fn method(&self) -> AggregationMethod {
        self.method
    }

    /// Aggregate per-asset outcomes into a portfolio risk figure.
    ///
    /// # Errors
    ///
    /// [`AggregateError::Incomplete`] if any holding lacks a usable
    /// estimate; [`AggregateError::InvalidWeights`] if the holdings
    /// violate the weight invariants.
    pub fn aggregate(
        &self,
        client_id: &str,
        as_of: NaiveDate,
        holdings: &[PortfolioHolding],
        outcomes: &[AssetOutcome],
    ) -> Result<PortfolioRiskFigure, AggregateError> {
        validate_weights(client_id, holdings)?;

        let by_symbol: HashMap<&str, &AssetOutcome> =
            outcomes.iter().map(|o| (o.symbol(), o)).collect();

        let mut constituents = Vec::with_capacity(holdings.len());
        let mut shortfalls = Vec::new();
        for holding in holdings {
            match by_symbol.get(holding.symbol.as_str()) {
                Some(AssetOutcome::Ready { estimate, returns }) => {
                    constituents.push((holding.weight, estimate, returns));
                }
                Some(outcome) => {
                    if let Some(shortfall) = outcome.shortfall() {
                        shortfalls.push(shortfall);
                    }
                }
                None => shortfalls.push(format!("{}: no estimation outcome", holding.symbol)),
            }
        }
        if !shortfalls.is_empty() {
            return Err(AggregateError::Incomplete {
                client_id: client_id.to_string(),
                shortfalls,
            });
        }

        let weighted_sum: f64 = constituents
            .iter()
            .map(|(weight, estimate, _)| weight * estimate.sigma)
            .sum();

        let risk_value = match self.method {
            AggregationMethod::WeightedSum => weighted_sum,
            AggregationMethod::CorrelationAdjusted { min_overlap } => {
                let weights: Vec<f64> = constituents.iter().map(|(w, _, _)| *w).collect();
                let sigmas: Vec<f64> = constituents.iter().map(|(_, e, _)| e.sigma).collect();
                let returns: Vec<&ReturnSeries> =
                    constituents.iter().map(|(_, _, r)| *r).collect();

                match correlation::portfolio_sigma(&weights, &sigmas, &returns, min_overlap) {
                    Ok(sigma) => sigma,
                    Err(err) => {
                        debug!(
                            client_id,
                            %err,
                            "correlation aggregation unavailable, using weighted sum"
                        );
                        weighted_sum
                    }
                }
            }
        };

        Ok(PortfolioRiskFigure {
            client_id: client_id.to_string(),
            as_of,
            risk_value,
        })
    }
}

/// Validate holding weights: each in [0, 1], summing to 1 within
/// [`WEIGHT_SUM_TOLERANCE`].
pub fn validate_weights(
    client_id: &str,
    holdings: &[PortfolioHolding],
) -> Result<(), AggregateError> {
    if holdings.is_empty() {
        return Err(AggregateError::InvalidWeights {
            client_id: client_id.to_string(),
            reason: "no holdings".to_string(),
        });
    }

    for holding in holdings {
        if !holding.weight.is_finite() || !(0.0..=1.0).contains(&holding.weight) {
            return Err(AggregateError::InvalidWeights {
                client_id: client_id.to_string(),
                reason: format!("{} has weight {}", holding.symbol, holding.weight),
            });
        }
    }

    let total: f64 = holdings.iter().map(|h| h.weight).sum();
    if (total - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
        return Err(AggregateError::InvalidWeights {
            client_id: client_id.to_string(),
            reason: format!("weights sum to {total}, expected 1.0"),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::returns::{ReturnKind, compute_returns};
    use approx::assert_relative_eq;
    use vigil_data::{PriceObservation, PriceSeries};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn ready(symbol: &str, sigma: f64) -> AssetOutcome {
        let observations = vec![
            PriceObservation::new(date(2024, 1, 2), 100.0),
            PriceObservation::new(date(2024, 1, 3), 101.0),
        ];
        let series = PriceSeries::new(symbol, observations).unwrap();
        AssetOutcome::Ready {
            estimate: VolatilityEstimate {
                symbol: symbol.to_string(),
                as_of: date(2024, 2, 1),
                sigma,
                sample_size: 30,
            },
            returns: compute_returns(&series, ReturnKind::Simple),
        }
    }

    #[test]
    fn test_weighted_sum() {
        let aggregator = RiskAggregator::default();
        let holdings = vec![
            PortfolioHolding::new("AAPL", 0.6),
            PortfolioHolding::new("MSFT", 0.4),
        ];
        let outcomes = vec![ready("AAPL", 0.20), ready("MSFT", 0.30)];

        let figure = aggregator
            .aggregate("acme", date(2024, 2, 1), &holdings, &outcomes)
            .unwrap();
        assert_relative_eq!(figure.risk_value, 0.24, epsilon = 1e-12);
        assert_eq!(figure.client_id, "acme");
    }

    #[test]
    fn test_insufficient_constituent_poisons_aggregate() {
        let aggregator = RiskAggregator::default();
        let holdings = vec![
            PortfolioHolding::new("AAPL", 0.5),
            PortfolioHolding::new("MSFT", 0.5),
        ];
        let outcomes = vec![
            ready("AAPL", 0.20),
            AssetOutcome::Insufficient {
                symbol: "MSFT".to_string(),
                required: 20,
                actual: 7,
            },
        ];

        let err = aggregator
            .aggregate("acme", date(2024, 2, 1), &holdings, &outcomes)
            .unwrap_err();
        match err {
            AggregateError::Incomplete { shortfalls, .. } => {
                assert_eq!(shortfalls.len(), 1);
                assert!(shortfalls[0].contains("MSFT"));
                assert!(shortfalls[0].contains("7 of 20"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_missing_data_poisons_aggregate() {
        let aggregator = RiskAggregator::default();
        let holdings = vec![PortfolioHolding::new("AAPL", 1.0)];
        let outcomes = vec![AssetOutcome::Missing {
            symbol: "AAPL".to_string(),
            reason: "gap of 9 business days".to_string(),
        }];

        let err = aggregator
            .aggregate("acme", date(2024, 2, 1), &holdings, &outcomes)
            .unwrap_err();
        assert!(matches!(err, AggregateError::Incomplete { .. }));
    }

    #[test]
    fn test_zero_weight_holding_still_required() {
        let aggregator = RiskAggregator::default();
        let holdings = vec![
            PortfolioHolding::new("AAPL", 1.0),
            PortfolioHolding::new("MSFT", 0.0),
        ];
        let outcomes = vec![
            ready("AAPL", 0.20),
            AssetOutcome::Missing {
                symbol: "MSFT".to_string(),
                reason: "source unavailable".to_string(),
            },
        ];

        assert!(
            aggregator
                .aggregate("acme", date(2024, 2, 1), &holdings, &outcomes)
                .is_err()
        );
    }

    #[test]
    fn test_holding_without_outcome() {
        let aggregator = RiskAggregator::default();
        let holdings = vec![PortfolioHolding::new("AAPL", 1.0)];

        let err = aggregator
            .aggregate("acme", date(2024, 2, 1), &holdings, &[])
            .unwrap_err();
        assert!(err.to_string().contains("no estimation outcome"));
    }

    #[test]
    fn test_weight_validation() {
        assert!(validate_weights("acme", &[]).is_err());

        let overweight = vec![PortfolioHolding::new("AAPL", 1.2)];
        assert!(validate_weights("acme", &overweight).is_err());

        let negative = vec![
            PortfolioHolding::new("AAPL", 1.5),
            PortfolioHolding::new("MSFT", -0.5),
        ];
        assert!(validate_weights("acme", &negative).is_err());

        let short_sum = vec![
            PortfolioHolding::new("AAPL", 0.5),
            PortfolioHolding::new("MSFT", 0.4),
        ];
        assert!(validate_weights("acme", &short_sum).is_err());

        let ok = vec![
            PortfolioHolding::new("AAPL", 0.5),
            PortfolioHolding::new("MSFT", 0.5),
        ];
        assert!(validate_weights("acme", &ok).is_ok());
    }

    #[test]
    fn test_correlation_falls_back_on_short_overlap() {
        // The ready() fixtures carry a single return each, far below the
        // overlap requirement, so the adjusted method must fall back.
        let aggregator =
            RiskAggregator::new(AggregationMethod::CorrelationAdjusted { min_overlap: 20 });
        let holdings = vec![
            PortfolioHolding::new("AAPL", 0.6),
            PortfolioHolding::new("MSFT", 0.4),
        ];
        let outcomes = vec![ready("AAPL", 0.20), ready("MSFT", 0.30)];

        let figure = aggregator
            .aggregate("acme", date(2024, 2, 1), &holdings, &outcomes)
            .unwrap();
        assert_relative_eq!(figure.risk_value, 0.24, epsilon = 1e-12);
    }
}
