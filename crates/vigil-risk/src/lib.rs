#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/meridianrisk/vigil/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod aggregate;
pub mod correlation;
pub mod returns;
pub mod volatility;

// Re-export main types
pub use aggregate::{
    AggregateError, AggregationMethod, AssetOutcome, PortfolioHolding, PortfolioRiskFigure,
    RiskAggregator, WEIGHT_SUM_TOLERANCE,
};
pub use correlation::CorrelationError;
pub use returns::{ReturnKind, ReturnSeries, compute_returns};
pub use volatility::{EstimateError, VolatilityConfig, VolatilityEstimate, VolatilityEstimator};
