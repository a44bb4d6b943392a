#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/meridianrisk/vigil/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod archive;
pub mod error;
pub mod normalize;
pub mod retry;
pub mod series;
pub mod source;

pub use archive::{ArchiveStats, PriceArchive};
pub use error::{DataError, Result};
pub use normalize::{NormalizeError, NormalizerConfig, PriceSeriesNormalizer};
pub use retry::RetryPolicy;
pub use series::{PriceObservation, PriceSeries};
pub use source::{MarketDataSource, YahooChartSource};

/// Version information.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
