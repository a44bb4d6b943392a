//! Market data source abstraction.
//!
//! A source hands back raw daily observations for one symbol over a date
//! range. Completeness is not guaranteed; callers run the result through
//! the normalizer and treat source failures as missing data for the
//! affected asset, never as a pipeline abort.

pub mod yahoo;

pub use yahoo::YahooChartSource;

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::error::Result;
use crate::series::PriceObservation;

/// An external provider of historical daily prices.
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// Fetch raw observations for `symbol` between `start` and `end`
    /// inclusive. May return fewer points than the range implies.
    async fn fetch_prices(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PriceObservation>>;
}
