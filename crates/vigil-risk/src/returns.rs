//! Periodic return computation.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use vigil_data::PriceSeries;

/// How consecutive-observation returns are computed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReturnKind {
    /// Simple returns: `p1 / p0 - 1`.
    #[default]
    Simple,
    /// Log returns: `ln(p1 / p0)`.
    Log,
}

/// Dated returns for one asset, each return stamped with the later
/// observation's date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReturnSeries {
    /// Asset symbol.
    pub symbol: String,

    dates: Vec<NaiveDate>,
    values: Vec<f64>,
}

impl ReturnSeries {
    /// Number of returns.
    pub const fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the series holds no returns.
    pub const fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Return values in date order.
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// The trailing `n` return values (all of them if fewer exist).
    pub fn trailing(&self, n: usize) -> &[f64] {
        let start = self.values.len().saturating_sub(n);
        &self.values[start..]
    }

    /// Dated returns in date order.
    pub fn iter(&self) -> impl Iterator<Item = (NaiveDate, f64)> + '_ {
        self.dates.iter().copied().zip(self.values.iter().copied())
    }
}

/// Compute consecutive-observation returns for a cleaned series.
///
/// An empty or single-observation series yields an empty return series.
pub fn compute_returns(series: &PriceSeries, kind: ReturnKind) -> ReturnSeries {
    let observations = series.observations();
    let mut dates = Vec::with_capacity(observations.len().saturating_sub(1));
    let mut values = Vec::with_capacity(observations.len().saturating_sub(1));

    for pair in observations.windows(2) {
        let value = match kind {
            ReturnKind::Simple => pair[1].price / pair[0].price - 1.0,
            ReturnKind::Log => (pair[1].price / pair[0].price).ln(),
        };
        dates.push(pair[1].date);
        values.push(value);
    }

    ReturnSeries {
        symbol: series.symbol.clone(),
        dates,
        values,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use vigil_data::PriceObservation;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn series(prices: &[f64]) -> PriceSeries {
        let observations = prices
            .iter()
            .enumerate()
            .map(|(i, p)| {
                PriceObservation::new(
                    date(2024, 1, 1) + chrono::Days::new(i as u64),
                    *p,
                )
            })
            .collect();
        PriceSeries::new("TEST", observations).unwrap()
    }

    #[test]
    fn test_simple_returns() {
        let returns = compute_returns(&series(&[100.0, 110.0, 99.0]), ReturnKind::Simple);
        assert_eq!(returns.len(), 2);
        assert_relative_eq!(returns.values()[0], 0.10, epsilon = 1e-12);
        assert_relative_eq!(returns.values()[1], -0.10, epsilon = 1e-12);
    }

    #[test]
    fn test_log_returns() {
        let returns = compute_returns(&series(&[100.0, 110.0]), ReturnKind::Log);
        assert_eq!(returns.len(), 1);
        assert_relative_eq!(returns.values()[0], (1.1_f64).ln(), epsilon = 1e-12);
    }

    #[test]
    fn test_returns_dated_by_later_observation() {
        let returns = compute_returns(&series(&[100.0, 101.0]), ReturnKind::Simple);
        let dated: Vec<_> = returns.iter().collect();
        assert_eq!(dated[0].0, date(2024, 1, 2));
    }

    #[test]
    fn test_constant_series_zero_returns() {
        let returns = compute_returns(&series(&[50.0, 50.0, 50.0, 50.0]), ReturnKind::Simple);
        assert!(returns.values().iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_short_series() {
        assert!(compute_returns(&series(&[100.0]), ReturnKind::Simple).is_empty());
        assert!(compute_returns(&series(&[]), ReturnKind::Simple).is_empty());
    }

    #[test]
    fn test_trailing_window() {
        let returns = compute_returns(
            &series(&[100.0, 101.0, 102.0, 103.0, 104.0]),
            ReturnKind::Simple,
        );
        assert_eq!(returns.trailing(2).len(), 2);
        assert_eq!(returns.trailing(100).len(), 4);
        assert_relative_eq!(returns.trailing(1)[0], 104.0 / 103.0 - 1.0);
    }
}
