//! Client tolerance bands.

use serde::Serialize;
use thiserror::Error;

/// Errors from tolerance band construction.
#[derive(Debug, Error, PartialEq)]
pub enum BandError {
    /// Bounds are not a valid range.
    #[error("Invalid band bounds: lower {lower}, upper {upper}")]
    InvalidBounds {
        /// Lower bound supplied.
        lower: f64,
        /// Upper bound supplied.
        upper: f64,
    },

    /// Target/tolerance form is not expressible as a band.
    #[error("Invalid band target {target} with tolerance {tolerance}")]
    InvalidTolerance {
        /// Target risk level supplied.
        target: f64,
        /// Relative tolerance supplied.
        tolerance: f64,
    },
}

/// Which side of the band a risk figure fell out of.
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BreachDirection {
    /// Risk exceeds the upper bound.
    #[display("above upper band")]
    AboveUpper,

    /// Risk fell below the lower bound.
    #[display("below lower band")]
    BelowLower,
}

/// A client-approved `[lower, upper]` range for portfolio volatility.
///
/// Bounds are inclusive: a figure equal to either bound is within band.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ToleranceBand {
    lower: f64,
    upper: f64,
}

impl ToleranceBand {
    /// Create a band from explicit bounds.
    ///
    /// # Errors
    ///
    /// [`BandError::InvalidBounds`] unless `0 <= lower <= upper` and both
    /// bounds are finite.
    pub fn new(lower: f64, upper: f64) -> Result<Self, BandError> {
        if !lower.is_finite() || !upper.is_finite() || lower < 0.0 || lower > upper {
            return Err(BandError::InvalidBounds { lower, upper });
        }
        Ok(Self { lower, upper })
    }

    /// Create a band as `target * (1 - tolerance)` to `target * (1 + tolerance)`.
    ///
    /// # Errors
    ///
    /// [`BandError::InvalidTolerance`] unless `target > 0` and
    /// `0 <= tolerance <= 1`, all finite.
    pub fn around(target: f64, tolerance: f64) -> Result<Self, BandError> {
        if !target.is_finite() || !tolerance.is_finite() || target <= 0.0 {
            return Err(BandError::InvalidTolerance { target, tolerance });
        }
        if !(0.0..=1.0).contains(&tolerance) {
            return Err(BandError::InvalidTolerance { target, tolerance });
        }
        Self::new(target * (1.0 - tolerance), target * (1.0 + tolerance))
    }

    /// Lower bound.
    pub const fn lower(&self) -> f64 {
        self.lower
    }

    /// Upper bound.
    pub const fn upper(&self) -> f64 {
        self.upper
    }

    /// Classify a risk value against the band. `None` means within band.
    pub fn classify(&self, risk_value: f64) -> Option<BreachDirection> {
        if risk_value > self.upper {
            Some(BreachDirection::AboveUpper)
        } else if risk_value < self.lower {
            Some(BreachDirection::BelowLower)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rstest::rstest;

    #[test]
    fn test_band_validation() {
        assert!(ToleranceBand::new(0.10, 0.30).is_ok());
        assert!(ToleranceBand::new(0.20, 0.20).is_ok());
        assert!(ToleranceBand::new(0.30, 0.10).is_err());
        assert!(ToleranceBand::new(-0.05, 0.30).is_err());
        assert!(ToleranceBand::new(0.10, f64::NAN).is_err());
    }

    #[test]
    fn test_band_around_target() {
        let band = ToleranceBand::around(0.20, 0.5).unwrap();
        assert_relative_eq!(band.lower(), 0.10, epsilon = 1e-12);
        assert_relative_eq!(band.upper(), 0.30, epsilon = 1e-12);

        assert!(ToleranceBand::around(0.0, 0.5).is_err());
        assert!(ToleranceBand::around(0.20, 1.5).is_err());
        assert!(ToleranceBand::around(0.20, -0.1).is_err());
    }

    #[rstest]
    #[case(0.35, Some(BreachDirection::AboveUpper))]
    #[case(0.05, Some(BreachDirection::BelowLower))]
    #[case(0.25, None)]
    #[case(0.30, None)]
    #[case(0.10, None)]
    fn test_classify(#[case] value: f64, #[case] expected: Option<BreachDirection>) {
        let band = ToleranceBand::new(0.10, 0.30).unwrap();
        assert_eq!(band.classify(value), expected);
    }
}
