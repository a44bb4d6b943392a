//! Tolerance band comparison.

use vigil_risk::PortfolioRiskFigure;

use crate::band::{BreachDirection, ToleranceBand};

/// Result of comparing one risk figure against a client band.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EvaluationOutcome {
    /// Risk is inside the approved band.
    WithinBand,

    /// Risk is outside the band.
    Breached(BreachDirection),

    /// No usable risk figure for this cycle. Skipped evaluations never
    /// open, update or close a breach episode.
    Skipped {
        /// Why the evaluation could not be performed.
        reason: String,
    },
}

impl EvaluationOutcome {
    /// Build a skipped outcome.
    pub fn skipped(reason: impl Into<String>) -> Self {
        Self::Skipped {
            reason: reason.into(),
        }
    }

    /// Whether the outcome is a breach.
    pub const fn is_breached(&self) -> bool {
        matches!(self, Self::Breached(_))
    }
}

/// Classifies portfolio risk figures against tolerance bands.
#[derive(Debug, Clone, Copy, Default)]
pub struct ComplianceEvaluator;

impl ComplianceEvaluator {
    /// Create an evaluator.
    pub const fn new() -> Self {
        Self
    }

    /// Evaluate a risk figure against a band.
    ///
    /// A non-finite risk value is reported as skipped rather than
    /// classified; it must not fabricate a compliance state.
    pub fn evaluate(
        &self,
        band: &ToleranceBand,
        figure: &PortfolioRiskFigure,
    ) -> EvaluationOutcome {
        if !figure.risk_value.is_finite() {
            return EvaluationOutcome::skipped(format!(
                "non-finite risk value {}",
                figure.risk_value
            ));
        }
        match band.classify(figure.risk_value) {
            Some(direction) => EvaluationOutcome::Breached(direction),
            None => EvaluationOutcome::WithinBand,
        }
    }
}
