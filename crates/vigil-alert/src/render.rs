//! Notification summary rendering.
//!
//! The rendered body rides along with the transition commit into the
//! outbox, so the text a client receives reflects exactly the figures
//! the decision was made on.

use chrono::NaiveDate;

use crate::band::ToleranceBand;

/// One holding line in a rendered summary.
#[derive(Debug, Clone, PartialEq)]
pub struct ConstituentLine {
    /// Asset symbol.
    pub symbol: String,

    /// Portfolio weight.
    pub weight: f64,

    /// Annualized volatility estimate.
    pub sigma: f64,
}

/// Inputs for one rendered notification body.
#[derive(Debug, Clone)]
pub struct DriftSummary<'a> {
    /// Display name for the client.
    pub client_name: &'a str,

    /// Evaluation date.
    pub as_of: NaiveDate,

    /// Portfolio risk value the evaluation used.
    pub risk_value: f64,

    /// Band the value was compared against.
    pub band: &'a ToleranceBand,

    /// Per-holding breakdown, in portfolio order.
    pub constituents: &'a [ConstituentLine],
}

impl DriftSummary<'_> {
    /// Render the notification body.
    pub fn render(&self) -> String {
        let mut output = String::new();

        output.push_str(&format!(
            "Portfolio risk review for {} as of {}\n",
            self.client_name, self.as_of
        ));
        output.push_str(&format!(
            "Annualized volatility {:.2}% against approved band {:.2}%-{:.2}%\n",
            self.risk_value * 100.0,
            self.band.lower() * 100.0,
            self.band.upper() * 100.0
        ));

        if !self.constituents.is_empty() {
            output.push_str("\nHoldings:\n");
            for line in self.constituents {
                output.push_str(&format!(
                    "  {:<8} weight {:>5.1}%  volatility {:>6.2}%\n",
                    line.symbol,
                    line.weight * 100.0,
                    line.sigma * 100.0
                ));
            }
        }

        output
    }
}
