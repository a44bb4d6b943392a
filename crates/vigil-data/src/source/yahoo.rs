//! Yahoo Finance chart-endpoint source.
//!
//! Speaks the public v8 chart API directly: daily interval, dividend and
//! split events requested so the adjusted close is populated. Adjusted
//! close is preferred for return computation (raw close as fallback when
//! the adjusted block is absent).

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime};
use serde::Deserialize;
use tracing::debug;

use crate::error::{DataError, Result};
use crate::series::PriceObservation;
use crate::source::MarketDataSource;

const CHART_BASE_URL: &str = "https://query1.finance.yahoo.com/v8/finance/chart";
const USER_AGENT: &str = "Mozilla/5.0";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_RATE_LIMIT_DELAY: Duration = Duration::from_millis(500);

/// Market data source backed by the Yahoo Finance chart endpoint.
#[derive(Debug, Clone)]
pub struct YahooChartSource {
    client: reqwest::Client,
    base_url: String,
    rate_limit_delay: Duration,
}

impl YahooChartSource {
    /// Create a source with the default endpoint, timeout and politeness
    /// delay.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            client,
            base_url: CHART_BASE_URL.to_string(),
            rate_limit_delay: DEFAULT_RATE_LIMIT_DELAY,
        })
    }

    /// Override the delay inserted before each request.
    pub fn with_rate_limit_delay(mut self, delay: Duration) -> Self {
        self.rate_limit_delay = delay;
        self
    }

    #[cfg(test)]
    fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl MarketDataSource for YahooChartSource {
    async fn fetch_prices(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PriceObservation>> {
        if symbol.trim().is_empty() {
            return Err(DataError::InvalidSymbol(symbol.to_string()));
        }
        if start > end {
            return Err(DataError::InvalidDateRange {
                start: start.to_string(),
                end: end.to_string(),
            });
        }

        // Stay polite with the unauthenticated endpoint.
        tokio::time::sleep(self.rate_limit_delay).await;

        let period1 = start.and_time(NaiveTime::MIN).and_utc().timestamp();
        let period2 = end
            .and_time(NaiveTime::from_hms_opt(23, 59, 59).unwrap_or(NaiveTime::MIN))
            .and_utc()
            .timestamp();

        let url = format!("{}/{}", self.base_url, symbol);
        let response = self
            .client
            .get(&url)
            .query(&[
                ("period1", period1.to_string()),
                ("period2", period2.to_string()),
                ("interval", "1d".to_string()),
                ("events", "div,splits".to_string()),
            ])
            .send()
            .await?;

        let status = response.status();
        if status.as_u16() == 429 {
            let retry_after_ms = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map_or(1_000, |secs| secs * 1_000);
            return Err(DataError::RateLimit { retry_after_ms });
        }
        if !status.is_success() {
            return Err(DataError::Upstream {
                symbol: symbol.to_string(),
                status: status.as_u16(),
            });
        }

        let payload: ChartResponse = response.json().await?;
        let observations = observations_from_chart(symbol, payload)?;
        debug!(symbol, points = observations.len(), "fetched chart data");
        Ok(observations)
    }
}

/// Convert a chart payload into raw observations.
///
/// Null entries (market holidays, partially populated rows) are skipped;
/// the normalizer deals with the resulting holes.
fn observations_from_chart(symbol: &str, payload: ChartResponse) -> Result<Vec<PriceObservation>> {
    if let Some(error) = payload.chart.error {
        return Err(DataError::MissingData {
            symbol: symbol.to_string(),
            reason: format!("{}: {}", error.code, error.description),
        });
    }

    let result = payload
        .chart
        .result
        .and_then(|mut results| (!results.is_empty()).then(|| results.remove(0)))
        .ok_or_else(|| DataError::MissingData {
            symbol: symbol.to_string(),
            reason: "empty chart result".to_string(),
        })?;

    let timestamps = result.timestamp.unwrap_or_default();
    if timestamps.is_empty() {
        return Err(DataError::MissingData {
            symbol: symbol.to_string(),
            reason: "no timestamps in chart result".to_string(),
        });
    }

    let adjusted = result
        .indicators
        .adjclose
        .as_ref()
        .and_then(|blocks| blocks.first())
        .map(|block| block.adjclose.as_slice());
    let raw_close = result
        .indicators
        .quote
        .first()
        .and_then(|block| block.close.as_deref());
    let closes = adjusted.or(raw_close).ok_or_else(|| DataError::Parse(format!(
        "{symbol}: chart result has neither adjclose nor close"
    )))?;

    let observations = timestamps
        .iter()
        .zip(closes.iter())
        .filter_map(|(ts, close)| {
            let price = (*close)?;
            let date = DateTime::from_timestamp(*ts, 0)?.date_naive();
            Some(PriceObservation::new(date, price))
        })
        .collect();

    Ok(observations)
}

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: Chart,
}

#[derive(Debug, Deserialize)]
struct Chart {
    result: Option<Vec<ChartResult>>,
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    timestamp: Option<Vec<i64>>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    #[serde(default)]
    quote: Vec<QuoteBlock>,
    adjclose: Option<Vec<AdjCloseBlock>>,
}

#[derive(Debug, Deserialize)]
struct QuoteBlock {
    close: Option<Vec<Option<f64>>>,
}

#[derive(Debug, Deserialize)]
struct AdjCloseBlock {
    adjclose: Vec<Option<f64>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    // 2024-01-02 and 2024-01-03 at 14:30 UTC (regular session open).
    const TS_JAN_2: i64 = 1704205800;
    const TS_JAN_3: i64 = 1704292200;

    fn chart_json(body: &str) -> ChartResponse {
        serde_json::from_str(body).unwrap()
    }

    #[test]
    fn test_parse_prefers_adjusted_close() {
        let payload = chart_json(&format!(
            r#"{{"chart":{{"result":[{{"timestamp":[{TS_JAN_2},{TS_JAN_3}],
                "indicators":{{"quote":[{{"close":[185.0,184.0]}}],
                "adjclose":[{{"adjclose":[184.5,183.5]}}]}}}}],"error":null}}}}"#
        ));

        let observations = observations_from_chart("AAPL", payload).unwrap();
        assert_eq!(observations.len(), 2);
        assert_eq!(observations[0].date, date(2024, 1, 2));
        assert_eq!(observations[0].price, 184.5);
        assert_eq!(observations[1].price, 183.5);
    }

    #[test]
    fn test_parse_falls_back_to_raw_close() {
        let payload = chart_json(&format!(
            r#"{{"chart":{{"result":[{{"timestamp":[{TS_JAN_2}],
                "indicators":{{"quote":[{{"close":[185.0]}}]}}}}],"error":null}}}}"#
        ));

        let observations = observations_from_chart("AAPL", payload).unwrap();
        assert_eq!(observations.len(), 1);
        assert_eq!(observations[0].price, 185.0);
    }

    #[test]
    fn test_parse_skips_null_closes() {
        let payload = chart_json(&format!(
            r#"{{"chart":{{"result":[{{"timestamp":[{TS_JAN_2},{TS_JAN_3}],
                "indicators":{{"quote":[{{"close":[185.0,null]}}]}}}}],"error":null}}}}"#
        ));

        let observations = observations_from_chart("AAPL", payload).unwrap();
        assert_eq!(observations.len(), 1);
        assert_eq!(observations[0].date, date(2024, 1, 2));
    }

    #[test]
    fn test_parse_surfaces_chart_error() {
        let payload = chart_json(
            r#"{"chart":{"result":null,
                "error":{"code":"Not Found","description":"No data found, symbol may be delisted"}}}"#,
        );

        let err = observations_from_chart("NOPE", payload).unwrap_err();
        assert!(matches!(err, DataError::MissingData { .. }));
        assert!(err.to_string().contains("delisted"));
    }

    #[test]
    fn test_parse_empty_result() {
        let payload = chart_json(r#"{"chart":{"result":[],"error":null}}"#);
        let err = observations_from_chart("AAPL", payload).unwrap_err();
        assert!(matches!(err, DataError::MissingData { .. }));
    }

    #[tokio::test]
    async fn test_rejects_empty_symbol() {
        let source = YahooChartSource::new()
            .unwrap()
            .with_rate_limit_delay(Duration::ZERO);
        let err = source
            .fetch_prices("  ", date(2024, 1, 2), date(2024, 1, 5))
            .await
            .unwrap_err();
        assert!(matches!(err, DataError::InvalidSymbol(_)));
    }

    #[tokio::test]
    async fn test_rejects_inverted_range() {
        let source = YahooChartSource::new()
            .unwrap()
            .with_rate_limit_delay(Duration::ZERO)
            .with_base_url("http://127.0.0.1:1/unreachable");
        let err = source
            .fetch_prices("AAPL", date(2024, 1, 5), date(2024, 1, 2))
            .await
            .unwrap_err();
        assert!(matches!(err, DataError::InvalidDateRange { .. }));
    }
}
