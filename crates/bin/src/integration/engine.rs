//! The monitoring cycle engine.
//!
//! One engine instance serves a whole roster. Per-client evaluation is
//! isolated: a failure anywhere in one client's pipeline becomes a status
//! row in the cycle report, never an abort of the cycle. Episode
//! transitions commit before the outbox is drained, so a delivery failure
//! can never lose or duplicate a decision.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chrono::{Duration, NaiveDate};
use futures::stream::{self, StreamExt};
use indicatif::ProgressBar;
use tracing::{error, warn};
use vigil::{ClientProfile, ClientRegistry, RosterSettings};
use vigil_alert::{
    BreachDeduplicator, ComplianceEvaluator, ConstituentLine, DedupError, DispatchError,
    DriftSummary, EpisodeStore, EvaluationOutcome, NotificationChannel, OutboxDispatcher,
    Transition,
};
use vigil_data::{
    DataError, MarketDataSource, NormalizerConfig, PriceArchive, PriceSeriesNormalizer,
    RetryPolicy,
};
use vigil_output::{ClientCycleRecord, CycleReport, CycleStatus};
use vigil_risk::{
    AggregateError, AggregationMethod, AssetOutcome, EstimateError, PortfolioHolding,
    RiskAggregator, VolatilityConfig, VolatilityEstimate, VolatilityEstimator,
};

/// Default number of clients evaluated concurrently.
const DEFAULT_CONCURRENCY: usize = 4;

/// Error type for engine construction and cycle execution.
#[derive(Debug, thiserror::Error)]
pub(crate) enum EngineError {
    /// Estimator configuration rejected.
    #[error("Estimator error: {0}")]
    Estimator(#[from] EstimateError),
    /// Outbox drain failed.
    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),
}

/// Tunable settings for one engine instance.
#[derive(Debug, Clone, Copy)]
pub(crate) struct EngineConfig {
    /// Calendar days of price history fetched before the evaluation date.
    pub(crate) lookback_days: u32,
    /// Clients evaluated concurrently.
    pub(crate) concurrency: usize,
    /// Volatility estimator settings.
    pub(crate) volatility: VolatilityConfig,
    /// Price normalization settings.
    pub(crate) normalizer: NormalizerConfig,
    /// Portfolio aggregation policy.
    pub(crate) method: AggregationMethod,
}

impl EngineConfig {
    /// Build an engine config from roster settings.
    pub(crate) fn from_settings(settings: &RosterSettings) -> Self {
        let defaults = VolatilityConfig::default();
        let volatility = VolatilityConfig {
            min_samples: settings.min_samples,
            // A raised floor widens the window with it.
            window: defaults.window.max(settings.min_samples),
            ..defaults
        };
        let method = if settings.correlation {
            AggregationMethod::CorrelationAdjusted {
                min_overlap: settings.min_samples,
            }
        } else {
            AggregationMethod::WeightedSum
        };
        Self {
            lookback_days: settings.lookback_days,
            concurrency: DEFAULT_CONCURRENCY,
            volatility,
            normalizer: NormalizerConfig {
                max_gap_days: settings.max_gap_days,
            },
            method,
        }
    }
}

/// Runs monitoring cycles: fetch, normalize, estimate, aggregate,
/// evaluate, apply the episode transition, then drain the outbox.
pub(crate) struct CycleEngine {
    source: Arc<dyn MarketDataSource>,
    archive: Option<PriceArchive>,
    store: Arc<dyn EpisodeStore>,
    normalizer: PriceSeriesNormalizer,
    estimator: VolatilityEstimator,
    aggregator: RiskAggregator,
    evaluator: ComplianceEvaluator,
    dedup: BreachDeduplicator,
    dispatcher: OutboxDispatcher,
    retry: RetryPolicy,
    lookback_days: u32,
    concurrency: usize,
}

impl fmt::Debug for CycleEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CycleEngine")
            .field("lookback_days", &self.lookback_days)
            .field("concurrency", &self.concurrency)
            .field("aggregator", &self.aggregator)
            .finish_non_exhaustive()
    }
}

impl CycleEngine {
    /// Wire an engine over the given store, source and channel.
    pub(crate) fn new(
        store: Arc<dyn EpisodeStore>,
        source: Arc<dyn MarketDataSource>,
        channel: Arc<dyn NotificationChannel>,
        archive: Option<PriceArchive>,
        config: &EngineConfig,
    ) -> Result<Self, EngineError> {
        let estimator = VolatilityEstimator::new(config.volatility)?;
        Ok(Self {
            source,
            archive,
            normalizer: PriceSeriesNormalizer::new(config.normalizer),
            estimator,
            aggregator: RiskAggregator::new(config.method),
            evaluator: ComplianceEvaluator::new(),
            dedup: BreachDeduplicator::new(store.clone()),
            dispatcher: OutboxDispatcher::new(store.clone(), channel),
            store,
            retry: RetryPolicy::default(),
            lookback_days: config.lookback_days,
            concurrency: config.concurrency.max(1),
        })
    }

    /// Evaluate every roster client for one date and drain the outbox.
    ///
    /// Report rows come back in roster order regardless of completion
    /// order. Clients whose configuration fails to resolve get a
    /// config-error row; nothing about one client can fail another.
    pub(crate) async fn run_cycle(
        &self,
        registry: &ClientRegistry,
        as_of: NaiveDate,
        progress: Option<&ProgressBar>,
    ) -> Result<CycleReport, EngineError> {
        let client_ids = registry.client_ids();
        let mut records: Vec<ClientCycleRecord> = Vec::with_capacity(client_ids.len());

        let mut profiles = Vec::new();
        for client_id in &client_ids {
            match registry.resolve(client_id) {
                Ok(profile) => profiles.push(profile),
                Err(err) => {
                    warn!(client_id = %client_id, error = %err, "client configuration rejected");
                    records.push(
                        ClientCycleRecord::new(client_id.as_str(), CycleStatus::ConfigError)
                            .with_detail(err.to_string()),
                    );
                    if let Some(pb) = progress {
                        pb.inc(1);
                    }
                }
            }
        }

        let evaluated: Vec<ClientCycleRecord> = stream::iter(&profiles)
            .map(|profile| async move {
                let record = self.evaluate_client(profile, as_of).await;
                if let Some(pb) = progress {
                    pb.inc(1);
                }
                record
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;
        records.extend(evaluated);

        let order: HashMap<String, usize> = client_ids
            .into_iter()
            .enumerate()
            .map(|(index, id)| (id, index))
            .collect();
        records.sort_by_key(|record| order.get(&record.client_id).copied().unwrap_or(usize::MAX));

        let mut report = CycleReport::new(as_of);
        for record in records {
            report.push(record);
        }
        self.drain_outbox(&mut report).await?;
        Ok(report)
    }

    /// Evaluate a single roster client for one date and drain the outbox.
    pub(crate) async fn run_single(
        &self,
        registry: &ClientRegistry,
        client_id: &str,
        as_of: NaiveDate,
    ) -> Result<CycleReport, EngineError> {
        let mut report = CycleReport::new(as_of);
        match registry.resolve(client_id) {
            Ok(profile) => report.push(self.evaluate_client(&profile, as_of).await),
            Err(err) => {
                warn!(client_id, error = %err, "client configuration rejected");
                report.push(
                    ClientCycleRecord::new(client_id, CycleStatus::ConfigError)
                        .with_detail(err.to_string()),
                );
            }
        }
        self.drain_outbox(&mut report).await?;
        Ok(report)
    }

    async fn drain_outbox(&self, report: &mut CycleReport) -> Result<(), EngineError> {
        let dispatch = self.dispatcher.drain().await?;
        report.delivered = dispatch.delivered;
        report.deferred = dispatch.deferred;
        report.escalated = dispatch.escalated;
        Ok(())
    }

    /// Run the full pipeline for one client. Never fails; every failure
    /// mode maps to a status row.
    async fn evaluate_client(&self, profile: &ClientProfile, as_of: NaiveDate) -> ClientCycleRecord {
        let start = as_of - Duration::days(i64::from(self.lookback_days));

        let mut outcomes = Vec::with_capacity(profile.holdings.len());
        for symbol in profile.symbols() {
            outcomes.push(self.asset_outcome(&symbol, start, as_of).await);
        }

        // Usable estimates are audited even when the portfolio as a
        // whole cannot be aggregated this cycle.
        let ready: Vec<VolatilityEstimate> = outcomes
            .iter()
            .filter_map(|outcome| match outcome {
                AssetOutcome::Ready { estimate, .. } => Some(estimate.clone()),
                _ => None,
            })
            .collect();
        if !ready.is_empty()
            && let Err(err) = self.store.record_estimates(&ready)
        {
            warn!(client_id = %profile.client_id, error = %err, "estimate audit write failed");
        }

        let (outcome, figure) = match self.aggregator.aggregate(
            &profile.client_id,
            as_of,
            &profile.holdings,
            &outcomes,
        ) {
            Ok(figure) => {
                if let Err(err) = self.store.record_risk_figure(&figure) {
                    warn!(client_id = %profile.client_id, error = %err, "risk figure audit write failed");
                }
                (self.evaluator.evaluate(&profile.band, &figure), Some(figure))
            }
            Err(AggregateError::Incomplete { shortfalls, .. }) => {
                (EvaluationOutcome::skipped(shortfalls.join("; ")), None)
            }
            Err(AggregateError::InvalidWeights { reason, .. }) => {
                return ClientCycleRecord::new(&profile.client_id, CycleStatus::ConfigError)
                    .with_detail(reason);
            }
        };

        let summary = figure.as_ref().map_or_else(String::new, |figure| {
            let constituents = constituent_lines(&profile.holdings, &outcomes);
            DriftSummary {
                client_name: &profile.display_name,
                as_of,
                risk_value: figure.risk_value,
                band: &profile.band,
                constituents: &constituents,
            }
            .render()
        });

        let record = match self.dedup.apply(&profile.client_id, as_of, &outcome, &summary) {
            Ok(transition) => {
                let status = match transition {
                    Transition::Opened(_) => CycleStatus::BreachOpened,
                    Transition::StillBreached(_) => CycleStatus::StillBreached,
                    Transition::Resolved(_) => CycleStatus::BreachResolved,
                    Transition::Clear => CycleStatus::WithinBand,
                    Transition::Skipped { reason } => {
                        return ClientCycleRecord::new(&profile.client_id, CycleStatus::Skipped)
                            .with_detail(reason);
                    }
                };
                ClientCycleRecord::new(&profile.client_id, status)
            }
            Err(DedupError::ConflictExhausted { attempts, .. }) => {
                ClientCycleRecord::new(&profile.client_id, CycleStatus::DeliveryDeferred)
                    .with_detail(format!("episode write conflicted {attempts} times"))
            }
            Err(err) => {
                error!(client_id = %profile.client_id, error = %err, "episode transition failed");
                ClientCycleRecord::new(&profile.client_id, CycleStatus::Failed)
                    .with_detail(err.to_string())
            }
        };

        match figure {
            Some(figure) => {
                record.with_risk(figure.risk_value, profile.band.lower(), profile.band.upper())
            }
            None => record,
        }
    }

    /// Fetch, archive, normalize and estimate one asset's window.
    async fn asset_outcome(&self, symbol: &str, start: NaiveDate, as_of: NaiveDate) -> AssetOutcome {
        let raw = match self
            .retry
            .run("price fetch", DataError::is_transient, || {
                self.source.fetch_prices(symbol, start, as_of)
            })
            .await
        {
            Ok(raw) => raw,
            Err(err) => {
                warn!(symbol, error = %err, "price fetch failed");
                return AssetOutcome::Missing {
                    symbol: symbol.to_string(),
                    reason: err.to_string(),
                };
            }
        };

        if let Some(archive) = &self.archive
            && let Err(err) = archive.store_observations(symbol, &raw)
        {
            warn!(symbol, error = %err, "price archive write failed");
        }

        let series = match self.normalizer.normalize(symbol, &raw) {
            Ok(series) => series,
            Err(err) => {
                return AssetOutcome::Missing {
                    symbol: symbol.to_string(),
                    reason: strip_symbol_prefix(symbol, err.to_string()),
                };
            }
        };

        let returns = self.estimator.returns(&series);
        match self.estimator.estimate_returns(&returns, as_of) {
            Ok(estimate) => AssetOutcome::Ready { estimate, returns },
            Err(EstimateError::InsufficientSamples {
                required, actual, ..
            }) => AssetOutcome::Insufficient {
                symbol: symbol.to_string(),
                required,
                actual,
            },
            Err(err) => AssetOutcome::Missing {
                symbol: symbol.to_string(),
                reason: strip_symbol_prefix(symbol, err.to_string()),
            },
        }
    }
}

/// Per-holding breakdown for rendered summaries, in portfolio order.
fn constituent_lines(
    holdings: &[PortfolioHolding],
    outcomes: &[AssetOutcome],
) -> Vec<ConstituentLine> {
    holdings
        .iter()
        .filter_map(|holding| {
            outcomes.iter().find_map(|outcome| match outcome {
                AssetOutcome::Ready { estimate, .. } if estimate.symbol == holding.symbol => {
                    Some(ConstituentLine {
                        symbol: holding.symbol.clone(),
                        weight: holding.weight,
                        sigma: estimate.sigma,
                    })
                }
                _ => None,
            })
        })
        .collect()
}

/// Data error displays usually lead with the symbol; the outcome carries
/// it separately, so drop the duplicate.
fn strip_symbol_prefix(symbol: &str, text: String) -> String {
    match text.strip_prefix(&format!("{symbol}: ")) {
        Some(stripped) => stripped.to_string(),
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Days;
    use parking_lot::Mutex;
    use uuid::Uuid;
    use vigil_alert::{NotificationKind, NotifyError, PendingNotification, SqliteEpisodeStore};
    use vigil_data::PriceObservation;

    const SINGLE: &str = r#"
[[clients]]
id = "acme-pension"
name = "Acme Pension"
band = { lower = 0.10, upper = 0.30 }
holdings = [{ symbol = "AAPL", weight = 1.0 }]
"#;

    const MIXED: &str = r#"
[[clients]]
id = "bad-weights"
band = { lower = 0.10, upper = 0.30 }
holdings = [{ symbol = "AAPL", weight = 0.9 }]

[[clients]]
id = "acme-pension"
band = { lower = 0.10, upper = 0.30 }
holdings = [{ symbol = "AAPL", weight = 1.0 }]
"#;

    const TWO_ASSET: &str = r#"
[[clients]]
id = "acme-pension"
band = { lower = 0.10, upper = 0.30 }
holdings = [
    { symbol = "AAPL", weight = 0.6 },
    { symbol = "MSFT", weight = 0.4 },
]
"#;

    const PAIR: &str = r#"
[[clients]]
id = "acme-pension"
band = { lower = 0.10, upper = 0.30 }
holdings = [{ symbol = "AAPL", weight = 1.0 }]

[[clients]]
id = "blue-harbor"
band = { lower = 0.10, upper = 0.30 }
holdings = [{ symbol = "MSFT", weight = 1.0 }]
"#;

    fn registry(roster: &str) -> ClientRegistry {
        roster.parse().unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    /// Daily closes ending on `end`, alternating between 100 and
    /// `100 * (1 + swing)`.
    fn alternating_series(end: NaiveDate, days: usize, swing: f64) -> Vec<PriceObservation> {
        let start = end - Days::new(days as u64 - 1);
        (0..days)
            .map(|i| {
                let price = if i % 2 == 0 {
                    100.0
                } else {
                    100.0 * (1.0 + swing)
                };
                PriceObservation::new(start + Days::new(i as u64), price)
            })
            .collect()
    }

    /// Swinging ±10% a day: annualized sigma around 1.5, far above any
    /// sane band.
    fn breach_series(end: NaiveDate) -> Vec<PriceObservation> {
        alternating_series(end, 40, 0.10)
    }

    /// Swinging ±1.26% a day: annualized sigma around 0.20, inside the
    /// [0.10, 0.30] test band.
    fn calm_series(end: NaiveDate) -> Vec<PriceObservation> {
        alternating_series(end, 40, 0.0126)
    }

    #[derive(Default)]
    struct FakeSource {
        series: Mutex<HashMap<String, Vec<PriceObservation>>>,
    }

    impl FakeSource {
        fn set(&self, symbol: &str, observations: Vec<PriceObservation>) {
            self.series.lock().insert(symbol.to_string(), observations);
        }
    }

    #[async_trait]
    impl MarketDataSource for FakeSource {
        async fn fetch_prices(
            &self,
            symbol: &str,
            start: NaiveDate,
            end: NaiveDate,
        ) -> vigil_data::Result<Vec<PriceObservation>> {
            let series = self.series.lock();
            let Some(observations) = series.get(symbol) else {
                return Err(DataError::MissingData {
                    symbol: symbol.to_string(),
                    reason: "no fixture".to_string(),
                });
            };
            Ok(observations
                .iter()
                .filter(|o| o.date >= start && o.date <= end)
                .copied()
                .collect())
        }
    }

    #[derive(Default)]
    struct RecordingChannel {
        delivered: Mutex<Vec<(Uuid, NotificationKind)>>,
    }

    #[async_trait]
    impl NotificationChannel for RecordingChannel {
        fn name(&self) -> &'static str {
            "recording"
        }

        async fn deliver(&self, notification: &PendingNotification) -> Result<(), NotifyError> {
            self.delivered
                .lock()
                .push((notification.episode_id, notification.kind));
            Ok(())
        }
    }

    struct Harness {
        engine: CycleEngine,
        source: Arc<FakeSource>,
        store: Arc<SqliteEpisodeStore>,
        channel: Arc<RecordingChannel>,
    }

    fn harness() -> Harness {
        let source = Arc::new(FakeSource::default());
        let store = Arc::new(SqliteEpisodeStore::in_memory().unwrap());
        let channel = Arc::new(RecordingChannel::default());
        let config = EngineConfig::from_settings(&RosterSettings::default());
        let engine = CycleEngine::new(
            store.clone(),
            source.clone(),
            channel.clone(),
            None,
            &config,
        )
        .unwrap();
        Harness {
            engine,
            source,
            store,
            channel,
        }
    }

    #[test]
    fn test_config_from_settings() {
        let config = EngineConfig::from_settings(&RosterSettings {
            min_samples: 25,
            max_gap_days: 3,
            correlation: true,
            ..RosterSettings::default()
        });
        assert_eq!(config.volatility.min_samples, 25);
        assert_eq!(config.normalizer.max_gap_days, 3);
        assert!(matches!(
            config.method,
            AggregationMethod::CorrelationAdjusted { min_overlap: 25 }
        ));

        // A floor above the default window widens the window with it.
        let config = EngineConfig::from_settings(&RosterSettings {
            min_samples: 40,
            ..RosterSettings::default()
        });
        assert_eq!(config.volatility.window, 40);
    }

    #[tokio::test]
    async fn test_breach_opens_and_rerun_stays_quiet() {
        let h = harness();
        let registry = registry(SINGLE);
        let as_of = date(2024, 3, 1);
        h.source.set("AAPL", breach_series(as_of));

        let report = h.engine.run_cycle(&registry, as_of, None).await.unwrap();
        assert_eq!(report.records.len(), 1);
        assert_eq!(report.records[0].status, CycleStatus::BreachOpened);
        assert!(report.records[0].risk_value.unwrap() > 0.30);
        assert_eq!(report.delivered, 1);

        // Rerunning the same day reports the breach without a second alert.
        let report = h.engine.run_cycle(&registry, as_of, None).await.unwrap();
        assert_eq!(report.records[0].status, CycleStatus::StillBreached);
        assert_eq!(report.delivered, 0);
        assert_eq!(h.channel.delivered.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_lifecycle_resolves_same_episode() {
        let h = harness();
        let registry = registry(SINGLE);

        h.source.set("AAPL", breach_series(date(2024, 3, 1)));
        let r1 = h
            .engine
            .run_cycle(&registry, date(2024, 3, 1), None)
            .await
            .unwrap();
        assert_eq!(r1.records[0].status, CycleStatus::BreachOpened);

        h.source.set("AAPL", breach_series(date(2024, 3, 2)));
        let r2 = h
            .engine
            .run_cycle(&registry, date(2024, 3, 2), None)
            .await
            .unwrap();
        assert_eq!(r2.records[0].status, CycleStatus::StillBreached);

        h.source.set("AAPL", calm_series(date(2024, 3, 3)));
        let r3 = h
            .engine
            .run_cycle(&registry, date(2024, 3, 3), None)
            .await
            .unwrap();
        assert_eq!(r3.records[0].status, CycleStatus::BreachResolved);

        let delivered = h.channel.delivered.lock();
        assert_eq!(delivered.len(), 2);
        assert_eq!(delivered[0].1, NotificationKind::Opened);
        assert_eq!(delivered[1].1, NotificationKind::Resolved);
        // Open and resolve announce the same episode.
        assert_eq!(delivered[0].0, delivered[1].0);
    }

    #[tokio::test]
    async fn test_missing_data_preserves_open_episode() {
        let h = harness();
        let registry = registry(SINGLE);

        h.source.set("AAPL", breach_series(date(2024, 3, 1)));
        h.engine
            .run_cycle(&registry, date(2024, 3, 1), None)
            .await
            .unwrap();

        h.source.set("AAPL", Vec::new());
        let report = h
            .engine
            .run_cycle(&registry, date(2024, 3, 2), None)
            .await
            .unwrap();
        assert_eq!(report.records[0].status, CycleStatus::Skipped);
        assert!(report.records[0].detail.as_deref().unwrap().contains("AAPL"));

        // The episode survived the outage: the next breach continues it.
        h.source.set("AAPL", breach_series(date(2024, 3, 3)));
        let report = h
            .engine
            .run_cycle(&registry, date(2024, 3, 3), None)
            .await
            .unwrap();
        assert_eq!(report.records[0].status, CycleStatus::StillBreached);
        assert_eq!(h.channel.delivered.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_bad_client_config_does_not_poison_cycle() {
        let h = harness();
        let registry = registry(MIXED);
        let as_of = date(2024, 3, 1);
        h.source.set("AAPL", calm_series(as_of));

        let report = h.engine.run_cycle(&registry, as_of, None).await.unwrap();
        assert_eq!(report.records.len(), 2);
        assert_eq!(report.records[0].client_id, "bad-weights");
        assert_eq!(report.records[0].status, CycleStatus::ConfigError);
        assert_eq!(report.records[1].client_id, "acme-pension");
        assert_eq!(report.records[1].status, CycleStatus::WithinBand);
        assert_eq!(report.delivered, 0);
    }

    #[tokio::test]
    async fn test_partial_data_skips_but_keeps_audit_rows() {
        let h = harness();
        let registry = registry(TWO_ASSET);
        let as_of = date(2024, 3, 1);
        h.source.set("AAPL", calm_series(as_of));
        // MSFT has no fixture at all.

        let report = h.engine.run_cycle(&registry, as_of, None).await.unwrap();
        assert_eq!(report.records[0].status, CycleStatus::Skipped);
        assert!(report.records[0].detail.as_deref().unwrap().contains("MSFT"));

        // The usable estimate was still audited; no portfolio figure was.
        let estimates = h.store.estimate_history("AAPL", as_of, as_of).unwrap();
        assert_eq!(estimates.len(), 1);
        assert_eq!(h.store.latest_risk_figure("acme-pension").unwrap(), None);
    }

    #[tokio::test]
    async fn test_within_band_cycle_records_audit_copies() {
        let h = harness();
        let registry = registry(SINGLE);
        let as_of = date(2024, 3, 1);
        h.source.set("AAPL", calm_series(as_of));

        let report = h.engine.run_cycle(&registry, as_of, None).await.unwrap();
        assert_eq!(report.records[0].status, CycleStatus::WithinBand);
        let risk = report.records[0].risk_value.unwrap();
        assert!(risk > 0.10 && risk < 0.30);

        let figure = h.store.latest_risk_figure("acme-pension").unwrap().unwrap();
        assert_eq!(figure.as_of, as_of);
        assert!((figure.risk_value - risk).abs() < 1e-12);
        assert!(h.channel.delivered.lock().is_empty());
    }

    #[tokio::test]
    async fn test_run_single_touches_only_named_client() {
        let h = harness();
        let registry = registry(PAIR);
        let as_of = date(2024, 3, 1);
        h.source.set("AAPL", breach_series(as_of));
        h.source.set("MSFT", breach_series(as_of));

        let report = h
            .engine
            .run_single(&registry, "acme-pension", as_of)
            .await
            .unwrap();
        assert_eq!(report.records.len(), 1);
        assert_eq!(report.records[0].client_id, "acme-pension");
        assert_eq!(report.records[0].status, CycleStatus::BreachOpened);
        assert!(h.store.load("blue-harbor").unwrap().is_none());

        let report = h
            .engine
            .run_single(&registry, "nobody", as_of)
            .await
            .unwrap();
        assert_eq!(report.records[0].status, CycleStatus::ConfigError);
    }
}
