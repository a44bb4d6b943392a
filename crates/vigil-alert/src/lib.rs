#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/meridianrisk/vigil/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod band;
pub mod dedup;
pub mod dispatch;
pub mod episode;
pub mod evaluator;
pub mod notify;
pub mod render;
pub mod store;

// Re-export main types
pub use band::{BandError, BreachDirection, ToleranceBand};
pub use dedup::{BreachDeduplicator, DedupError, Transition};
pub use dispatch::{DispatchError, DispatchReport, OutboxDispatcher};
pub use episode::{BreachEpisode, ComplianceState, EpisodeEvent, NotificationKind, PendingNotification};
pub use evaluator::{ComplianceEvaluator, EvaluationOutcome};
pub use notify::{LogChannel, NotificationChannel, NotifyError, WebhookChannel};
pub use render::{ConstituentLine, DriftSummary};
pub use store::{EpisodeStore, SqliteEpisodeStore, StoreError, VersionedEpisode};
