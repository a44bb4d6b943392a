#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/meridianrisk/vigil/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod export;
pub mod report;

// Re-export main types
pub use export::{
    EpisodeEventExport, ExportError, ExportFormat, Exporter, RiskFigureExport, VolatilityExport,
};
pub use report::{ClientCycleRecord, CycleReport, CycleStatus, ReportError};
