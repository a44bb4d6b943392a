#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/meridianrisk/vigil/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod clients;

// Re-export main types from sub-crates
pub use vigil_alert as alert;
pub use vigil_data as data;
pub use vigil_output as output;
pub use vigil_risk as risk;

// Re-export common client types
pub use clients::{ClientConfigError, ClientProfile, ClientRegistry, RosterError, RosterSettings};

/// Version information.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
