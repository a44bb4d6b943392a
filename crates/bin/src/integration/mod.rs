//! Integration glue for the monitoring cycle.
//!
//! Wires the data, risk and alert crates into one engine the CLI drives:
//! fetch, normalize, estimate, aggregate, evaluate and apply per client,
//! then drain the notification outbox.

pub(crate) mod engine;
pub(crate) mod paths;
