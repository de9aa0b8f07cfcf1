//! HTTP API Module
//!
//! Operator endpoints over the monitor core: rankings, scan and sync
//! control, performance history, the watch-list and metrics.

mod metrics;
mod routes;

pub use metrics::Metrics;
pub use routes::{router, run_api_server, ApiState};
