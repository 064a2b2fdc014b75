//! HTTP API Module
//!
//! Evaluation endpoint plus health, status, policy and metrics for a single
//! defended node.

mod metrics;
mod routes;

pub use metrics::Metrics;
pub use routes::{router, run_api_server, ApiState};
