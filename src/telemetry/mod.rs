//! Pool telemetry.
//!
//! Every pool keeps a [`Metrics`] collector; [`PoolStats`] combines it with
//! live thread and queue counts for logging and export.

pub mod metrics;

pub use metrics::{Metrics, MetricsSnapshot, PoolStats};
