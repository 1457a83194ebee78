//! Lightweight in-process metrics.
//!
//! Counters/gauges/histograms are atomics keyed by label sets in a `DashMap`
//! and rendered in the Prometheus text format on demand (the binary logs a
//! snapshot on shutdown).

pub mod metrics;

pub use metrics::ClientMetrics;
