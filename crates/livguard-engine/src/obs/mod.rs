//! Lightweight in-process metrics.
//!
//! Exposes Prometheus-compatible counters without adding external crates.
//! Metrics are stored as atomics and rendered by the `/metrics` handler.

pub mod metrics;

pub use metrics::EngineMetrics;
