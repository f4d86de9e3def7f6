// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Metrics instrumentation for dbflow.
//!
//! Uses the `metrics` crate for backend-agnostic metrics collection.
//! The host application chooses the exporter (Prometheus, OTEL, etc.)
//!
//! # Metric Naming Convention
//! - `dbflow_` prefix for all metrics
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Labels
//! - `store`: cache, primary
//! - `operation`: get, save, update, delete
//! - `model`: registered model name
//! - `status`: ok, not_found, error

use metrics::{counter, gauge, histogram};
use std::time::{Duration, Instant};

/// Record the outcome of one store step of an operation
pub fn record_operation(store: &str, operation: &str, status: &str) {
    counter!(
        "dbflow_operations_total",
        "store" => store.to_string(),
        "operation" => operation.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record end-to-end latency of a public operation
pub fn record_latency(operation: &str, duration: Duration) {
    histogram!(
        "dbflow_operation_seconds",
        "operation" => operation.to_string()
    )
    .record(duration.as_secs_f64());
}

/// Record a cache lookup result (`hit`, `miss` or `error`)
pub fn record_cache_lookup(model: &str, result: &str) {
    counter!(
        "dbflow_cache_lookups_total",
        "model" => model.to_string(),
        "result" => result.to_string()
    )
    .increment(1);
}

/// Record a read served by the primary store after the cache missed
pub fn record_fallback(model: &str) {
    counter!(
        "dbflow_primary_fallbacks_total",
        "model" => model.to_string()
    )
    .increment(1);
}

/// Record records written back to the cache after a fallback read
pub fn record_repopulation(model: &str, count: usize) {
    counter!(
        "dbflow_cache_repopulated_records_total",
        "model" => model.to_string()
    )
    .increment(count as u64);
}

/// Record a state where the two stores (or old/new cache entries) disagree
pub fn record_divergence(model: &str, kind: &str) {
    counter!(
        "dbflow_divergence_total",
        "model" => model.to_string(),
        "kind" => kind.to_string()
    )
    .increment(1);
}

/// Record rows removed from a related model by a cascading delete
pub fn record_cascade(model: &str, relation: &str) {
    counter!(
        "dbflow_cascades_total",
        "model" => model.to_string(),
        "relation" => relation.to_string()
    )
    .increment(1);
}

/// Record a retried store command
pub fn record_retry(operation: &str) {
    counter!(
        "dbflow_retries_total",
        "operation" => operation.to_string()
    )
    .increment(1);
}

/// Set the number of registered models
pub fn set_registered_models(count: usize) {
    gauge!("dbflow_registered_models").set(count as f64);
}

/// Record a relation declaration rejected at registration
pub fn record_rejected_relation(model: &str) {
    counter!(
        "dbflow_rejected_relations_total",
        "model" => model.to_string()
    )
    .increment(1);
}

/// A timing guard that records latency on drop
pub struct LatencyTimer {
    operation: &'static str,
    start: Instant,
}

impl LatencyTimer {
    /// Start a new latency timer
    pub fn new(operation: &'static str) -> Self {
        Self {
            operation,
            start: Instant::now(),
        }
    }
}

impl Drop for LatencyTimer {
    fn drop(&mut self) {
        record_latency(self.operation, self.start.elapsed());
    }
}
