//! Prometheus metrics for observability.
//!
//! This module provides the server-side metrics:
//! - HTTP request metrics (latency, counts, in flight)
//! - Instance totals (collected dynamically)
//!
//! Job, shared resource and streaming metrics live in
//! `pipeserve_core::metrics` and are registered here as well.

use once_cell::sync::Lazy;
use prometheus::{
    self, Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use regex_lite::Regex;
use tracing::warn;

/// Global metrics registry.
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    register_metrics(&registry);
    registry
});

// =============================================================================
// HTTP Request Metrics
// =============================================================================

/// HTTP request duration in seconds.
pub static HTTP_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "pipeserve_http_request_duration_seconds",
            "HTTP request duration in seconds",
        )
        .buckets(vec![
            0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
        ]),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests total count.
pub static HTTP_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("pipeserve_http_requests_total", "Total HTTP requests"),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests currently in flight.
pub static HTTP_REQUESTS_IN_FLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "pipeserve_http_requests_in_flight",
        "Number of HTTP requests currently being processed",
    )
    .unwrap()
});

// =============================================================================
// Instance Metrics
// =============================================================================

/// Instances known to the manager, in any state.
pub static INSTANCES_TOTAL: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "pipeserve_instances",
        "Number of pipeline instances known to the manager",
    )
    .unwrap()
});

// =============================================================================
// Registration
// =============================================================================

fn register_metrics(registry: &Registry) {
    // HTTP
    registry
        .register(Box::new(HTTP_REQUEST_DURATION.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_TOTAL.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_IN_FLIGHT.clone()))
        .unwrap();

    // Instances
    registry
        .register(Box::new(INSTANCES_TOTAL.clone()))
        .unwrap();

    // Core metrics (jobs, shared resources, streaming)
    for metric in pipeserve_core::metrics::all_metrics() {
        registry.register(metric).unwrap();
    }
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        warn!("Failed to encode metrics: {}", e);
        return String::new();
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

/// Collect dynamic metrics from current application state.
///
/// Called before encoding so gauges reflect the manager's current pool.
pub async fn collect_dynamic_metrics(state: &crate::state::AppState) {
    let pool = state.manager().pool_status().await;
    INSTANCES_TOTAL.set(pool.instances as i64);
}

static UUID: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}")
        .unwrap()
});
static INSTANCE_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"[0-9a-fA-F]{32}").unwrap());
static NUMERIC: Lazy<Regex> = Lazy::new(|| Regex::new(r"/\d+(/|$)").unwrap());

/// Normalize a path for metric labels (replace IDs with placeholders).
pub fn normalize_path(path: &str) -> String {
    let result = UUID.replace_all(path, "{id}");
    let result = INSTANCE_ID.replace_all(&result, "{id}");
    let result = NUMERIC.replace_all(&result, "/{id}$1");
    result.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path_uuid() {
        let path = "/api/v1/instances/550e8400-e29b-41d4-a716-446655440000";
        assert_eq!(normalize_path(path), "/api/v1/instances/{id}");
    }

    #[test]
    fn test_normalize_path_simple_uuid() {
        let path = "/api/v1/instances/550e8400e29b41d4a716446655440000/status";
        assert_eq!(normalize_path(path), "/api/v1/instances/{id}/status");
    }

    #[test]
    fn test_normalize_path_numeric_version() {
        let path = "/api/v1/pipelines/detect/1";
        assert_eq!(normalize_path(path), "/api/v1/pipelines/detect/{id}");
    }

    #[test]
    fn test_normalize_path_no_ids() {
        let path = "/api/v1/health";
        assert_eq!(normalize_path(path), "/api/v1/health");
    }

    #[test]
    fn test_encode_metrics_returns_prometheus_format() {
        HTTP_REQUESTS_TOTAL
            .with_label_values(&["GET", "/test", "200"])
            .inc();

        let output = encode_metrics();
        assert!(output.contains("pipeserve_http_requests_total"));
        assert!(output.contains("# HELP"));
        assert!(output.contains("# TYPE"));
    }

    #[test]
    fn test_registry_contains_core_metrics() {
        pipeserve_core::metrics::JOBS_RUNNING.set(0);
        pipeserve_core::metrics::CASCADE_ABORTS.inc_by(0);
        INSTANCES_TOTAL.set(0);

        let output = encode_metrics();
        assert!(output.contains("pipeserve_instances"));
        assert!(output.contains("pipeserve_jobs_running"));
        assert!(output.contains("pipeserve_cascade_aborts_total"));
    }
}
