//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Pipeline manager (admissions, terminal states, queue and running gauges)
//! - Shared resource cache (live entries, cascading aborts)
//! - Streaming sessions (active sessions, retries)

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts};

// =============================================================================
// Pipeline Manager
// =============================================================================

/// Instances admitted, by template name.
pub static JOBS_CREATED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("pipeserve_jobs_created_total", "Total pipeline instances created"),
        &["template"],
    )
    .unwrap()
});

/// Instances that reached a terminal state, by state.
pub static JOBS_FINISHED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "pipeserve_jobs_finished_total",
            "Total pipeline instances that reached a terminal state",
        ),
        &["state"], // "COMPLETED", "ERROR", "ABORTED"
    )
    .unwrap()
});

/// Instances currently holding an admission slot.
pub static JOBS_RUNNING: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new("pipeserve_jobs_running", "Pipeline instances holding a run slot").unwrap()
});

/// Instances waiting for admission.
pub static JOBS_QUEUED: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new("pipeserve_jobs_queued", "Pipeline instances waiting for admission").unwrap()
});

/// Wall-clock run time of finished instances.
pub static JOB_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "pipeserve_job_duration_seconds",
            "Run time of pipeline instances from start to terminal state",
        )
        .buckets(vec![0.5, 1.0, 5.0, 15.0, 60.0, 300.0, 900.0, 3600.0]),
        &["state"],
    )
    .unwrap()
});

// =============================================================================
// Shared Resources
// =============================================================================

/// Live shared resource cache entries.
pub static SHARED_RESOURCES: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new("pipeserve_shared_resources", "Live shared resource cache entries").unwrap()
});

/// Instances stopped because a shared resource they depended on faulted.
pub static CASCADE_ABORTS: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "pipeserve_cascade_aborts_total",
        "Instances stopped by a shared resource fault",
    )
    .unwrap()
});

// =============================================================================
// Streaming
// =============================================================================

/// Streaming session tasks currently running.
pub static STREAM_SESSIONS_ACTIVE: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new("pipeserve_stream_sessions_active", "Running streaming sessions").unwrap()
});

/// Streaming session reconnect attempts.
pub static STREAM_RETRIES: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "pipeserve_stream_retries_total",
        "Streaming session reconnect attempts",
    )
    .unwrap()
});

/// Returns all core metrics for registration.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        // Manager
        Box::new(JOBS_CREATED.clone()),
        Box::new(JOBS_FINISHED.clone()),
        Box::new(JOBS_RUNNING.clone()),
        Box::new(JOBS_QUEUED.clone()),
        Box::new(JOB_DURATION.clone()),
        // Shared resources
        Box::new(SHARED_RESOURCES.clone()),
        Box::new(CASCADE_ABORTS.clone()),
        // Streaming
        Box::new(STREAM_SESSIONS_ACTIVE.clone()),
        Box::new(STREAM_RETRIES.clone()),
    ]
}
