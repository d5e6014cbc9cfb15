//! Prometheus metrics registry and instruments.
//!
//! This module is framework-agnostic and can be used from any layer.

use lazy_static::lazy_static;
use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry};

lazy_static! {
    /// Global Prometheus registry
    pub static ref REGISTRY: Registry = Registry::new();

    // Upstream Metrics
    pub static ref UPSTREAM_CALLS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("ledgerlink_upstream_calls_total", "Total number of upstream API calls"),
        &["operation", "outcome"]
    ).expect("metric can be created");
    pub static ref UPSTREAM_CALL_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "ledgerlink_upstream_call_duration_seconds",
            "Upstream API call duration in seconds"
        ).buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
        &["operation"]
    ).expect("metric can be created");

    // Auth Metrics
    pub static ref AUTH_FLOWS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("ledgerlink_auth_flows_total", "Total number of OAuth flow steps"),
        &["stage", "outcome"]
    ).expect("metric can be created");
    pub static ref SESSIONS_ACTIVE: IntGauge = IntGauge::new(
        "ledgerlink_sessions_active",
        "Current number of live sessions"
    ).expect("metric can be created");

    // Error Metrics
    pub static ref ERRORS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("ledgerlink_errors_total", "Total number of errors"),
        &["kind"]
    ).expect("metric can be created");
}

/// Initialize metrics registry.
///
/// Safe to call more than once; repeated registrations are ignored.
pub fn init_metrics() {
    let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(UPSTREAM_CALLS_TOTAL.clone()),
        Box::new(UPSTREAM_CALL_DURATION_SECONDS.clone()),
        Box::new(AUTH_FLOWS_TOTAL.clone()),
        Box::new(SESSIONS_ACTIVE.clone()),
        Box::new(ERRORS_TOTAL.clone()),
    ];

    for collector in collectors {
        if let Err(error) = REGISTRY.register(collector) {
            tracing::debug!(%error, "Metric already registered");
        }
    }

    tracing::info!("Metrics registry initialized");
}
