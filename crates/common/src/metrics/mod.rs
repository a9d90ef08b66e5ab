//! Metrics and observability utilities
//!
//! Provides Prometheus metrics with SLO-aligned histograms
//! and standardized naming conventions.

use metrics::{
    counter, describe_counter, describe_histogram, histogram, Unit,
};
use std::time::Instant;

/// Metrics prefix for all Ragline metrics
pub const METRICS_PREFIX: &str = "ragline";

/// SLO-aligned histogram buckets for request latency (in seconds)
/// Targets: P50 < 50ms, P99 < 150ms
pub const LATENCY_BUCKETS: &[f64] = &[
    0.001,  // 1ms
    0.005,  // 5ms
    0.010,  // 10ms
    0.025,  // 25ms
    0.050,  // 50ms - P50 target
    0.075,  // 75ms
    0.100,  // 100ms
    0.150,  // 150ms - P99 target
    0.250,  // 250ms
    0.500,  // 500ms
    1.000,  // 1s
    2.500,  // 2.5s
    5.000,  // 5s
    10.00,  // 10s
];

/// Buckets for answer exchanges (generation is slow)
pub const EXCHANGE_BUCKETS: &[f64] = &[
    0.250,  // 250ms
    0.500,  // 500ms
    1.000,  // 1s
    2.500,  // 2.5s
    5.000,  // 5s
    10.00,  // 10s
    30.00,  // 30s
    60.00,  // 60s
    120.0,  // 2m
];

/// Register all metric descriptions
pub fn register_metrics() {
    // Request metrics
    describe_counter!(
        format!("{}_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total number of HTTP requests"
    );

    describe_histogram!(
        format!("{}_request_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "HTTP request latency in seconds"
    );

    // Exchange metrics
    describe_counter!(
        format!("{}_exchanges_total", METRICS_PREFIX),
        Unit::Count,
        "Total question exchanges forwarded to the answering backend"
    );

    describe_histogram!(
        format!("{}_exchange_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "End-to-end exchange latency in seconds"
    );

    // Persistence metrics
    describe_counter!(
        format!("{}_chats_created_total", METRICS_PREFIX),
        Unit::Count,
        "Total chats created"
    );

    describe_counter!(
        format!("{}_messages_persisted_total", METRICS_PREFIX),
        Unit::Count,
        "Total messages persisted"
    );

    describe_counter!(
        format!("{}_analytics_entries_total", METRICS_PREFIX),
        Unit::Count,
        "Total analytics entries recorded"
    );

    tracing::info!("Metrics registered");
}

/// Helper to record request metrics
pub struct RequestMetrics {
    start: Instant,
    endpoint: String,
    method: String,
}

impl RequestMetrics {
    /// Start tracking a request
    pub fn start(method: &str, endpoint: &str) -> Self {
        Self {
            start: Instant::now(),
            endpoint: endpoint.to_string(),
            method: method.to_string(),
        }
    }

    /// Record request completion
    pub fn finish(self, status: u16) {
        let duration = self.start.elapsed().as_secs_f64();

        counter!(
            format!("{}_requests_total", METRICS_PREFIX),
            "method" => self.method.clone(),
            "endpoint" => self.endpoint.clone(),
            "status" => status.to_string()
        )
        .increment(1);

        histogram!(
            format!("{}_request_duration_seconds", METRICS_PREFIX),
            "method" => self.method,
            "endpoint" => self.endpoint
        )
        .record(duration);
    }
}

/// Helper to record one exchange with the answering backend
pub fn record_exchange(duration_secs: f64, mode: &str, success: bool) {
    let status = if success { "ok" } else { "error" };

    counter!(
        format!("{}_exchanges_total", METRICS_PREFIX),
        "mode" => mode.to_string(),
        "status" => status.to_string()
    )
    .increment(1);

    if success {
        histogram!(
            format!("{}_exchange_duration_seconds", METRICS_PREFIX),
            "mode" => mode.to_string()
        )
        .record(duration_secs);
    }
}

/// Helper to record a created chat
pub fn record_chat_created() {
    counter!(format!("{}_chats_created_total", METRICS_PREFIX)).increment(1);
}

/// Helper to record a persisted message
pub fn record_message_persisted(role: &str) {
    counter!(
        format!("{}_messages_persisted_total", METRICS_PREFIX),
        "role" => role.to_string()
    )
    .increment(1);
}

/// Helper to record an analytics entry
pub fn record_analytics_entry(streamed: bool) {
    counter!(
        format!("{}_analytics_entries_total", METRICS_PREFIX),
        "streamed" => streamed.to_string()
    )
    .increment(1);
}
