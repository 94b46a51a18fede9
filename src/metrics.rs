//! Metrics and telemetry for the dataset engine
//!
//! Prometheus metrics for query outcomes, produced rows and validation cost.
//! Everything registers with the default registry, which `/metrics` encodes.

use lazy_static::lazy_static;
use prometheus::{
    register_counter, register_counter_vec, register_gauge, register_histogram, Counter,
    CounterVec, Encoder, Gauge, Histogram, TextEncoder,
};

lazy_static! {
    // === Query Counters ===

    /// Dataset queries by timeline mode and outcome
    pub static ref DATASET_QUERIES_TOTAL: CounterVec = register_counter_vec!(
        "tsdataset_queries_total",
        "Dataset queries by timeline mode and outcome",
        &["mode", "outcome"]
    ).expect("tsdataset_queries_total registers once");

    /// Rows handed to callers
    pub static ref DATASET_ROWS_TOTAL: Counter = register_counter!(
        "tsdataset_rows_total",
        "Dataset rows produced"
    ).expect("tsdataset_rows_total registers once");

    /// Query errors by kind
    pub static ref DATASET_ERRORS_TOTAL: CounterVec = register_counter_vec!(
        "tsdataset_errors_total",
        "Dataset query errors by kind",
        &["kind"]
    ).expect("tsdataset_errors_total registers once");

    // === Latency Histograms ===

    /// Time spent validating a query, including stream existence checks
    pub static ref VALIDATION_DURATION: Histogram = register_histogram!(
        "tsdataset_validation_duration_seconds",
        "Dataset query validation latency in seconds",
        vec![0.00001, 0.0001, 0.001, 0.01, 0.1, 1.0]
    ).expect("tsdataset_validation_duration_seconds registers once");

    // === System Health ===

    /// Streams currently held by the store
    pub static ref STREAMS_LOADED: Gauge = register_gauge!(
        "tsdataset_streams_loaded",
        "Number of streams in the store"
    ).expect("tsdataset_streams_loaded registers once");

    /// Health status (0=unhealthy, 1=healthy)
    pub static ref HEALTH_STATUS: Gauge = register_gauge!(
        "tsdataset_health_status",
        "System health status (0=unhealthy, 1=healthy)"
    ).expect("tsdataset_health_status registers once");
}

/// Initialize metrics system
pub fn init() {
    HEALTH_STATUS.set(1.0);
    tracing::info!("Metrics system initialized");
}

/// Get metrics in Prometheus text format
pub fn gather_metrics() -> Result<String, String> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = vec![];

    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| format!("Failed to encode metrics: {}", e))?;

    String::from_utf8(buffer).map_err(|e| format!("Metrics contain invalid UTF-8: {}", e))
}

/// Record the outcome of `Run`
#[inline]
pub fn record_query(mode: &str, outcome: &str) {
    DATASET_QUERIES_TOTAL
        .with_label_values(&[mode, outcome])
        .inc();
}

/// Record a query error
#[inline]
pub fn record_error(kind: &str) {
    DATASET_ERRORS_TOTAL.with_label_values(&[kind]).inc();
}

/// Record rows produced by one output sequence
#[inline]
pub fn record_rows(rows: u64) {
    if rows > 0 {
        DATASET_ROWS_TOTAL.inc_by(rows as f64);
    }
}

/// Record validation latency
#[inline]
pub fn record_validation(duration_secs: f64) {
    VALIDATION_DURATION.observe(duration_secs);
}

/// Update the number of stored streams
#[inline]
pub fn update_stream_count(count: usize) {
    STREAMS_LOADED.set(count as f64);
}
