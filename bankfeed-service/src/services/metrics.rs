//! Prometheus metrics for bankfeed-service.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, Encoder, HistogramVec, TextEncoder,
};

/// Histogram for database query duration by operation.
pub static DB_QUERY_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "bankfeed_db_query_duration_seconds",
        "Database query duration in seconds",
        &["operation"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5]
    )
    .expect("Failed to register DB_QUERY_DURATION")
});

/// Counter for statement-line imports.
pub static TRANSACTION_IMPORTS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "bankfeed_transaction_imports_total",
        "Total number of imported statement lines",
        &["status"]
    )
    .expect("Failed to register TRANSACTION_IMPORTS")
});

/// Counter for transaction matches by how they were produced.
pub static TRANSACTION_MATCHES: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "bankfeed_transaction_matches_total",
        "Total number of transaction matches",
        &["match_type"]
    )
    .expect("Failed to register TRANSACTION_MATCHES")
});

/// Counter for auto-match passes.
pub static AUTO_MATCH_RUNS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "bankfeed_auto_match_runs_total",
        "Total number of auto-match passes",
        &["status"]
    )
    .expect("Failed to register AUTO_MATCH_RUNS")
});

/// Counter for errors by type.
pub static ERRORS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "bankfeed_errors_total",
        "Total number of errors",
        &["error_type"]
    )
    .expect("Failed to register ERRORS")
});

/// Initialize all metrics (forces lazy initialization).
pub fn init_metrics() {
    Lazy::force(&DB_QUERY_DURATION);
    Lazy::force(&TRANSACTION_IMPORTS);
    Lazy::force(&TRANSACTION_MATCHES);
    Lazy::force(&AUTO_MATCH_RUNS);
    Lazy::force(&ERRORS);
}

/// Get all metrics as Prometheus text format.
pub fn get_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer).unwrap_or_default();
    String::from_utf8(buffer).unwrap_or_default()
}

/// Record a transaction match.
pub fn record_transaction_match(match_type: &str) {
    TRANSACTION_MATCHES.with_label_values(&[match_type]).inc();
}

/// Record several transaction matches at once (batch passes).
pub fn record_transaction_matches(match_type: &str, count: u64) {
    TRANSACTION_MATCHES
        .with_label_values(&[match_type])
        .inc_by(count as f64);
}

/// Record an auto-match pass.
pub fn record_auto_match_run(status: &str) {
    AUTO_MATCH_RUNS.with_label_values(&[status]).inc();
}

/// Record imported statement lines.
pub fn record_transaction_import(status: &str, count: u64) {
    TRANSACTION_IMPORTS
        .with_label_values(&[status])
        .inc_by(count as f64);
}

/// Record an error.
pub fn record_error(error_type: &str) {
    ERRORS.with_label_values(&[error_type]).inc();
}
