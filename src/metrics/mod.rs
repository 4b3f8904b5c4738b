//! Metrics module
//!
//! Provides Prometheus metrics for both the widget controller and the
//! signing server.

use lazy_static::lazy_static;
use prometheus::{
    register_counter, register_counter_vec, register_histogram, register_int_gauge, Counter,
    CounterVec, Encoder, Histogram, IntGauge, TextEncoder,
};

lazy_static! {
    // Authorization metrics
    pub static ref AUTHORIZATIONS_TOTAL: CounterVec = register_counter_vec!(
        "s3file_authorizations_total",
        "Upload authorization requests by outcome",
        &["outcome"]
    ).unwrap();

    // Upload metrics
    pub static ref UPLOADS_TOTAL: CounterVec = register_counter_vec!(
        "s3file_uploads_total",
        "Total number of direct uploads",
        &["status"]
    ).unwrap();

    pub static ref UPLOAD_BYTES_TOTAL: Counter = register_counter!(
        "s3file_upload_bytes_total",
        "Total bytes uploaded to storage"
    ).unwrap();

    pub static ref UPLOAD_DURATION: Histogram = register_histogram!(
        "s3file_upload_duration_seconds",
        "Direct upload duration in seconds",
        vec![0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0]
    ).unwrap();

    // Submission gate
    pub static ref GATE_OUTSTANDING: IntGauge = register_int_gauge!(
        "s3file_gate_outstanding",
        "Uploads currently holding the submission gate"
    ).unwrap();

    // Signer metrics
    pub static ref GRANTS_SIGNED: Counter = register_counter!(
        "s3file_grants_signed_total",
        "Upload grants issued by the signing endpoint"
    ).unwrap();

    // Error metrics
    pub static ref ERRORS_TOTAL: CounterVec = register_counter_vec!(
        "s3file_errors_total",
        "Total errors",
        &["type"]
    ).unwrap();
}

/// Record an authorization attempt outcome
pub fn record_authorization(outcome: &str) {
    AUTHORIZATIONS_TOTAL.with_label_values(&[outcome]).inc();
}

/// Record a successful upload
pub fn record_upload_success(bytes: u64) {
    UPLOADS_TOTAL.with_label_values(&["success"]).inc();
    UPLOAD_BYTES_TOTAL.inc_by(bytes as f64);
}

/// Record a failed upload
pub fn record_upload_failure() {
    UPLOADS_TOTAL.with_label_values(&["failure"]).inc();
}

/// Record upload duration
pub fn record_upload_duration(duration_secs: f64) {
    UPLOAD_DURATION.observe(duration_secs);
}

/// Track the submission gate count
pub fn set_gate_outstanding(outstanding: usize) {
    GATE_OUTSTANDING.set(outstanding as i64);
}

/// Record a signed grant
pub fn record_grant_signed() {
    GRANTS_SIGNED.inc();
}

/// Record an error
pub fn record_error(error_type: &str) {
    ERRORS_TOTAL.with_label_values(&[error_type]).inc();
}

/// Render every registered metric in the Prometheus text format
pub fn gather_text() -> String {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        tracing::error!(error = %e, "Failed to encode metrics");
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
