//! Prediction metrics.
//!
//! - Request counter by outcome
//! - Latency histogram

use metrics::{counter, histogram};

// =============================================================================
// Metric Names
// =============================================================================

/// Metric name constants for consistency.
pub mod names {
    /// Total prediction requests by outcome.
    pub const REQUESTS_TOTAL: &str = "prediction_requests_total";

    /// End-to-end prediction latency in seconds.
    pub const LATENCY_SECONDS: &str = "prediction_latency_seconds";
}

// =============================================================================
// Recording Functions
// =============================================================================

/// Record metrics for a completed prediction.
///
/// `outcome` is `"success"` or an [`ErrorKind`](crate::ErrorKind) name.
pub fn record_prediction(outcome: &'static str, latency_ms: f64) {
    counter!(names::REQUESTS_TOTAL, "outcome" => outcome).increment(1);
    histogram!(names::LATENCY_SECONDS).record(latency_ms / 1000.0);
}

// =============================================================================
// Tests
// =============================================================================
