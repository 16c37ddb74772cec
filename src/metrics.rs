//! Process-wide pipeline metrics.

use lazy_static::lazy_static;
use prometheus::{
    exponential_buckets, register_histogram, register_int_counter_vec, Encoder, Histogram,
    IntCounterVec, TextEncoder,
};

lazy_static! {
    /// Wall time of a single `process_frame` call inside the worker.
    pub static ref FRAME_LATENCY_SECONDS: Histogram = register_histogram!(
        "plate_tracker_frame_latency_seconds",
        "Time spent processing a single frame",
        exponential_buckets(0.001, 2.0, 12).unwrap()
    )
    .unwrap();

    /// Per-frame outcomes: "detected", "tracked", "empty" or "error".
    pub static ref FRAME_OUTCOMES: IntCounterVec = register_int_counter_vec!(
        "plate_tracker_frame_outcomes_total",
        "Per-frame pipeline outcomes",
        &["outcome"]
    )
    .unwrap();
}

/// Renders all registered metrics in the text exposition format.
pub fn render() -> String {
    let mut buffer = Vec::new();
    let encoder = TextEncoder::new();
    if encoder.encode(&prometheus::gather(), &mut buffer).is_err() {
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
