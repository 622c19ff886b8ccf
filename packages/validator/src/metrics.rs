//! Prometheus metrics for the validator relay service
//!
//! Exposed on the /metrics endpoint for scraping.

use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_gauge, register_gauge_vec, register_histogram, CounterVec,
    Gauge, GaugeVec, Histogram,
};

lazy_static! {
    // Transfer metrics
    pub static ref TRANSFERS_OBSERVED: CounterVec = register_counter_vec!(
        "validator_transfers_observed_total",
        "Total number of transfers enqueued",
        &["direction"]
    ).unwrap();

    pub static ref TRANSFERS_PROCESSED: CounterVec = register_counter_vec!(
        "validator_transfers_processed_total",
        "Total number of transfers driven to a terminal state",
        &["direction", "outcome"]
    ).unwrap();

    // Queue metrics
    pub static ref QUEUE_DEPTH: Gauge = register_gauge!(
        "validator_pending_transfers",
        "Number of transfers waiting in the pending queue"
    ).unwrap();

    // Tick metrics
    pub static ref TICK_DURATION: Histogram = register_histogram!(
        "validator_tick_duration_seconds",
        "Duration of one relay tick",
        vec![0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0, 30.0]
    ).unwrap();

    // Error metrics
    pub static ref ERRORS: CounterVec = register_counter_vec!(
        "validator_errors_total",
        "Total number of errors",
        &["ledger", "kind"]
    ).unwrap();

    pub static ref CONSECUTIVE_FAILURES: GaugeVec = register_gauge_vec!(
        "validator_consecutive_failures",
        "Number of consecutive connector failures (circuit breaker)",
        &["ledger"]
    ).unwrap();

    // Health metrics
    pub static ref UP: Gauge = register_gauge!(
        "validator_up",
        "Whether the relay loop is active"
    ).unwrap();

    pub static ref LAST_SUCCESSFUL_TICK: Gauge = register_gauge!(
        "validator_last_successful_tick_timestamp",
        "Unix timestamp of the last completed tick"
    ).unwrap();
}

/// Record a transfer entering the queue.
pub fn record_transfer_observed(direction: &str) {
    TRANSFERS_OBSERVED.with_label_values(&[direction]).inc();
}

/// Record a terminal decision.
pub fn record_transfer_processed(direction: &str, approved: bool) {
    let outcome = if approved { "approved" } else { "rejected" };
    TRANSFERS_PROCESSED
        .with_label_values(&[direction, outcome])
        .inc();
}

/// Record a connector or processing error.
pub fn record_error(ledger: &str, kind: &str) {
    ERRORS.with_label_values(&[ledger, kind]).inc();
}
