//! Metrics module for rental-service.
//! Prometheus metrics for booking operations and webhook processing.

use once_cell::sync::Lazy;
use prometheus::{
    Encoder, HistogramVec, IntCounter, IntCounterVec, TextEncoder, histogram_opts, opts,
    register_histogram_vec, register_int_counter, register_int_counter_vec,
};

/// Database query duration histogram
pub static DB_QUERY_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        histogram_opts!("rental_db_query_duration_seconds", "Database query duration"),
        &["operation"]
    )
    .expect("Failed to register DB_QUERY_DURATION")
});

/// Booking lifecycle operations counter
pub static BOOKING_OPERATIONS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        opts!(
            "rental_booking_operations_total",
            "Booking operations by type and outcome"
        ),
        &["operation", "outcome"]
    )
    .expect("Failed to register BOOKING_OPERATIONS_TOTAL")
});

/// Webhook events counter
pub static WEBHOOK_EVENTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        opts!(
            "rental_webhook_events_total",
            "Gateway callback events by type and outcome"
        ),
        &["event_type", "outcome"]
    )
    .expect("Failed to register WEBHOOK_EVENTS_TOTAL")
});

/// Expired holds counter
pub static HOLDS_EXPIRED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(opts!(
        "rental_holds_expired_total",
        "Holds released by the expiry sweep"
    ))
    .expect("Failed to register HOLDS_EXPIRED_TOTAL")
});

/// Initialize all metrics. Call once at startup so the first scrape
/// sees every series.
pub fn init_metrics() {
    Lazy::force(&DB_QUERY_DURATION);
    Lazy::force(&BOOKING_OPERATIONS_TOTAL);
    Lazy::force(&WEBHOOK_EVENTS_TOTAL);
    Lazy::force(&HOLDS_EXPIRED_TOTAL);
}

/// Render the default registry in Prometheus text format.
pub fn get_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode metrics");
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
