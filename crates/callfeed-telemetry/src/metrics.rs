//! Prometheus metrics for the calls feed.
//!
//! Covers:
//! - Stream connection state and reconnects
//! - Snapshot fetch outcomes and latency
//! - Merge outcomes (admitted, duplicate, malformed)
//!
//! # Panics
//!
//! Metric registration uses `unwrap()`. Registration only fails on duplicate
//! metric names, which is a programming error caught on first access.

use crate::error::{TelemetryError, TelemetryResult};
use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram, register_int_counter, register_int_gauge,
    CounterVec, Encoder, Histogram, IntCounter, IntGauge, TextEncoder,
};

/// Stream connection state (1 = open, 0 = not open).
pub static STREAM_CONNECTED: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "callfeed_stream_connected",
        "Stream connection state (1=open)"
    )
    .unwrap()
});

/// Total stream reconnection attempts.
/// Labels: reason (connect_failed/dropped/heartbeat_timeout/...)
pub static STREAM_RECONNECT_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "callfeed_stream_reconnect_total",
        "Total stream reconnection attempts",
        &["reason"]
    )
    .unwrap()
});

/// Snapshot fetches by outcome.
/// Labels: outcome (ok/network/timeout/status/malformed/client)
pub static SNAPSHOT_FETCH_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "callfeed_snapshot_fetch_total",
        "Snapshot fetches by outcome",
        &["outcome"]
    )
    .unwrap()
});

/// Snapshot round-trip latency in milliseconds.
pub static SNAPSHOT_LATENCY_MS: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(
        "callfeed_snapshot_latency_ms",
        "Snapshot request latency in milliseconds",
        vec![5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 10000.0]
    )
    .unwrap()
});

/// Messages admitted into the exposed feed.
/// Labels: origin (snapshot/stream)
pub static MESSAGES_ADMITTED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "callfeed_messages_admitted_total",
        "Messages admitted into the exposed feed",
        &["origin"]
    )
    .unwrap()
});

/// Messages dropped because their id was already present.
pub static MESSAGES_DUPLICATE_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "callfeed_messages_duplicate_total",
        "Messages dropped as duplicates by id"
    )
    .unwrap()
});

/// Records that failed to parse.
/// Labels: source (snapshot/stream)
pub static MESSAGES_MALFORMED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "callfeed_messages_malformed_total",
        "Wire records that failed to parse",
        &["source"]
    )
    .unwrap()
});

/// Number of messages currently exposed.
pub static FEED_SIZE: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!("callfeed_feed_size", "Messages currently exposed").unwrap()
});

/// Metrics facade.
pub struct Metrics;

impl Metrics {
    /// Record stream open.
    pub fn stream_connected() {
        STREAM_CONNECTED.set(1);
    }

    /// Record stream closed.
    pub fn stream_disconnected() {
        STREAM_CONNECTED.set(0);
    }

    /// Record a scheduled reconnect.
    pub fn stream_reconnect(reason: &str) {
        STREAM_RECONNECT_TOTAL.with_label_values(&[reason]).inc();
    }

    /// Record a snapshot fetch outcome and its latency.
    pub fn snapshot_fetched(outcome: &str, latency_ms: f64) {
        SNAPSHOT_FETCH_TOTAL.with_label_values(&[outcome]).inc();
        SNAPSHOT_LATENCY_MS.observe(latency_ms);
    }

    /// Record messages admitted into the feed.
    pub fn messages_admitted(origin: &str, count: usize) {
        if count > 0 {
            MESSAGES_ADMITTED_TOTAL
                .with_label_values(&[origin])
                .inc_by(count as f64);
        }
    }

    /// Record duplicates dropped by the merge.
    pub fn messages_duplicate(count: usize) {
        MESSAGES_DUPLICATE_TOTAL.inc_by(count as u64);
    }

    /// Record a malformed wire record.
    pub fn message_malformed(source: &str) {
        MESSAGES_MALFORMED_TOTAL.with_label_values(&[source]).inc();
    }

    /// Set exposed feed size.
    pub fn feed_size(size: usize) {
        FEED_SIZE.set(size as i64);
    }

    /// Render all registered metrics in the text exposition format.
    pub fn gather_text() -> TelemetryResult<String> {
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&prometheus::gather(), &mut buffer)
            .map_err(|e| TelemetryError::Metrics(e.to_string()))?;
        String::from_utf8(buffer).map_err(|e| TelemetryError::Metrics(e.to_string()))
    }
}
