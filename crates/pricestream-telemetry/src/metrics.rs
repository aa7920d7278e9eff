//! Prometheus metrics for pricestream.
//!
//! Covers the connection layer (state, reconnects, sends) and the inbound
//! message stream (received, dropped, unparseable).
//!
//! # Panics
//!
//! Metric registration uses `unwrap()`. A registration failure means a
//! duplicate metric name, which is a programming error caught on first use.

use crate::error::{TelemetryError, TelemetryResult};
use once_cell::sync::Lazy;
use prometheus::{
    register_int_counter, register_int_counter_vec, register_int_gauge, Encoder, IntCounter,
    IntCounterVec, IntGauge, TextEncoder,
};
use pricestream_core::ConnectionState;

/// Connection state (0 = disconnected, 1 = connecting, 2 = connected).
pub static WS_STATE: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "pricestream_ws_state",
        "Connection state (0=disconnected, 1=connecting, 2=connected)"
    )
    .unwrap()
});

/// Reconnects scheduled after a close or failure.
/// Labels: reason (closed/failure)
pub static WS_RECONNECT_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "pricestream_ws_reconnect_total",
        "Total reconnects scheduled",
        &["reason"]
    )
    .unwrap()
});

/// Inbound text messages received from the transport.
pub static MESSAGES_RECEIVED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "pricestream_messages_received_total",
        "Total inbound messages received"
    )
    .unwrap()
});

/// Inbound messages published while nobody was subscribed.
pub static MESSAGES_DROPPED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "pricestream_messages_dropped_total",
        "Total inbound messages dropped for lack of subscribers"
    )
    .unwrap()
});

/// Outbound sends by result.
/// Labels: result (accepted/rejected/no_transport)
pub static SENDS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "pricestream_sends_total",
        "Total outbound send attempts",
        &["result"]
    )
    .unwrap()
});

/// Inbound messages that failed to decode as price updates.
pub static PARSE_ERRORS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "pricestream_parse_errors_total",
        "Total inbound messages that failed to parse"
    )
    .unwrap()
});

/// Metrics facade for easy access.
pub struct Metrics;

impl Metrics {
    /// Record the current connection state.
    pub fn ws_state_set(state: ConnectionState) {
        WS_STATE.set(state.as_gauge());
    }

    /// Record a scheduled reconnect.
    pub fn ws_reconnect(reason: &str) {
        WS_RECONNECT_TOTAL.with_label_values(&[reason]).inc();
    }

    /// Record an inbound message.
    pub fn message_received() {
        MESSAGES_RECEIVED_TOTAL.inc();
    }

    /// Record an inbound message nobody was listening for.
    pub fn message_dropped() {
        MESSAGES_DROPPED_TOTAL.inc();
    }

    /// Record an outbound send attempt.
    pub fn send(result: &str) {
        SENDS_TOTAL.with_label_values(&[result]).inc();
    }

    /// Record a message that failed to parse.
    pub fn parse_error() {
        PARSE_ERRORS_TOTAL.inc();
    }

    /// Render all registered metrics in the Prometheus text format.
    pub fn gather_text() -> TelemetryResult<String> {
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&prometheus::gather(), &mut buffer)
            .map_err(|e| TelemetryError::Metrics(e.to_string()))?;
        String::from_utf8(buffer).map_err(|e| TelemetryError::Metrics(e.to_string()))
    }
}
