//! Metrics collection and exposition.
//!
//! # Metrics
//! - `sse_messages_received_total` (counter): events delivered by the transport
//! - `sse_bytes_received_total` (counter): payload bytes received
//! - `sse_messages_dropped_total` (counter): messages shed by backpressure
//! - `sse_reconnections_total` (counter): reconnect attempts
//! - `sse_transport_errors_total` (counter): failed attempts and lost connections
//! - `sse_handler_errors_total` (counter): message handler failures
//! - `sse_buffer_size` (gauge): undelivered messages
//! - `sse_connection_state` (gauge): 1 for the current state, 0 for the others
//! - `sse_circuit_state` (gauge): 0=closed, 1=half-open, 2=open

use std::net::SocketAddr;

use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

use crate::client::ConnectionState;
use crate::resilience::CircuitState;

const CONNECTION_STATES: [ConnectionState; 4] = [
    ConnectionState::Connecting,
    ConnectionState::Connected,
    ConnectionState::Disconnected,
    ConnectionState::Error,
];

/// Install the Prometheus recorder and serve it on `addr`.
///
/// Must be called from within a tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    register_metrics();
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

fn register_metrics() {
    describe_counter!("sse_messages_received_total", "Events received from the server");
    describe_counter!("sse_bytes_received_total", "Event payload bytes received");
    describe_counter!("sse_messages_dropped_total", "Messages shed by backpressure");
    describe_counter!("sse_reconnections_total", "Reconnect attempts");
    describe_counter!(
        "sse_transport_errors_total",
        "Failed connection attempts and lost connections"
    );
    describe_counter!("sse_handler_errors_total", "Message handler failures");
    describe_gauge!("sse_buffer_size", "Buffered, undelivered messages");
    describe_gauge!("sse_connection_state", "Current connection state");
    describe_gauge!("sse_circuit_state", "Circuit breaker state (0=closed, 1=half-open, 2=open)");
}

pub fn record_message(bytes: usize) {
    counter!("sse_messages_received_total").increment(1);
    counter!("sse_bytes_received_total").increment(bytes as u64);
}

pub fn record_dropped(count: u64) {
    counter!("sse_messages_dropped_total").increment(count);
}

pub fn record_reconnection() {
    counter!("sse_reconnections_total").increment(1);
}

pub fn record_transport_error() {
    counter!("sse_transport_errors_total").increment(1);
}

pub fn record_handler_error() {
    counter!("sse_handler_errors_total").increment(1);
}

pub fn record_buffer_size(len: usize) {
    gauge!("sse_buffer_size").set(len as f64);
}

pub fn record_connection_state(current: ConnectionState) {
    for state in CONNECTION_STATES {
        let value = if state == current { 1.0 } else { 0.0 };
        gauge!("sse_connection_state", "state" => state.as_str()).set(value);
    }
}

pub fn record_circuit_state(state: CircuitState) {
    let value = match state {
        CircuitState::Closed => 0.0,
        CircuitState::HalfOpen => 1.0,
        CircuitState::Open => 2.0,
    };
    gauge!("sse_circuit_state").set(value);
}
