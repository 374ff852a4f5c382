//! Connection state and client-level metrics.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Connecting,
    Connected,
    Disconnected,
    Error,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Error => "error",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of a client's counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SseMetrics {
    pub messages_received: u64,
    pub bytes_received: u64,
    pub reconnections: u64,
    pub errors: u64,
    /// Messages currently buffered and not yet delivered.
    pub buffer_size: usize,
    /// Messages shed by backpressure.
    pub messages_dropped: u64,
    pub connection_state: ConnectionState,
    /// Last sign of life from the server (ms since epoch).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_heartbeat: Option<u64>,
}

impl Default for SseMetrics {
    fn default() -> Self {
        Self {
            messages_received: 0,
            bytes_received: 0,
            reconnections: 0,
            errors: 0,
            buffer_size: 0,
            messages_dropped: 0,
            connection_state: ConnectionState::Disconnected,
            last_heartbeat: None,
        }
    }
}
