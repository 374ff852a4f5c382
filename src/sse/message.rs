//! Messages handed to subscribers.

use serde::{Deserialize, Serialize};

use crate::clock::unix_millis;

/// A dispatched event, before any interpretation of its payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEvent {
    /// `event:` field, `"message"` when absent.
    pub event_type: String,
    pub data: String,
    /// Last `id:` seen on the stream so far.
    pub last_event_id: Option<String>,
    /// `retry:` hint, in milliseconds.
    pub retry: Option<u64>,
}

/// A received event, stamped with its arrival time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SseMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Dispatched event type (`"message"` for unnamed events).
    pub event: Option<String>,

    pub data: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry: Option<u64>,

    /// Arrival time (ms since epoch).
    pub timestamp: u64,
}

impl SseMessage {
    pub fn from_event(event: RawEvent) -> Self {
        Self {
            id: event.last_event_id,
            event: Some(event.event_type),
            data: event.data,
            retry: event.retry,
            timestamp: unix_millis(),
        }
    }

    pub fn event_type(&self) -> &str {
        self.event.as_deref().unwrap_or("message")
    }
}
