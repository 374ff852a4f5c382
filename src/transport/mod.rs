//! Event-stream transport boundary.
//!
//! # Responsibilities
//! - Open one event-stream connection per call
//! - Turn the response body into a stream of [`RawEvent`]s
//! - Report every failure as a [`TransportError`]
//!
//! # Contract
//! ```text
//! open() resolves Ok      → connection is open
//! stream yields Ok(event) → event received
//! stream yields Err / ends → connection lost
//! stream dropped          → connection closed by the client
//! ```

pub mod http;

use std::fmt;
use std::time::Duration;

use futures_util::future::BoxFuture;
use eventsource_stream::{Event, Eventsource};
use futures_util::stream::{self, BoxStream, Stream, StreamExt};
use thiserror::Error;
use url::Url;

use crate::sse::RawEvent;

pub use http::HttpTransport;

/// Parameters of one connection attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectRequest {
    pub url: Url,
    /// Replayed as `Last-Event-ID` so the server can resume.
    pub last_event_id: Option<String>,
}

/// Events received on an open connection.
pub type EventStream = BoxStream<'static, Result<RawEvent, TransportError>>;

/// Opens event-stream connections.
pub trait Transport: Send + Sync + 'static {
    fn open(
        &self,
        request: ConnectRequest,
    ) -> BoxFuture<'static, Result<EventStream, TransportError>>;
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error("invalid header {name}: {reason}")]
    InvalidHeader { name: String, reason: String },

    #[error("request failed: {0}")]
    Request(String),

    #[error("server responded with status {0}")]
    Status(u16),

    #[error("unexpected content type: {0:?}")]
    ContentType(String),

    #[error("stream read failed: {0}")]
    Stream(String),

    #[error("stream closed by server")]
    Closed,

    #[error("connection attempt timed out after {0:?}")]
    Timeout(Duration),
}

/// Decode a byte-chunk stream into an [`EventStream`].
///
/// The returned stream ends with [`TransportError::Closed`] when the body
/// ends, since the end of an event-stream response is a lost connection.
/// `last_event_id` seeds the decoder so events without an `id:` field keep
/// the id the stream was resumed from.
pub fn into_event_stream<S, B, E>(bytes: S, last_event_id: Option<String>) -> EventStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]>,
    E: fmt::Display,
{
    let mut events = bytes.eventsource();
    if let Some(id) = &last_event_id {
        events.set_last_event_id(id.as_str());
    }
    let mut last_id = last_event_id;

    events
        .map(move |item| match item {
            Ok(event) => Ok(raw_event(event, &mut last_id)),
            Err(err) => Err(TransportError::Stream(err.to_string())),
        })
        .chain(stream::once(async { Err(TransportError::Closed) }))
        .boxed()
}

fn raw_event(event: Event, last_id: &mut Option<String>) -> RawEvent {
    if !event.id.is_empty() {
        *last_id = Some(event.id);
    }

    RawEvent {
        event_type: if event.event.is_empty() {
            "message".to_string()
        } else {
            event.event
        },
        data: event.data,
        last_event_id: last_id.clone(),
        retry: event.retry.map(|delay| delay.as_millis() as u64),
    }
}
