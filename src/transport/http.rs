//! HTTP event-stream transport over `reqwest`.

use std::collections::BTreeMap;

use futures_util::future::{BoxFuture, FutureExt};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, CACHE_CONTROL, CONTENT_TYPE};

use crate::config::SseConfig;
use crate::transport::{
    into_event_stream, ConnectRequest, EventStream, Transport, TransportError,
};

const LAST_EVENT_ID: &str = "last-event-id";
const EVENT_STREAM: &str = "text/event-stream";

/// Opens event streams with plain HTTP GET requests.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    headers: HeaderMap,
}

impl HttpTransport {
    pub fn new(config: &SseConfig) -> Result<Self, TransportError> {
        let headers = build_headers(&config.headers)?;
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout())
            .build()
            .map_err(|e| TransportError::Request(e.to_string()))?;

        Ok(Self { client, headers })
    }

    /// Use an existing client; `headers` are sent on top of the SSE defaults.
    pub fn with_client(
        client: reqwest::Client,
        extra: &BTreeMap<String, String>,
    ) -> Result<Self, TransportError> {
        Ok(Self {
            client,
            headers: build_headers(extra)?,
        })
    }
}

impl Transport for HttpTransport {
    fn open(
        &self,
        request: ConnectRequest,
    ) -> BoxFuture<'static, Result<EventStream, TransportError>> {
        let mut builder = self.client.get(request.url).headers(self.headers.clone());

        let last_event_id = request.last_event_id;
        if let Some(id) = &last_event_id {
            match HeaderValue::from_str(id) {
                Ok(value) => builder = builder.header(LAST_EVENT_ID, value),
                Err(_) => tracing::warn!(
                    last_event_id = %id,
                    "Event id is not a valid header value, not replaying it"
                ),
            }
        }

        async move {
            let response = builder
                .send()
                .await
                .map_err(|e| TransportError::Request(e.to_string()))?;

            let status = response.status();
            if !status.is_success() {
                return Err(TransportError::Status(status.as_u16()));
            }

            let content_type = response
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|value| value.to_str().ok())
                .unwrap_or_default();
            if !is_event_stream(content_type) {
                return Err(TransportError::ContentType(content_type.to_string()));
            }

            Ok(into_event_stream(response.bytes_stream(), last_event_id))
        }
        .boxed()
    }
}

fn build_headers(extra: &BTreeMap<String, String>) -> Result<HeaderMap, TransportError> {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static(EVENT_STREAM));
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));

    for (name, value) in extra {
        let invalid = |reason: String| TransportError::InvalidHeader {
            name: name.clone(),
            reason,
        };
        let header_name =
            HeaderName::from_bytes(name.as_bytes()).map_err(|e| invalid(e.to_string()))?;
        let header_value = HeaderValue::from_str(value).map_err(|e| invalid(e.to_string()))?;
        headers.insert(header_name, header_value);
    }

    Ok(headers)
}

fn is_event_stream(content_type: &str) -> bool {
    content_type
        .split(';')
        .next()
        .is_some_and(|mime| mime.trim().eq_ignore_ascii_case(EVENT_STREAM))
}
