//! Shared utilities for integration and load testing.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::future::{self, BoxFuture, FutureExt};
use futures_util::stream::{self, StreamExt};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use resilient_sse::sse::RawEvent;
use resilient_sse::transport::{ConnectRequest, EventStream, Transport, TransportError};
use resilient_sse::SseConfig;

/// Config with short delays, suitable for tests.
pub fn fast_config(url: &str) -> SseConfig {
    let mut config = SseConfig::new(url);
    config.reconnect_timeout_ms = 100;
    config.backoff_base_ms = 10;
    config.heartbeat_interval_ms = 60_000;
    config.connect_timeout_ms = 2_000;
    config
}

/// Poll `condition` every 10ms, panicking after 10s.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..1_000 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not met in time");
}

// =============================================================================
// Mock SSE backend
// =============================================================================

/// How the mock backend answers one request.
pub enum Reply {
    /// Event-stream body, then close the connection.
    Events(String),
    /// Event-stream body, then keep the connection open.
    EventsThenHold(String),
    /// Empty response with the given status.
    Status(u16),
    /// 200 with a non-event-stream content type.
    Json(String),
}

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub path: String,
    pub last_event_id: Option<String>,
    pub accept: Option<String>,
}

pub struct MockBackend {
    pub addr: SocketAddr,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl MockBackend {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

/// Start a programmable SSE backend on an ephemeral port.
///
/// `respond` receives the 0-based request index.
pub async fn start_sse_backend<F>(respond: F) -> MockBackend
where
    F: Fn(usize) -> Reply + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let requests = Arc::new(Mutex::new(Vec::new()));
    let respond = Arc::new(respond);

    let recorded = requests.clone();
    tokio::spawn(async move {
        loop {
            let (mut socket, _) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(_) => break,
            };
            let respond = respond.clone();
            let recorded = recorded.clone();

            tokio::spawn(async move {
                let Some(request) = read_request(&mut socket).await else {
                    return;
                };
                let index = {
                    let mut recorded = recorded.lock().unwrap();
                    recorded.push(request);
                    recorded.len() - 1
                };

                let (head, body, hold) = match respond(index) {
                    Reply::Events(body) => (event_stream_head(), body, false),
                    Reply::EventsThenHold(body) => (event_stream_head(), body, true),
                    Reply::Status(status) => (
                        format!(
                            "HTTP/1.1 {} {}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
                            status,
                            reason(status)
                        ),
                        String::new(),
                        false,
                    ),
                    Reply::Json(body) => (
                        format!(
                            "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\n\
                             Content-Length: {}\r\nConnection: close\r\n\r\n",
                            body.len()
                        ),
                        body,
                        false,
                    ),
                };

                if socket.write_all(head.as_bytes()).await.is_err() {
                    return;
                }
                let _ = socket.write_all(body.as_bytes()).await;
                let _ = socket.flush().await;

                if hold {
                    // Held until the client goes away.
                    let mut sink = [0u8; 64];
                    while let Ok(n) = socket.read(&mut sink).await {
                        if n == 0 {
                            break;
                        }
                    }
                } else {
                    let _ = socket.shutdown().await;
                }
            });
        }
    });

    MockBackend { addr, requests }
}

fn event_stream_head() -> String {
    concat!(
        "HTTP/1.1 200 OK\r\n",
        "Content-Type: text/event-stream\r\n",
        "Cache-Control: no-cache\r\n",
        "Connection: close\r\n\r\n",
    )
    .to_string()
}

fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        404 => "Not Found",
        429 => "Too Many Requests",
        500 => "Internal Server Error",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        _ => "Unknown",
    }
}

async fn read_request(socket: &mut tokio::net::TcpStream) -> Option<RecordedRequest> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];

    while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
    }

    let text = String::from_utf8_lossy(&buf);
    let mut lines = text.split("\r\n");
    let path = lines.next()?.split_whitespace().nth(1)?.to_string();

    let mut last_event_id = None;
    let mut accept = None;
    for line in lines {
        if let Some((name, value)) = line.split_once(':') {
            match name.trim().to_ascii_lowercase().as_str() {
                "last-event-id" => last_event_id = Some(value.trim().to_string()),
                "accept" => accept = Some(value.trim().to_string()),
                _ => {}
            }
        }
    }

    Some(RecordedRequest {
        path,
        last_event_id,
        accept,
    })
}

/// `count` events with ids `0..count`, as one event-stream body.
pub fn numbered_events(count: usize) -> String {
    (0..count)
        .map(|i| format!("id: {}\ndata: {{\"content\":\"token-{}\"}}\n\n", i, i))
        .collect()
}

// =============================================================================
// Scripted in-memory transport
// =============================================================================

pub type Feed = mpsc::UnboundedSender<Result<RawEvent, TransportError>>;

/// Outcome of one `open()` call.
pub enum Step {
    Fail(TransportError),
    /// Open; items arrive through the paired [`Feed`]. Dropping the feed ends the stream.
    Open(mpsc::UnboundedReceiver<Result<RawEvent, TransportError>>),
    /// Never resolves.
    Hang,
}

pub fn feed() -> (Feed, Step) {
    let (tx, rx) = mpsc::unbounded_channel();
    (tx, Step::Open(rx))
}

pub fn fail(status: u16) -> Step {
    Step::Fail(TransportError::Status(status))
}

/// Transport that plays back a fixed script; exhausted scripts fail with 503.
pub struct ScriptedTransport {
    script: Mutex<VecDeque<Step>>,
    attempts: AtomicUsize,
    last_event_ids: Mutex<Vec<Option<String>>>,
}

impl ScriptedTransport {
    pub fn new(steps: Vec<Step>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(steps.into()),
            attempts: AtomicUsize::new(0),
            last_event_ids: Mutex::new(Vec::new()),
        })
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn last_event_ids(&self) -> Vec<Option<String>> {
        self.last_event_ids.lock().unwrap().clone()
    }
}

impl Transport for ScriptedTransport {
    fn open(
        &self,
        request: ConnectRequest,
    ) -> BoxFuture<'static, Result<EventStream, TransportError>> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        self.last_event_ids.lock().unwrap().push(request.last_event_id);

        let step = self.script.lock().unwrap().pop_front();
        match step {
            Some(Step::Fail(err)) => future::ready(Err(err)).boxed(),
            None => future::ready(Err(TransportError::Status(503))).boxed(),
            Some(Step::Hang) => future::pending().boxed(),
            Some(Step::Open(rx)) => {
                let items = stream::unfold(rx, |mut rx| async move {
                    rx.recv().await.map(|item| (item, rx))
                });
                future::ready(Ok(items.boxed())).boxed()
            }
        }
    }
}

pub fn event(id: Option<&str>, data: &str) -> Result<RawEvent, TransportError> {
    named_event("message", id, data)
}

pub fn named_event(name: &str, id: Option<&str>, data: &str) -> Result<RawEvent, TransportError> {
    Ok(RawEvent {
        event_type: name.to_string(),
        data: data.to_string(),
        last_event_id: id.map(str::to_string),
        retry: None,
    })
}

/// A connection that opens and then immediately ends.
pub fn dropped() -> Step {
    let (_, open) = feed();
    open
}

/// HTTP-backed client that bypasses any proxy configured in the environment.
pub fn http_client(config: resilient_sse::SseConfig) -> resilient_sse::SseClient {
    let client = reqwest::Client::builder()
        .no_proxy()
        .connect_timeout(config.connect_timeout())
        .build()
        .unwrap();
    let transport = resilient_sse::HttpTransport::with_client(client, &config.headers).unwrap();
    resilient_sse::SseClient::new(config, Arc::new(transport)).unwrap()
}
