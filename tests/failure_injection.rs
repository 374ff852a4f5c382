//! Failure injection over real HTTP against the mock backend.

use std::sync::{Arc, Mutex};

use resilient_sse::{ClientError, ConnectionState};

mod common;
use common::{fast_config, http_client, start_sse_backend, wait_until, Reply};

#[tokio::test]
async fn test_events_arrive_in_order() {
    let backend = start_sse_backend(|_| {
        Reply::EventsThenHold("id: 1\ndata: a\n\nid: 2\ndata: b\n\nid: 3\ndata: c\n\n".to_string())
    })
    .await;

    let client = http_client(fast_config(&backend.url("/events")));
    let received = Arc::new(Mutex::new(Vec::new()));
    let sink = received.clone();
    client.on_message(move |message| {
        let sink = sink.clone();
        async move {
            sink.lock().unwrap().push((message.id, message.data));
            Ok(())
        }
    });

    client.connect().await.unwrap();
    wait_until(|| received.lock().unwrap().len() == 3).await;

    let received = received.lock().unwrap().clone();
    assert_eq!(
        received,
        vec![
            (Some("1".to_string()), "a".to_string()),
            (Some("2".to_string()), "b".to_string()),
            (Some("3".to_string()), "c".to_string()),
        ]
    );
    assert_eq!(client.metrics().messages_received, 3);
    assert_eq!(backend.requests()[0].path, "/events");

    client.disconnect();
}

#[tokio::test]
async fn test_retries_until_backend_recovers() {
    let backend = start_sse_backend(|index| match index {
        0 | 1 => Reply::Status(503),
        _ => Reply::EventsThenHold(": ready\n\n".to_string()),
    })
    .await;

    let client = http_client(fast_config(&backend.url("/events")));
    client.connect().await.unwrap();

    assert!(client.is_connected());
    assert_eq!(backend.request_count(), 3);
    let metrics = client.metrics();
    assert_eq!(metrics.reconnections, 2);
    assert_eq!(metrics.errors, 2);

    client.disconnect();
}

#[tokio::test]
async fn test_gives_up_on_dead_backend() {
    let backend = start_sse_backend(|_| Reply::Status(500)).await;

    let mut config = fast_config(&backend.url("/events"));
    config.max_reconnect_attempts = 2;
    let client = http_client(config);

    let err = client.connect().await.unwrap_err();

    assert!(matches!(err, ClientError::MaxReconnectAttempts { max: 2 }));
    assert_eq!(backend.request_count(), 2);
    assert_eq!(client.connection_state(), ConnectionState::Error);
}

#[tokio::test]
async fn test_reconnect_sends_last_event_id() {
    let backend = start_sse_backend(|index| match index {
        0 => Reply::Events("id: 6\ndata: x\n\nid: 7\ndata: y\n\n".to_string()),
        _ => Reply::EventsThenHold(String::new()),
    })
    .await;

    let client = http_client(fast_config(&backend.url("/events")));
    client.connect().await.unwrap();

    wait_until(|| backend.request_count() >= 2).await;
    wait_until(|| client.is_connected()).await;

    let requests = backend.requests();
    assert_eq!(requests[0].last_event_id, None);
    assert_eq!(requests[1].last_event_id.as_deref(), Some("7"));
    assert_eq!(client.metrics().reconnections, 1);

    client.disconnect();
}

#[tokio::test]
async fn test_wrong_content_type_is_reported() {
    let backend = start_sse_backend(|_| Reply::Json("{\"status\":\"ok\"}".to_string())).await;

    let mut config = fast_config(&backend.url("/events"));
    config.max_reconnect_attempts = 1;
    let client = http_client(config);

    let errors = Arc::new(Mutex::new(Vec::new()));
    let sink = errors.clone();
    client.on_error(move |err| sink.lock().unwrap().push(err.to_string()));

    let err = client.connect().await.unwrap_err();

    assert!(matches!(err, ClientError::MaxReconnectAttempts { max: 1 }));
    let errors = errors.lock().unwrap();
    assert!(errors[0].contains("unexpected content type"));
    assert!(errors[0].contains("application/json"));
}

#[tokio::test]
async fn test_heartbeat_events_are_not_delivered() {
    let backend = start_sse_backend(|_| {
        Reply::EventsThenHold(
            "event: heartbeat\ndata: {}\n\n: keep-alive\n\ndata: real\n\n".to_string(),
        )
    })
    .await;

    let client = http_client(fast_config(&backend.url("/events")));
    let received = Arc::new(Mutex::new(Vec::new()));
    let sink = received.clone();
    client.on_message(move |message| {
        let sink = sink.clone();
        async move {
            sink.lock().unwrap().push(message.data);
            Ok(())
        }
    });

    client.connect().await.unwrap();
    wait_until(|| !received.lock().unwrap().is_empty()).await;

    assert_eq!(*received.lock().unwrap(), vec!["real".to_string()]);
    assert_eq!(client.metrics().messages_received, 1);

    client.disconnect();
}

#[tokio::test]
async fn test_request_asks_for_event_stream() {
    let backend = start_sse_backend(|_| Reply::EventsThenHold(String::new())).await;

    let client = http_client(fast_config(&backend.url("/stream")));
    client.connect().await.unwrap();

    let request = &backend.requests()[0];
    assert_eq!(request.path, "/stream");
    assert_eq!(request.accept.as_deref(), Some("text/event-stream"));

    client.disconnect();
}
