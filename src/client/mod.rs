//! Resilient event-stream client.
//!
//! # Connection Lifecycle
//! ```text
//! connect()
//!     → Connecting
//!     → breaker.execute_with_fallback(establish_connection, handle_connection_failure)
//!         success → Connected, reader + heartbeat tasks spawned
//!         failure → backoff sleep, try again (until max_reconnect_attempts)
//!     → stream error / end
//!         → counted as a breaker failure
//!         → recovery task re-enters the same loop, replaying Last-Event-ID
//!     → heartbeat stall
//!         → session torn down and restarted
//! disconnect()
//!     → tasks aborted, in-flight attempt cancelled, Disconnected
//! ```
//!
//! # Delivery
//! ```text
//! reader task → handle_message → MessageBuffer (oldest shed at threshold)
//!             → process_messages (one drain pass at a time)
//!             → message handlers, awaited in registration order
//! ```
//!
//! # Design Decisions
//! - All mutable state sits behind one mutex that is never held across `.await`
//! - Handlers run outside the lock; their errors and panics are reported, never propagated
//! - Only terminal failures are returned from `connect()`; transient ones go to `on_error`
//! - Reconnect attempts and backoff reset only once a connection carries traffic,
//!   so a server that accepts and immediately drops still exhausts the attempts

mod abort;
mod buffer;
mod error;
mod handlers;
mod state;

pub use abort::{AbortController, AbortSignal};
pub use buffer::MessageBuffer;
pub use error::ClientError;
pub use handlers::{HandlerError, Subscription};
pub use state::{ConnectionState, SseMetrics};

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures_util::future::{BoxFuture, FutureExt};
use futures_util::StreamExt;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use url::Url;

use crate::clock::unix_millis;
use crate::config::{validate_stream, SseConfig};
use crate::observability::metrics;
use crate::resilience::{CircuitBreaker, CircuitBreakerMetrics, ExponentialBackoff};
use crate::sse::{RawEvent, SseMessage};
use crate::transport::{ConnectRequest, EventStream, HttpTransport, Transport, TransportError};

use handlers::{ErrorFn, HandlerRegistry, MessageFn, StateFn};

const HEARTBEAT_EVENT: &str = "heartbeat";

/// Outcome of one guarded connection attempt.
enum ConnectStep {
    Opened(EventStream),
    Retry,
}

#[derive(Default)]
struct Tasks {
    reader: Option<JoinHandle<()>>,
    heartbeat: Option<JoinHandle<()>>,
    recovery: Option<JoinHandle<()>>,
}

impl Tasks {
    fn abort_all(&mut self) {
        let handles = [self.reader.take(), self.heartbeat.take(), self.recovery.take()];
        for handle in handles.into_iter().flatten() {
            handle.abort();
        }
    }
}

struct ClientState {
    metrics: SseMetrics,
    buffer: MessageBuffer,
    backoff: ExponentialBackoff,
    reconnect_attempts: u32,
    /// Set once the current connection has delivered an event or outlived a heartbeat period.
    stable: bool,
    session_active: bool,
    last_event_id: Option<String>,
    last_activity: Instant,
    tasks: Tasks,
}

impl ClientState {
    /// Returns whether the state actually changed.
    fn set_connection_state(&mut self, to: ConnectionState) -> bool {
        if self.metrics.connection_state == to {
            return false;
        }
        self.metrics.connection_state = to;
        metrics::record_connection_state(to);
        true
    }

    fn record_activity(&mut self) {
        self.last_activity = Instant::now();
        self.metrics.last_heartbeat = Some(unix_millis());
    }

    /// Forget earlier failures once a connection has proven it can carry traffic.
    fn mark_stable(&mut self) {
        if !self.stable {
            self.stable = true;
            self.reconnect_attempts = 0;
            self.backoff.reset();
        }
    }
}

struct Inner {
    config: SseConfig,
    url: Url,
    transport: Arc<dyn Transport>,
    breaker: CircuitBreaker<ConnectStep>,
    state: Mutex<ClientState>,
    abort: AbortController,
    processing: AtomicBool,
    message_handlers: HandlerRegistry<MessageFn>,
    error_handlers: HandlerRegistry<ErrorFn>,
    state_handlers: HandlerRegistry<StateFn>,
}

/// One logical event-stream subscription that survives flaky connections.
///
/// Dropping the client disconnects it.
pub struct SseClient {
    inner: Arc<Inner>,
}

impl SseClient {
    /// Build a client on top of `transport`.
    pub fn new(config: SseConfig, transport: Arc<dyn Transport>) -> Result<Self, ClientError> {
        validate_stream(&config).map_err(ClientError::InvalidConfig)?;
        let url = Url::parse(&config.url).map_err(|e| TransportError::InvalidUrl(e.to_string()))?;

        let state = ClientState {
            metrics: SseMetrics::default(),
            buffer: MessageBuffer::new(config.buffer_size, config.backpressure_threshold),
            backoff: ExponentialBackoff::from_config(&config.backoff_config()),
            reconnect_attempts: 0,
            stable: false,
            session_active: false,
            last_event_id: None,
            last_activity: Instant::now(),
            tasks: Tasks::default(),
        };

        let inner = Inner {
            breaker: CircuitBreaker::new(config.breaker_config()),
            config,
            url,
            transport,
            state: Mutex::new(state),
            abort: AbortController::new(),
            processing: AtomicBool::new(false),
            message_handlers: HandlerRegistry::new(),
            error_handlers: HandlerRegistry::new(),
            state_handlers: HandlerRegistry::new(),
        };

        Ok(Self {
            inner: Arc::new(inner),
        })
    }

    /// Build a client that connects over HTTP.
    pub fn with_http(config: SseConfig) -> Result<Self, ClientError> {
        validate_stream(&config).map_err(ClientError::InvalidConfig)?;
        let transport = HttpTransport::new(&config)?;
        Self::new(config, Arc::new(transport))
    }

    /// Client for the content-generation stream under `base_url`.
    pub fn content_generator(base_url: &str, api_key: Option<&str>) -> Result<Self, ClientError> {
        let mut config = SseConfig::content_generation(base_url);
        if let Some(key) = api_key {
            config
                .headers
                .insert("Authorization".to_string(), format!("Bearer {}", key));
        }
        Self::with_http(config)
    }

    pub fn config(&self) -> &SseConfig {
        &self.inner.config
    }

    /// Open the stream, retrying per the reconnect policy.
    ///
    /// Resolves once the connection is open. Returns an error only when the
    /// client gives up or `disconnect()` interrupts the attempt. Calling it
    /// while a session is already active is a no-op.
    pub async fn connect(&self) -> Result<(), ClientError> {
        let signal = {
            let mut state = self.inner.lock_state();
            if state.session_active {
                tracing::warn!(url = %self.inner.url, "Already connected or connecting");
                return Ok(());
            }
            state.session_active = true;
            state.reconnect_attempts = 0;
            state.backoff.reset();
            self.inner.abort.signal()
        };

        Arc::clone(&self.inner).run_session(signal).await
    }

    /// Close the stream and stop every background task. Idempotent.
    pub fn disconnect(&self) {
        self.inner.disconnect();
    }

    /// Register an async message handler.
    pub fn on_message<F, Fut>(&self, handler: F) -> Subscription
    where
        F: Fn(SseMessage) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
    {
        let handler: Arc<MessageFn> = Arc::new(move |message| handler(message).boxed());
        let id = self.inner.message_handlers.add(handler);
        let inner = Arc::downgrade(&self.inner);

        Subscription::new(move || {
            if let Some(inner) = inner.upgrade() {
                inner.message_handlers.remove(id);
            }
        })
    }

    /// Register an error handler. Receives transient and fatal errors alike.
    pub fn on_error<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&ClientError) + Send + Sync + 'static,
    {
        let id = self.inner.error_handlers.add(Arc::new(handler));
        let inner = Arc::downgrade(&self.inner);

        Subscription::new(move || {
            if let Some(inner) = inner.upgrade() {
                inner.error_handlers.remove(id);
            }
        })
    }

    /// Register a connection state handler.
    pub fn on_state_change<F>(&self, handler: F) -> Subscription
    where
        F: Fn(ConnectionState) + Send + Sync + 'static,
    {
        let id = self.inner.state_handlers.add(Arc::new(handler));
        let inner = Arc::downgrade(&self.inner);

        Subscription::new(move || {
            if let Some(inner) = inner.upgrade() {
                inner.state_handlers.remove(id);
            }
        })
    }

    pub fn metrics(&self) -> SseMetrics {
        let state = self.inner.lock_state();
        SseMetrics {
            buffer_size: state.buffer.len(),
            ..state.metrics.clone()
        }
    }

    pub fn circuit_metrics(&self) -> CircuitBreakerMetrics {
        self.inner.breaker.metrics()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.inner.lock_state().metrics.connection_state
    }

    pub fn is_connected(&self) -> bool {
        self.connection_state() == ConnectionState::Connected
    }

    /// Drop every undelivered message.
    pub fn clear_buffer(&self) {
        let mut state = self.inner.lock_state();
        state.buffer.clear();
        state.metrics.buffer_size = 0;
        metrics::record_buffer_size(0);
    }

    /// Undelivered messages, oldest first.
    pub fn buffered_messages(&self) -> Vec<SseMessage> {
        self.inner.lock_state().buffer.snapshot()
    }
}

impl Drop for SseClient {
    fn drop(&mut self) {
        self.inner.disconnect();
    }
}

impl std::fmt::Debug for SseClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SseClient")
            .field("url", &self.inner.url.as_str())
            .field("state", &self.connection_state())
            .finish()
    }
}

impl Inner {
    fn lock_state(&self) -> MutexGuard<'_, ClientState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Connect loop shared by `connect()`, recovery and heartbeat restarts.
    ///
    /// Boxed because the tasks it spawns lead back into it.
    fn run_session(
        self: Arc<Self>,
        signal: AbortSignal,
    ) -> BoxFuture<'static, Result<(), ClientError>> {
        async move {
            loop {
                if signal.is_aborted() {
                    return Err(ClientError::Aborted);
                }
                self.set_state_for(&signal, ConnectionState::Connecting);

                let attempt = self.breaker.execute_with_fallback(
                    || self.establish_connection(&signal),
                    || self.handle_connection_failure(),
                );

                let step = tokio::select! {
                    biased;
                    _ = signal.aborted() => return Err(ClientError::Aborted),
                    step = attempt => step,
                };

                match step {
                    Ok(ConnectStep::Opened(stream)) => return self.on_open(stream, &signal),
                    Ok(ConnectStep::Retry) => continue,
                    Err(err) => {
                        let err = ClientError::from(err);
                        self.fail_session(&signal, &err);
                        return Err(err);
                    }
                }
            }
        }
        .boxed()
    }

    async fn establish_connection(&self, signal: &AbortSignal) -> Result<ConnectStep, ClientError> {
        let request = ConnectRequest {
            url: self.url.clone(),
            last_event_id: self.lock_state().last_event_id.clone(),
        };
        let deadline = self.config.connect_timeout();

        let result = match tokio::time::timeout(deadline, self.transport.open(request)).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout(deadline)),
        };

        match result {
            Ok(stream) => Ok(ConnectStep::Opened(stream)),
            Err(err) => {
                self.lock_state().metrics.errors += 1;
                self.set_state_for(signal, ConnectionState::Error);
                tracing::warn!(url = %self.url, error = %err, "Connection attempt failed");
                metrics::record_transport_error();

                let err = ClientError::Transport(err);
                self.report_error(&err);
                Err(err)
            }
        }
    }

    /// Reconnect policy: back off and ask for another attempt, or give up.
    async fn handle_connection_failure(&self) -> Result<ConnectStep, ClientError> {
        let max = self.config.max_reconnect_attempts;
        let next = {
            let mut state = self.lock_state();
            state.reconnect_attempts += 1;
            state.metrics.reconnections += 1;

            if state.reconnect_attempts >= max {
                None
            } else {
                Some((state.reconnect_attempts, state.backoff.next_delay()))
            }
        };
        metrics::record_reconnection();

        match next {
            None => {
                tracing::error!(max, url = %self.url, "Max reconnection attempts reached");
                Err(ClientError::MaxReconnectAttempts { max })
            }
            Some((attempt, delay)) => {
                tracing::info!(
                    attempt,
                    max,
                    delay_ms = delay.as_millis() as u64,
                    "Reconnecting"
                );
                tokio::time::sleep(delay).await;
                Ok(ConnectStep::Retry)
            }
        }
    }

    fn on_open(
        self: &Arc<Self>,
        stream: EventStream,
        signal: &AbortSignal,
    ) -> Result<(), ClientError> {
        {
            let mut state = self.lock_state();
            if signal.is_aborted() {
                return Err(ClientError::Aborted);
            }

            // Attempts and backoff carry over until the connection proves stable.
            state.stable = false;
            state.record_activity();
            let reader = Arc::clone(self).read_stream(stream, signal.clone());
            let heartbeat = Arc::clone(self).monitor_heartbeat(signal.clone());
            state.tasks.reader = Some(tokio::spawn(reader));
            state.tasks.heartbeat = Some(tokio::spawn(heartbeat));
            if !state.set_connection_state(ConnectionState::Connected) {
                return Ok(());
            }
        }

        tracing::info!(url = %self.url, "Connected");
        self.notify_state(ConnectionState::Connected);
        Ok(())
    }

    fn fail_session(&self, signal: &AbortSignal, err: &ClientError) {
        let changed = {
            let mut state = self.lock_state();
            if signal.is_aborted() {
                return;
            }
            state.session_active = false;
            state.set_connection_state(ConnectionState::Error)
        };

        tracing::error!(url = %self.url, error = %err, "Giving up on connection");
        if changed {
            self.notify_state(ConnectionState::Error);
        }
        self.report_error(err);
    }

    async fn read_stream(self: Arc<Self>, mut stream: EventStream, signal: AbortSignal) {
        while let Some(item) = stream.next().await {
            if signal.is_aborted() {
                return;
            }
            match item {
                Ok(event) => self.handle_event(event),
                Err(err) => {
                    self.on_connection_lost(err, &signal);
                    return;
                }
            }
        }
        self.on_connection_lost(TransportError::Closed, &signal);
    }

    fn on_connection_lost(self: &Arc<Self>, err: TransportError, signal: &AbortSignal) {
        let changed = {
            let mut state = self.lock_state();
            if signal.is_aborted() {
                return;
            }
            self.breaker.record_failure();
            state.metrics.errors += 1;
            if let Some(heartbeat) = state.tasks.heartbeat.take() {
                heartbeat.abort();
            }
            state.tasks.reader = None;
            state.tasks.recovery = Some(tokio::spawn(Arc::clone(self).recover(signal.clone())));
            state.set_connection_state(ConnectionState::Error)
        };

        tracing::warn!(url = %self.url, error = %err, "Connection lost");
        metrics::record_transport_error();
        if changed {
            self.notify_state(ConnectionState::Error);
        }
        self.report_error(&ClientError::Transport(err));
    }

    async fn recover(self: Arc<Self>, signal: AbortSignal) {
        let step = tokio::select! {
            biased;
            _ = signal.aborted() => return,
            step = self.handle_connection_failure() => step,
        };

        let result = match step {
            Ok(_) => Arc::clone(&self).run_session(signal).await,
            Err(err) => {
                self.fail_session(&signal, &err);
                Err(err)
            }
        };

        if let Err(err) = result {
            tracing::debug!(error = %err, "Recovery ended without a connection");
        }
    }

    async fn monitor_heartbeat(self: Arc<Self>, signal: AbortSignal) {
        let period = self.config.heartbeat_interval();
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);

        loop {
            ticker.tick().await;
            if signal.is_aborted() {
                return;
            }

            let silence = {
                let mut state = self.lock_state();
                let silence = state.last_activity.elapsed();
                if silence < period * 2 {
                    state.mark_stable();
                }
                silence
            };
            tracing::debug!(silence_ms = silence.as_millis() as u64, "Heartbeat check");

            if silence >= period * 2 {
                tracing::warn!(
                    silence_ms = silence.as_millis() as u64,
                    "Heartbeat timeout, reconnecting"
                );
                tokio::spawn(Arc::clone(&self).restart(signal));
                return;
            }
        }
    }

    /// Tear the stale session down and start a fresh one.
    async fn restart(self: Arc<Self>, stale: AbortSignal) {
        let (signal, changed) = {
            let mut state = self.lock_state();
            if stale.is_aborted() {
                return;
            }
            let changed = self.teardown(&mut state);
            state.session_active = true;
            (self.abort.signal(), changed)
        };

        if changed {
            self.notify_state(ConnectionState::Disconnected);
        }
        if let Err(err) = Arc::clone(&self).run_session(signal).await {
            tracing::debug!(error = %err, "Restart ended without a connection");
        }
    }

    fn disconnect(&self) {
        let changed = {
            let mut state = self.lock_state();
            self.teardown(&mut state)
        };

        if changed {
            tracing::info!(url = %self.url, "Disconnected");
            self.notify_state(ConnectionState::Disconnected);
        }
    }

    fn teardown(&self, state: &mut ClientState) -> bool {
        state.tasks.abort_all();
        self.abort.abort();
        state.session_active = false;
        state.set_connection_state(ConnectionState::Disconnected)
    }

    fn handle_event(self: &Arc<Self>, event: RawEvent) {
        if event.event_type == HEARTBEAT_EVENT {
            let mut state = self.lock_state();
            state.record_activity();
            state.mark_stable();
            return;
        }
        self.handle_message(event);
    }

    fn handle_message(self: &Arc<Self>, event: RawEvent) {
        let message = SseMessage::from_event(event);
        let bytes = message.data.len();

        let (dropped, buffered) = {
            let mut state = self.lock_state();
            state.metrics.messages_received += 1;
            state.metrics.bytes_received += bytes as u64;
            state.record_activity();
            state.mark_stable();
            state.last_event_id = message.id.clone();

            let dropped = state.buffer.push(message);
            state.metrics.messages_dropped += dropped as u64;
            state.metrics.buffer_size = state.buffer.len();
            (dropped, state.buffer.len())
        };

        metrics::record_message(bytes);
        metrics::record_buffer_size(buffered);
        if dropped > 0 {
            tracing::warn!(dropped, buffered, "Backpressure: dropping oldest messages");
            metrics::record_dropped(dropped as u64);
        }

        self.schedule_processing();
    }

    fn schedule_processing(self: &Arc<Self>) {
        if self
            .processing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            tokio::spawn(Arc::clone(self).process_messages());
        }
    }

    async fn process_messages(self: Arc<Self>) {
        loop {
            while let Some(message) = self.next_buffered() {
                self.deliver(message).await;
            }

            self.processing.store(false, Ordering::Release);

            // A push may have landed after the drain but before the flag cleared.
            if self.lock_state().buffer.is_empty() {
                return;
            }
            if self
                .processing
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_err()
            {
                return;
            }
        }
    }

    fn next_buffered(&self) -> Option<SseMessage> {
        let mut state = self.lock_state();
        let message = state.buffer.pop_front();
        state.metrics.buffer_size = state.buffer.len();
        message
    }

    async fn deliver(&self, message: SseMessage) {
        for handler in self.message_handlers.snapshot() {
            let outcome = AssertUnwindSafe(async { handler(message.clone()).await })
                .catch_unwind()
                .await;

            let failure = match outcome {
                Ok(Ok(())) => continue,
                Ok(Err(err)) => err.to_string(),
                Err(panic) => panic_message(panic.as_ref()),
            };

            tracing::error!(error = %failure, "Message handler failed");
            metrics::record_handler_error();
            self.report_error(&ClientError::Handler(failure));
        }
    }

    fn set_state_for(&self, signal: &AbortSignal, to: ConnectionState) {
        let changed = {
            let mut state = self.lock_state();
            !signal.is_aborted() && state.set_connection_state(to)
        };
        if changed {
            self.notify_state(to);
        }
    }

    fn notify_state(&self, to: ConnectionState) {
        for handler in self.state_handlers.snapshot() {
            if std::panic::catch_unwind(AssertUnwindSafe(|| handler(to))).is_err() {
                tracing::error!(state = %to, "State handler panicked");
            }
        }
    }

    fn report_error(&self, err: &ClientError) {
        for handler in self.error_handlers.snapshot() {
            if std::panic::catch_unwind(AssertUnwindSafe(|| handler(err))).is_err() {
                tracing::error!(error = %err, "Error handler panicked");
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        format!("handler panicked: {}", message)
    } else if let Some(message) = panic.downcast_ref::<String>() {
        format!("handler panicked: {}", message)
    } else {
        "handler panicked".to_string()
    }
}
