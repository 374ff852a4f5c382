//! Subscriber registries.

use std::error::Error;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use futures_util::future::BoxFuture;

use crate::client::error::ClientError;
use crate::client::state::ConnectionState;
use crate::sse::SseMessage;

/// Error returned by a message handler.
pub type HandlerError = Box<dyn Error + Send + Sync>;

pub(crate) type MessageFn =
    dyn Fn(SseMessage) -> BoxFuture<'static, Result<(), HandlerError>> + Send + Sync;
pub(crate) type ErrorFn = dyn Fn(&ClientError) + Send + Sync;
pub(crate) type StateFn = dyn Fn(ConnectionState) + Send + Sync;

/// Ordered list of handlers, each addressable by the id it was added under.
pub(crate) struct HandlerRegistry<H: ?Sized> {
    next_id: AtomicU64,
    handlers: Mutex<Vec<(u64, Arc<H>)>>,
}

impl<H: ?Sized> HandlerRegistry<H> {
    pub(crate) fn new() -> Self {
        Self {
            next_id: AtomicU64::new(0),
            handlers: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn add(&self, handler: Arc<H>) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, handler));
        id
    }

    pub(crate) fn remove(&self, id: u64) -> bool {
        let mut handlers = self.handlers.lock().unwrap_or_else(PoisonError::into_inner);
        let before = handlers.len();
        handlers.retain(|(handler_id, _)| *handler_id != id);
        handlers.len() != before
    }

    /// Handlers in registration order, detached from the registry.
    pub(crate) fn snapshot(&self) -> Vec<Arc<H>> {
        self.handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, handler)| Arc::clone(handler))
            .collect()
    }
}

/// Registration handle returned by the `on_*` methods.
///
/// Dropping it keeps the handler registered; call
/// [`unsubscribe`](Self::unsubscribe) to remove it.
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub(crate) fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// Remove exactly the handler this subscription was created for.
    pub fn unsubscribe(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remove_only_matching_handler() {
        let registry: HandlerRegistry<StateFn> = HandlerRegistry::new();
        let first = registry.add(Arc::new(|_| {}));
        let second = registry.add(Arc::new(|_| {}));

        assert_ne!(first, second);
        assert!(registry.remove(first));
        assert!(!registry.remove(first));
        assert_eq!(registry.snapshot().len(), 1);
    }

    #[test]
    fn test_snapshot_keeps_order() {
        let registry: HandlerRegistry<dyn Fn() -> u32 + Send + Sync> = HandlerRegistry::new();
        registry.add(Arc::new(|| 1));
        registry.add(Arc::new(|| 2));
        registry.add(Arc::new(|| 3));

        let values: Vec<u32> = registry.snapshot().iter().map(|h| h()).collect();
        assert_eq!(values, vec![1, 2, 3]);
    }

    #[test]
    fn test_subscription_runs_cancel_once() {
        let (tx, rx) = std::sync::mpsc::channel();
        let subscription = Subscription::new(move || tx.send(()).unwrap());

        subscription.unsubscribe();
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }
}
