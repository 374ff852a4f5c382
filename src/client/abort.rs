//! Cancellation of in-flight connection work.

use tokio::sync::watch;

/// Coordinator for cancelling a connection session.
///
/// Every call to [`abort`](Self::abort) starts a new epoch. Signals taken
/// before it observe the abort; signals taken afterwards do not.
pub struct AbortController {
    tx: watch::Sender<u64>,
}

impl AbortController {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(0);
        Self { tx }
    }

    /// Signal bound to the current epoch.
    pub fn signal(&self) -> AbortSignal {
        let rx = self.tx.subscribe();
        let epoch = *rx.borrow();
        AbortSignal { rx, epoch }
    }

    /// Abort every outstanding signal.
    pub fn abort(&self) {
        self.tx.send_modify(|epoch| *epoch = epoch.wrapping_add(1));
    }
}

impl Default for AbortController {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone)]
pub struct AbortSignal {
    rx: watch::Receiver<u64>,
    epoch: u64,
}

impl AbortSignal {
    pub fn is_aborted(&self) -> bool {
        *self.rx.borrow() != self.epoch
    }

    /// Resolves once the controller aborts (or is dropped).
    pub async fn aborted(&self) {
        let mut rx = self.rx.clone();
        loop {
            if *rx.borrow_and_update() != self.epoch {
                return;
            }
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}
