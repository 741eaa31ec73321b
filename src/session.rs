//! Session-scoped cooperative cancellation.
//!
//! Every background task of an estimation session (weather refresh loop,
//! position cache, supervisors, fusion publisher) holds a [`Shutdown`]
//! handle and observes it at each suspension point. Triggering the paired
//! [`ShutdownHandle`] stops the whole task tree deterministically.

use std::time::Duration;
use tokio::sync::watch;

/// Sender side of the session cancellation scope.
pub struct ShutdownHandle {
    tx: watch::Sender<bool>,
}

impl ShutdownHandle {
    /// Signal every task in the session to stop.
    pub fn trigger(&self) {
        let _ = self.tx.send(true);
    }
}

/// Receiver side held by each background task.
#[derive(Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

impl Shutdown {
    /// Create a new cancellation scope.
    pub fn new() -> (ShutdownHandle, Shutdown) {
        let (tx, rx) = watch::channel(false);
        (ShutdownHandle { tx }, Shutdown { rx })
    }

    /// Whether the session has been cancelled.
    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once the session is cancelled.
    ///
    /// Dropping the [`ShutdownHandle`] counts as cancellation, so a leaked
    /// task can never outlive its session.
    pub async fn triggered(&mut self) {
        while !*self.rx.borrow() {
            if self.rx.changed().await.is_err() {
                return;
            }
        }
    }

    /// Sleep for `duration`, waking early on cancellation.
    ///
    /// Returns `true` when the full duration elapsed, `false` when the
    /// sleep was interrupted by shutdown.
    pub async fn sleep(&mut self, duration: Duration) -> bool {
        tokio::select! {
            _ = self.triggered() => false,
            _ = tokio::time::sleep(duration) => true,
        }
    }
}
