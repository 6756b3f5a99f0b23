//! A cloneable handle over an `mpsc::Receiver`, so repeated calls to an
//! idempotent channel accessor can hand back a shared receiving end.
//! Generalizes [`eventlog_core::store::Subscription`] for the manager's
//! own outbound-facing channels (currently `pubChan`).

use std::sync::Arc;

use tokio::sync::{Mutex, mpsc};

/// A receiving handle shared between every caller of an idempotent
/// accessor. Only one logical consumer should drain it at a time — the
/// cluster bridge is meant to have a single reader.
#[derive(Clone)]
pub struct SharedReceiver<T> {
    inner: Arc<Mutex<mpsc::Receiver<T>>>,
}

impl<T: Send + 'static> SharedReceiver<T> {
    #[must_use]
    pub fn new(rx: mpsc::Receiver<T>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(rx)),
        }
    }

    /// Receive the next value, or `None` once the channel is closed.
    pub async fn recv(&self) -> Option<T> {
        self.inner.lock().await.recv().await
    }
}
