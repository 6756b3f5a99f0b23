//! The durable persistence back-end is an external collaborator: a
//! "memory+file" store for live data and a file-only archive. This crate
//! only defines the seam it writes through.

use async_trait::async_trait;

use crate::{error::IngestError, message::Message, message::Stream};

/// Durable sink a [`crate::store::MessageStore`] appends to.
///
/// Implementations serialize their own writes; the store never assumes
/// more than "send it here, eventually" — durable-sink writes use the
/// sink's own policy.
#[async_trait]
pub trait DurableSink: Send + Sync {
    /// Append one message for `stream` to durable storage.
    async fn append(&self, stream: Stream, message: &Message) -> Result<(), IngestError>;

    /// Flush and release any resources. Called once during `Stop()`.
    async fn close(&self) -> Result<(), IngestError>;
}

/// In-memory reference `DurableSink`, useful for tests and for running the
/// manager without a real backing store.
#[derive(Default)]
pub struct MemorySink {
    written: std::sync::Mutex<Vec<(Stream, Message)>>,
}

impl MemorySink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything appended so far, in append order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<(Stream, Message)> {
        self.written.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl DurableSink for MemorySink {
    async fn append(&self, stream: Stream, message: &Message) -> Result<(), IngestError> {
        self.written
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((stream, message.clone()));
        Ok(())
    }

    async fn close(&self) -> Result<(), IngestError> {
        Ok(())
    }
}
