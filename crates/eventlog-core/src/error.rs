//! Error kinds for parsing and for the ingest pipeline.

use thiserror::Error;

/// Errors raised while decoding a raw inbound payload into a [`crate::Message`].
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("empty message")]
    Empty,
    #[error("unsupported format")]
    UnsupportedFormat,
    #[error("missing event_id")]
    MissingEventId,
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),
}

/// The error kinds surfaced by the ingest pipeline.
///
/// `InvalidMessage` is quarantined (filed into Garbage), not retried.
/// `SinkFailure` and `SubscriberLagging` are logged and the record is
/// dropped for that sink/subscriber only; ingest continues. Only
/// `IntakeClosed` (an unexpected worker exit) is surfaced on the store
/// manager's `Error()` channel. `ShutdownRequested` never produces an
/// error value: workers exit cleanly and silently.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("invalid message: {0}")]
    InvalidMessage(#[from] ParseError),
    #[error("intake channel closed")]
    IntakeClosed,
    #[error("durable sink failure: {0}")]
    SinkFailure(String),
    #[error("subscriber lagging, message dropped")]
    SubscriberLagging,
}
