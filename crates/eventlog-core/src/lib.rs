//! Core primitives for the event/log ingestion hub.
//!
//! This crate provides the building blocks the rest of the workspace is
//! built from:
//! - [`Message`] / [`Stream`] — the routed record and the five stream kinds.
//! - [`parser`] — decodes a raw inbound payload into a [`Message`].
//! - [`store::MessageStore`] — per-stream tail buffers, subscriber
//!   fan-out, Garbage bucket, and durable-sink glue.
//! - [`sink::DurableSink`] / [`cluster::TwoFrame`] — the seams the
//!   external durable store and cluster bus are reached through.

pub mod cluster;
pub mod error;
pub mod message;
pub mod parser;
pub mod sink;
pub mod store;

pub use cluster::{ClusterTag, TwoFrame};
pub use error::{IngestError, ParseError};
pub use message::{Message, Stream};
pub use parser::{ParseOutcome, parse};
pub use sink::{DurableSink, MemorySink};
pub use store::{MessageStore, MonitorData, StoreConfig, Subscription};
