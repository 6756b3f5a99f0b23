//! The canonical record that flows through every stream.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// One of the five message classes handled by the store manager.
///
/// `Event` and `Read` are two views of the same ingested event messages:
/// `Event` is the durable history, `Read` is the live tail subscribers
/// observe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stream {
    Event,
    Read,
    ContainerLog,
    Monitor,
    NewMonitor,
}

impl Stream {
    /// Label used in log lines and metric labels.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Event => "event",
            Self::Read => "read",
            Self::ContainerLog => "container_log",
            Self::Monitor => "monitor",
            Self::NewMonitor => "new_monitor",
        }
    }
}

/// A record ingested from any of the four inbound message classes.
///
/// `event_id` is the routing key: an event id, a service id, or a
/// synthesized monitor topic. Every stored message has a non-empty
/// `event_id` except records filed into a store's Garbage bucket.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Message {
    #[serde(default)]
    pub event_id: String,

    #[serde(default, rename = "message")]
    pub message_text: String,

    #[serde(default)]
    pub level: String,

    /// Original bytes for event records. Never populated by JSON decoding;
    /// the parser fills it in from the raw input it was handed.
    #[serde(skip)]
    pub content_raw: Bytes,

    /// Opaque payload for monitor records.
    #[serde(default, rename = "monitor_data")]
    pub monitor_data_raw: Bytes,

    #[serde(default)]
    pub time: String,
}

impl Message {
    /// Rough in-memory footprint, used for buffer accounting.
    #[must_use]
    pub fn approx_bytes(&self) -> usize {
        const OVERHEAD: usize = 48;
        OVERHEAD
            + self.event_id.len()
            + self.message_text.len()
            + self.level.len()
            + self.content_raw.len()
            + self.monitor_data_raw.len()
            + self.time.len()
    }
}
