//! Per-stream Message Store: per-key tail buffers, subscriber fan-out, a
//! Garbage bucket, and an asynchronous durable-sink writer.

use std::{
    collections::{HashMap, VecDeque},
    sync::Arc,
    time::{Duration, Instant},
};

use prometheus::{Gauge, Opts, core::Collector, proto::MetricFamily};
use tokio::sync::{Mutex as AsyncMutex, RwLock, mpsc};

use crate::{
    message::{Message, Stream},
    sink::DurableSink,
};

/// Tuning knobs for one [`MessageStore`].
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Per-key tail buffer bound.
    pub max_messages_per_key: usize,
    /// Per-key tail buffer max age; eviction is FIFO by age first, then
    /// by size.
    pub max_age: Duration,
    /// Subscriber channel capacity (small, e.g. 4-16).
    pub subscriber_channel_capacity: usize,
    /// Bound on the internal queue feeding the durable sink.
    pub sink_queue_capacity: usize,
    /// Garbage bucket capacity.
    pub garbage_capacity: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_messages_per_key: 200,
            max_age: Duration::from_secs(3600),
            subscriber_channel_capacity: 8,
            sink_queue_capacity: 1024,
            garbage_capacity: 200,
        }
    }
}

struct KeyBuffer {
    messages: VecDeque<(Message, Instant)>,
}

impl KeyBuffer {
    fn new() -> Self {
        Self {
            messages: VecDeque::new(),
        }
    }

    fn push(&mut self, message: Message, max_age: Duration, max_len: usize) {
        let now = Instant::now();
        while let Some((_, at)) = self.messages.front() {
            if now.duration_since(*at) > max_age {
                self.messages.pop_front();
            } else {
                break;
            }
        }
        self.messages.push_back((message, now));
        while self.messages.len() > max_len {
            self.messages.pop_front();
        }
    }
}

/// A receiving handle to a subscription's bounded channel.
///
/// Wraps the `Receiver` in a shared, lockable handle so repeated
/// `Subscribe` calls for the same `(key, sub_id)` are truly idempotent:
/// every caller gets a clone of the same handle rather than a fresh,
/// independent channel (an `mpsc::Receiver` cannot itself be cloned).
#[derive(Clone)]
pub struct Subscription {
    inner: Arc<AsyncMutex<mpsc::Receiver<Message>>>,
}

impl Subscription {
    /// Receive the next message, or `None` once the store has released
    /// this subscription and the channel has drained.
    pub async fn recv(&self) -> Option<Message> {
        self.inner.lock().await.recv().await
    }
}

/// Ingest statistics returned by `GetMonitorData`.
#[derive(Debug, Clone, Copy, Default)]
pub struct MonitorData {
    /// Bytes ingested in the last minute.
    pub log_size_per_minute: u64,
    /// Distinct active keys.
    pub service_size: usize,
}

struct Inner {
    buffers: HashMap<String, KeyBuffer>,
    /// Subscribers nested by key first so `insert` only ever touches the
    /// senders for the inserted key, not every subscriber in the store.
    senders: HashMap<String, HashMap<String, mpsc::Sender<Message>>>,
    receivers: HashMap<(String, String), Arc<AsyncMutex<mpsc::Receiver<Message>>>>,
    garbage: VecDeque<Message>,
    recent_bytes: VecDeque<(Instant, usize)>,
}

impl Inner {
    fn new() -> Self {
        Self {
            buffers: HashMap::new(),
            senders: HashMap::new(),
            receivers: HashMap::new(),
            garbage: VecDeque::new(),
            recent_bytes: VecDeque::new(),
        }
    }

    fn record_bytes(&mut self, bytes: usize) {
        self.recent_bytes.push_back((Instant::now(), bytes));
        self.trim_recent_bytes();
    }

    fn trim_recent_bytes(&mut self) {
        let now = Instant::now();
        while let Some((at, _)) = self.recent_bytes.front() {
            if now.duration_since(*at) > Duration::from_secs(60) {
                self.recent_bytes.pop_front();
            } else {
                break;
            }
        }
    }

    fn log_size_per_minute(&mut self) -> u64 {
        self.trim_recent_bytes();
        self.recent_bytes.iter().map(|(_, b)| *b as u64).sum()
    }
}

/// One instance per stream: per-key tail buffers, subscriber fan-out, a
/// Garbage bucket, and an asynchronous durable-sink writer.
pub struct MessageStore {
    stream: Stream,
    config: StoreConfig,
    inner: RwLock<Inner>,
    sink: Arc<dyn DurableSink>,
    sink_tx: mpsc::Sender<(Stream, Message)>,
    sink_rx: AsyncMutex<Option<mpsc::Receiver<(Stream, Message)>>>,
    sink_task: AsyncMutex<Option<tokio::task::JoinHandle<()>>>,
}

impl MessageStore {
    #[must_use]
    pub fn new(stream: Stream, config: StoreConfig, sink: Arc<dyn DurableSink>) -> Self {
        let (sink_tx, sink_rx) = mpsc::channel(config.sink_queue_capacity);
        Self {
            stream,
            config,
            inner: RwLock::new(Inner::new()),
            sink,
            sink_tx,
            sink_rx: AsyncMutex::new(Some(sink_rx)),
            sink_task: AsyncMutex::new(None),
        }
    }

    #[must_use]
    pub const fn stream(&self) -> Stream {
        self.stream
    }

    /// Start the background task that drains the internal sink queue.
    /// Idempotent: a second call is a no-op.
    pub async fn run(self: &Arc<Self>) {
        let mut task_slot = self.sink_task.lock().await;
        if task_slot.is_some() {
            return;
        }
        let Some(mut rx) = self.sink_rx.lock().await.take() else {
            return;
        };
        let store = Arc::clone(self);
        let handle = tokio::spawn(async move {
            while let Some((stream, message)) = rx.recv().await {
                if let Err(e) = store.sink.append(stream, &message).await {
                    tracing::warn!(stream = stream.label(), error = %e, "durable sink append failed");
                }
            }
        });
        *task_slot = Some(handle);
    }

    /// Insert a message: persist asynchronously, update the per-key tail,
    /// and fan out to subscribers of that key. Never blocks the caller
    /// longer than a bounded-channel `try_send`: a full subscriber
    /// channel means that subscriber misses the message, not that ingest
    /// stalls.
    pub async fn insert(&self, message: Message) {
        let bytes = message.approx_bytes();

        if self
            .sink_tx
            .try_send((self.stream, message.clone()))
            .is_err()
        {
            tracing::warn!(
                stream = self.stream.label(),
                "durable sink queue full, message dropped"
            );
        }

        let key = message.event_id.clone();
        let mut inner = self.inner.write().await;
        inner.record_bytes(bytes);
        inner
            .buffers
            .entry(key.clone())
            .or_insert_with(KeyBuffer::new)
            .push(
                message.clone(),
                self.config.max_age,
                self.config.max_messages_per_key,
            );

        let mut stale = Vec::new();
        if let Some(subs) = inner.senders.get(&key) {
            for (sub_id, sender) in subs {
                match sender.try_send(message.clone()) {
                    Ok(()) => {}
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        tracing::debug!(key = %key, sub_id = %sub_id, "subscriber lagging, message dropped");
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => {
                        stale.push(sub_id.clone());
                    }
                }
            }
        }
        for sub_id in stale {
            if let Some(subs) = inner.senders.get_mut(&key) {
                subs.remove(&sub_id);
                if subs.is_empty() {
                    inner.senders.remove(&key);
                }
            }
            inner.receivers.remove(&(key.clone(), sub_id));
        }
    }

    /// File a malformed record into the Garbage bucket. Never delivered
    /// to subscribers, never written to the durable sink.
    pub async fn insert_garbage(&self, message: Message) {
        let mut inner = self.inner.write().await;
        inner.garbage.push_back(message);
        while inner.garbage.len() > self.config.garbage_capacity {
            inner.garbage.pop_front();
        }
    }

    /// Snapshot of the Garbage bucket, oldest first.
    pub async fn garbage_snapshot(&self) -> Vec<Message> {
        self.inner.read().await.garbage.iter().cloned().collect()
    }

    /// Snapshot of the current tail buffer for `key`.
    pub async fn tail(&self, key: &str) -> Vec<Message> {
        self.inner
            .read()
            .await
            .buffers
            .get(key)
            .map(|buf| buf.messages.iter().map(|(m, _)| m.clone()).collect())
            .unwrap_or_default()
    }

    /// Subscribe to messages for `key` under subscriber id `sub_id`.
    /// Idempotent: repeated calls for the same `(key, sub_id)` return a
    /// clone of the same underlying subscription.
    pub async fn subscribe(&self, key: &str, sub_id: &str) -> Subscription {
        let id = (key.to_string(), sub_id.to_string());
        let mut inner = self.inner.write().await;
        if let Some(existing) = inner.receivers.get(&id) {
            return Subscription {
                inner: Arc::clone(existing),
            };
        }
        let (tx, rx) = mpsc::channel(self.config.subscriber_channel_capacity);
        let rx = Arc::new(AsyncMutex::new(rx));
        inner
            .senders
            .entry(key.to_string())
            .or_default()
            .insert(sub_id.to_string(), tx);
        inner.receivers.insert(id, Arc::clone(&rx));
        Subscription { inner: rx }
    }

    /// Release a subscription, closing the channel on the sender side
    /// exactly once.
    pub async fn release(&self, key: &str, sub_id: &str) {
        let mut inner = self.inner.write().await;
        if let Some(subs) = inner.senders.get_mut(key) {
            subs.remove(sub_id);
            if subs.is_empty() {
                inner.senders.remove(key);
            }
        }
        inner.receivers.remove(&(key.to_string(), sub_id.to_string()));
    }

    /// Aggregated ingest statistics for this store.
    pub async fn monitor_data(&self) -> MonitorData {
        let mut inner = self.inner.write().await;
        MonitorData {
            log_size_per_minute: inner.log_size_per_minute(),
            service_size: inner.buffers.len(),
        }
    }

    /// Emit this store's metrics (`Scrape`). `namespace`/`exporter` follow
    /// `prometheus::Opts`'s `BuildFQName(namespace, subsystem, name)`
    /// convention: `exporter` becomes the metric subsystem.
    pub async fn scrape(&self, out: &mut Vec<MetricFamily>, namespace: &str, exporter: &str) {
        let data = self.monitor_data().await;

        if let Ok(gauge) = Gauge::with_opts(
            Opts::new("service_size", "distinct active keys in the store")
                .namespace(namespace)
                .subsystem(exporter)
                .const_label("stream", self.stream.label()),
        ) {
            gauge.set(data.service_size as f64);
            out.extend(gauge.collect());
        }

        if let Ok(gauge) = Gauge::with_opts(
            Opts::new("log_size_per_minute", "bytes ingested in the last minute")
                .namespace(namespace)
                .subsystem(exporter)
                .const_label("stream", self.stream.label()),
        ) {
            gauge.set(data.log_size_per_minute as f64);
            out.extend(gauge.collect());
        }
    }

    /// Flush the durable sink, close every subscriber channel, and stop
    /// the background sink writer.
    pub async fn stop(&self) {
        let mut inner = self.inner.write().await;
        inner.senders.clear();
        inner.receivers.clear();
        drop(inner);

        if let Some(handle) = self.sink_task.lock().await.take() {
            handle.abort();
            let _ = handle.await;
        }
        if let Err(e) = self.sink.close().await {
            tracing::warn!(stream = self.stream.label(), error = %e, "durable sink close failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::MemorySink;

    fn msg(event_id: &str) -> Message {
        Message {
            event_id: event_id.to_string(),
            message_text: "hi".to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn insert_delivers_to_matching_subscriber_only() {
        let store = Arc::new(MessageStore::new(
            Stream::Event,
            StoreConfig::default(),
            Arc::new(MemorySink::new()),
        ));
        store.run().await;

        let sub_a = store.subscribe("E1", "subA").await;
        let sub_b = store.subscribe("E1", "subB").await;
        let sub_c = store.subscribe("E2", "subC").await;

        store.insert(msg("E1")).await;

        let got_a = sub_a.recv().await.expect("subA should receive");
        let got_b = sub_b.recv().await.expect("subB should receive");
        assert_eq!(got_a.event_id, "E1");
        assert_eq!(got_b.event_id, "E1");

        store.insert(msg("E2")).await;
        let got_c = sub_c.recv().await.expect("subC should receive its own key");
        assert_eq!(got_c.event_id, "E2");
    }

    #[tokio::test]
    async fn subscribe_is_idempotent() {
        let store = MessageStore::new(
            Stream::Event,
            StoreConfig::default(),
            Arc::new(MemorySink::new()),
        );
        let first = store.subscribe("E1", "subA").await;
        let second = store.subscribe("E1", "subA").await;

        store.insert(msg("E1")).await;
        let via_second = second.recv().await.expect("message delivered");
        assert_eq!(via_second.event_id, "E1");
        drop(first);
    }

    #[tokio::test]
    async fn release_closes_channel() {
        let store = MessageStore::new(
            Stream::Event,
            StoreConfig::default(),
            Arc::new(MemorySink::new()),
        );
        let sub = store.subscribe("E1", "subA").await;
        store.release("E1", "subA").await;
        assert!(sub.recv().await.is_none());
    }

    #[tokio::test]
    async fn garbage_is_never_delivered_to_subscribers() {
        let store = MessageStore::new(
            Stream::Event,
            StoreConfig::default(),
            Arc::new(MemorySink::new()),
        );
        let sub = store.subscribe("", "sub").await;
        store.insert_garbage(msg("")).await;
        assert_eq!(store.garbage_snapshot().await.len(), 1);
        assert!(store.tail("").await.is_empty());
        drop(sub);
    }

    #[tokio::test]
    async fn tail_buffer_bounded_by_count() {
        let mut config = StoreConfig::default();
        config.max_messages_per_key = 3;
        let store = MessageStore::new(Stream::Event, config, Arc::new(MemorySink::new()));
        for _ in 0..5 {
            store.insert(msg("E1")).await;
        }
        assert_eq!(store.tail("E1").await.len(), 3);
    }

    #[tokio::test]
    async fn stop_closes_subscriptions() {
        let store = Arc::new(MessageStore::new(
            Stream::Event,
            StoreConfig::default(),
            Arc::new(MemorySink::new()),
        ));
        store.run().await;
        let sub = store.subscribe("E1", "subA").await;
        store.insert(msg("E1")).await;
        assert!(sub.recv().await.is_some());
        store.stop().await;
        assert!(sub.recv().await.is_none());
    }
}
