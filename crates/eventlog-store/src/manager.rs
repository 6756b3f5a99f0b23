//! The Store Manager façade: owns the six intake channels, the
//! five per-stream [`MessageStore`]s, the worker pools that connect them,
//! the cluster bridge glue, and the janitor. This is the crate's single
//! composition root — everything else in this crate is a seam it is built
//! from.

use std::sync::Arc;

use bytes::Bytes;
use chrono::Local;
use eventlog_core::{
    ClusterTag, IngestError, Message, ParseOutcome, TwoFrame,
    message::Stream as StreamKind,
    parser::parse,
    sink::DurableSink,
    store::{MessageStore, MonitorData, Subscription},
};
use eventlog_monitor::{LegacyKind, parse_legacy_record, rewrite};
use prometheus::{Gauge, Opts, proto::MetricFamily};
use tokio::sync::{Mutex as AsyncMutex, mpsc, watch};

use crate::{catalog::CatalogStore, chan::SharedReceiver, config::StoreManagerConfig, janitor};

const RECEIVE_CAPACITY: usize = 300;
const SUB_CAPACITY: usize = 300;
const PUB_CAPACITY: usize = 300;
const DOCKER_LOG_CAPACITY: usize = 2048;
const MONITOR_MESSAGE_CAPACITY: usize = 100;
const NEW_MONITOR_MESSAGE_CAPACITY: usize = 2048;
const ERROR_CAPACITY: usize = 16;

/// WebSocket subscriber mode (`WebSocketMessageChan`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WsMode {
    Event,
    Docker,
    Monitor,
    NewMonitor,
}

impl WsMode {
    #[must_use]
    pub fn parse(mode: &str) -> Option<Self> {
        match mode {
            "event" => Some(Self::Event),
            "docker" => Some(Self::Docker),
            "monitor" => Some(Self::Monitor),
            "newmonitor" => Some(Self::NewMonitor),
            _ => None,
        }
    }
}

/// The Store Manager façade used by transports.
pub struct StoreManager {
    config: StoreManagerConfig,

    event_store: Arc<MessageStore>,
    read_store: Arc<MessageStore>,
    container_log_store: Arc<MessageStore>,
    monitor_store: Arc<MessageStore>,
    new_monitor_store: Arc<MessageStore>,

    receive_tx: mpsc::Sender<Bytes>,
    receive_rx: SharedReceiver<Bytes>,

    sub_tx: mpsc::Sender<TwoFrame>,
    sub_rx: SharedReceiver<TwoFrame>,

    pub_tx: mpsc::Sender<TwoFrame>,
    pub_rx: SharedReceiver<TwoFrame>,

    docker_log_tx: mpsc::Sender<Bytes>,
    docker_log_rx: SharedReceiver<Bytes>,

    monitor_message_tx: mpsc::Sender<TwoFrame>,
    monitor_message_rx: SharedReceiver<TwoFrame>,

    new_monitor_message_tx: mpsc::Sender<Bytes>,
    new_monitor_message_rx: SharedReceiver<Bytes>,

    error_tx: mpsc::Sender<IngestError>,
    error_rx: SharedReceiver<IngestError>,

    shutdown_tx: watch::Sender<()>,
    shutdown_rx: watch::Receiver<()>,

    catalog: Arc<dyn CatalogStore>,
    workers: AsyncMutex<Vec<tokio::task::JoinHandle<()>>>,
}

impl StoreManager {
    /// Build a new, un-started store manager. `sink` backs all five
    /// stores (a "memory+file" store and a file-only archive are
    /// themselves external collaborators); `catalog` backs the janitor's
    /// row GC.
    #[must_use]
    pub fn new(
        config: StoreManagerConfig,
        sink: Arc<dyn DurableSink>,
        catalog: Arc<dyn CatalogStore>,
    ) -> Self {
        let (receive_tx, receive_rx) = mpsc::channel(RECEIVE_CAPACITY);
        let (sub_tx, sub_rx) = mpsc::channel(SUB_CAPACITY);
        let (pub_tx, pub_rx) = mpsc::channel(PUB_CAPACITY);
        let (docker_log_tx, docker_log_rx) = mpsc::channel(DOCKER_LOG_CAPACITY);
        let (monitor_message_tx, monitor_message_rx) = mpsc::channel(MONITOR_MESSAGE_CAPACITY);
        let (new_monitor_message_tx, new_monitor_message_rx) =
            mpsc::channel(NEW_MONITOR_MESSAGE_CAPACITY);
        let (error_tx, error_rx) = mpsc::channel(ERROR_CAPACITY);
        let (shutdown_tx, shutdown_rx) = watch::channel(());

        let store_config = config.store.clone();
        Self {
            event_store: Arc::new(MessageStore::new(
                StreamKind::Event,
                store_config.clone(),
                Arc::clone(&sink),
            )),
            read_store: Arc::new(MessageStore::new(
                StreamKind::Read,
                store_config.clone(),
                Arc::clone(&sink),
            )),
            container_log_store: Arc::new(MessageStore::new(
                StreamKind::ContainerLog,
                store_config.clone(),
                Arc::clone(&sink),
            )),
            monitor_store: Arc::new(MessageStore::new(
                StreamKind::Monitor,
                store_config.clone(),
                Arc::clone(&sink),
            )),
            new_monitor_store: Arc::new(MessageStore::new(
                StreamKind::NewMonitor,
                store_config,
                sink,
            )),

            receive_tx,
            receive_rx: SharedReceiver::new(receive_rx),
            sub_tx,
            sub_rx: SharedReceiver::new(sub_rx),
            pub_tx,
            pub_rx: SharedReceiver::new(pub_rx),
            docker_log_tx,
            docker_log_rx: SharedReceiver::new(docker_log_rx),
            monitor_message_tx,
            monitor_message_rx: SharedReceiver::new(monitor_message_rx),
            new_monitor_message_tx,
            new_monitor_message_rx: SharedReceiver::new(new_monitor_message_rx),
            error_tx,
            error_rx: SharedReceiver::new(error_rx),
            shutdown_tx,
            shutdown_rx,
            catalog,
            workers: AsyncMutex::new(Vec::new()),
            config,
        }
    }

    // ---- intake channel accessors (idempotent) ----

    #[must_use]
    pub fn receive_message_chan(&self) -> mpsc::Sender<Bytes> {
        self.receive_tx.clone()
    }

    #[must_use]
    pub fn sub_message_chan(&self) -> mpsc::Sender<TwoFrame> {
        self.sub_tx.clone()
    }

    #[must_use]
    pub fn pub_message_chan(&self) -> SharedReceiver<TwoFrame> {
        self.pub_rx.clone()
    }

    #[must_use]
    pub fn docker_log_message_chan(&self) -> mpsc::Sender<Bytes> {
        self.docker_log_tx.clone()
    }

    #[must_use]
    pub fn monitor_message_chan(&self) -> mpsc::Sender<TwoFrame> {
        self.monitor_message_tx.clone()
    }

    #[must_use]
    pub fn new_monitor_message_chan(&self) -> mpsc::Sender<Bytes> {
        self.new_monitor_message_tx.clone()
    }

    #[must_use]
    pub fn error(&self) -> SharedReceiver<IngestError> {
        self.error_rx.clone()
    }

    /// Subscribe a WebSocket client to `(mode, event_id, sub_id)`.
    /// Returns `None` for an unrecognized mode.
    pub async fn websocket_message_chan(
        &self,
        mode: &str,
        event_id: &str,
        sub_id: &str,
    ) -> Option<Subscription> {
        let store = match WsMode::parse(mode)? {
            WsMode::Event => &self.read_store,
            WsMode::Docker => &self.container_log_store,
            WsMode::Monitor => &self.monitor_store,
            WsMode::NewMonitor => &self.new_monitor_store,
        };
        Some(store.subscribe(event_id, sub_id).await)
    }

    /// Release a WebSocket subscription. `mode` ∈ {event, docker, monitor}
    /// (newmonitor release is not part of this contract).
    pub async fn release_websocket_message_chan(&self, mode: &str, event_id: &str, sub_id: &str) {
        let store = match WsMode::parse(mode) {
            Some(WsMode::Event) => &self.read_store,
            Some(WsMode::Docker) => &self.container_log_store,
            Some(WsMode::Monitor) => &self.monitor_store,
            _ => return,
        };
        store.release(event_id, sub_id).await;
    }

    /// Aggregated ingest statistics, returned as a two-entry vector:
    /// `[container_log + monitor combined, event]`.
    pub async fn monitor(&self) -> Vec<MonitorData> {
        let mut combined = self.container_log_store.monitor_data().await;
        let monitor_data = self.monitor_store.monitor_data().await;
        combined.log_size_per_minute += monitor_data.log_size_per_minute;
        combined.service_size += monitor_data.service_size;

        let event_data = self.event_store.monitor_data().await;
        vec![combined, event_data]
    }

    /// Emit per-store metrics plus the three intake queue-depth gauges.
    pub async fn scrape(
        &self,
        out: &mut Vec<MetricFamily>,
        namespace: &str,
        exporter: &str,
        from: &str,
    ) {
        self.container_log_store.scrape(out, namespace, exporter).await;
        self.event_store.scrape(out, namespace, exporter).await;
        self.monitor_store.scrape(out, namespace, exporter).await;

        let depth_of = |capacity: usize, sender_capacity: usize| (capacity - sender_capacity) as f64;
        let gauges = [
            (
                "container_log",
                depth_of(DOCKER_LOG_CAPACITY, self.docker_log_tx.capacity()),
            ),
            (
                "monitor_message",
                depth_of(MONITOR_MESSAGE_CAPACITY, self.monitor_message_tx.capacity()),
            ),
            (
                "event_message",
                depth_of(RECEIVE_CAPACITY, self.receive_tx.capacity()),
            ),
        ];
        for (chan_name, depth) in gauges {
            if let Ok(gauge) = Gauge::with_opts(
                Opts::new("chan_cache_size", "the handle chan cache size.")
                    .namespace(namespace)
                    .subsystem(exporter)
                    .const_label("from", from)
                    .const_label("chan", chan_name),
            ) {
                gauge.set(depth);
                out.extend(gauge.collect());
            }
        }
    }

    /// Start every store, every worker pool, and the janitor.
    pub async fn run(&self) {
        tracing::info!("store manager starting");

        self.event_store.run().await;
        self.read_store.run().await;
        self.container_log_store.run().await;
        self.monitor_store.run().await;
        self.new_monitor_store.run().await;

        let mut workers = self.workers.lock().await;

        for _ in 0..self.config.handle_message_core_number {
            workers.push(self.spawn_event_worker());
        }
        for _ in 0..self.config.handle_sub_message_core_number {
            workers.push(self.spawn_cluster_inbound_worker());
        }
        for _ in 0..self.config.handle_docker_log_core_number {
            workers.push(self.spawn_container_log_worker());
        }
        for _ in 0..self.config.handle_message_core_number {
            workers.push(self.spawn_legacy_monitor_worker());
        }
        workers.push(self.spawn_new_monitor_worker());

        workers.push(janitor::spawn_log_file_gc(
            self.config.log_root.clone(),
            self.config.janitor_interval,
            self.config.log_file_max_age,
            self.shutdown_rx.clone(),
        ));
        workers.push(janitor::spawn_catalog_gc(
            Arc::clone(&self.catalog),
            self.config.janitor_interval,
            self.shutdown_rx.clone(),
        ));
    }

    /// Stop all stores, cancel the shutdown signal, and wait for every
    /// worker to return.
    pub async fn stop(&self) {
        self.event_store.stop().await;
        self.read_store.stop().await;
        self.container_log_store.stop().await;
        self.monitor_store.stop().await;
        self.new_monitor_store.stop().await;

        let _ = self.shutdown_tx.send(());

        let mut workers = self.workers.lock().await;
        for handle in workers.drain(..) {
            let _ = handle.await;
        }
        tracing::info!("store manager stopped");
    }

    fn spawn_event_worker(&self) -> tokio::task::JoinHandle<()> {
        let rx = self.receive_rx.clone();
        let pub_tx = self.pub_tx.clone();
        let error_tx = self.error_tx.clone();
        let mut shutdown = self.shutdown_rx.clone();
        let event_store = Arc::clone(&self.event_store);
        let read_store = Arc::clone(&self.read_store);
        let cluster_mode = self.config.cluster_mode;
        let message_type = self.config.message_type.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = shutdown_fired(&mut shutdown) => return,
                    received = rx.recv() => {
                        let Some(raw) = received else {
                            let _ = error_tx.send(IngestError::IntakeClosed).await;
                            return;
                        };
                        if cluster_mode {
                            let _ = pub_tx.try_send((
                                Bytes::from_static(ClusterTag::EventMessage.as_bytes()),
                                raw.clone(),
                            ));
                        }
                        match parse(&raw, &message_type) {
                            ParseOutcome::Parsed(message) => {
                                event_store.insert(message.clone()).await;
                                read_store.insert(message).await;
                            }
                            ParseOutcome::Garbage(message, e) => {
                                tracing::warn!(error = %e, "parsing the message before insert message error");
                                event_store.insert_garbage(message).await;
                            }
                            ParseOutcome::Rejected(e) => {
                                tracing::warn!(error = %e, "parsing the message before insert message error");
                            }
                        }
                    }
                }
            }
        })
    }

    fn spawn_cluster_inbound_worker(&self) -> tokio::task::JoinHandle<()> {
        let rx = self.sub_rx.clone();
        let error_tx = self.error_tx.clone();
        let mut shutdown = self.shutdown_rx.clone();
        let read_store = Arc::clone(&self.read_store);
        let monitor_store = Arc::clone(&self.monitor_store);
        let new_monitor_store = Arc::clone(&self.new_monitor_store);
        let message_type = self.config.message_type.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = shutdown_fired(&mut shutdown) => return,
                    received = rx.recv() => {
                        let Some((tag, payload)) = received else {
                            let _ = error_tx.send(IngestError::IntakeClosed).await;
                            return;
                        };
                        let tag = ClusterTag::from_bytes(&tag);
                        if tag == Some(ClusterTag::ServiceNewMonitorMessage) {
                            new_monitor_store
                                .insert(Message { monitor_data_raw: payload, ..Default::default() })
                                .await;
                            continue;
                        }
                        if tag == Some(ClusterTag::ServiceMonitorMessage) {
                            // the legacy-monitor worker publishes an already-built
                            // Message (event_id = topic), not a raw client record,
                            // so this bypasses the client-format parser entirely.
                            match serde_json::from_slice::<Message>(&payload) {
                                Ok(message) => monitor_store.insert(message).await,
                                Err(e) => tracing::warn!(error = %e, "decoding peer monitor message failed"),
                            }
                            continue;
                        }
                        match parse(&payload, &message_type) {
                            ParseOutcome::Parsed(message) => {
                                if tag == Some(ClusterTag::EventMessage) {
                                    read_store.insert(message).await;
                                }
                            }
                            ParseOutcome::Garbage(_, e) | ParseOutcome::Rejected(e) => {
                                tracing::warn!(error = %e, "parsing the message before insert message error");
                            }
                        }
                    }
                }
            }
        })
    }

    fn spawn_container_log_worker(&self) -> tokio::task::JoinHandle<()> {
        let rx = self.docker_log_rx.clone();
        let error_tx = self.error_tx.clone();
        let mut shutdown = self.shutdown_rx.clone();
        let container_log_store = Arc::clone(&self.container_log_store);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = shutdown_fired(&mut shutdown) => return,
                    received = rx.recv() => {
                        let Some(raw) = received else {
                            let _ = error_tx.send(IngestError::IntakeClosed).await;
                            return;
                        };
                        if raw.len() < 47 {
                            continue;
                        }
                        let event_id = String::from_utf8_lossy(&raw[13..45]).into_owned();
                        let mut content = Vec::with_capacity(raw.len() - 45 + 13);
                        content.extend_from_slice(&raw[0..12]);
                        content.extend_from_slice(b":");
                        content.extend_from_slice(&raw[45..]);
                        let message_text = String::from_utf8_lossy(&content).into_owned();
                        container_log_store
                            .insert(Message {
                                event_id,
                                message_text,
                                content_raw: Bytes::from(content),
                                ..Default::default()
                            })
                            .await;
                    }
                }
            }
        })
    }

    fn spawn_legacy_monitor_worker(&self) -> tokio::task::JoinHandle<()> {
        let rx = self.monitor_message_rx.clone();
        let error_tx = self.error_tx.clone();
        let mut shutdown = self.shutdown_rx.clone();
        let monitor_store = Arc::clone(&self.monitor_store);
        let pub_tx = self.pub_tx.clone();
        let cluster_mode = self.config.cluster_mode;

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = shutdown_fired(&mut shutdown) => return,
                    received = rx.recv() => {
                        let Some((_tag, payload)) = received else {
                            let _ = error_tx.send(IngestError::IntakeClosed).await;
                            return;
                        };
                        let Some(record) = parse_legacy_record(&payload) else { continue };
                        let Some(kind) = LegacyKind::from_name(record.name) else { continue };

                        for emission in rewrite(kind, record.body, Local::now()) {
                            let message = Message {
                                event_id: emission.topic,
                                monitor_data_raw: Bytes::from(emission.envelope_json),
                                ..Default::default()
                            };
                            if cluster_mode {
                                if let Ok(serialized) = serde_json::to_vec(&message) {
                                    let _ = pub_tx.try_send((
                                        Bytes::from_static(ClusterTag::ServiceMonitorMessage.as_bytes()),
                                        Bytes::from(serialized),
                                    ));
                                }
                            }
                            monitor_store.insert(message).await;
                        }
                    }
                }
            }
        })
    }

    fn spawn_new_monitor_worker(&self) -> tokio::task::JoinHandle<()> {
        let rx = self.new_monitor_message_rx.clone();
        let error_tx = self.error_tx.clone();
        let mut shutdown = self.shutdown_rx.clone();
        let new_monitor_store = Arc::clone(&self.new_monitor_store);
        let pub_tx = self.pub_tx.clone();
        let cluster_mode = self.config.cluster_mode;

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = shutdown_fired(&mut shutdown) => return,
                    received = rx.recv() => {
                        let Some(raw) = received else {
                            let _ = error_tx.send(IngestError::IntakeClosed).await;
                            return;
                        };
                        if cluster_mode {
                            let _ = pub_tx.try_send((
                                Bytes::from_static(ClusterTag::ServiceNewMonitorMessage.as_bytes()),
                                raw.clone(),
                            ));
                        }
                        new_monitor_store
                            .insert(Message { monitor_data_raw: raw, ..Default::default() })
                            .await;
                    }
                }
            }
        })
    }
}

/// Resolves once the shutdown watch has changed, never otherwise.
async fn shutdown_fired(rx: &mut watch::Receiver<()>) {
    let _ = rx.changed().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::NoopCatalogStore;
    use eventlog_core::sink::MemorySink;
    use std::time::Duration as StdDuration;

    fn manager() -> StoreManager {
        let mut config = StoreManagerConfig::default();
        config.log_root = std::env::temp_dir().join("eventlog-manager-test-nonexistent");
        StoreManager::new(config, Arc::new(MemorySink::new()), Arc::new(NoopCatalogStore))
    }

    #[tokio::test]
    async fn event_insert_reaches_event_and_read_stores_and_not_pub_chan() {
        let manager = manager();
        manager.run().await;

        let tx = manager.receive_message_chan();
        tx.send(Bytes::from_static(br#"{"event_id":"E1","message":"hi"}"#))
            .await
            .unwrap();

        let sub = manager
            .websocket_message_chan("event", "E1", "subA")
            .await
            .expect("event mode is valid");
        let msg = tokio::time::timeout(StdDuration::from_secs(1), sub.recv())
            .await
            .expect("delivered before timeout")
            .expect("channel open");
        assert_eq!(msg.event_id, "E1");

        // no cluster mode: pubChan must stay empty.
        let pub_rx = manager.pub_message_chan();
        assert!(
            tokio::time::timeout(StdDuration::from_millis(100), pub_rx.recv())
                .await
                .is_err()
        );

        manager.stop().await;
    }

    #[tokio::test]
    async fn missing_event_id_is_quarantined_not_delivered() {
        let manager = manager();
        manager.run().await;

        let sub = manager
            .websocket_message_chan("event", "", "subA")
            .await
            .unwrap();

        manager
            .receive_message_chan()
            .send(Bytes::from_static(b"{}"))
            .await
            .unwrap();

        assert!(
            tokio::time::timeout(StdDuration::from_millis(200), sub.recv())
                .await
                .is_err()
        );
        manager.stop().await;
    }

    #[tokio::test]
    async fn container_log_shorter_than_47_bytes_is_dropped() {
        let manager = manager();
        manager.run().await;

        let sub = manager
            .websocket_message_chan("docker", "srv", "subA")
            .await
            .unwrap();
        manager
            .docker_log_message_chan()
            .send(Bytes::from_static(b"short"))
            .await
            .unwrap();

        assert!(
            tokio::time::timeout(StdDuration::from_millis(200), sub.recv())
                .await
                .is_err()
        );
        manager.stop().await;
    }

    #[tokio::test]
    async fn container_log_routes_by_service_id() {
        let manager = manager();
        manager.run().await;

        let service_id = "srv_32bytes_id_aaaaaaaaaaaaaaaaa";
        assert_eq!(service_id.len(), 32);
        let mut raw = Vec::new();
        raw.extend_from_slice(b"cid_12bytes_");
        raw.push(b' ');
        raw.extend_from_slice(service_id.as_bytes());
        raw.extend_from_slice(b"hello\n");

        let sub = manager
            .websocket_message_chan("docker", service_id, "subA")
            .await
            .unwrap();
        manager
            .docker_log_message_chan()
            .send(Bytes::from(raw))
            .await
            .unwrap();

        let msg = tokio::time::timeout(StdDuration::from_secs(1), sub.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(msg.event_id, service_id);
        assert_eq!(msg.message_text, "cid_12bytes_:hello\n");
        manager.stop().await;
    }

    #[tokio::test]
    async fn cluster_inbound_event_message_skips_event_store() {
        let manager = manager();
        manager.run().await;

        let read_sub = manager
            .websocket_message_chan("event", "E1", "subA")
            .await
            .unwrap();

        manager
            .sub_message_chan()
            .send((
                Bytes::from_static(ClusterTag::EventMessage.as_bytes()),
                Bytes::from_static(br#"{"event_id":"E1","message":"from-peer"}"#),
            ))
            .await
            .unwrap();

        let msg = tokio::time::timeout(StdDuration::from_secs(1), read_sub.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(msg.event_id, "E1");

        manager.stop().await;
    }
}
