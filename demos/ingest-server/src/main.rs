//! Minimal host process wiring the Store Manager to a couple of HTTP
//! intake routes and the WebSocket subscriber fan-out.
//!
//! Run with: cargo run --bin ingest-server
//!
//! The real transport adapters (UDP/TCP listeners, the cluster pub/sub
//! transport) live outside this crate; this binary stands in the minimal
//! amount of plumbing needed to see the Store Manager run.

use std::{net::SocketAddr, sync::Arc};

use axum::{Router, body::Bytes, extract::State, response::Html, routing::{get, post}};
use eventlog_store::{
    NoopCatalogStore, StoreManager, StoreManagerConfig,
    catalog::CatalogStore,
};
use eventlog_core::sink::MemorySink;
use eventlog_transport::websocket::create_ws_router;
use tower_http::cors::CorsLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Clone)]
struct AppState {
    manager: Arc<StoreManager>,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = StoreManagerConfig::default();
    let catalog: Arc<dyn CatalogStore> = Arc::new(NoopCatalogStore);
    let manager = Arc::new(StoreManager::new(
        config,
        Arc::new(MemorySink::new()),
        catalog,
    ));
    manager.run().await;

    let state = AppState {
        manager: Arc::clone(&manager),
    };

    let app = Router::new()
        .route("/", get(index_handler))
        .route("/ingest/event", post(ingest_event))
        .route("/ingest/dockerlog", post(ingest_docker_log))
        .merge(create_ws_router(manager))
        .with_state(state)
        .layer(CorsLayer::permissive());

    let addr = SocketAddr::from(([127, 0, 0, 1], 3000));
    tracing::info!("store manager listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}

async fn ingest_event(State(state): State<AppState>, body: Bytes) -> &'static str {
    if state
        .manager
        .receive_message_chan()
        .send(body)
        .await
        .is_err()
    {
        return "intake closed";
    }
    "accepted"
}

async fn ingest_docker_log(State(state): State<AppState>, body: Bytes) -> &'static str {
    if state
        .manager
        .docker_log_message_chan()
        .send(body)
        .await
        .is_err()
    {
        return "intake closed";
    }
    "accepted"
}

async fn index_handler() -> Html<&'static str> {
    Html(INDEX_HTML)
}

const INDEX_HTML: &str = r#"<!DOCTYPE html>
<html>
<head><title>Event/Log Store Manager</title></head>
<body>
<h1>Event/Log Store Manager</h1>
<p>POST JSON event records to <code>/ingest/event</code>.</p>
<p>POST raw container-log frames to <code>/ingest/dockerlog</code>.</p>
<p>Connect to <code>/ws</code> and send <code>{"type":"subscribe","mode":"event","event_id":"...","sub_id":"..."}</code> to tail a key.</p>
</body>
</html>
"#;
