//! WebSocket adapter for the Store Manager's subscriber fan-out.
//!
//! One socket can carry many independent `(mode, event_id, sub_id)`
//! subscriptions; each is forwarded to the client on its own background
//! task, with a single dedicated task owning the outbound send side.

use std::{collections::HashMap, sync::Arc};

use axum::{
    extract::{
        State, WebSocketUpgrade,
        ws::{Message as WsMessage, WebSocket},
    },
    response::IntoResponse,
};
use eventlog_store::StoreManager;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use crate::protocol::{ClientMessage, ServerMessage};

/// Shared WebSocket handler state.
#[derive(Clone)]
pub struct WsState {
    pub manager: Arc<StoreManager>,
}

impl WsState {
    #[must_use]
    pub fn new(manager: Arc<StoreManager>) -> Self {
        Self { manager }
    }
}

/// WebSocket upgrade handler. Use this as an Axum route handler.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<WsState>) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

type SubKey = (String, String, String);

async fn handle_socket(socket: WebSocket, state: WsState) {
    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();

    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let json = match serde_json::to_string(&msg) {
                Ok(j) => j,
                Err(e) => {
                    tracing::error!("failed to serialize server message: {e}");
                    continue;
                }
            };
            if sender.send(WsMessage::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    let mut forwarders: HashMap<SubKey, tokio::task::JoinHandle<()>> = HashMap::new();

    while let Some(msg) = receiver.next().await {
        let text = match msg {
            Ok(WsMessage::Text(text)) => text.to_string(),
            Ok(WsMessage::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                tracing::error!("websocket error: {e}");
                break;
            }
        };

        let client_msg: ClientMessage = match serde_json::from_str(&text) {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!("invalid client message: {e}");
                continue;
            }
        };

        match client_msg {
            ClientMessage::Ping => {
                let _ = tx.send(ServerMessage::Pong);
            }
            ClientMessage::Subscribe {
                mode,
                event_id,
                sub_id,
            } => {
                let Some(subscription) = state
                    .manager
                    .websocket_message_chan(&mode, &event_id, &sub_id)
                    .await
                else {
                    let _ = tx.send(ServerMessage::UnknownMode { mode });
                    continue;
                };
                let key = (mode, event_id, sub_id);
                let forward_tx = tx.clone();
                let handle = tokio::spawn(async move {
                    while let Some(message) = subscription.recv().await {
                        if forward_tx.send(ServerMessage::Message(message)).is_err() {
                            break;
                        }
                    }
                });
                if let Some(old) = forwarders.insert(key, handle) {
                    old.abort();
                }
            }
            ClientMessage::Release {
                mode,
                event_id,
                sub_id,
            } => {
                state
                    .manager
                    .release_websocket_message_chan(&mode, &event_id, &sub_id)
                    .await;
                if let Some(handle) = forwarders.remove(&(mode, event_id, sub_id)) {
                    handle.abort();
                }
            }
        }
    }

    for (_, handle) in forwarders {
        handle.abort();
    }
    send_task.abort();
}

/// Build the `/ws` route for a [`StoreManager`] (merge into a host
/// `axum::Router`).
#[must_use]
pub fn create_ws_router(manager: Arc<StoreManager>) -> axum::Router {
    axum::Router::new()
        .route("/ws", axum::routing::get(ws_handler))
        .with_state(WsState::new(manager))
}
