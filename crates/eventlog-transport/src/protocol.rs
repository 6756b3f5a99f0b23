//! Wire protocol for the WebSocket fan-out adapter
//! (`WebSocketMessageChan`/`ReleaseWebSocketMessageChan`). Everything else
//! about the WebSocket handler (auth, framing beyond JSON, routing
//! multiple sockets per connection) is the external transport adapter's
//! concern.

use eventlog_core::Message;
use serde::{Deserialize, Serialize};

/// Message from client to server: subscribe to or release a `(mode, key,
/// sub_id)` subscription.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Subscribe to a stream (mode ∈ {event, docker, monitor, newmonitor}).
    Subscribe {
        mode: String,
        event_id: String,
        sub_id: String,
    },
    /// Release a previously-established subscription.
    Release {
        mode: String,
        event_id: String,
        sub_id: String,
    },
    /// Ping for keepalive.
    Ping,
}

/// Message from server to client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// A message delivered from the subscribed store.
    Message(Message),
    /// The requested mode was not one of the four recognized kinds.
    UnknownMode { mode: String },
    /// Pong response.
    Pong,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscribe_round_trips_through_json() {
        let msg = ClientMessage::Subscribe {
            mode: "event".to_string(),
            event_id: "E1".to_string(),
            sub_id: "subA".to_string(),
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("subscribe"));
        let parsed: ClientMessage = serde_json::from_str(&json).unwrap();
        match parsed {
            ClientMessage::Subscribe { mode, event_id, sub_id } => {
                assert_eq!(mode, "event");
                assert_eq!(event_id, "E1");
                assert_eq!(sub_id, "subA");
            }
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn server_message_wraps_a_message() {
        let msg = ServerMessage::Message(Message {
            event_id: "E1".to_string(),
            ..Default::default()
        });
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"message\""));
    }
}
