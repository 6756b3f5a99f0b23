//! WebSocket adapter layer: transports are external collaborators; this
//! crate is the one fixed by the store manager's `WebSocketMessageChan`
//! contract.
//!
//! Provides:
//! - Wire protocol for subscribe/release/message framing
//! - WebSocket transport (feature: `websocket`)

pub mod protocol;

#[cfg(feature = "websocket")]
pub mod websocket;

pub use protocol::{ClientMessage, ServerMessage};
