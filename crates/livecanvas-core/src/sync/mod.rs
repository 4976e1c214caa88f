//! Relay wire protocol and client transports.
//!
//! Messages are JSON objects tagged by `type`:
//! ```json
//! { "type": "join", "room": "room-id" }
//! { "type": "sync", "data": "<base64-encoded-loro-bytes>", "snapshot": false }
//! { "type": "presence", "state": { "cursor": { "x": 100, "y": 200 } } }
//! { "type": "broadcast", "event": { "kind": "reaction", "x": 1, "y": 2, "value": "🔥" } }
//! ```

mod loopback;
#[cfg(not(target_arch = "wasm32"))]
mod native;

use std::collections::VecDeque;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::presence::PresenceState;

pub use loopback::{LoopbackHub, LoopbackTransport};
#[cfg(not(target_arch = "wasm32"))]
pub use native::NativeWebSocket;

/// Entries a room keeps for late joiners before the oldest are dropped.
pub const MAX_ROOM_HISTORY: usize = 100;

/// Messages sent to the relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Join a room
    Join { room: String },
    /// Leave current room
    Leave,
    /// Store update bytes, base64 encoded. A snapshot replaces the room's
    /// history on the relay.
    Sync {
        data: String,
        #[serde(default)]
        snapshot: bool,
    },
    /// Ephemeral presence state
    Presence { state: PresenceState },
    /// Fire-and-forget event for everyone else in the room
    Broadcast { event: BroadcastEvent },
}

/// Messages received from the relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Confirm room join with the room's update history
    Joined {
        room: String,
        peer_count: usize,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        initial_sync: Vec<String>,
    },
    PeerJoined { peer_id: String },
    PeerLeft { peer_id: String },
    Sync { from: String, data: String },
    Presence { from: String, state: PresenceState },
    Broadcast { from: String, event: BroadcastEvent },
    Error { message: String },
}

/// Events that are shown but never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BroadcastEvent {
    Reaction { x: f64, y: f64, value: String },
}

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Error,
}

/// Events surfaced by a transport.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    Connected,
    Disconnected,
    JoinedRoom {
        room: String,
        peer_count: usize,
        initial_sync: Vec<Vec<u8>>,
    },
    PeerJoined { peer_id: String },
    PeerLeft { peer_id: String },
    SyncReceived { from: String, data: Vec<u8> },
    PresenceReceived { from: String, state: PresenceState },
    BroadcastReceived { from: String, event: BroadcastEvent },
    Error { message: String },
}

impl ServerMessage {
    /// Decode into a transport event. Sync payloads that are not valid
    /// base64 are dropped.
    pub fn into_event(self) -> Option<SyncEvent> {
        let event = match self {
            ServerMessage::Joined {
                room,
                peer_count,
                initial_sync,
            } => SyncEvent::JoinedRoom {
                room,
                peer_count,
                initial_sync: initial_sync
                    .iter()
                    .filter_map(|data| decode_update(data).ok())
                    .collect(),
            },
            ServerMessage::PeerJoined { peer_id } => SyncEvent::PeerJoined { peer_id },
            ServerMessage::PeerLeft { peer_id } => SyncEvent::PeerLeft { peer_id },
            ServerMessage::Sync { from, data } => match decode_update(&data) {
                Ok(data) => SyncEvent::SyncReceived { from, data },
                Err(err) => {
                    log::warn!("Dropping sync from {from}: {err}");
                    return None;
                }
            },
            ServerMessage::Presence { from, state } => SyncEvent::PresenceReceived { from, state },
            ServerMessage::Broadcast { from, event } => {
                SyncEvent::BroadcastReceived { from, event }
            }
            ServerMessage::Error { message } => SyncEvent::Error { message },
        };
        Some(event)
    }
}

/// Errors raised by transports.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Not connected")]
    NotConnected,
    #[error("Already connected")]
    AlreadyConnected,
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
    #[error("Send failed: {0}")]
    Send(String),
    #[error("Invalid message: {0}")]
    Codec(#[from] serde_json::Error),
}

/// A bidirectional message channel to the relay.
///
/// Sends are fire-and-forget; incoming traffic is collected and handed out by
/// [`Transport::poll_events`].
pub trait Transport {
    /// Send a raw JSON text frame.
    fn send(&mut self, text: &str) -> Result<(), TransportError>;

    /// Drain events received since the last poll (non-blocking).
    fn poll_events(&mut self) -> Vec<SyncEvent>;

    fn state(&self) -> ConnectionState;

    fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    fn send_message(&mut self, message: &ClientMessage) -> Result<(), TransportError> {
        let text = serde_json::to_string(message)?;
        self.send(&text)
    }
}

pub fn encode_update(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

pub fn decode_update(data: &str) -> Result<Vec<u8>, base64::DecodeError> {
    STANDARD.decode(data)
}

/// Update log a relay keeps per room so late joiners can catch up.
///
/// A snapshot makes everything before it redundant, so it replaces the log.
#[derive(Debug, Clone, Default)]
pub struct RoomHistory {
    updates: VecDeque<String>,
}

impl RoomHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an update. Returns true when old entries had to be dropped to
    /// stay within [`MAX_ROOM_HISTORY`].
    pub fn record(&mut self, data: String, snapshot: bool) -> bool {
        if snapshot {
            self.updates.clear();
        }
        self.updates.push_back(data);
        let mut truncated = false;
        while self.updates.len() > MAX_ROOM_HISTORY {
            self.updates.pop_front();
            truncated = true;
        }
        truncated
    }

    pub fn entries(&self) -> Vec<String> {
        self.updates.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.updates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.updates.is_empty()
    }
}
