//! LiveCanvas WebSocket Relay Server
//!
//! Relays store updates, presence and broadcast events between clients in the
//! same room, and keeps a compacted update history per room so late joiners
//! can catch up. The wire format is defined in `livecanvas_core::sync`.

use axum::{
    Router,
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
    routing::get,
};
use dashmap::DashMap;
use futures_util::{SinkExt, StreamExt, stream::SplitSink};
use livecanvas_core::sync::{ClientMessage, RoomHistory, ServerMessage, encode_update};
use std::{collections::HashSet, net::SocketAddr, sync::Arc};
use tokio::sync::broadcast;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

const ADDR_ENV: &str = "LIVECANVAS_RELAY_ADDR";
const CHANNEL_CAPACITY: usize = 256;

type RoomMessage = (String, ServerMessage);

/// Room state
struct Room {
    /// Broadcast channel for this room
    tx: broadcast::Sender<RoomMessage>,
    /// Connected peer IDs
    peers: HashSet<String>,
    /// Updates replayed to new joiners
    history: RoomHistory,
}

impl Room {
    fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            tx,
            peers: HashSet::new(),
            history: RoomHistory::new(),
        }
    }
}

/// What a peer gets back when joining a room.
struct Joined {
    rx: broadcast::Receiver<RoomMessage>,
    history: Vec<String>,
    peer_count: usize,
}

/// Shared application state
struct AppState {
    /// Active rooms
    rooms: DashMap<String, Room>,
}

impl AppState {
    fn new() -> Self {
        Self {
            rooms: DashMap::new(),
        }
    }

    /// Add peer to room, creating the room on first join
    fn join_room(&self, room_id: &str, peer_id: &str) -> Joined {
        let mut room = self
            .rooms
            .entry(room_id.to_string())
            .or_insert_with(Room::new);
        room.peers.insert(peer_id.to_string());
        Joined {
            rx: room.tx.subscribe(),
            history: room.history.entries(),
            peer_count: room.peers.len(),
        }
    }

    /// Remove peer from room and tell the others
    fn leave_room(&self, room_id: &str, peer_id: &str) {
        let Some(mut room) = self.rooms.get_mut(room_id) else {
            return;
        };
        room.peers.remove(peer_id);
        if room.peers.is_empty() {
            drop(room);
            self.rooms.remove(room_id);
            info!("Room {} closed", room_id);
            return;
        }
        drop(room);
        self.broadcast(
            room_id,
            peer_id,
            ServerMessage::PeerLeft {
                peer_id: peer_id.to_string(),
            },
        );
    }

    /// Append an update to the room's history
    fn record_sync(&self, room_id: &str, data: String, snapshot: bool) {
        if let Some(mut room) = self.rooms.get_mut(room_id) {
            if room.history.record(data, snapshot) {
                debug!("History of room {} truncated", room_id);
            }
        }
    }

    /// Broadcast message to room; receivers skip their own messages
    fn broadcast(&self, room_id: &str, from: &str, msg: ServerMessage) {
        if let Some(room) = self.rooms.get(room_id) {
            // No receivers is fine: everyone else may have left already.
            let _ = room.tx.send((from.to_string(), msg));
        }
    }

    fn peer_count(&self, room_id: &str) -> usize {
        self.rooms.get(room_id).map_or(0, |room| room.peers.len())
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "livecanvas_relay=info,tower_http=info".into()),
        )
        .init();

    let state = Arc::new(AppState::new());

    let app = Router::new()
        .route("/", get(index))
        .route("/ws", get(ws_handler))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    let addr = listen_addr();
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind {}: {}", addr, e);
            return;
        }
    };
    info!("LiveCanvas relay listening on {}", addr);
    info!("WebSocket endpoint: ws://{}/ws", addr);

    if let Err(e) = axum::serve(listener, app).await {
        error!("Server error: {}", e);
    }
}

fn listen_addr() -> SocketAddr {
    let fallback = SocketAddr::from(([0, 0, 0, 0], 3030));
    let Ok(value) = std::env::var(ADDR_ENV) else {
        return fallback;
    };
    value.parse().unwrap_or_else(|e| {
        warn!("Invalid {} {:?} ({}), using {}", ADDR_ENV, value, e, fallback);
        fallback
    })
}

/// Index page
async fn index() -> &'static str {
    "LiveCanvas Relay Server - Connect via WebSocket at /ws"
}

/// Health check
async fn health() -> &'static str {
    "ok"
}

/// WebSocket upgrade handler
async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Serialize and send one message. Returns false once the socket is gone.
async fn send_json(sender: &mut SplitSink<WebSocket, Message>, msg: &ServerMessage) -> bool {
    match serde_json::to_string(msg) {
        Ok(json) => sender.send(Message::Text(json.into())).await.is_ok(),
        Err(e) => {
            error!("Failed to encode {:?}: {}", msg, e);
            true
        }
    }
}

/// Per-connection room membership
struct Connection {
    peer_id: String,
    room: Option<String>,
    room_rx: Option<broadcast::Receiver<RoomMessage>>,
}

impl Connection {
    fn leave(&mut self, state: &AppState) {
        if let Some(room) = self.room.take() {
            state.leave_room(&room, &self.peer_id);
            info!("Peer {} left room {}", self.peer_id, room);
        }
        self.room_rx = None;
    }

    /// Apply a client message. Returns the direct reply, if any.
    fn handle(&mut self, state: &AppState, msg: ClientMessage) -> Option<ServerMessage> {
        let peer_id = self.peer_id.clone();
        match msg {
            ClientMessage::Join { room } => {
                self.leave(state);
                let joined = state.join_room(&room, &peer_id);
                self.room_rx = Some(joined.rx);
                self.room = Some(room.clone());
                state.broadcast(
                    &room,
                    &peer_id,
                    ServerMessage::PeerJoined {
                        peer_id: peer_id.clone(),
                    },
                );
                info!(
                    "Peer {} joined room {} ({} peers)",
                    peer_id, room, joined.peer_count
                );
                Some(ServerMessage::Joined {
                    room,
                    peer_count: joined.peer_count,
                    initial_sync: joined.history,
                })
            }
            ClientMessage::Leave => {
                self.leave(state);
                None
            }
            ClientMessage::Sync { data, snapshot } => {
                let room = self.room.as_deref()?;
                state.record_sync(room, data.clone(), snapshot);
                state.broadcast(
                    room,
                    &peer_id,
                    ServerMessage::Sync {
                        from: peer_id.clone(),
                        data,
                    },
                );
                None
            }
            ClientMessage::Presence { state: presence } => {
                let room = self.room.as_deref()?;
                state.broadcast(
                    room,
                    &peer_id,
                    ServerMessage::Presence {
                        from: peer_id.clone(),
                        state: presence,
                    },
                );
                None
            }
            ClientMessage::Broadcast { event } => {
                let room = self.room.as_deref()?;
                state.broadcast(
                    room,
                    &peer_id,
                    ServerMessage::Broadcast {
                        from: peer_id.clone(),
                        event,
                    },
                );
                None
            }
        }
    }
}

/// Handle a WebSocket connection
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let mut conn = Connection {
        peer_id: Uuid::new_v4().to_string(),
        room: None,
        room_rx: None,
    };
    info!("New connection: {}", conn.peer_id);

    let (mut sender, mut receiver) = socket.split();

    loop {
        tokio::select! {
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let reply = match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(client_msg) => conn.handle(&state, client_msg),
                            Err(e) => {
                                warn!("Invalid message from {}: {}", conn.peer_id, e);
                                Some(ServerMessage::Error {
                                    message: format!("Invalid message: {}", e),
                                })
                            }
                        };
                        if let Some(reply) = reply {
                            if !send_json(&mut sender, &reply).await {
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Binary(data))) => {
                        // Binary frames are raw store updates
                        let msg = ClientMessage::Sync {
                            data: encode_update(&data),
                            snapshot: false,
                        };
                        conn.handle(&state, msg);
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {} // Ignore ping/pong
                    Some(Err(e)) => {
                        warn!("WebSocket error for {}: {}", conn.peer_id, e);
                        break;
                    }
                }
            }

            msg = async {
                match &mut conn.room_rx {
                    Some(rx) => Some(rx.recv().await),
                    None => std::future::pending().await,
                }
            } => {
                match msg {
                    Some(Ok((from, server_msg))) => {
                        // Don't echo back to sender
                        if from != conn.peer_id && !send_json(&mut sender, &server_msg).await {
                            break;
                        }
                    }
                    Some(Err(broadcast::error::RecvError::Lagged(skipped))) => {
                        warn!("Peer {} missed {} room messages", conn.peer_id, skipped);
                    }
                    Some(Err(broadcast::error::RecvError::Closed)) | None => {
                        conn.room_rx = None;
                    }
                }
            }
        }
    }

    conn.leave(&state);
    info!("Connection closed: {}", conn.peer_id);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connection(peer_id: &str) -> Connection {
        Connection {
            peer_id: peer_id.to_string(),
            room: None,
            room_rx: None,
        }
    }

    fn sync(data: &str, snapshot: bool) -> ClientMessage {
        ClientMessage::Sync {
            data: data.to_string(),
            snapshot,
        }
    }

    #[test]
    fn test_join_reports_peer_count_and_history() {
        let state = AppState::new();
        let mut a = connection("a");
        let reply = a.handle(&state, ClientMessage::Join { room: "r".into() });
        assert_eq!(
            reply,
            Some(ServerMessage::Joined {
                room: "r".into(),
                peer_count: 1,
                initial_sync: Vec::new(),
            })
        );

        a.handle(&state, sync("one", false));
        a.handle(&state, sync("two", false));

        let mut b = connection("b");
        let reply = b.handle(&state, ClientMessage::Join { room: "r".into() });
        assert_eq!(
            reply,
            Some(ServerMessage::Joined {
                room: "r".into(),
                peer_count: 2,
                initial_sync: vec!["one".into(), "two".into()],
            })
        );
    }

    #[test]
    fn test_snapshot_replaces_history() {
        let state = AppState::new();
        let mut a = connection("a");
        a.handle(&state, ClientMessage::Join { room: "r".into() });
        a.handle(&state, sync("one", false));
        a.handle(&state, sync("full", true));
        a.handle(&state, sync("three", false));

        let joined = state.join_room("r", "b");
        assert_eq!(joined.history, vec!["full".to_string(), "three".to_string()]);
    }

    #[test]
    fn test_sync_outside_room_is_ignored() {
        let state = AppState::new();
        let mut a = connection("a");
        assert!(a.handle(&state, sync("one", false)).is_none());
        assert!(state.rooms.is_empty());
    }

    #[test]
    fn test_last_peer_leaving_closes_room() {
        let state = AppState::new();
        let mut a = connection("a");
        let mut b = connection("b");
        a.handle(&state, ClientMessage::Join { room: "r".into() });
        b.handle(&state, ClientMessage::Join { room: "r".into() });
        assert_eq!(state.peer_count("r"), 2);

        a.handle(&state, ClientMessage::Leave);
        assert_eq!(state.peer_count("r"), 1);
        b.leave(&state);
        assert!(state.rooms.get("r").is_none());
    }

    #[test]
    fn test_switching_rooms_leaves_the_old_one() {
        let state = AppState::new();
        let mut a = connection("a");
        let mut b = connection("b");
        a.handle(&state, ClientMessage::Join { room: "r1".into() });
        b.handle(&state, ClientMessage::Join { room: "r1".into() });
        a.handle(&state, ClientMessage::Join { room: "r2".into() });
        assert_eq!(state.peer_count("r1"), 1);
        assert_eq!(state.peer_count("r2"), 1);
    }

    #[tokio::test]
    async fn test_room_messages_carry_sender() {
        let state = AppState::new();
        let mut a = connection("a");
        let mut b = connection("b");
        a.handle(&state, ClientMessage::Join { room: "r".into() });
        b.handle(&state, ClientMessage::Join { room: "r".into() });
        let mut rx = b.room_rx.take().unwrap();

        // b's own join notice is first in line; receivers filter it out.
        let (from, _) = rx.recv().await.unwrap();
        assert_eq!(from, "b");

        a.handle(&state, sync("update", false));
        let (from, msg) = rx.recv().await.unwrap();
        assert_eq!(from, "a");
        assert_eq!(
            msg,
            ServerMessage::Sync {
                from: "a".into(),
                data: "update".into(),
            }
        );

        a.handle(&state, ClientMessage::Leave);
        let (_, msg) = rx.recv().await.unwrap();
        assert_eq!(msg, ServerMessage::PeerLeft { peer_id: "a".into() });
    }
}
