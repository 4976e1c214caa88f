//! In-process relay for tests and single-process embedding.
//!
//! Messages still travel as JSON text so the wire codec is exercised the same
//! way it is over a socket.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use super::{
    ClientMessage, ConnectionState, RoomHistory, ServerMessage, SyncEvent, Transport,
    TransportError,
};

#[derive(Debug)]
enum Delivery {
    Connected,
    Message(String),
}

#[derive(Debug, Default)]
struct Peer {
    room: Option<String>,
    inbox: VecDeque<Delivery>,
    offline: bool,
}

#[derive(Debug, Default)]
struct Room {
    members: Vec<String>,
    history: RoomHistory,
}

#[derive(Debug, Default)]
struct HubState {
    peers: HashMap<String, Peer>,
    rooms: HashMap<String, Room>,
    next_peer: u64,
}

impl HubState {
    fn deliver(&mut self, peer_id: &str, message: &ServerMessage) {
        let Some(peer) = self.peers.get_mut(peer_id) else {
            return;
        };
        match serde_json::to_string(message) {
            Ok(text) => peer.inbox.push_back(Delivery::Message(text)),
            Err(err) => log::error!("Failed to encode relay message: {err}"),
        }
    }

    /// Send to everyone in `room` except `from`.
    fn broadcast(&mut self, room: &str, from: &str, message: &ServerMessage) {
        let members = self
            .rooms
            .get(room)
            .map(|room| room.members.clone())
            .unwrap_or_default();
        for member in members.iter().filter(|member| *member != from) {
            self.deliver(member, message);
        }
    }

    fn leave(&mut self, peer_id: &str) {
        let Some(room_id) = self.peers.get_mut(peer_id).and_then(|peer| peer.room.take()) else {
            return;
        };
        if let Some(room) = self.rooms.get_mut(&room_id) {
            room.members.retain(|member| member != peer_id);
            if room.members.is_empty() {
                self.rooms.remove(&room_id);
                return;
            }
        }
        self.broadcast(
            &room_id,
            peer_id,
            &ServerMessage::PeerLeft {
                peer_id: peer_id.to_string(),
            },
        );
    }

    fn handle(&mut self, from: &str, message: ClientMessage) {
        let current_room = self.peers.get(from).and_then(|peer| peer.room.clone());
        match message {
            ClientMessage::Join { room } => {
                self.leave(from);
                let entry = self.rooms.entry(room.clone()).or_default();
                entry.members.push(from.to_string());
                let joined = ServerMessage::Joined {
                    room: room.clone(),
                    peer_count: entry.members.len(),
                    initial_sync: entry.history.entries(),
                };
                if let Some(peer) = self.peers.get_mut(from) {
                    peer.room = Some(room.clone());
                }
                self.deliver(from, &joined);
                self.broadcast(
                    &room,
                    from,
                    &ServerMessage::PeerJoined {
                        peer_id: from.to_string(),
                    },
                );
            }
            ClientMessage::Leave => self.leave(from),
            ClientMessage::Sync { data, snapshot } => {
                let Some(room) = current_room else { return };
                if let Some(entry) = self.rooms.get_mut(&room) {
                    entry.history.record(data.clone(), snapshot);
                }
                self.broadcast(
                    &room,
                    from,
                    &ServerMessage::Sync {
                        from: from.to_string(),
                        data,
                    },
                );
            }
            ClientMessage::Presence { state } => {
                let Some(room) = current_room else { return };
                self.broadcast(
                    &room,
                    from,
                    &ServerMessage::Presence {
                        from: from.to_string(),
                        state,
                    },
                );
            }
            ClientMessage::Broadcast { event } => {
                let Some(room) = current_room else { return };
                self.broadcast(
                    &room,
                    from,
                    &ServerMessage::Broadcast {
                        from: from.to_string(),
                        event,
                    },
                );
            }
        }
    }
}

/// A relay living in the current thread. Clones share the same rooms.
#[derive(Debug, Clone, Default)]
pub struct LoopbackHub {
    state: Rc<RefCell<HubState>>,
}

impl LoopbackHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a new peer. Its first poll yields `Connected`.
    pub fn connect(&self) -> LoopbackTransport {
        let mut state = self.state.borrow_mut();
        state.next_peer += 1;
        let peer_id = format!("peer-{}", state.next_peer);
        let mut peer = Peer::default();
        peer.inbox.push_back(Delivery::Connected);
        state.peers.insert(peer_id.clone(), peer);
        LoopbackTransport {
            hub: Rc::clone(&self.state),
            peer_id,
            state: ConnectionState::Connecting,
        }
    }

    /// Make sends from `peer_id` fail until switched back.
    pub fn set_offline(&self, peer_id: &str, offline: bool) {
        if let Some(peer) = self.state.borrow_mut().peers.get_mut(peer_id) {
            peer.offline = offline;
        }
    }

    pub fn peer_count(&self, room: &str) -> usize {
        self.state
            .borrow()
            .rooms
            .get(room)
            .map_or(0, |room| room.members.len())
    }

    pub fn history_len(&self, room: &str) -> usize {
        self.state
            .borrow()
            .rooms
            .get(room)
            .map_or(0, |room| room.history.len())
    }
}

/// One peer's connection to a [`LoopbackHub`].
#[derive(Debug)]
pub struct LoopbackTransport {
    hub: Rc<RefCell<HubState>>,
    peer_id: String,
    state: ConnectionState,
}

impl LoopbackTransport {
    pub fn peer_id(&self) -> &str {
        &self.peer_id
    }

    /// Leave any room and detach from the hub.
    pub fn disconnect(&mut self) {
        if self.state == ConnectionState::Disconnected {
            return;
        }
        let mut hub = self.hub.borrow_mut();
        hub.leave(&self.peer_id);
        hub.peers.remove(&self.peer_id);
        self.state = ConnectionState::Disconnected;
    }
}

impl Transport for LoopbackTransport {
    fn send(&mut self, text: &str) -> Result<(), TransportError> {
        if self.state != ConnectionState::Connected {
            return Err(TransportError::NotConnected);
        }
        let mut hub = self.hub.borrow_mut();
        match hub.peers.get(&self.peer_id) {
            None => return Err(TransportError::NotConnected),
            Some(peer) if peer.offline => {
                return Err(TransportError::Send("peer is offline".to_string()));
            }
            Some(_) => {}
        }
        let message: ClientMessage = serde_json::from_str(text)?;
        hub.handle(&self.peer_id, message);
        Ok(())
    }

    fn poll_events(&mut self) -> Vec<SyncEvent> {
        let deliveries: Vec<Delivery> = match self.hub.borrow_mut().peers.get_mut(&self.peer_id) {
            Some(peer) => peer.inbox.drain(..).collect(),
            None => return Vec::new(),
        };
        let mut events = Vec::with_capacity(deliveries.len());
        for delivery in deliveries {
            match delivery {
                Delivery::Connected => {
                    self.state = ConnectionState::Connected;
                    events.push(SyncEvent::Connected);
                }
                Delivery::Message(text) => match serde_json::from_str::<ServerMessage>(&text) {
                    Ok(message) => events.extend(message.into_event()),
                    Err(err) => log::warn!("Failed to parse relay message: {err}"),
                },
            }
        }
        events
    }

    fn state(&self) -> ConnectionState {
        self.state
    }
}

impl Drop for LoopbackTransport {
    fn drop(&mut self) {
        self.disconnect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::BroadcastEvent;

    fn joined(hub: &LoopbackHub, room: &str) -> LoopbackTransport {
        let mut transport = hub.connect();
        assert_eq!(transport.poll_events(), vec![SyncEvent::Connected]);
        transport
            .send_message(&ClientMessage::Join {
                room: room.to_string(),
            })
            .unwrap();
        transport
    }

    #[test]
    fn test_send_requires_connected_event() {
        let hub = LoopbackHub::new();
        let mut transport = hub.connect();
        assert!(matches!(transport.send("{}"), Err(TransportError::NotConnected)));
    }

    #[test]
    fn test_join_and_relay() {
        let hub = LoopbackHub::new();
        let mut a = joined(&hub, "room");
        let mut b = joined(&hub, "room");
        assert_eq!(hub.peer_count("room"), 2);

        let events = a.poll_events();
        assert!(matches!(events[0], SyncEvent::JoinedRoom { peer_count: 1, .. }));
        assert_eq!(
            events[1],
            SyncEvent::PeerJoined {
                peer_id: b.peer_id().to_string()
            }
        );

        b.send_message(&ClientMessage::Broadcast {
            event: BroadcastEvent::Reaction {
                x: 1.0,
                y: 2.0,
                value: "🎉".to_string(),
            },
        })
        .unwrap();
        assert!(matches!(
            a.poll_events().as_slice(),
            [SyncEvent::BroadcastReceived { .. }]
        ));
        // No echo to the sender.
        assert!(
            b.poll_events()
                .iter()
                .all(|event| !matches!(event, SyncEvent::BroadcastReceived { .. }))
        );
    }

    #[test]
    fn test_late_joiner_gets_history() {
        let hub = LoopbackHub::new();
        let mut a = joined(&hub, "room");
        a.send_message(&ClientMessage::Sync {
            data: "AQI=".to_string(),
            snapshot: false,
        })
        .unwrap();

        let mut b = joined(&hub, "room");
        let events = b.poll_events();
        assert_eq!(
            events[0],
            SyncEvent::JoinedRoom {
                room: "room".to_string(),
                peer_count: 2,
                initial_sync: vec![vec![1, 2]],
            }
        );
    }

    #[test]
    fn test_offline_send_fails() {
        let hub = LoopbackHub::new();
        let mut a = joined(&hub, "room");
        hub.set_offline(a.peer_id(), true);
        assert!(matches!(
            a.send_message(&ClientMessage::Leave),
            Err(TransportError::Send(_))
        ));
        hub.set_offline(a.peer_id(), false);
        assert!(a.send_message(&ClientMessage::Leave).is_ok());
    }

    #[test]
    fn test_drop_notifies_peers() {
        let hub = LoopbackHub::new();
        let mut a = joined(&hub, "room");
        let b = joined(&hub, "room");
        let b_id = b.peer_id().to_string();
        a.poll_events();

        drop(b);
        assert_eq!(a.poll_events(), vec![SyncEvent::PeerLeft { peer_id: b_id }]);
        assert_eq!(hub.peer_count("room"), 1);
    }
}
