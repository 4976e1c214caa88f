//! Collaboration management for real-time multi-user editing.
//!
//! Bridges the document store, presence and reactions to a relay
//! [`Transport`]. Outgoing traffic is queued and sent by [`flush`]; incoming
//! events are applied by [`handle_event`].
//!
//! [`flush`]: CollaborationManager::flush
//! [`handle_event`]: CollaborationManager::handle_event

use std::collections::VecDeque;
#[cfg(not(target_arch = "wasm32"))]
use std::time::Instant;

use kurbo::Point;
#[cfg(target_arch = "wasm32")]
use web_time::Instant;

use crate::error::CanvasResult;
use crate::presence::{PresenceChannel, PresenceState};
use crate::reactions::{Reaction, ReactionList};
use crate::scene::SceneAdapter;
use crate::store::DocumentStore;
use crate::sync::{BroadcastEvent, ClientMessage, SyncEvent, Transport, encode_update};

/// Incremental syncs sent before a full snapshot compacts the relay's history.
pub const SNAPSHOT_INTERVAL: usize = 50;

#[derive(Debug, Clone, PartialEq)]
enum Outgoing {
    Message(ClientMessage),
    /// Exported from the store at send time.
    Snapshot,
}

impl Outgoing {
    /// Whether the item survives a failed send.
    fn is_durable(&self) -> bool {
        matches!(
            self,
            Outgoing::Snapshot
                | Outgoing::Message(ClientMessage::Join { .. } | ClientMessage::Leave)
        )
    }
}

/// Room membership and the outgoing message queue of one client.
#[derive(Debug, Default)]
pub struct CollaborationManager {
    /// Room to (re)join whenever a connection comes up.
    desired_room: Option<String>,
    current_room: Option<String>,
    peer_count: usize,
    outgoing: VecDeque<Outgoing>,
    syncs_since_snapshot: usize,
}

impl CollaborationManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current_room(&self) -> Option<&str> {
        self.current_room.as_deref()
    }

    pub fn in_room(&self) -> bool {
        self.current_room.is_some()
    }

    /// Participants in the room, this client included.
    pub fn peer_count(&self) -> usize {
        self.peer_count
    }

    pub fn queued(&self) -> usize {
        self.outgoing.len()
    }

    pub fn join_room(&mut self, room: &str) {
        self.desired_room = Some(room.to_string());
        self.outgoing
            .retain(|item| !matches!(item, Outgoing::Message(ClientMessage::Join { .. })));
        self.outgoing
            .push_back(Outgoing::Message(ClientMessage::Join {
                room: room.to_string(),
            }));
    }

    pub fn leave_room(&mut self) {
        self.desired_room = None;
        self.outgoing.clear();
        if self.current_room.take().is_some() {
            self.outgoing.push_back(Outgoing::Message(ClientMessage::Leave));
        }
        self.peer_count = 0;
    }

    /// Presence goes out only while in a room.
    pub fn queue_presence(&mut self, state: PresenceState) {
        if self.in_room() {
            self.outgoing
                .push_back(Outgoing::Message(ClientMessage::Presence { state }));
        }
    }

    pub fn queue_broadcast(&mut self, event: BroadcastEvent) {
        if self.in_room() {
            self.outgoing
                .push_back(Outgoing::Message(ClientMessage::Broadcast { event }));
        }
    }

    pub fn queue_snapshot(&mut self) {
        if !self.outgoing.contains(&Outgoing::Snapshot) {
            self.outgoing.push_back(Outgoing::Snapshot);
        }
    }

    /// Apply one transport event. Returns true when the store changed.
    pub fn handle_event(
        &mut self,
        event: SyncEvent,
        store: &mut dyn DocumentStore,
        presence: &mut PresenceChannel,
        reactions: &mut ReactionList,
        now: Instant,
    ) -> bool {
        match event {
            SyncEvent::Connected => {
                log::info!("Connected to relay");
                if let Some(room) = self.desired_room.clone() {
                    self.join_room(&room);
                }
                false
            }
            SyncEvent::Disconnected => {
                log::info!("Disconnected from relay");
                self.current_room = None;
                self.peer_count = 0;
                self.outgoing.clear();
                presence.clear_peers();
                false
            }
            SyncEvent::JoinedRoom {
                room,
                peer_count,
                initial_sync,
            } => {
                log::info!("Joined room {room} with {peer_count} peers");
                self.current_room = Some(room);
                self.peer_count = peer_count;
                let mut changed = false;
                for update in &initial_sync {
                    changed |= import(store, update, "room history");
                }
                // Offline edits and everything imported, in one compact entry.
                self.queue_snapshot();
                presence.mark_dirty();
                changed
            }
            SyncEvent::PeerJoined { peer_id } => {
                log::debug!("Peer {peer_id} joined");
                self.peer_count += 1;
                self.queue_snapshot();
                presence.mark_dirty();
                false
            }
            SyncEvent::PeerLeft { peer_id } => {
                log::debug!("Peer {peer_id} left");
                self.peer_count = self.peer_count.saturating_sub(1);
                presence.remove_peer(&peer_id);
                false
            }
            SyncEvent::SyncReceived { from, data } => import(store, &data, &from),
            SyncEvent::PresenceReceived { from, state } => {
                presence.receive(&from, state);
                false
            }
            SyncEvent::BroadcastReceived { from, event } => {
                match event {
                    BroadcastEvent::Reaction { x, y, value } => {
                        log::trace!("Reaction {value} from {from}");
                        reactions.push(Reaction {
                            point: Point::new(x, y),
                            value,
                            timestamp: now,
                        });
                    }
                }
                false
            }
            SyncEvent::Error { message } => {
                log::warn!("Relay error: {message}");
                false
            }
        }
    }

    /// Send queued messages, then any store updates not yet shared.
    ///
    /// The store's sent marker only advances after a successful send, so a
    /// failure leaves the updates pending (and their ids unsynced) for the
    /// next flush. Returns the number of messages sent.
    pub fn flush(
        &mut self,
        transport: &mut dyn Transport,
        store: &mut dyn DocumentStore,
        scene: &mut SceneAdapter,
    ) -> CanvasResult<usize> {
        if !transport.is_connected() {
            return Ok(0);
        }

        let mut sent = 0;
        while let Some(item) = self.outgoing.pop_front() {
            let (message, carries_document) = match &item {
                Outgoing::Message(message) => (message.clone(), false),
                Outgoing::Snapshot => (
                    ClientMessage::Sync {
                        data: encode_update(&store.export_snapshot()),
                        snapshot: true,
                    },
                    true,
                ),
            };
            if let Err(err) = transport.send_message(&message) {
                log::warn!("Send failed, will retry: {err}");
                if item.is_durable() {
                    self.outgoing.push_front(item);
                }
                return Err(err.into());
            }
            sent += 1;
            if carries_document {
                store.mark_sent();
                scene.mark_synced();
                self.syncs_since_snapshot = 0;
            }
        }

        if !self.in_room() {
            return Ok(sent);
        }
        if let Some(bytes) = store.pending_updates() {
            let message = ClientMessage::Sync {
                data: encode_update(&bytes),
                snapshot: false,
            };
            if let Err(err) = transport.send_message(&message) {
                log::warn!("Sync failed, updates stay pending: {err}");
                return Err(err.into());
            }
            store.mark_sent();
            scene.mark_synced();
            sent += 1;
            self.syncs_since_snapshot += 1;
            if self.syncs_since_snapshot >= SNAPSHOT_INTERVAL {
                self.queue_snapshot();
            }
        }
        Ok(sent)
    }
}

fn import(store: &mut dyn DocumentStore, data: &[u8], source: &str) -> bool {
    match store.import(data) {
        Ok(()) => true,
        Err(err) => {
            log::error!("Failed to import update from {source}: {err}");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{Geometry, ShapeBody, ShapeRecord};
    use crate::store::LoroStore;
    use crate::sync::LoopbackHub;
    use std::time::Duration;
    use uuid::Uuid;

    struct Client {
        store: LoroStore,
        scene: SceneAdapter,
        presence: PresenceChannel,
        reactions: ReactionList,
        collaboration: CollaborationManager,
        transport: crate::sync::LoopbackTransport,
    }

    impl Client {
        fn new(hub: &LoopbackHub) -> Self {
            let mut collaboration = CollaborationManager::new();
            collaboration.join_room("room");
            Self {
                store: LoroStore::new(),
                scene: SceneAdapter::new(),
                presence: PresenceChannel::new(Duration::ZERO),
                reactions: ReactionList::new(Duration::from_secs(4)),
                collaboration,
                transport: hub.connect(),
            }
        }

        fn pump(&mut self) -> CanvasResult<usize> {
            let now = Instant::now();
            for event in self.transport.poll_events() {
                self.collaboration.handle_event(
                    event,
                    &mut self.store,
                    &mut self.presence,
                    &mut self.reactions,
                    now,
                );
            }
            if self.collaboration.in_room() {
                if let Some(state) = self.presence.flush(now) {
                    self.collaboration.queue_presence(state);
                }
            }
            self.collaboration
                .flush(&mut self.transport, &mut self.store, &mut self.scene)
        }
    }

    fn record(x: f64) -> ShapeRecord {
        ShapeRecord::new(
            Uuid::new_v4(),
            Geometry::new(
                Point::new(x, 0.0),
                ShapeBody::Rectangle {
                    width: 10.0,
                    height: 10.0,
                },
            ),
        )
    }

    #[test]
    fn test_updates_reach_peer() {
        let hub = LoopbackHub::new();
        let mut a = Client::new(&hub);
        let mut b = Client::new(&hub);
        for _ in 0..2 {
            a.pump().unwrap();
            b.pump().unwrap();
        }
        assert_eq!(a.collaboration.current_room(), Some("room"));
        assert_eq!(hub.peer_count("room"), 2);

        let shape = record(0.0);
        a.store.set(shape.id, &shape).unwrap();
        a.pump().unwrap();
        b.pump().unwrap();
        assert_eq!(b.store.get(shape.id), Some(shape));
        assert!(a.store.pending_updates().is_none());
        assert!(b.store.pending_updates().is_none());
    }

    #[test]
    fn test_failed_sync_stays_pending() {
        let hub = LoopbackHub::new();
        let mut a = Client::new(&hub);
        a.pump().unwrap();
        a.pump().unwrap();

        let shape = record(0.0);
        a.store.set(shape.id, &shape).unwrap();
        hub.set_offline(a.transport.peer_id(), true);
        assert!(a.pump().is_err());
        assert!(a.store.pending_updates().is_some());

        hub.set_offline(a.transport.peer_id(), false);
        a.pump().unwrap();
        assert!(a.store.pending_updates().is_none());
    }

    #[test]
    fn test_reaction_broadcast_becomes_local_reaction() {
        let hub = LoopbackHub::new();
        let mut a = Client::new(&hub);
        let mut b = Client::new(&hub);
        for _ in 0..2 {
            a.pump().unwrap();
            b.pump().unwrap();
        }

        a.collaboration.queue_broadcast(BroadcastEvent::Reaction {
            x: 5.0,
            y: 6.0,
            value: "❤️".to_string(),
        });
        a.pump().unwrap();
        b.pump().unwrap();
        assert_eq!(b.reactions.len(), 1);
        assert_eq!(b.reactions.visible()[0].point, Point::new(5.0, 6.0));
        assert!(a.reactions.is_empty());
    }

    #[test]
    fn test_peer_left_drops_presence() {
        let hub = LoopbackHub::new();
        let mut a = Client::new(&hub);
        let mut b = Client::new(&hub);
        for _ in 0..2 {
            a.pump().unwrap();
            b.pump().unwrap();
        }
        a.pump().unwrap();
        assert_eq!(a.presence.peers().len(), 1);

        drop(b);
        a.pump().unwrap();
        assert!(a.presence.peers().is_empty());
        assert_eq!(a.collaboration.peer_count(), 1);
    }

    #[test]
    fn test_presence_dropped_outside_room() {
        let mut collaboration = CollaborationManager::new();
        collaboration.queue_presence(PresenceState::default());
        assert_eq!(collaboration.queued(), 0);
    }
}
