//! Multi-client scenarios over the in-process relay.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::{Duration, Instant};

use kurbo::Point;
use livecanvas_core::record::SerializableColor;
use livecanvas_core::sync::LoopbackTransport;
use livecanvas_core::{
    AttributeEdit, CanvasSession, ConnectionState, DocumentStore, Draft, GestureOutcome,
    HeadlessSurface, LoopbackHub, LoroStore, SessionConfig, ShapeId, ShapeRecord, SurfaceEvent,
    SyncEvent, ToolKind, Transport, TransportError,
};

type Session = CanvasSession<LoroStore, HeadlessSurface>;

const ROOM: &str = "board";

fn config() -> SessionConfig {
    SessionConfig {
        room: Some(ROOM.to_string()),
        ..SessionConfig::default()
    }
}

fn client(hub: &LoopbackHub) -> (Session, String) {
    let _ = env_logger::builder().is_test(true).try_init();
    let transport = hub.connect();
    let peer_id = transport.peer_id().to_string();
    let session = CanvasSession::new(config(), LoroStore::new(), HeadlessSurface::new())
        .unwrap()
        .with_transport(Box::new(transport));
    (session, peer_id)
}

/// Tick every session a few rounds so queued traffic settles.
fn settle(sessions: &mut [&mut Session], now: Instant) {
    for _ in 0..4 {
        for session in sessions.iter_mut() {
            session.tick(now);
        }
    }
}

fn draw_rect(session: &mut Session, x: f64, y: f64) -> ShapeId {
    session.set_tool(ToolKind::Rectangle);
    session
        .handle_surface_event(&SurfaceEvent::down(x, y))
        .unwrap();
    session
        .handle_surface_event(&SurfaceEvent::move_to(x + 10.0, y + 10.0))
        .unwrap();
    match session
        .handle_surface_event(&SurfaceEvent::up(x + 30.0, y + 20.0))
        .unwrap()
    {
        GestureOutcome::Created(Draft::Committed(id, _)) => id,
        other => panic!("expected a committed shape, got {other:?}"),
    }
}

fn sorted_entries(session: &Session) -> Vec<(ShapeId, ShapeRecord)> {
    let mut entries = session.store().entries();
    entries.sort_by_key(|(id, _)| *id);
    entries
}

#[test]
fn test_clients_join_the_configured_room() {
    let hub = LoopbackHub::new();
    let (mut a, _) = client(&hub);
    let (mut b, _) = client(&hub);
    settle(&mut [&mut a, &mut b], Instant::now());

    assert_eq!(a.connection_state(), ConnectionState::Connected);
    assert_eq!(a.collaboration().current_room(), Some(ROOM));
    assert_eq!(b.collaboration().current_room(), Some(ROOM));
    assert_eq!(a.collaboration().peer_count(), 2);
    assert_eq!(b.collaboration().peer_count(), 2);
    assert_eq!(hub.peer_count(ROOM), 2);
}

#[test]
fn test_remote_shape_appears_on_peer_surface() {
    let hub = LoopbackHub::new();
    let (mut a, _) = client(&hub);
    let (mut b, _) = client(&hub);
    let now = Instant::now();
    settle(&mut [&mut a, &mut b], now);

    let id = draw_rect(&mut a, 0.0, 0.0);
    a.tick(now);
    b.tick(now);

    let record = b.store().get(id).unwrap();
    assert_eq!(record.geometry.position, Point::ZERO);
    assert_eq!(record.geometry.size(), Some((30.0, 20.0)));
    let handle = b.surface().find(id).unwrap();
    assert_eq!(b.surface().geometry(handle), Some(&record.geometry));
}

#[test]
fn test_concurrent_edits_converge() {
    let hub = LoopbackHub::new();
    let (mut a, _) = client(&hub);
    let (mut b, _) = client(&hub);
    let now = Instant::now();
    settle(&mut [&mut a, &mut b], now);

    let from_a = draw_rect(&mut a, 0.0, 0.0);
    let from_b = draw_rect(&mut b, 100.0, 0.0);
    settle(&mut [&mut a, &mut b], now);

    assert_eq!(a.store().size(), 2);
    assert_eq!(sorted_entries(&a), sorted_entries(&b));
    for id in [from_a, from_b] {
        assert!(a.surface().find(id).is_some());
        assert!(b.surface().find(id).is_some());
    }
    assert!(a.store().pending_updates().is_none());
    assert!(b.store().pending_updates().is_none());
}

#[test]
fn test_concurrent_fill_edits_converge() {
    let hub = LoopbackHub::new();
    let (mut a, _) = client(&hub);
    let (mut b, _) = client(&hub);
    let now = Instant::now();
    settle(&mut [&mut a, &mut b], now);

    let id = draw_rect(&mut a, 0.0, 0.0);
    settle(&mut [&mut a, &mut b], now);
    for session in [&mut a, &mut b] {
        session
            .handle_surface_event(&SurfaceEvent::down(10.0, 10.0))
            .unwrap();
        session
            .handle_surface_event(&SurfaceEvent::up(10.0, 10.0))
            .unwrap();
    }

    let red = SerializableColor::new(255, 0, 0, 255);
    let blue = SerializableColor::new(0, 0, 255, 255);
    let edited = a.modify_selected(&AttributeEdit::Fill(Some(red))).unwrap();
    assert_eq!(edited, vec![id]);
    let edited = b.modify_selected(&AttributeEdit::Fill(Some(blue))).unwrap();
    assert_eq!(edited, vec![id]);
    settle(&mut [&mut a, &mut b], now);

    let on_a = a.store().get(id).unwrap();
    let on_b = b.store().get(id).unwrap();
    assert_eq!(on_a, on_b);
    let fill = on_a.geometry.style.fill_color;
    assert!(fill == Some(red) || fill == Some(blue));
    for session in [&a, &b] {
        let handle = session.surface().find(id).unwrap();
        assert_eq!(session.surface().geometry(handle), Some(&on_a.geometry));
    }
}

#[test]
fn test_late_joiner_receives_room_history() {
    let hub = LoopbackHub::new();
    let (mut a, _) = client(&hub);
    let now = Instant::now();
    settle(&mut [&mut a], now);
    let first = draw_rect(&mut a, 0.0, 0.0);
    let second = draw_rect(&mut a, 50.0, 0.0);
    settle(&mut [&mut a], now);
    assert!(hub.history_len(ROOM) > 0);

    let (mut late, _) = client(&hub);
    settle(&mut [&mut a, &mut late], now);
    assert!(late.store().get(first).is_some());
    assert!(late.store().get(second).is_some());
    assert_eq!(late.surface().len(), 2);
}

#[test]
fn test_remote_edits_are_not_undoable() {
    let hub = LoopbackHub::new();
    let (mut a, _) = client(&hub);
    let (mut b, _) = client(&hub);
    let now = Instant::now();
    settle(&mut [&mut a, &mut b], now);

    let id = draw_rect(&mut a, 0.0, 0.0);
    settle(&mut [&mut a, &mut b], now);

    assert!(!b.undo().unwrap());
    assert!(b.store().get(id).is_some());

    // The author's undo propagates as an ordinary update.
    assert!(a.undo().unwrap());
    settle(&mut [&mut a, &mut b], now);
    assert!(b.store().get(id).is_none());
    assert!(b.surface().is_empty());
}

#[test]
fn test_failed_send_keeps_updates_until_reconnect() {
    let hub = LoopbackHub::new();
    let (mut a, a_id) = client(&hub);
    let (mut b, _) = client(&hub);
    let now = Instant::now();
    settle(&mut [&mut a, &mut b], now);

    hub.set_offline(&a_id, true);
    let id = draw_rect(&mut a, 0.0, 0.0);
    a.tick(now);
    b.tick(now);
    assert!(a.store().pending_updates().is_some());
    assert!(a.scene().is_unsynced(id));
    assert!(b.store().get(id).is_none());

    hub.set_offline(&a_id, false);
    a.tick(now);
    b.tick(now);
    assert!(a.store().pending_updates().is_none());
    assert!(!a.scene().is_unsynced(id));
    assert!(b.store().get(id).is_some());
}

#[test]
fn test_reactions_travel_and_expire() {
    let hub = LoopbackHub::new();
    let (mut a, _) = client(&hub);
    let (mut b, _) = client(&hub);
    let base = Instant::now();
    settle(&mut [&mut a, &mut b], base);

    a.choose_reaction("🔥");
    a.handle_surface_event(&SurfaceEvent::move_to(30.0, 40.0))
        .unwrap();
    a.handle_surface_event(&SurfaceEvent::down(30.0, 40.0))
        .unwrap();
    a.tick(base);
    b.tick(base);

    assert_eq!(a.reactions().len(), 1);
    assert_eq!(b.reactions().len(), 1);
    let reaction = &b.reactions().visible()[0];
    assert_eq!(reaction.point, Point::new(30.0, 40.0));
    assert_eq!(reaction.value, "🔥");
    // Reaction mode never draws.
    assert_eq!(a.store().size(), 0);

    b.tick(base + Duration::from_millis(3000));
    assert_eq!(b.reactions().len(), 1);
    b.tick(base + Duration::from_millis(4001));
    assert!(b.reactions().is_empty());
}

/// Wraps a loopback transport and records every frame sent through it.
struct Recording {
    inner: LoopbackTransport,
    sent: Rc<RefCell<Vec<String>>>,
}

impl Transport for Recording {
    fn send(&mut self, text: &str) -> Result<(), TransportError> {
        self.inner.send(text)?;
        self.sent.borrow_mut().push(text.to_string());
        Ok(())
    }

    fn poll_events(&mut self) -> Vec<SyncEvent> {
        self.inner.poll_events()
    }

    fn state(&self) -> ConnectionState {
        self.inner.state()
    }
}

fn presence_frames(sent: &RefCell<Vec<String>>) -> usize {
    sent.borrow()
        .iter()
        .filter(|text| text.contains(r#""type":"presence""#))
        .count()
}

#[test]
fn test_cursor_burst_is_throttled() {
    let _ = env_logger::builder().is_test(true).try_init();
    let hub = LoopbackHub::new();
    let sent = Rc::new(RefCell::new(Vec::new()));
    let inner = hub.connect();
    let a_id = inner.peer_id().to_string();
    let mut a = CanvasSession::new(config(), LoroStore::new(), HeadlessSurface::new())
        .unwrap()
        .with_transport(Box::new(Recording {
            inner,
            sent: Rc::clone(&sent),
        }));
    let (mut b, _) = client(&hub);
    let base = Instant::now();
    settle(&mut [&mut a, &mut b], base);
    sent.borrow_mut().clear();

    let at = |ms: u64| base + Duration::from_millis(ms);
    for i in 0..10 {
        a.handle_surface_event(&SurfaceEvent::move_to(i as f64, 0.0))
            .unwrap();
    }
    a.tick(at(100));
    for (step, ms) in [110, 120, 130, 140].into_iter().enumerate() {
        a.handle_surface_event(&SurfaceEvent::move_to(50.0 + step as f64, 5.0))
            .unwrap();
        a.tick(at(ms));
    }
    assert_eq!(presence_frames(&sent), 1);

    a.tick(at(150));
    assert_eq!(presence_frames(&sent), 2);

    b.tick(at(150));
    let seen = b.presence().peer(&a_id).unwrap();
    assert_eq!(seen.cursor, Some(Point::new(53.0, 5.0)));
}

#[test]
fn test_peer_leaving_clears_its_presence() {
    let hub = LoopbackHub::new();
    let (mut a, _) = client(&hub);
    let (mut b, b_id) = client(&hub);
    let now = Instant::now();
    settle(&mut [&mut a, &mut b], now);
    assert!(a.presence().peer(&b_id).is_some());

    let (store, _surface) = b.shutdown();
    assert_eq!(store.size(), 0);
    a.tick(now);
    assert!(a.presence().peer(&b_id).is_none());
    assert_eq!(a.collaboration().peer_count(), 1);
}
