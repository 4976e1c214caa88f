//! Ephemeral per-participant state: cursors, chat bubbles and reactions.
//!
//! Presence is never written to the document store and is never undoable.

use std::collections::HashMap;
#[cfg(not(target_arch = "wasm32"))]
use std::time::{Duration, Instant};

use kurbo::Point;
use serde::{Deserialize, Serialize};
#[cfg(target_arch = "wasm32")]
use web_time::{Duration, Instant};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserInfo {
    pub name: String,
    pub color: String,
}

/// What a participant shares with everyone else in the room.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PresenceState {
    /// Cursor position in world coordinates.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor: Option<Point>,
    /// Live chat bubble text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Emoji currently attached to the cursor.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reaction: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<UserInfo>,
}

/// A partial presence update.
///
/// `None` leaves a field untouched; `Some(None)` clears it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PresencePatch {
    pub cursor: Option<Option<Point>>,
    pub message: Option<Option<String>>,
    pub reaction: Option<Option<String>>,
    pub user: Option<Option<UserInfo>>,
}

impl PresencePatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cursor(mut self, cursor: Option<Point>) -> Self {
        self.cursor = Some(cursor);
        self
    }

    pub fn message(mut self, message: Option<String>) -> Self {
        self.message = Some(message);
        self
    }

    pub fn reaction(mut self, reaction: Option<String>) -> Self {
        self.reaction = Some(reaction);
        self
    }

    pub fn user(mut self, user: Option<UserInfo>) -> Self {
        self.user = Some(user);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.cursor.is_none()
            && self.message.is_none()
            && self.reaction.is_none()
            && self.user.is_none()
    }
}

impl PresenceState {
    /// Merge a patch. Returns whether anything changed.
    pub fn apply(&mut self, patch: PresencePatch) -> bool {
        fn merge<T: PartialEq>(field: &mut Option<T>, update: Option<Option<T>>) -> bool {
            match update {
                Some(value) if *field != value => {
                    *field = value;
                    true
                }
                _ => false,
            }
        }

        let cursor = merge(&mut self.cursor, patch.cursor);
        let message = merge(&mut self.message, patch.message);
        let reaction = merge(&mut self.reaction, patch.reaction);
        let user = merge(&mut self.user, patch.user);
        cursor || message || reaction || user
    }
}

/// Local cursor interaction mode. Never shared directly; it is reflected in
/// the presence fields it drives.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum CursorMode {
    #[default]
    Hidden,
    Chat {
        message: String,
        /// Last submitted message, shown as a placeholder.
        previous: Option<String>,
    },
    ReactionSelector,
    Reaction {
        emoji: String,
        pressed: bool,
    },
}

/// Throttled outgoing presence plus the last known state of every peer.
#[derive(Debug)]
pub struct PresenceChannel {
    local: PresenceState,
    dirty: bool,
    last_flush: Option<Instant>,
    throttle: Duration,
    peers: HashMap<String, PresenceState>,
}

impl PresenceChannel {
    pub fn new(throttle: Duration) -> Self {
        Self {
            local: PresenceState::default(),
            dirty: false,
            last_flush: None,
            throttle,
            peers: HashMap::new(),
        }
    }

    pub fn local(&self) -> &PresenceState {
        &self.local
    }

    /// Merge a local change. It goes out with the next permitted flush.
    pub fn update(&mut self, patch: PresencePatch) -> bool {
        let changed = self.local.apply(patch);
        self.dirty |= changed;
        changed
    }

    /// Force the current state out on the next permitted flush, e.g. so a
    /// newly joined peer learns about us.
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// The state to broadcast, at most once per throttle window. All updates
    /// since the previous flush are coalesced into it.
    pub fn flush(&mut self, now: Instant) -> Option<PresenceState> {
        if !self.dirty {
            return None;
        }
        let throttled = self
            .last_flush
            .is_some_and(|last| now.saturating_duration_since(last) < self.throttle);
        if throttled {
            return None;
        }
        self.dirty = false;
        self.last_flush = Some(now);
        Some(self.local.clone())
    }

    /// Store a peer's latest state.
    pub fn receive(&mut self, peer_id: &str, state: PresenceState) {
        self.peers.insert(peer_id.to_string(), state);
    }

    pub fn remove_peer(&mut self, peer_id: &str) -> bool {
        self.peers.remove(peer_id).is_some()
    }

    pub fn clear_peers(&mut self) {
        self.peers.clear();
    }

    pub fn peers(&self) -> &HashMap<String, PresenceState> {
        &self.peers
    }

    pub fn peer(&self, peer_id: &str) -> Option<&PresenceState> {
        self.peers.get(peer_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_patch_distinguishes_clear_from_untouched() {
        let mut state = PresenceState {
            cursor: Some(Point::new(1.0, 1.0)),
            message: Some("hi".to_string()),
            ..PresenceState::default()
        };

        assert!(state.apply(PresencePatch::new().message(None)));
        assert_eq!(state.message, None);
        assert_eq!(state.cursor, Some(Point::new(1.0, 1.0)));

        assert!(!state.apply(PresencePatch::new()));
        assert!(!state.apply(PresencePatch::new().cursor(Some(Point::new(1.0, 1.0)))));
    }

    #[test]
    fn test_burst_is_coalesced() {
        let mut channel = PresenceChannel::new(Duration::from_millis(50));
        let start = Instant::now();

        channel.update(PresencePatch::new().cursor(Some(Point::new(0.0, 0.0))));
        assert!(channel.flush(start).is_some());

        for i in 1..=10 {
            channel.update(PresencePatch::new().cursor(Some(Point::new(i as f64, 0.0))));
            assert!(channel.flush(start + Duration::from_millis(i * 4)).is_none());
        }

        let flushed = channel.flush(start + Duration::from_millis(50)).unwrap();
        assert_eq!(flushed.cursor, Some(Point::new(10.0, 0.0)));
        assert!(channel.flush(start + Duration::from_millis(200)).is_none());
    }

    #[test]
    fn test_unchanged_update_is_not_sent() {
        let mut channel = PresenceChannel::new(Duration::from_millis(50));
        assert!(!channel.update(PresencePatch::new().message(None)));
        assert!(channel.flush(Instant::now()).is_none());
    }

    #[test]
    fn test_peers() {
        let mut channel = PresenceChannel::new(Duration::ZERO);
        channel.receive("a", PresenceState::default());
        assert!(channel.peer("a").is_some());
        assert!(channel.remove_peer("a"));
        assert!(!channel.remove_peer("a"));
    }
}
