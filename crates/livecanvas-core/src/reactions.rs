//! Short-lived emoji reactions floating over the canvas.

#[cfg(not(target_arch = "wasm32"))]
use std::time::{Duration, Instant};

use kurbo::Point;
#[cfg(target_arch = "wasm32")]
use web_time::{Duration, Instant};

use crate::presence::CursorMode;

#[derive(Debug, Clone, PartialEq)]
pub struct Reaction {
    /// World position.
    pub point: Point,
    pub value: String,
    pub timestamp: Instant,
}

/// Reactions currently on screen, local and remote alike.
#[derive(Debug, Clone)]
pub struct ReactionList {
    reactions: Vec<Reaction>,
    ttl: Duration,
}

impl ReactionList {
    pub fn new(ttl: Duration) -> Self {
        Self {
            reactions: Vec::new(),
            ttl,
        }
    }

    pub fn push(&mut self, reaction: Reaction) {
        self.reactions.push(reaction);
    }

    /// Drop reactions whose age reached the TTL. Returns how many were removed.
    pub fn prune(&mut self, now: Instant) -> usize {
        let before = self.reactions.len();
        let ttl = self.ttl;
        self.reactions
            .retain(|reaction| now.saturating_duration_since(reaction.timestamp) < ttl);
        before - self.reactions.len()
    }

    pub fn visible(&self) -> &[Reaction] {
        &self.reactions
    }

    pub fn len(&self) -> usize {
        self.reactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reactions.is_empty()
    }
}

/// Rate-limits reactions produced by holding the pointer down in reaction mode.
#[derive(Debug, Clone)]
pub struct ReactionEmitter {
    interval: Duration,
    last_emit: Option<Instant>,
}

impl ReactionEmitter {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_emit: None,
        }
    }

    /// Emit a reaction at the cursor if the mode calls for one and the
    /// interval has elapsed.
    pub fn poll(
        &mut self,
        now: Instant,
        mode: &CursorMode,
        cursor: Option<Point>,
    ) -> Option<Reaction> {
        let CursorMode::Reaction {
            emoji,
            pressed: true,
        } = mode
        else {
            return None;
        };
        let point = cursor?;
        let due = self
            .last_emit
            .is_none_or(|last| now.saturating_duration_since(last) >= self.interval);
        if !due {
            return None;
        }
        self.last_emit = Some(now);
        Some(Reaction {
            point,
            value: emoji.clone(),
            timestamp: now,
        })
    }

    pub fn reset(&mut self) {
        self.last_emit = None;
    }
}
