//! Explicit surface-event dispatch table.

use std::collections::HashMap;

use super::{GestureOutcome, InteractionController, SceneContext};
use crate::error::{CanvasError, CanvasResult};
use crate::surface::{SurfaceEvent, SurfaceEventKind};

/// A surface event handler.
pub type Handler = fn(
    &mut InteractionController,
    &mut SceneContext<'_>,
    &SurfaceEvent,
) -> CanvasResult<GestureOutcome>;

/// Maps each event kind to exactly one handler.
#[derive(Default)]
pub struct EventRouter {
    handlers: HashMap<SurfaceEventKind, Handler>,
}

impl EventRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the handler for `kind`. A second registration for the same
    /// kind is rejected.
    pub fn register(&mut self, kind: SurfaceEventKind, handler: Handler) -> CanvasResult<()> {
        if self.handlers.contains_key(&kind) {
            return Err(CanvasError::DuplicateHandler(kind));
        }
        self.handlers.insert(kind, handler);
        Ok(())
    }

    /// Remove and return the handler for `kind`.
    pub fn unregister(&mut self, kind: SurfaceEventKind) -> Option<Handler> {
        self.handlers.remove(&kind)
    }

    pub fn handler(&self, kind: SurfaceEventKind) -> Option<Handler> {
        self.handlers.get(&kind).copied()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl std::fmt::Debug for EventRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventRouter")
            .field("kinds", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}
