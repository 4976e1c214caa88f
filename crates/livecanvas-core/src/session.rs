//! One mounted canvas: store, surface, controller and collaboration wired
//! together behind a single owner.

use std::cell::Cell;
use std::rc::Rc;
#[cfg(not(target_arch = "wasm32"))]
use std::time::Instant;

#[cfg(target_arch = "wasm32")]
use web_time::Instant;

use crate::collaboration::CollaborationManager;
use crate::config::SessionConfig;
use crate::controller::{AttributeEdit, GestureOutcome, ImageSource, InteractionController, SceneContext};
use crate::error::CanvasResult;
use crate::history::{HistoryManager, HistoryState};
use crate::input::KeyInput;
use crate::presence::{CursorMode, PresenceChannel, PresencePatch};
use crate::reactions::{ReactionEmitter, ReactionList};
use crate::record::ShapeId;
use crate::scene::{RehydrateReport, SceneAdapter};
use crate::shortcuts::Shortcut;
use crate::store::{DocumentStore, StoreChange, SubscriptionId};
use crate::surface::{RenderSurface, SurfaceEvent};
use crate::sync::{BroadcastEvent, ConnectionState, Transport};
use crate::tools::ToolKind;

/// A canvas session.
///
/// Created when the canvas mounts and torn down with [`CanvasSession::shutdown`]
/// when it unmounts. Remote and historical store changes reach the surface
/// through [`CanvasSession::sync_scene`], which [`CanvasSession::tick`] calls.
pub struct CanvasSession<S: DocumentStore, R: RenderSurface> {
    config: SessionConfig,
    store: S,
    surface: R,
    scene: SceneAdapter,
    controller: InteractionController,
    history: HistoryManager,
    presence: PresenceChannel,
    cursor_mode: CursorMode,
    reactions: ReactionList,
    emitter: ReactionEmitter,
    collaboration: CollaborationManager,
    transport: Option<Box<dyn Transport>>,
    focused: bool,
    /// Set by the store subscription; cleared by `sync_scene`.
    dirty: Rc<Cell<bool>>,
    subscription: SubscriptionId,
    last_prune: Option<Instant>,
}

impl<S: DocumentStore, R: RenderSurface> CanvasSession<S, R> {
    pub fn new(config: SessionConfig, mut store: S, surface: R) -> CanvasResult<Self> {
        config.validate()?;

        let dirty = Rc::new(Cell::new(true));
        let flag = Rc::clone(&dirty);
        let subscription = store.subscribe(Box::new(move |_: &StoreChange| flag.set(true)));

        let mut collaboration = CollaborationManager::new();
        if let Some(room) = &config.room {
            collaboration.join_room(room);
        }

        Ok(Self {
            controller: InteractionController::new(&config),
            presence: PresenceChannel::new(config.presence_throttle()),
            reactions: ReactionList::new(config.reaction_ttl()),
            emitter: ReactionEmitter::new(config.reaction_emit_interval()),
            config,
            store,
            surface,
            scene: SceneAdapter::new(),
            history: HistoryManager::new(),
            cursor_mode: CursorMode::Hidden,
            collaboration,
            transport: None,
            focused: true,
            dirty,
            subscription,
            last_prune: None,
        })
    }

    pub fn with_transport(mut self, transport: Box<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Attach a transport, replacing any previous one.
    pub fn connect(&mut self, transport: Box<dyn Transport>) {
        self.transport = Some(transport);
    }

    /// Open a WebSocket to the configured relay.
    #[cfg(not(target_arch = "wasm32"))]
    pub fn connect_relay(&mut self) -> CanvasResult<bool> {
        let Some(url) = self.config.relay_url.clone() else {
            return Ok(false);
        };
        let mut socket = crate::sync::NativeWebSocket::new();
        socket.connect(&url)?;
        self.connect(Box::new(socket));
        Ok(true)
    }

    pub fn join_room(&mut self, room: &str) {
        self.collaboration.join_room(room);
    }

    /// Tear the session down and hand back the store and surface.
    pub fn shutdown(mut self) -> (S, R) {
        self.controller.cancel_draft(&mut self.surface);
        if self.collaboration.in_room() {
            self.collaboration.leave_room();
            if let Some(transport) = self.transport.as_deref_mut() {
                if let Err(err) =
                    self.collaboration
                        .flush(transport, &mut self.store, &mut self.scene)
                {
                    log::warn!("Failed to leave room cleanly: {err}");
                }
            }
        }
        self.store.unsubscribe(self.subscription);
        log::debug!("Canvas session shut down");
        (self.store, self.surface)
    }

    fn parts(&mut self) -> (&mut InteractionController, SceneContext<'_>) {
        (
            &mut self.controller,
            SceneContext {
                store: &mut self.store,
                surface: &mut self.surface,
                scene: &mut self.scene,
            },
        )
    }

    /// Feed one surface event through the controller.
    pub fn handle_surface_event(
        &mut self,
        event: &SurfaceEvent,
    ) -> CanvasResult<GestureOutcome> {
        match event {
            SurfaceEvent::PointerMove { position, .. } => {
                let world = self.controller.camera().screen_to_world(*position);
                self.presence.update(PresencePatch::new().cursor(Some(world)));
            }
            SurfaceEvent::PointerDown { .. } | SurfaceEvent::PointerUp { .. } => {
                if let CursorMode::Reaction { pressed, .. } = &mut self.cursor_mode {
                    *pressed = matches!(event, SurfaceEvent::PointerDown { .. });
                    if !*pressed {
                        self.emitter.reset();
                    }
                    return Ok(GestureOutcome::Ignored);
                }
            }
            _ => {}
        }

        let (controller, mut ctx) = self.parts();
        let result = controller.dispatch(&mut ctx, event);
        if let Err(err) = &result {
            log::warn!("{:?} failed: {err}", event.kind());
        }
        result
    }

    /// The pointer left the canvas.
    pub fn pointer_left(&mut self) {
        self.presence
            .update(PresencePatch::new().cursor(None).message(None));
    }

    pub fn set_focused(&mut self, focused: bool) {
        self.focused = focused;
    }

    /// Handle a key press. Returns whether it was consumed.
    pub fn handle_key(&mut self, key: &KeyInput) -> CanvasResult<bool> {
        if let CursorMode::Chat { message, .. } = &mut self.cursor_mode {
            match key.key.as_str() {
                "Escape" => self.close_chat(),
                "Enter" => self.submit_chat(),
                "Backspace" => {
                    message.pop();
                    let text = message.clone();
                    self.presence.update(PresencePatch::new().message(Some(text)));
                }
                text if text.chars().count() == 1 && !key.modifiers.command() => {
                    message.push_str(text);
                    let text = message.clone();
                    self.presence.update(PresencePatch::new().message(Some(text)));
                }
                _ => return Ok(false),
            }
            return Ok(true);
        }

        if !self.focused || self.controller.is_editing_text() {
            return Ok(false);
        }
        let Some(shortcut) = Shortcut::from_key(key) else {
            return Ok(false);
        };
        log::trace!("Shortcut {shortcut:?}");

        match shortcut {
            Shortcut::DeleteSelection => {
                self.delete_selected()?;
            }
            Shortcut::Undo => {
                self.undo()?;
            }
            Shortcut::Redo => {
                self.redo()?;
            }
            Shortcut::Copy => {
                self.copy_selected();
            }
            Shortcut::Paste => {
                self.paste()?;
            }
            Shortcut::Group => {
                self.group_selected()?;
            }
            Shortcut::Ungroup => {
                self.ungroup_selected()?;
            }
            Shortcut::SelectTool(tool) => self.set_tool(tool),
            Shortcut::OpenChat => {
                self.cursor_mode = CursorMode::Chat {
                    message: String::new(),
                    previous: None,
                };
            }
            Shortcut::CloseChat => self.close_chat(),
            Shortcut::OpenReactionPicker => {
                self.cursor_mode = CursorMode::ReactionSelector;
                self.presence.update(PresencePatch::new().message(None));
            }
        }
        Ok(true)
    }

    fn close_chat(&mut self) {
        self.cursor_mode = CursorMode::Hidden;
        self.presence.update(PresencePatch::new().message(None));
    }

    /// Replace the live chat text.
    pub fn set_chat_message(&mut self, text: &str) {
        if let CursorMode::Chat { message, .. } = &mut self.cursor_mode {
            *message = text.to_string();
            self.presence
                .update(PresencePatch::new().message(Some(text.to_string())));
        }
    }

    /// Keep the message as the placeholder and start a fresh one.
    pub fn submit_chat(&mut self) {
        if let CursorMode::Chat { message, previous } = &mut self.cursor_mode {
            *previous = Some(std::mem::take(message));
            self.presence.update(PresencePatch::new().message(None));
        }
    }

    /// Pick an emoji from the reaction selector.
    pub fn choose_reaction(&mut self, emoji: &str) {
        self.cursor_mode = CursorMode::Reaction {
            emoji: emoji.to_string(),
            pressed: false,
        };
        self.presence
            .update(PresencePatch::new().reaction(Some(emoji.to_string())));
    }

    pub fn hide_cursor_ui(&mut self) {
        self.cursor_mode = CursorMode::Hidden;
        self.presence
            .update(PresencePatch::new().message(None).reaction(None));
    }

    /// Periodic work: transport events, reaction emission and pruning,
    /// presence flush, outgoing sync, scene rehydration.
    pub fn tick(&mut self, now: Instant) -> Option<RehydrateReport> {
        if let Some(transport) = self.transport.as_deref_mut() {
            for event in transport.poll_events() {
                self.collaboration.handle_event(
                    event,
                    &mut self.store,
                    &mut self.presence,
                    &mut self.reactions,
                    now,
                );
            }
        }

        if let Some(reaction) =
            self.emitter
                .poll(now, &self.cursor_mode, self.presence.local().cursor)
        {
            self.collaboration.queue_broadcast(BroadcastEvent::Reaction {
                x: reaction.point.x,
                y: reaction.point.y,
                value: reaction.value.clone(),
            });
            self.reactions.push(reaction);
        }

        let prune_due = self.last_prune.is_none_or(|last| {
            now.saturating_duration_since(last) >= self.config.reaction_prune_interval()
        });
        if prune_due {
            self.reactions.prune(now);
            self.last_prune = Some(now);
        }

        if self.collaboration.in_room() {
            if let Some(state) = self.presence.flush(now) {
                self.collaboration.queue_presence(state);
            }
        }

        if let Some(transport) = self.transport.as_deref_mut() {
            if let Err(err) = self
                .collaboration
                .flush(transport, &mut self.store, &mut self.scene)
            {
                log::warn!("Sync deferred: {err}");
            }
        }

        self.sync_scene()
    }

    /// Rebuild the surface from the store if it changed since the last call.
    pub fn sync_scene(&mut self) -> Option<RehydrateReport> {
        if !self.dirty.replace(false) {
            return None;
        }
        let records = self.store.entries();
        let report = self.scene.rehydrate(&records, &mut self.surface);
        self.controller.prune_selection(&self.surface);
        Some(report)
    }

    pub fn undo(&mut self) -> CanvasResult<bool> {
        self.controller.cancel_draft(&mut self.surface);
        let undone = self.history.undo(&mut self.store)?;
        self.sync_scene();
        Ok(undone)
    }

    pub fn redo(&mut self) -> CanvasResult<bool> {
        self.controller.cancel_draft(&mut self.surface);
        let redone = self.history.redo(&mut self.store)?;
        self.sync_scene();
        Ok(redone)
    }

    pub fn delete_selected(&mut self) -> CanvasResult<Vec<ShapeId>> {
        let (controller, mut ctx) = self.parts();
        controller.delete_selected(&mut ctx)
    }

    pub fn reset(&mut self) -> CanvasResult<()> {
        let (controller, mut ctx) = self.parts();
        controller.reset(&mut ctx)
    }

    pub fn group_selected(&mut self) -> CanvasResult<Option<ShapeId>> {
        let (controller, mut ctx) = self.parts();
        controller.group_selected(&mut ctx)
    }

    pub fn ungroup_selected(&mut self) -> CanvasResult<Vec<ShapeId>> {
        let (controller, mut ctx) = self.parts();
        controller.ungroup_selected(&mut ctx)
    }

    pub fn copy_selected(&mut self) -> usize {
        self.controller.copy_selected(&self.surface, &self.scene)
    }

    pub fn paste(&mut self) -> CanvasResult<Vec<ShapeId>> {
        let (controller, mut ctx) = self.parts();
        controller.paste(&mut ctx)
    }

    pub fn insert_image(&mut self, image: ImageSource) -> CanvasResult<ShapeId> {
        let (controller, mut ctx) = self.parts();
        controller.insert_image(&mut ctx, image)
    }

    pub fn modify_selected(&mut self, edit: &AttributeEdit) -> CanvasResult<Vec<ShapeId>> {
        let (controller, mut ctx) = self.parts();
        controller.modify_selected(&mut ctx, edit)
    }

    pub fn end_text_edit(&mut self, content: Option<String>) -> CanvasResult<Option<ShapeId>> {
        let (controller, mut ctx) = self.parts();
        controller.end_text_edit(&mut ctx, content)
    }

    pub fn set_tool(&mut self, tool: ToolKind) {
        self.controller.set_tool(&mut self.surface, tool);
    }

    /// Retry commits the store rejected earlier.
    pub fn retry_failed(&mut self) -> usize {
        self.scene.retry_failed(&mut self.surface, &mut self.store)
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn surface(&self) -> &R {
        &self.surface
    }

    pub fn scene(&self) -> &SceneAdapter {
        &self.scene
    }

    pub fn controller(&self) -> &InteractionController {
        &self.controller
    }

    pub fn presence(&self) -> &PresenceChannel {
        &self.presence
    }

    pub fn reactions(&self) -> &ReactionList {
        &self.reactions
    }

    pub fn cursor_mode(&self) -> &CursorMode {
        &self.cursor_mode
    }

    pub fn collaboration(&self) -> &CollaborationManager {
        &self.collaboration
    }

    pub fn history_state(&self) -> HistoryState {
        HistoryState::of(&self.store)
    }

    /// Toolbar state, when it changed since the last call.
    pub fn refresh_history(&mut self) -> Option<HistoryState> {
        self.history.refresh(&self.store)
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.transport
            .as_ref()
            .map_or(ConnectionState::Disconnected, |transport| transport.state())
    }
}
