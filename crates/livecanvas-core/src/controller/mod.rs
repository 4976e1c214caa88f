//! Interaction controller: turns surface events into scene and store changes.
//!
//! Drawing gestures build a provisional surface object that only reaches the
//! store on pointer-up. Select gestures move objects locally and commit on
//! release. Pan and zoom only touch the camera.

mod attributes;
mod router;

pub use attributes::{AttributeEdit, ElementAttributes};
pub use router::{EventRouter, Handler};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use kurbo::{Point, Rect, Vec2};

use crate::camera::Camera;
use crate::config::SessionConfig;
use crate::error::{CanvasError, CanvasResult};
use crate::input::{InputState, MouseButton};
use crate::record::{Geometry, ImageFormat, ShapeBody, ShapeId};
use crate::scene::SceneAdapter;
use crate::store::{DocumentStore, StoreError};
use crate::surface::{ObjectHandle, RenderSurface, SurfaceEvent, SurfaceEventKind};
use crate::tools::{Draft, ToolKind, ToolManager};

/// Mutable access to the three collaborators a gesture may touch.
pub struct SceneContext<'a> {
    pub store: &'a mut dyn DocumentStore,
    pub surface: &'a mut dyn RenderSurface,
    pub scene: &'a mut SceneAdapter,
}

/// What handling an event did.
#[derive(Debug, Clone, PartialEq)]
pub enum GestureOutcome {
    Ignored,
    /// A provisional object was created or reshaped.
    Drafting,
    /// Selected objects moved locally; nothing committed yet.
    Transforming,
    /// A drawing gesture finished and its shape was committed.
    Created(Draft),
    /// A drawing gesture produced a degenerate shape, which was discarded.
    Rejected,
    Committed(Vec<ShapeId>),
    Deleted(Vec<ShapeId>),
    Selection,
    Viewport,
}

/// Decoded image handed over by the host.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageSource {
    pub width: u32,
    pub height: u32,
    pub format: ImageFormat,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum DragState {
    Idle,
    Drawing,
    /// World-space position of the previous move step.
    Moving { last: Point, moved: bool },
    Marquee { start: Point, additive: bool },
    /// Screen-space position of the previous pan step.
    Panning { last: Point },
    Erasing,
}

/// Owns tool, selection and viewport state for one client.
#[derive(Debug)]
pub struct InteractionController {
    config: SessionConfig,
    tools: ToolManager,
    camera: Camera,
    input: InputState,
    /// Back to front is not guaranteed; order of selection.
    selection: Vec<ObjectHandle>,
    drag: DragState,
    router: EventRouter,
    editing_text: bool,
    clipboard: Vec<Geometry>,
    attributes: ElementAttributes,
}

fn mismatch(event: &SurfaceEvent) -> CanvasError {
    CanvasError::InvalidGesture(format!("handler received unexpected {:?}", event.kind()))
}

impl InteractionController {
    pub fn new(config: &SessionConfig) -> Self {
        let mut router = EventRouter::new();
        let table: [(SurfaceEventKind, Handler); 8] = [
            (SurfaceEventKind::PointerDown, Self::on_pointer_down),
            (SurfaceEventKind::PointerMove, Self::on_pointer_move),
            (SurfaceEventKind::PointerUp, Self::on_pointer_up),
            (SurfaceEventKind::ObjectModified, Self::on_object_modified),
            (SurfaceEventKind::ObjectScaling, Self::on_object_scaling),
            (SurfaceEventKind::SelectionCreated, Self::on_selection_created),
            (SurfaceEventKind::PathCreated, Self::on_path_created),
            (SurfaceEventKind::Wheel, Self::on_wheel),
        ];
        for (kind, handler) in table {
            if let Err(err) = router.register(kind, handler) {
                log::error!("{err}");
            }
        }

        Self {
            config: config.clone(),
            tools: ToolManager::new(),
            camera: Camera::with_limits(config.min_zoom, config.max_zoom),
            input: InputState::new(),
            selection: Vec::new(),
            drag: DragState::Idle,
            router,
            editing_text: false,
            clipboard: Vec::new(),
            attributes: ElementAttributes::default(),
        }
    }

    /// Route an event to its registered handler.
    pub fn dispatch(
        &mut self,
        ctx: &mut SceneContext<'_>,
        event: &SurfaceEvent,
    ) -> CanvasResult<GestureOutcome> {
        let kind = event.kind();
        let handler = self
            .router
            .handler(kind)
            .ok_or(CanvasError::MissingHandler(kind))?;
        handler(self, ctx, event)
    }

    pub fn router_mut(&mut self) -> &mut EventRouter {
        &mut self.router
    }

    pub fn tool(&self) -> ToolKind {
        self.tools.current_tool
    }

    pub fn tools_mut(&mut self) -> &mut ToolManager {
        &mut self.tools
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn input(&self) -> &InputState {
        &self.input
    }

    pub fn selection(&self) -> &[ObjectHandle] {
        &self.selection
    }

    pub fn attributes(&self) -> &ElementAttributes {
        &self.attributes
    }

    pub fn draft(&self) -> Option<&Draft> {
        self.tools.draft()
    }

    pub fn is_editing_text(&self) -> bool {
        self.editing_text
    }

    pub fn clipboard_len(&self) -> usize {
        self.clipboard.len()
    }

    /// Switch tools, discarding any provisional draft.
    pub fn set_tool(&mut self, surface: &mut dyn RenderSurface, tool: ToolKind) {
        self.cancel_draft(surface);
        self.drag = DragState::Idle;
        if tool.draws() {
            self.selection.clear();
            self.attributes = ElementAttributes::default();
        }
        self.tools.set_tool(tool);
        log::debug!("Tool set to {tool:?}");
    }

    /// Remove an uncommitted draft from the surface. Returns whether one existed.
    pub fn cancel_draft(&mut self, surface: &mut dyn RenderSurface) -> bool {
        let draft = self.tools.take_draft();
        self.tools.cancel();
        if self.drag == DragState::Drawing {
            self.drag = DragState::Idle;
        }
        match draft {
            Some(Draft::Uncommitted(handle)) => {
                surface.remove_object(handle);
                true
            }
            _ => false,
        }
    }

    /// Drop selected handles that no longer exist on the surface.
    pub fn prune_selection(&mut self, surface: &dyn RenderSurface) {
        let before = self.selection.len();
        self.selection
            .retain(|handle| surface.serialize(*handle).is_some());
        if self.selection.len() != before {
            self.refresh_attributes(surface);
        }
    }

    pub fn begin_text_edit(&mut self) {
        self.editing_text = true;
    }

    /// Leave text editing, committing new content for the selected text box.
    pub fn end_text_edit(
        &mut self,
        ctx: &mut SceneContext<'_>,
        content: Option<String>,
    ) -> CanvasResult<Option<ShapeId>> {
        self.editing_text = false;
        let (Some(content), [handle]) = (content, self.selection.as_slice()) else {
            return Ok(None);
        };
        let handle = *handle;
        let Some(object) = ctx.surface.serialize(handle) else {
            return Ok(None);
        };
        let mut geometry = object.geometry;
        let ShapeBody::Text { content: current, .. } = &mut geometry.body else {
            return Ok(None);
        };
        *current = content;
        ctx.surface.update_object(handle, geometry);
        let record = ctx.scene.commit(ctx.surface, ctx.store, handle)?;
        self.refresh_attributes(ctx.surface);
        Ok(Some(record.id))
    }

    fn on_pointer_down(
        &mut self,
        ctx: &mut SceneContext<'_>,
        event: &SurfaceEvent,
    ) -> CanvasResult<GestureOutcome> {
        let SurfaceEvent::PointerDown {
            position,
            button,
            modifiers,
        } = *event
        else {
            return Err(mismatch(event));
        };
        self.input.pointer_down(position, button, modifiers);
        if button != MouseButton::Left {
            return Ok(GestureOutcome::Ignored);
        }
        let world = self.camera.screen_to_world(position);

        match self.tools.current_tool {
            ToolKind::Hand => {
                self.drag = DragState::Panning { last: position };
                Ok(GestureOutcome::Viewport)
            }
            ToolKind::Select => Ok(self.begin_select(ctx.surface, world, modifiers.shift)),
            ToolKind::Eraser => {
                self.drag = DragState::Erasing;
                self.erase_at(ctx, world)
            }
            ToolKind::Image => Ok(GestureOutcome::Ignored),
            ToolKind::Rectangle
            | ToolKind::Ellipse
            | ToolKind::Line
            | ToolKind::Freehand
            | ToolKind::Text => Ok(self.begin_draft(ctx.surface, world)),
        }
    }

    fn on_pointer_move(
        &mut self,
        ctx: &mut SceneContext<'_>,
        event: &SurfaceEvent,
    ) -> CanvasResult<GestureOutcome> {
        let SurfaceEvent::PointerMove {
            position,
            modifiers,
        } = *event
        else {
            return Err(mismatch(event));
        };
        self.input.pointer_move(position, modifiers);
        let world = self.camera.screen_to_world(position);

        match self.drag {
            DragState::Idle => Ok(GestureOutcome::Ignored),
            DragState::Drawing => {
                let geometry = self.tools.update(world);
                if let (Some(geometry), Some(Draft::Uncommitted(handle))) =
                    (geometry, self.tools.draft())
                {
                    ctx.surface.update_object(*handle, geometry);
                }
                Ok(GestureOutcome::Drafting)
            }
            DragState::Moving { last, .. } => {
                let delta = world - last;
                if delta == Vec2::ZERO {
                    return Ok(GestureOutcome::Ignored);
                }
                for handle in self.movable_handles(ctx.surface, ctx.scene) {
                    if let Some(object) = ctx.surface.serialize(handle) {
                        let mut geometry = object.geometry;
                        geometry.translate(delta);
                        ctx.surface.update_object(handle, geometry);
                    }
                }
                self.drag = DragState::Moving {
                    last: world,
                    moved: true,
                };
                Ok(GestureOutcome::Transforming)
            }
            DragState::Marquee { .. } => Ok(GestureOutcome::Selection),
            DragState::Panning { last } => {
                self.camera.pan(position - last);
                self.push_viewport(ctx.surface);
                self.drag = DragState::Panning { last: position };
                Ok(GestureOutcome::Viewport)
            }
            DragState::Erasing => self.erase_at(ctx, world),
        }
    }

    fn on_pointer_up(
        &mut self,
        ctx: &mut SceneContext<'_>,
        event: &SurfaceEvent,
    ) -> CanvasResult<GestureOutcome> {
        let SurfaceEvent::PointerUp {
            position,
            button,
            modifiers,
        } = *event
        else {
            return Err(mismatch(event));
        };
        self.input.pointer_up(position, button, modifiers);
        let world = self.camera.screen_to_world(position);

        match std::mem::replace(&mut self.drag, DragState::Idle) {
            DragState::Drawing => self.finish_draft(ctx, world),
            DragState::Moving { moved: true, .. } => {
                let handles = self.movable_handles(ctx.surface, ctx.scene);
                let ids = commit_handles(ctx, &handles)?;
                self.refresh_attributes(ctx.surface);
                Ok(GestureOutcome::Committed(ids))
            }
            DragState::Moving { moved: false, .. } => Ok(GestureOutcome::Selection),
            DragState::Marquee { start, additive } => {
                let hits = ctx.surface.objects_in_rect(Rect::from_points(start, world));
                if additive {
                    for hit in hits {
                        if !self.selection.contains(&hit) {
                            self.selection.push(hit);
                        }
                    }
                } else {
                    self.selection = hits;
                }
                self.refresh_attributes(ctx.surface);
                Ok(GestureOutcome::Selection)
            }
            DragState::Panning { .. } => Ok(GestureOutcome::Viewport),
            DragState::Erasing | DragState::Idle => Ok(GestureOutcome::Ignored),
        }
    }

    fn on_object_modified(
        &mut self,
        ctx: &mut SceneContext<'_>,
        event: &SurfaceEvent,
    ) -> CanvasResult<GestureOutcome> {
        let SurfaceEvent::ObjectModified { handles } = event else {
            return Err(mismatch(event));
        };
        let ids = commit_handles(ctx, handles)?;
        self.refresh_attributes(ctx.surface);
        Ok(GestureOutcome::Committed(ids))
    }

    fn on_object_scaling(
        &mut self,
        ctx: &mut SceneContext<'_>,
        event: &SurfaceEvent,
    ) -> CanvasResult<GestureOutcome> {
        let SurfaceEvent::ObjectScaling { handle } = *event else {
            return Err(mismatch(event));
        };
        let object = ctx
            .surface
            .serialize(handle)
            .ok_or(CanvasError::UnknownObject(handle))?;
        self.attributes = ElementAttributes::from_geometry(&object.geometry);
        Ok(GestureOutcome::Selection)
    }

    fn on_selection_created(
        &mut self,
        ctx: &mut SceneContext<'_>,
        event: &SurfaceEvent,
    ) -> CanvasResult<GestureOutcome> {
        let SurfaceEvent::SelectionCreated { handles } = event else {
            return Err(mismatch(event));
        };
        if self.editing_text {
            return Ok(GestureOutcome::Ignored);
        }
        self.selection = handles.clone();
        self.refresh_attributes(ctx.surface);
        Ok(GestureOutcome::Selection)
    }

    fn on_path_created(
        &mut self,
        ctx: &mut SceneContext<'_>,
        event: &SurfaceEvent,
    ) -> CanvasResult<GestureOutcome> {
        let SurfaceEvent::PathCreated { handle } = *event else {
            return Err(mismatch(event));
        };
        let record = ctx.scene.commit(ctx.surface, ctx.store, handle)?;
        Ok(GestureOutcome::Created(Draft::Committed(record.id, record)))
    }

    fn on_wheel(
        &mut self,
        ctx: &mut SceneContext<'_>,
        event: &SurfaceEvent,
    ) -> CanvasResult<GestureOutcome> {
        let SurfaceEvent::Wheel { position, delta_y } = *event else {
            return Err(mismatch(event));
        };
        if self
            .camera
            .wheel_zoom(position, delta_y, self.config.zoom_sensitivity)
        {
            self.push_viewport(ctx.surface);
        }
        Ok(GestureOutcome::Viewport)
    }

    fn begin_select(
        &mut self,
        surface: &dyn RenderSurface,
        world: Point,
        shift: bool,
    ) -> GestureOutcome {
        match surface.hit_test(world) {
            Some(hit) => {
                if shift {
                    if let Some(index) = self.selection.iter().position(|h| *h == hit) {
                        self.selection.remove(index);
                    } else {
                        self.selection.push(hit);
                    }
                } else if !self.selection.contains(&hit) {
                    self.selection = vec![hit];
                }
                self.drag = DragState::Moving {
                    last: world,
                    moved: false,
                };
            }
            None => {
                if !shift {
                    self.selection.clear();
                }
                self.drag = DragState::Marquee {
                    start: world,
                    additive: shift,
                };
            }
        }
        self.refresh_attributes(surface);
        GestureOutcome::Selection
    }

    fn begin_draft(&mut self, surface: &mut dyn RenderSurface, world: Point) -> GestureOutcome {
        self.cancel_draft(surface);
        let Some(geometry) = self.tools.begin(world) else {
            return GestureOutcome::Ignored;
        };
        let handle = surface.create_object(geometry);
        self.tools.set_draft(Draft::Uncommitted(handle));
        self.drag = DragState::Drawing;
        GestureOutcome::Drafting
    }

    fn finish_draft(
        &mut self,
        ctx: &mut SceneContext<'_>,
        world: Point,
    ) -> CanvasResult<GestureOutcome> {
        let tool = self.tools.current_tool;
        let geometry = self.tools.end(world);
        let Some(Draft::Uncommitted(handle)) = self.tools.take_draft() else {
            return Ok(GestureOutcome::Ignored);
        };
        if let Some(geometry) = geometry {
            ctx.surface.update_object(handle, geometry);
        }
        let object = ctx
            .surface
            .serialize(handle)
            .ok_or(CanvasError::UnknownObject(handle))?;

        if object.geometry.is_degenerate(self.config.min_shape_size) {
            ctx.surface.remove_object(handle);
            log::warn!("Discarded degenerate {:?} draft", object.geometry.kind());
            self.after_draw(tool);
            return Ok(GestureOutcome::Rejected);
        }

        let result = ctx.scene.commit(ctx.surface, ctx.store, handle);
        self.after_draw(tool);
        let record = result?;
        if tool == ToolKind::Text {
            self.selection = vec![handle];
            self.editing_text = true;
            self.refresh_attributes(ctx.surface);
        }
        Ok(GestureOutcome::Created(Draft::Committed(record.id, record)))
    }

    fn after_draw(&mut self, tool: ToolKind) {
        if !self.config.is_sticky(tool) {
            self.tools.set_tool(ToolKind::Select);
        }
    }

    fn erase_at(
        &mut self,
        ctx: &mut SceneContext<'_>,
        world: Point,
    ) -> CanvasResult<GestureOutcome> {
        match ctx.surface.hit_test(world) {
            Some(hit) => Ok(GestureOutcome::Deleted(self.delete_handles(ctx, &[hit])?)),
            None => Ok(GestureOutcome::Ignored),
        }
    }

    /// Selected handles plus the members of selected groups.
    fn movable_handles(
        &self,
        surface: &dyn RenderSurface,
        scene: &SceneAdapter,
    ) -> Vec<ObjectHandle> {
        expand_groups(&self.selection, surface, scene)
    }

    fn push_viewport(&self, surface: &mut dyn RenderSurface) {
        surface.set_viewport_transform(self.camera.offset, self.camera.zoom);
    }

    fn refresh_attributes(&mut self, surface: &dyn RenderSurface) {
        self.attributes = match self.selection.as_slice() {
            [handle] => surface
                .serialize(*handle)
                .map(|object| ElementAttributes::from_geometry(&object.geometry))
                .unwrap_or_default(),
            _ => ElementAttributes::default(),
        };
    }

    /// Delete objects from store and surface, groups together with their
    /// members. One store delete per id.
    fn delete_handles(
        &mut self,
        ctx: &mut SceneContext<'_>,
        handles: &[ObjectHandle],
    ) -> CanvasResult<Vec<ShapeId>> {
        let targets = expand_groups(handles, ctx.surface, ctx.scene);
        let mut deleted = Vec::new();
        let mut first_error = None;
        for handle in targets {
            match ctx.surface.object_id(handle) {
                Some(id) => match ctx.store.delete(id) {
                    Ok(_) => {
                        ctx.surface.remove_object(handle);
                        ctx.scene.forget(id);
                        deleted.push(id);
                    }
                    Err(err) => {
                        log::error!("Failed to delete {id}: {err}");
                        first_error.get_or_insert(err);
                    }
                },
                None => {
                    ctx.surface.remove_object(handle);
                }
            }
        }
        self.prune_selection(ctx.surface);
        match first_error {
            Some(err) => Err(err.into()),
            None => Ok(deleted),
        }
    }

    /// Delete every selected object.
    pub fn delete_selected(&mut self, ctx: &mut SceneContext<'_>) -> CanvasResult<Vec<ShapeId>> {
        let selection = std::mem::take(&mut self.selection);
        let result = self.delete_handles(ctx, &selection);
        self.refresh_attributes(ctx.surface);
        result
    }

    /// Clear the whole canvas for every participant.
    ///
    /// Every entry, including ones that fail to decode, is removed in one
    /// store change. The surface is cleared only once the store reports that
    /// it is empty; otherwise the local scene is left untouched and an error
    /// is returned.
    pub fn reset(&mut self, ctx: &mut SceneContext<'_>) -> CanvasResult<()> {
        self.cancel_draft(ctx.surface);
        let removed = ctx.store.clear()?;
        let remaining = ctx.store.size();
        if remaining != 0 {
            return Err(StoreError::Unavailable(format!(
                "{remaining} records survived reset"
            ))
            .into());
        }

        ctx.surface.clear();
        ctx.scene.clear();
        self.selection.clear();
        self.attributes = ElementAttributes::default();
        self.drag = DragState::Idle;
        self.editing_text = false;
        log::info!("Canvas reset, {removed} records removed");
        Ok(())
    }

    /// Group the selected committed objects. Needs at least two.
    pub fn group_selected(&mut self, ctx: &mut SceneContext<'_>) -> CanvasResult<Option<ShapeId>> {
        let order = ctx.surface.objects();
        let mut members: Vec<(usize, ShapeId, Option<Rect>)> = self
            .selection
            .iter()
            .filter_map(|handle| {
                let object = ctx.surface.serialize(*handle)?;
                let id = object.id?;
                let z = order.iter().position(|h| h == handle)?;
                Some((z, id, object.geometry.bounds()))
            })
            .collect();
        if members.len() < 2 {
            return Ok(None);
        }
        members.sort_by_key(|(z, _, _)| *z);

        let origin = members
            .iter()
            .filter_map(|(_, _, bounds)| *bounds)
            .reduce(|a, b| a.union(b))
            .map(|bounds| bounds.origin())
            .unwrap_or(Point::ZERO);
        let geometry = Geometry::new(
            origin,
            ShapeBody::Group {
                members: members.iter().map(|(_, id, _)| *id).collect(),
            },
        );
        let handle = ctx.surface.create_object(geometry);
        let record = ctx.scene.commit(ctx.surface, ctx.store, handle)?;
        self.selection = vec![handle];
        self.refresh_attributes(ctx.surface);
        log::debug!("Grouped {} shapes into {}", members.len(), record.id);
        Ok(Some(record.id))
    }

    /// Dissolve selected groups, re-committing their members as independent
    /// records.
    pub fn ungroup_selected(&mut self, ctx: &mut SceneContext<'_>) -> CanvasResult<Vec<ShapeId>> {
        let mut released = Vec::new();
        let mut next_selection = Vec::new();
        for handle in self.selection.clone() {
            let Some(object) = ctx.surface.serialize(handle) else {
                continue;
            };
            let ShapeBody::Group { members } = object.geometry.body else {
                next_selection.push(handle);
                continue;
            };
            if let Some(group_id) = object.id {
                ctx.store.delete(group_id)?;
                ctx.scene.forget(group_id);
            }
            ctx.surface.remove_object(handle);
            for member in members {
                if let Some(member_handle) = ctx.scene.handle_of(member) {
                    ctx.scene.commit(ctx.surface, ctx.store, member_handle)?;
                    released.push(member);
                    next_selection.push(member_handle);
                }
            }
        }
        self.selection = next_selection;
        self.refresh_attributes(ctx.surface);
        Ok(released)
    }

    /// Copy the selection (group members included) to the local clipboard.
    pub fn copy_selected(&mut self, surface: &dyn RenderSurface, scene: &SceneAdapter) -> usize {
        self.clipboard = expand_groups(&self.selection, surface, scene)
            .into_iter()
            .filter_map(|handle| surface.serialize(handle))
            .map(|object| object.geometry)
            .filter(|geometry| geometry.kind() != crate::record::ShapeKind::Group)
            .collect();
        self.clipboard.len()
    }

    /// Paste the clipboard as new records, offset from the previous copy.
    pub fn paste(&mut self, ctx: &mut SceneContext<'_>) -> CanvasResult<Vec<ShapeId>> {
        if self.clipboard.is_empty() {
            return Ok(Vec::new());
        }
        let offset = Vec2::new(self.config.paste_offset, self.config.paste_offset);
        let mut handles = Vec::with_capacity(self.clipboard.len());
        for geometry in self.clipboard.iter_mut() {
            geometry.translate(offset);
            handles.push(ctx.surface.create_object(geometry.clone()));
        }
        let ids = commit_handles(ctx, &handles)?;
        self.selection = handles;
        self.refresh_attributes(ctx.surface);
        Ok(ids)
    }

    /// Place an image at the configured anchor, scaled down to fit.
    pub fn insert_image(
        &mut self,
        ctx: &mut SceneContext<'_>,
        image: ImageSource,
    ) -> CanvasResult<ShapeId> {
        if image.width == 0 || image.height == 0 {
            return Err(CanvasError::InvalidGesture("image has no pixels".to_string()));
        }
        let longest = image.width.max(image.height) as f64;
        let scale = (self.config.image_max_size / longest).min(1.0);
        let mut geometry = Geometry::new(
            self.config.image_anchor,
            ShapeBody::Image {
                width: image.width as f64,
                height: image.height as f64,
                format: image.format,
                data_base64: STANDARD.encode(&image.bytes),
            },
        );
        geometry.scale_x = scale;
        geometry.scale_y = scale;

        self.cancel_draft(ctx.surface);
        let handle = ctx.surface.create_object(geometry);
        let record = ctx.scene.commit(ctx.surface, ctx.store, handle)?;
        self.tools.set_tool(ToolKind::Select);
        self.selection = vec![handle];
        self.refresh_attributes(ctx.surface);
        Ok(record.id)
    }

    /// Apply an inspector edit to every selected object and commit it.
    pub fn modify_selected(
        &mut self,
        ctx: &mut SceneContext<'_>,
        edit: &AttributeEdit,
    ) -> CanvasResult<Vec<ShapeId>> {
        let mut changed = Vec::new();
        for handle in &self.selection {
            let Some(object) = ctx.surface.serialize(*handle) else {
                continue;
            };
            let mut geometry = object.geometry;
            if edit.apply(&mut geometry) {
                ctx.surface.update_object(*handle, geometry);
                changed.push(*handle);
            }
        }
        let ids = commit_handles(ctx, &changed)?;
        self.refresh_attributes(ctx.surface);
        Ok(ids)
    }
}

/// Commit each handle, attempting all of them before reporting the first error.
fn commit_handles(
    ctx: &mut SceneContext<'_>,
    handles: &[ObjectHandle],
) -> CanvasResult<Vec<ShapeId>> {
    let mut ids = Vec::with_capacity(handles.len());
    let mut first_error = None;
    for handle in handles {
        match ctx.scene.commit(ctx.surface, ctx.store, *handle) {
            Ok(record) => ids.push(record.id),
            Err(err) => {
                first_error.get_or_insert(err);
            }
        }
    }
    match first_error {
        Some(err) => Err(err),
        None => Ok(ids),
    }
}

fn expand_groups(
    handles: &[ObjectHandle],
    surface: &dyn RenderSurface,
    scene: &SceneAdapter,
) -> Vec<ObjectHandle> {
    let mut expanded = Vec::new();
    let mut push = |handle: ObjectHandle| {
        if !expanded.contains(&handle) {
            expanded.push(handle);
        }
    };
    for handle in handles {
        push(*handle);
        if let Some(object) = surface.serialize(*handle) {
            for member in object.geometry.body.members() {
                if let Some(member_handle) = scene.handle_of(*member) {
                    push(member_handle);
                }
            }
        }
    }
    expanded
}
