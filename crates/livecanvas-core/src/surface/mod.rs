//! Rendering surface abstraction.
//!
//! The surface is the local, interactive object scene (an HTML canvas
//! library, a GPU scene graph, or [`HeadlessSurface`] in tests). It owns
//! object z-order and reports gestures as [`SurfaceEvent`]s.

mod headless;

pub use headless::HeadlessSurface;

use kurbo::{Point, Rect, Vec2};
use serde::{Deserialize, Serialize};

use crate::input::{Modifiers, MouseButton};
use crate::record::{Geometry, ShapeId};

/// Opaque reference to an object living on a surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectHandle(pub u64);

/// Full serialized state of a surface object.
#[derive(Debug, Clone, PartialEq)]
pub struct SurfaceObject {
    pub handle: ObjectHandle,
    /// `None` until the object has been committed.
    pub id: Option<ShapeId>,
    pub geometry: Geometry,
}

/// Events emitted by the surface. Pointer positions are in screen space.
#[derive(Debug, Clone, PartialEq)]
pub enum SurfaceEvent {
    PointerDown {
        position: Point,
        button: MouseButton,
        modifiers: Modifiers,
    },
    PointerMove {
        position: Point,
        modifiers: Modifiers,
    },
    PointerUp {
        position: Point,
        button: MouseButton,
        modifiers: Modifiers,
    },
    /// The surface finished transforming or editing objects on its own.
    ObjectModified { handles: Vec<ObjectHandle> },
    /// A live resize/scale is in progress.
    ObjectScaling { handle: ObjectHandle },
    /// The surface's native selection changed.
    SelectionCreated { handles: Vec<ObjectHandle> },
    /// A native freehand brush produced a finished path object.
    PathCreated { handle: ObjectHandle },
    Wheel { position: Point, delta_y: f64 },
}

/// Discriminant of [`SurfaceEvent`], used to key the event router.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SurfaceEventKind {
    PointerDown,
    PointerMove,
    PointerUp,
    ObjectModified,
    ObjectScaling,
    SelectionCreated,
    PathCreated,
    Wheel,
}

impl SurfaceEventKind {
    pub const ALL: [SurfaceEventKind; 8] = [
        SurfaceEventKind::PointerDown,
        SurfaceEventKind::PointerMove,
        SurfaceEventKind::PointerUp,
        SurfaceEventKind::ObjectModified,
        SurfaceEventKind::ObjectScaling,
        SurfaceEventKind::SelectionCreated,
        SurfaceEventKind::PathCreated,
        SurfaceEventKind::Wheel,
    ];
}

impl SurfaceEvent {
    pub fn kind(&self) -> SurfaceEventKind {
        match self {
            SurfaceEvent::PointerDown { .. } => SurfaceEventKind::PointerDown,
            SurfaceEvent::PointerMove { .. } => SurfaceEventKind::PointerMove,
            SurfaceEvent::PointerUp { .. } => SurfaceEventKind::PointerUp,
            SurfaceEvent::ObjectModified { .. } => SurfaceEventKind::ObjectModified,
            SurfaceEvent::ObjectScaling { .. } => SurfaceEventKind::ObjectScaling,
            SurfaceEvent::SelectionCreated { .. } => SurfaceEventKind::SelectionCreated,
            SurfaceEvent::PathCreated { .. } => SurfaceEventKind::PathCreated,
            SurfaceEvent::Wheel { .. } => SurfaceEventKind::Wheel,
        }
    }

    /// Left-button press with no modifiers.
    pub fn down(x: f64, y: f64) -> Self {
        SurfaceEvent::PointerDown {
            position: Point::new(x, y),
            button: MouseButton::Left,
            modifiers: Modifiers::NONE,
        }
    }

    pub fn move_to(x: f64, y: f64) -> Self {
        SurfaceEvent::PointerMove {
            position: Point::new(x, y),
            modifiers: Modifiers::NONE,
        }
    }

    pub fn up(x: f64, y: f64) -> Self {
        SurfaceEvent::PointerUp {
            position: Point::new(x, y),
            button: MouseButton::Left,
            modifiers: Modifiers::NONE,
        }
    }
}

/// The local interactive scene.
///
/// Object z-order is owned by the surface: `objects()` lists handles back to
/// front and new objects are placed on top.
pub trait RenderSurface {
    fn create_object(&mut self, geometry: Geometry) -> ObjectHandle;

    /// Replace an object's geometry. Returns false for unknown handles.
    fn update_object(&mut self, handle: ObjectHandle, geometry: Geometry) -> bool;

    fn remove_object(&mut self, handle: ObjectHandle) -> bool;

    fn serialize(&self, handle: ObjectHandle) -> Option<SurfaceObject>;

    /// Topmost object under a world-space point. Members of a group resolve
    /// to the group.
    fn hit_test(&self, point: Point) -> Option<ObjectHandle>;

    /// Objects intersecting a world-space rectangle, back to front.
    fn objects_in_rect(&self, rect: Rect) -> Vec<ObjectHandle>;

    fn set_viewport_transform(&mut self, pan: Vec2, zoom: f64);

    fn object_id(&self, handle: ObjectHandle) -> Option<ShapeId>;

    fn set_object_id(&mut self, handle: ObjectHandle, id: ShapeId) -> bool;

    /// All object handles, back to front.
    fn objects(&self) -> Vec<ObjectHandle>;

    fn clear(&mut self);
}
