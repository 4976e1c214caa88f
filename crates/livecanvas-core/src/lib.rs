//! LiveCanvas Core Library
//!
//! Platform-agnostic core of the LiveCanvas collaborative whiteboard: shape
//! records in a replicated store, a render-surface abstraction, the
//! interaction controller, presence and the relay protocol.

pub mod camera;
pub mod collaboration;
pub mod config;
pub mod controller;
pub mod error;
pub mod history;
pub mod input;
pub mod presence;
pub mod reactions;
pub mod record;
pub mod scene;
pub mod session;
pub mod shortcuts;
pub mod store;
pub mod surface;
pub mod sync;
pub mod tools;

pub use camera::Camera;
pub use collaboration::CollaborationManager;
pub use config::SessionConfig;
pub use controller::{
    AttributeEdit, ElementAttributes, EventRouter, GestureOutcome, ImageSource,
    InteractionController, SceneContext,
};
pub use error::{CanvasError, CanvasResult};
pub use history::{HistoryManager, HistoryState};
pub use input::{InputState, KeyInput, Modifiers, MouseButton};
pub use presence::{CursorMode, PresenceChannel, PresencePatch, PresenceState, UserInfo};
pub use reactions::{Reaction, ReactionEmitter, ReactionList};
pub use record::{Geometry, ShapeBody, ShapeId, ShapeKind, ShapeRecord, ShapeStyle};
pub use scene::{RehydrateReport, SceneAdapter, SceneConflict};
pub use session::CanvasSession;
pub use shortcuts::{Shortcut, ShortcutRegistry};
pub use store::{DocumentStore, LoroStore, StoreError, StoreResult, Transaction};
pub use surface::{HeadlessSurface, ObjectHandle, RenderSurface, SurfaceEvent, SurfaceEventKind};
pub use sync::{ConnectionState, LoopbackHub, SyncEvent, Transport, TransportError};
pub use tools::{Draft, ToolKind, ToolManager};
