//! Error types for canvas interaction and session management.

use thiserror::Error;

use crate::store::StoreError;
use crate::surface::{ObjectHandle, SurfaceEventKind};
use crate::sync::TransportError;

/// Errors raised by the controller and session layers.
#[derive(Debug, Error)]
pub enum CanvasError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("Unknown surface object: {0:?}")]
    UnknownObject(ObjectHandle),
    #[error("A handler for {0:?} is already registered")]
    DuplicateHandler(SurfaceEventKind),
    #[error("No handler registered for {0:?}")]
    MissingHandler(SurfaceEventKind),
    #[error("Invalid gesture: {0}")]
    InvalidGesture(String),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Result type for controller and session operations.
pub type CanvasResult<T> = Result<T, CanvasError>;
