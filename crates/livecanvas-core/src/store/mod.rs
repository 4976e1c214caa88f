//! Shared document store: the replicated map of shape records.
//!
//! # Schema
//!
//! The Loro-backed store has the following structure:
//! ```text
//! LoroDoc
//! └── "shapes": LoroMap<ShapeId, LoroMap> (one container per record)
//! ```
//!
//! Each record container holds:
//! - "type": String ("rectangle", "ellipse", "line", "freehand", "text", "image", "group")
//! - "id": String (UUID)
//! - Transform fields (x, y, scale_x, scale_y, rotation)
//! - Kind-specific fields (dimensions, points, content, members, ...)
//! - Style fields (stroke, fill, opacity)
//!
//! Writes always replace a whole record, so concurrent edits to the same
//! shape resolve last-writer-wins per key.

mod convert;
mod schema;

pub use convert::{record_from_loro, record_to_loro};
pub use schema::{LoroStore, SHAPES_KEY};

use std::collections::HashMap;

use thiserror::Error;

use crate::record::{ShapeId, ShapeRecord};

/// Store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Store backend error: {0}")]
    Backend(String),
    #[error("Store unavailable: {0}")]
    Unavailable(String),
    #[error("Corrupt record: {0}")]
    Corrupt(String),
    #[error("Record not found: {0}")]
    NotFound(ShapeId),
}

impl From<loro::LoroError> for StoreError {
    fn from(err: loro::LoroError) -> Self {
        StoreError::Backend(err.to_string())
    }
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Where an observable store change came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeOrigin {
    /// A write made through this store handle.
    Local,
    /// Updates imported from another replica.
    Remote,
    Undo,
    Redo,
}

/// Notification passed to store subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreChange {
    pub origin: ChangeOrigin,
}

/// Handle returned by [`DocumentStore::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

/// Callback invoked after every observable change.
pub type ChangeCallback = Box<dyn FnMut(&StoreChange)>;

/// A write staged inside [`DocumentStore::mutate`].
#[derive(Debug, Clone, PartialEq)]
pub enum StagedWrite {
    Set(ShapeRecord),
    Delete(ShapeId),
}

/// Consistent view of the store inside a mutation.
///
/// Reads observe the snapshot taken when the mutation began plus any writes
/// staged so far. Nothing reaches the store until the closure returns.
#[derive(Debug, Default)]
pub struct Transaction {
    view: HashMap<ShapeId, ShapeRecord>,
    writes: Vec<StagedWrite>,
}

impl Transaction {
    /// Begin a transaction over a snapshot of the store.
    pub fn new(snapshot: HashMap<ShapeId, ShapeRecord>) -> Self {
        Self {
            view: snapshot,
            writes: Vec::new(),
        }
    }

    pub fn get(&self, id: ShapeId) -> Option<&ShapeRecord> {
        self.view.get(&id)
    }

    pub fn contains(&self, id: ShapeId) -> bool {
        self.view.contains_key(&id)
    }

    /// Ids visible in this transaction.
    pub fn ids(&self) -> Vec<ShapeId> {
        self.view.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.view.len()
    }

    pub fn is_empty(&self) -> bool {
        self.view.is_empty()
    }

    pub fn set(&mut self, record: ShapeRecord) {
        self.view.insert(record.id, record.clone());
        self.writes.push(StagedWrite::Set(record));
    }

    pub fn delete(&mut self, id: ShapeId) {
        if self.view.remove(&id).is_some() {
            self.writes.push(StagedWrite::Delete(id));
        }
    }

    /// Staged writes in the order they were made.
    pub fn writes(&self) -> &[StagedWrite] {
        &self.writes
    }

    pub fn into_writes(self) -> Vec<StagedWrite> {
        self.writes
    }
}

/// The replicated key/value store of shape records.
///
/// Implementations must be eventually consistent: replicas that have seen
/// the same set of updates hold the same records.
pub trait DocumentStore {
    fn get(&self, id: ShapeId) -> Option<ShapeRecord>;

    /// Insert or wholly replace the record stored under `id`.
    fn set(&mut self, id: ShapeId, record: &ShapeRecord) -> StoreResult<()>;

    /// Remove a record. Returns whether it existed.
    fn delete(&mut self, id: ShapeId) -> StoreResult<bool>;

    fn entries(&self) -> Vec<(ShapeId, ShapeRecord)>;

    fn size(&self) -> usize;

    /// Run `f` against a consistent snapshot and apply its staged writes as
    /// one unit. On failure no staged write remains applied.
    fn mutate(&mut self, f: &mut dyn FnMut(&mut Transaction)) -> StoreResult<()>;

    /// Remove every entry, including ones that no longer decode, as a single
    /// undoable change. Either the store ends up empty or it is left as it
    /// was. Returns the number of entries removed.
    fn clear(&mut self) -> StoreResult<usize>;

    fn subscribe(&mut self, callback: ChangeCallback) -> SubscriptionId;

    /// Returns false when the subscription was unknown.
    fn unsubscribe(&mut self, id: SubscriptionId) -> bool;

    /// Revert this client's most recent change. Returns false with nothing to undo.
    fn undo(&mut self) -> StoreResult<bool>;

    fn redo(&mut self) -> StoreResult<bool>;

    fn can_undo(&self) -> bool;

    fn can_redo(&self) -> bool;

    fn undo_count(&self) -> usize;

    fn redo_count(&self) -> usize;

    fn clear_history(&mut self);

    /// Encoded updates not yet acknowledged with [`mark_sent`](Self::mark_sent).
    fn pending_updates(&self) -> Option<Vec<u8>>;

    /// Record that everything currently pending has been delivered.
    fn mark_sent(&mut self);

    fn export_snapshot(&self) -> Vec<u8>;

    /// Merge updates or a snapshot produced by another replica.
    fn import(&mut self, bytes: &[u8]) -> StoreResult<()>;
}
