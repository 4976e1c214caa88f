//! Undo/redo policy.
//!
//! Undo is per client: it only reverts this client's own committed document
//! mutations. Remote edits, presence, reactions and viewport changes are
//! never recorded. The actual bookkeeping lives in the store's undo manager;
//! this type adds logging and change tracking for the UI.

use crate::store::{DocumentStore, StoreResult};

/// Undo/redo availability as shown by toolbar buttons.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HistoryState {
    pub can_undo: bool,
    pub can_redo: bool,
    pub undo_count: usize,
    pub redo_count: usize,
}

impl HistoryState {
    pub fn of(store: &dyn DocumentStore) -> Self {
        Self {
            can_undo: store.can_undo(),
            can_redo: store.can_redo(),
            undo_count: store.undo_count(),
            redo_count: store.redo_count(),
        }
    }
}

#[derive(Debug, Default)]
pub struct HistoryManager {
    last: HistoryState,
}

impl HistoryManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Revert this client's most recent change. Returns false when there was
    /// nothing to undo.
    pub fn undo(&mut self, store: &mut dyn DocumentStore) -> StoreResult<bool> {
        let undone = store.undo()?;
        if undone {
            log::debug!("Undo ({} steps left)", store.undo_count());
        }
        Ok(undone)
    }

    pub fn redo(&mut self, store: &mut dyn DocumentStore) -> StoreResult<bool> {
        let redone = store.redo()?;
        if redone {
            log::debug!("Redo ({} steps left)", store.redo_count());
        }
        Ok(redone)
    }

    pub fn clear(&mut self, store: &mut dyn DocumentStore) {
        store.clear_history();
        self.last = HistoryState::default();
    }

    /// Current state, or `None` if it did not change since the last call.
    pub fn refresh(&mut self, store: &dyn DocumentStore) -> Option<HistoryState> {
        let state = HistoryState::of(store);
        if state == self.last {
            return None;
        }
        self.last = state;
        Some(state)
    }

    pub fn state(&self) -> HistoryState {
        self.last
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{Geometry, ShapeBody, ShapeRecord};
    use crate::store::LoroStore;
    use kurbo::Point;
    use uuid::Uuid;

    fn record() -> ShapeRecord {
        ShapeRecord::new(
            Uuid::new_v4(),
            Geometry::new(
                Point::ZERO,
                ShapeBody::Ellipse {
                    radius_x: 5.0,
                    radius_y: 5.0,
                },
            ),
        )
    }

    #[test]
    fn test_undo_redo_round() {
        let mut store = LoroStore::new();
        let mut history = HistoryManager::new();
        let record = record();
        store.set(record.id, &record).unwrap();

        assert!(history.undo(&mut store).unwrap());
        assert!(store.get(record.id).is_none());
        assert!(!history.undo(&mut store).unwrap());

        assert!(history.redo(&mut store).unwrap());
        assert_eq!(store.get(record.id), Some(record));
    }

    #[test]
    fn test_refresh_reports_changes_once() {
        let mut store = LoroStore::new();
        let mut history = HistoryManager::new();
        assert!(history.refresh(&store).is_none());

        let record = record();
        store.set(record.id, &record).unwrap();
        let state = history.refresh(&store).unwrap();
        assert!(state.can_undo);
        assert_eq!(state.undo_count, 1);
        assert!(history.refresh(&store).is_none());

        history.clear(&mut store);
        assert!(!store.can_undo());
    }
}
