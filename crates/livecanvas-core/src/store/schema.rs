//! Loro-backed document store.

use std::collections::HashMap;

use loro::{ExportMode, LoroDoc, LoroMap, LoroValue, UndoManager, VersionVector};

use super::convert::{record_from_loro, record_to_loro};
use super::{
    ChangeCallback, ChangeOrigin, DocumentStore, StagedWrite, StoreChange, StoreError,
    StoreResult, SubscriptionId, Transaction,
};
use crate::record::{ShapeId, ShapeRecord};

/// Key for the shapes map in the document.
pub const SHAPES_KEY: &str = "shapes";

/// Default bound on recorded undo steps.
const DEFAULT_MAX_UNDO_STEPS: usize = 100;

/// A CRDT-backed store of shape records.
///
/// Wraps a `LoroDoc` together with an `UndoManager` that only tracks commits
/// made by this peer, so undo never reverts a collaborator's work.
pub struct LoroStore {
    doc: LoroDoc,
    undo_manager: UndoManager,
    subscribers: Vec<(SubscriptionId, ChangeCallback)>,
    next_subscription: u64,
    /// Oplog version at the last successful `mark_sent`.
    sent_version: VersionVector,
}

impl LoroStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::with_history(DEFAULT_MAX_UNDO_STEPS, 0)
    }

    /// Create an empty store with explicit undo limits.
    ///
    /// A merge interval of 0 records every commit as its own undo step.
    pub fn with_history(max_undo_steps: usize, merge_interval_ms: i64) -> Self {
        let doc = LoroDoc::new();
        let mut undo_manager = UndoManager::new(&doc);
        undo_manager.set_max_undo_steps(max_undo_steps);
        undo_manager.set_merge_interval(merge_interval_ms);
        let sent_version = doc.oplog_vv();
        Self {
            doc,
            undo_manager,
            subscribers: Vec::new(),
            next_subscription: 0,
            sent_version,
        }
    }

    /// Create a store from a snapshot produced by another replica.
    pub fn from_snapshot(bytes: &[u8]) -> StoreResult<Self> {
        let mut store = Self::new();
        store.doc.import(bytes)?;
        store.sent_version = store.doc.oplog_vv();
        Ok(store)
    }

    /// Get the underlying LoroDoc.
    pub fn loro_doc(&self) -> &LoroDoc {
        &self.doc
    }

    /// This replica's peer id.
    pub fn peer_id(&self) -> u64 {
        self.doc.peer_id()
    }

    /// Pin the peer id, e.g. for reproducible tie-breaking in tests.
    pub fn set_peer_id(&mut self, peer: u64) -> StoreResult<()> {
        self.doc.set_peer_id(peer)?;
        Ok(())
    }

    /// Get the shapes map.
    fn shapes_map(&self) -> LoroMap {
        self.doc.get_map(SHAPES_KEY)
    }

    fn snapshot(&self) -> HashMap<ShapeId, ShapeRecord> {
        self.entries().into_iter().collect()
    }

    fn write(&self, id: ShapeId, record: &ShapeRecord) -> StoreResult<()> {
        if record.id != id {
            return Err(StoreError::Corrupt(format!(
                "record {} stored under key {id}",
                record.id
            )));
        }
        let map = self
            .shapes_map()
            .insert_container(&id.to_string(), LoroMap::new())?;
        record_to_loro(record, &map)?;
        Ok(())
    }

    fn remove(&self, id: ShapeId) -> StoreResult<bool> {
        let shapes = self.shapes_map();
        let key = id.to_string();
        if shapes.get(&key).is_none() {
            return Ok(false);
        }
        shapes.delete(&key)?;
        Ok(true)
    }

    fn apply(&self, write: &StagedWrite) -> StoreResult<()> {
        match write {
            StagedWrite::Set(record) => self.write(record.id, record),
            StagedWrite::Delete(id) => self.remove(*id).map(|_| ()),
        }
    }

    /// Restore the snapshot value of every id touched by `applied`.
    fn roll_back(
        &self,
        applied: &[StagedWrite],
        snapshot: &HashMap<ShapeId, ShapeRecord>,
    ) -> StoreResult<()> {
        for write in applied.iter().rev() {
            let id = match write {
                StagedWrite::Set(record) => record.id,
                StagedWrite::Delete(id) => *id,
            };
            match snapshot.get(&id) {
                Some(record) => self.write(id, record)?,
                None => {
                    self.remove(id)?;
                }
            }
        }
        Ok(())
    }

    /// Put back a raw entry removed by [`clear`](DocumentStore::clear).
    fn restore_raw(&self, key: &str, value: &LoroValue) -> StoreResult<()> {
        let shapes = self.shapes_map();
        if let LoroValue::Map(record) = value {
            if let Ok(record) = record_from_loro(record) {
                let map = shapes.insert_container(key, LoroMap::new())?;
                record_to_loro(&record, &map)?;
                return Ok(());
            }
        }
        shapes.insert(key, value.clone())?;
        Ok(())
    }

    fn notify(&mut self, origin: ChangeOrigin) {
        let change = StoreChange { origin };
        for (_, callback) in self.subscribers.iter_mut() {
            callback(&change);
        }
    }
}

impl Default for LoroStore {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentStore for LoroStore {
    fn get(&self, id: ShapeId) -> Option<ShapeRecord> {
        let LoroValue::Map(map) = self.shapes_map().get_deep_value() else {
            return None;
        };
        let LoroValue::Map(record) = map.get(&id.to_string())? else {
            return None;
        };
        match record_from_loro(record) {
            Ok(record) => Some(record),
            Err(err) => {
                log::warn!("Skipping undecodable record {id}: {err}");
                None
            }
        }
    }

    fn set(&mut self, id: ShapeId, record: &ShapeRecord) -> StoreResult<()> {
        self.write(id, record)?;
        self.doc.commit();
        self.notify(ChangeOrigin::Local);
        Ok(())
    }

    fn delete(&mut self, id: ShapeId) -> StoreResult<bool> {
        let existed = self.remove(id)?;
        if existed {
            self.doc.commit();
            self.notify(ChangeOrigin::Local);
        }
        Ok(existed)
    }

    fn entries(&self) -> Vec<(ShapeId, ShapeRecord)> {
        let LoroValue::Map(map) = self.shapes_map().get_deep_value() else {
            return Vec::new();
        };
        map.iter()
            .filter_map(|(key, value)| {
                let LoroValue::Map(record) = value else {
                    log::warn!("Skipping non-map entry {key} in shapes");
                    return None;
                };
                match record_from_loro(record) {
                    Ok(record) => Some((record.id, record)),
                    Err(err) => {
                        log::warn!("Skipping undecodable record {key}: {err}");
                        None
                    }
                }
            })
            .collect()
    }

    fn size(&self) -> usize {
        self.shapes_map().len()
    }

    fn mutate(&mut self, f: &mut dyn FnMut(&mut Transaction)) -> StoreResult<()> {
        let snapshot = self.snapshot();
        let mut tx = Transaction::new(snapshot.clone());
        f(&mut tx);
        let writes = tx.into_writes();
        if writes.is_empty() {
            return Ok(());
        }

        // Group all staged writes into a single undo step.
        if let Err(err) = self.undo_manager.group_start() {
            log::debug!("Undo group already open: {err}");
        }
        let mut result = Ok(());
        for (index, write) in writes.iter().enumerate() {
            if let Err(err) = self.apply(write) {
                log::error!("Mutation failed after {index} writes, rolling back: {err}");
                if let Err(rollback_err) = self.roll_back(&writes[..index], &snapshot) {
                    log::error!("Rollback failed: {rollback_err}");
                }
                result = Err(err);
                break;
            }
        }
        self.doc.commit();
        self.undo_manager.group_end();

        if result.is_ok() {
            self.notify(ChangeOrigin::Local);
        }
        result
    }

    fn clear(&mut self) -> StoreResult<usize> {
        // Work from raw keys: entries() hides records that fail to decode.
        let shapes = self.shapes_map();
        let LoroValue::Map(raw) = shapes.get_deep_value() else {
            return Ok(0);
        };
        if raw.is_empty() {
            return Ok(0);
        }

        if let Err(err) = self.undo_manager.group_start() {
            log::debug!("Undo group already open: {err}");
        }
        let mut removed: Vec<(&String, &LoroValue)> = Vec::with_capacity(raw.len());
        let mut result = Ok(());
        for (key, value) in raw.iter() {
            if let Err(err) = shapes.delete(key) {
                result = Err(StoreError::from(err));
                break;
            }
            removed.push((key, value));
        }
        if result.is_ok() && !shapes.is_empty() {
            result = Err(StoreError::Unavailable(format!(
                "{} records survived clear",
                shapes.len()
            )));
        }
        if let Err(err) = &result {
            log::error!("Clear failed after {} removals, restoring: {err}", removed.len());
            for (key, value) in removed.iter().rev() {
                if let Err(restore_err) = self.restore_raw(key, value) {
                    log::error!("Failed to restore {key}: {restore_err}");
                }
            }
        }
        self.doc.commit();
        self.undo_manager.group_end();

        result?;
        self.notify(ChangeOrigin::Local);
        Ok(removed.len())
    }

    fn subscribe(&mut self, callback: ChangeCallback) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription);
        self.next_subscription += 1;
        self.subscribers.push((id, callback));
        id
    }

    fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|(sub, _)| *sub != id);
        self.subscribers.len() != before
    }

    fn undo(&mut self) -> StoreResult<bool> {
        let done = self.undo_manager.undo()?;
        if done {
            self.notify(ChangeOrigin::Undo);
        }
        Ok(done)
    }

    fn redo(&mut self) -> StoreResult<bool> {
        let done = self.undo_manager.redo()?;
        if done {
            self.notify(ChangeOrigin::Redo);
        }
        Ok(done)
    }

    fn can_undo(&self) -> bool {
        self.undo_manager.can_undo()
    }

    fn can_redo(&self) -> bool {
        self.undo_manager.can_redo()
    }

    fn undo_count(&self) -> usize {
        self.undo_manager.undo_count()
    }

    fn redo_count(&self) -> usize {
        self.undo_manager.redo_count()
    }

    fn clear_history(&mut self) {
        self.undo_manager.clear();
    }

    fn pending_updates(&self) -> Option<Vec<u8>> {
        if self.doc.oplog_vv() == self.sent_version {
            return None;
        }
        match self.doc.export(ExportMode::updates(&self.sent_version)) {
            Ok(bytes) if !bytes.is_empty() => Some(bytes),
            Ok(_) => None,
            Err(err) => {
                log::error!("Failed to export pending updates: {err}");
                None
            }
        }
    }

    fn mark_sent(&mut self) {
        self.sent_version = self.doc.oplog_vv();
    }

    fn export_snapshot(&self) -> Vec<u8> {
        match self.doc.export(ExportMode::Snapshot) {
            Ok(bytes) => bytes,
            Err(err) => {
                log::error!("Failed to export snapshot: {err}");
                Vec::new()
            }
        }
    }

    fn import(&mut self, bytes: &[u8]) -> StoreResult<()> {
        // Without unsent local work, what we import came from the relay and
        // must not be echoed back.
        let caught_up = self.doc.oplog_vv() == self.sent_version;
        self.doc.import(bytes)?;
        if caught_up {
            self.sent_version = self.doc.oplog_vv();
        }
        self.notify(ChangeOrigin::Remote);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{Geometry, ShapeBody};
    use kurbo::Point;
    use std::cell::RefCell;
    use std::rc::Rc;
    use uuid::Uuid;

    fn rect_record(x: f64) -> ShapeRecord {
        ShapeRecord::new(
            Uuid::new_v4(),
            Geometry::new(
                Point::new(x, 0.0),
                ShapeBody::Rectangle {
                    width: 50.0,
                    height: 30.0,
                },
            ),
        )
    }

    #[test]
    fn test_store_creation() {
        let store = LoroStore::new();
        assert_eq!(store.size(), 0);
        assert!(store.entries().is_empty());
        assert!(!store.can_undo());
    }

    #[test]
    fn test_set_get_delete() {
        let mut store = LoroStore::new();
        let record = rect_record(10.0);

        store.set(record.id, &record).expect("set failed");
        assert_eq!(store.size(), 1);
        assert_eq!(store.get(record.id), Some(record.clone()));

        assert!(store.delete(record.id).expect("delete failed"));
        assert_eq!(store.size(), 0);
        assert!(!store.delete(record.id).expect("second delete failed"));
    }

    #[test]
    fn test_set_replaces_whole_record() {
        let mut store = LoroStore::new();
        let mut record = rect_record(0.0);
        store.set(record.id, &record).unwrap();

        record.geometry.body = ShapeBody::Ellipse {
            radius_x: 5.0,
            radius_y: 6.0,
        };
        store.set(record.id, &record).unwrap();

        assert_eq!(store.size(), 1);
        assert_eq!(store.get(record.id), Some(record));
    }

    #[test]
    fn test_set_rejects_mismatched_key() {
        let mut store = LoroStore::new();
        let record = rect_record(0.0);
        assert!(store.set(Uuid::new_v4(), &record).is_err());
        assert_eq!(store.size(), 0);
    }

    #[test]
    fn test_mutate_applies_all_writes() {
        let mut store = LoroStore::new();
        let a = rect_record(0.0);
        let b = rect_record(100.0);
        store.set(a.id, &a).unwrap();
        store.set(b.id, &b).unwrap();

        store
            .mutate(&mut |tx| {
                for id in tx.ids() {
                    tx.delete(id);
                }
            })
            .unwrap();
        assert_eq!(store.size(), 0);

        // The whole mutation undoes as one step.
        assert!(store.undo().unwrap());
        assert_eq!(store.size(), 2);
    }

    /// Write an entry whose shape type this build does not know.
    fn insert_undecodable(store: &LoroStore, key: &str) {
        let map = store
            .loro_doc()
            .get_map(SHAPES_KEY)
            .insert_container(key, LoroMap::new())
            .unwrap();
        map.insert("type", "hexagon").unwrap();
        store.loro_doc().commit();
    }

    #[test]
    fn test_clear_removes_undecodable_entries() {
        let mut store = LoroStore::new();
        let record = rect_record(0.0);
        store.set(record.id, &record).unwrap();
        insert_undecodable(&store, &Uuid::new_v4().to_string());
        assert_eq!(store.size(), 2);
        assert_eq!(store.entries().len(), 1);

        assert_eq!(store.clear().unwrap(), 2);
        assert_eq!(store.size(), 0);

        assert!(store.undo().unwrap());
        assert_eq!(store.size(), 2);
        assert_eq!(store.get(record.id), Some(record));
    }

    #[test]
    fn test_clear_failure_leaves_store_untouched() {
        let mut store = LoroStore::new();
        let first = rect_record(0.0);
        store.set(first.id, &first).unwrap();
        let after_first = store.loro_doc().state_frontiers();
        let second = rect_record(100.0);
        store.set(second.id, &second).unwrap();

        // A document checked out at an older version rejects edits.
        store.loro_doc().checkout(&after_first).unwrap();
        assert!(store.clear().is_err());

        store.loro_doc().checkout_to_latest();
        assert_eq!(store.size(), 2);
        assert_eq!(store.get(first.id), Some(first));
        assert_eq!(store.get(second.id), Some(second));
    }

    #[test]
    fn test_clear_on_empty_store() {
        let mut store = LoroStore::new();
        assert_eq!(store.clear().unwrap(), 0);
        assert!(!store.can_undo());
    }

    #[test]
    fn test_subscribers_see_origins() {
        let mut store = LoroStore::new();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        let sub = store.subscribe(Box::new(move |change| sink.borrow_mut().push(change.origin)));

        let record = rect_record(0.0);
        store.set(record.id, &record).unwrap();
        store.undo().unwrap();
        store.redo().unwrap();

        assert_eq!(
            *seen.borrow(),
            vec![ChangeOrigin::Local, ChangeOrigin::Undo, ChangeOrigin::Redo]
        );

        assert!(store.unsubscribe(sub));
        assert!(!store.unsubscribe(sub));
        store.delete(record.id).unwrap();
        assert_eq!(seen.borrow().len(), 3);
    }

    #[test]
    fn test_undo_restores_deleted_record() {
        let mut store = LoroStore::new();
        let record = rect_record(42.0);
        store.set(record.id, &record).unwrap();
        store.clear_history();

        store.delete(record.id).unwrap();
        assert!(store.get(record.id).is_none());

        assert!(store.undo().unwrap());
        assert_eq!(store.get(record.id), Some(record));
    }

    #[test]
    fn test_undo_count() {
        let mut store = LoroStore::new();
        for i in 0..5 {
            let record = rect_record(i as f64 * 10.0);
            store.set(record.id, &record).unwrap();
        }
        assert_eq!(store.undo_count(), 5);
        assert_eq!(store.redo_count(), 0);
    }

    #[test]
    fn test_pending_updates_until_marked() {
        let mut store = LoroStore::new();
        assert!(store.pending_updates().is_none());

        let record = rect_record(0.0);
        store.set(record.id, &record).unwrap();
        assert!(store.pending_updates().is_some());

        store.mark_sent();
        assert!(store.pending_updates().is_none());
    }

    #[test]
    fn test_updates_replicate() {
        let mut a = LoroStore::new();
        let mut b = LoroStore::new();
        let record = rect_record(7.0);
        a.set(record.id, &record).unwrap();

        let updates = a.pending_updates().unwrap();
        a.mark_sent();
        b.import(&updates).unwrap();

        assert_eq!(b.get(record.id), Some(record));
        // Imported work is not re-sent.
        assert!(b.pending_updates().is_none());
        // Remote changes are not undoable locally.
        assert!(!b.can_undo());
    }

    #[test]
    fn test_snapshot_round_trip() {
        let mut store = LoroStore::new();
        let record = rect_record(3.0);
        store.set(record.id, &record).unwrap();

        let restored = LoroStore::from_snapshot(&store.export_snapshot()).unwrap();
        assert_eq!(restored.entries(), vec![(record.id, record)]);
    }
}
