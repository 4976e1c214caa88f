//! Bridge between the rendering surface and the shared document store.
//!
//! Local edits flow surface → store through [`SceneAdapter::commit`]; remote
//! and historical edits flow store → surface through
//! [`SceneAdapter::rehydrate`]. Rehydration never writes to the store, so the
//! two directions cannot feed back into each other.

use std::collections::{HashMap, HashSet};

use uuid::Uuid;

use crate::error::{CanvasError, CanvasResult};
use crate::record::{ShapeId, ShapeRecord};
use crate::store::DocumentStore;
use crate::surface::{ObjectHandle, RenderSurface};

/// Inconsistencies found while rebuilding the scene.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SceneConflict {
    /// A group lists a member that is not in the store.
    DanglingMember { group: ShapeId, member: ShapeId },
}

/// What a rehydration changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RehydrateReport {
    pub created: usize,
    pub updated: usize,
    pub removed: usize,
    pub conflicts: Vec<SceneConflict>,
}

impl RehydrateReport {
    /// True when the surface was left untouched.
    pub fn is_noop(&self) -> bool {
        self.created == 0 && self.updated == 0 && self.removed == 0
    }
}

/// Keeps the id ↔ handle index and tracks writes not yet shared.
#[derive(Debug, Default)]
pub struct SceneAdapter {
    index: HashMap<ShapeId, ObjectHandle>,
    /// Written locally but not yet handed to the replication channel.
    unsynced: HashSet<ShapeId>,
    /// The store rejected the write; the object lives only on the surface.
    failed: HashSet<ShapeId>,
}

impl SceneAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serialize a surface object and write it to the store as a whole record.
    ///
    /// An id is assigned (and tagged onto the object) on first commit. When
    /// the store write fails the object stays on the surface, its id is
    /// flagged unsynced and the error is returned.
    pub fn commit(
        &mut self,
        surface: &mut dyn RenderSurface,
        store: &mut dyn DocumentStore,
        handle: ObjectHandle,
    ) -> CanvasResult<ShapeRecord> {
        let object = surface
            .serialize(handle)
            .ok_or(CanvasError::UnknownObject(handle))?;
        let id = match object.id {
            Some(id) => id,
            None => {
                let id = Uuid::new_v4();
                surface.set_object_id(handle, id);
                id
            }
        };
        self.index.insert(id, handle);
        self.unsynced.insert(id);

        let record = ShapeRecord::new(id, object.geometry);
        match store.set(id, &record) {
            Ok(()) => {
                self.failed.remove(&id);
                log::debug!("Committed {:?} {id}", record.kind());
                Ok(record)
            }
            Err(err) => {
                log::warn!("Store rejected {id}, keeping it local and unsynced: {err}");
                self.failed.insert(id);
                Err(err.into())
            }
        }
    }

    /// Retry every commit the store previously rejected.
    ///
    /// Returns how many now succeeded.
    pub fn retry_failed(
        &mut self,
        surface: &mut dyn RenderSurface,
        store: &mut dyn DocumentStore,
    ) -> usize {
        let pending: Vec<ShapeId> = self.failed.iter().copied().collect();
        let mut recovered = 0;
        for id in pending {
            let Some(handle) = self.index.get(&id).copied() else {
                self.failed.remove(&id);
                continue;
            };
            if self.commit(surface, store, handle).is_ok() {
                recovered += 1;
            }
        }
        recovered
    }

    /// Bring the surface in line with the store's records.
    ///
    /// Creates missing objects, updates objects whose state differs, and
    /// removes tagged objects whose id is gone. Provisional (untagged) objects
    /// and objects whose store write failed are left alone. Running it twice
    /// with the same records mutates nothing the second time.
    pub fn rehydrate(
        &mut self,
        records: &[(ShapeId, ShapeRecord)],
        surface: &mut dyn RenderSurface,
    ) -> RehydrateReport {
        let mut report = RehydrateReport::default();
        self.reindex(surface);

        let live: HashSet<ShapeId> = records.iter().map(|(id, _)| *id).collect();

        for (id, record) in records {
            match self.index.get(id).copied() {
                // The local version is newer than anything the store has.
                Some(_) if self.failed.contains(id) => {}
                Some(handle) => {
                    let current = surface.serialize(handle).map(|object| object.geometry);
                    if current.as_ref() != Some(&record.geometry) {
                        surface.update_object(handle, record.geometry.clone());
                        report.updated += 1;
                    }
                }
                None => {
                    let handle = surface.create_object(record.geometry.clone());
                    surface.set_object_id(handle, *id);
                    self.index.insert(*id, handle);
                    report.created += 1;
                }
            }

            for member in record.geometry.body.members() {
                if !live.contains(member) {
                    log::warn!("Group {id} references missing member {member}");
                    report.conflicts.push(SceneConflict::DanglingMember {
                        group: *id,
                        member: *member,
                    });
                }
            }
        }

        let stale: Vec<(ShapeId, ObjectHandle)> = self
            .index
            .iter()
            .filter(|(id, _)| !live.contains(id) && !self.failed.contains(id))
            .map(|(id, handle)| (*id, *handle))
            .collect();
        for (id, handle) in stale {
            surface.remove_object(handle);
            self.index.remove(&id);
            self.unsynced.remove(&id);
            report.removed += 1;
        }

        if !report.is_noop() {
            log::debug!(
                "Rehydrated scene: {} created, {} updated, {} removed",
                report.created,
                report.updated,
                report.removed
            );
        }
        report
    }

    /// Rebuild the index from the tags on the surface, dropping handles the
    /// surface no longer knows.
    fn reindex(&mut self, surface: &dyn RenderSurface) {
        self.index.clear();
        for handle in surface.objects() {
            if let Some(id) = surface.object_id(handle) {
                self.index.insert(id, handle);
            }
        }
    }

    /// Ids whose latest local write has not reached the replication channel.
    pub fn unsynced(&self) -> Vec<ShapeId> {
        self.unsynced.iter().copied().collect()
    }

    pub fn is_unsynced(&self, id: ShapeId) -> bool {
        self.unsynced.contains(&id)
    }

    /// Clear the unsynced flag of every id whose write reached the store.
    pub fn mark_synced(&mut self) {
        let failed = &self.failed;
        self.unsynced.retain(|id| failed.contains(id));
    }

    pub fn handle_of(&self, id: ShapeId) -> Option<ObjectHandle> {
        self.index.get(&id).copied()
    }

    pub fn id_of(&self, handle: ObjectHandle) -> Option<ShapeId> {
        self.index
            .iter()
            .find(|(_, h)| **h == handle)
            .map(|(id, _)| *id)
    }

    /// Drop every trace of `id` after it was deleted locally.
    pub fn forget(&mut self, id: ShapeId) {
        self.index.remove(&id);
        self.failed.remove(&id);
        // A deletion is itself a write that has to be shared.
        self.unsynced.insert(id);
    }

    /// Forget everything, e.g. after the surface was cleared.
    pub fn clear(&mut self) {
        self.index.clear();
        self.failed.clear();
    }
}
