//! In-memory surface for tests and headless embedding.

use kurbo::{Point, Rect, Vec2};

use super::{ObjectHandle, RenderSurface, SurfaceObject};
use crate::record::{Geometry, ShapeId};

/// Extra world-space slack around objects when hit-testing.
const HIT_TOLERANCE: f64 = 4.0;

#[derive(Debug, Clone)]
struct Entry {
    handle: ObjectHandle,
    id: Option<ShapeId>,
    geometry: Geometry,
}

/// A surface that keeps objects in a z-ordered list and counts mutations.
#[derive(Debug, Clone)]
pub struct HeadlessSurface {
    /// Back to front.
    entries: Vec<Entry>,
    next_handle: u64,
    pan: Vec2,
    zoom: f64,
    mutations: u64,
}

impl Default for HeadlessSurface {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            next_handle: 1,
            pan: Vec2::ZERO,
            zoom: 1.0,
            mutations: 0,
        }
    }
}

impl HeadlessSurface {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of object mutations (create, update, remove, tag, clear) so far.
    pub fn mutation_count(&self) -> u64 {
        self.mutations
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn viewport(&self) -> (Vec2, f64) {
        (self.pan, self.zoom)
    }

    /// Handle of the object tagged with `id`.
    pub fn find(&self, id: ShapeId) -> Option<ObjectHandle> {
        self.entries
            .iter()
            .find(|entry| entry.id == Some(id))
            .map(|entry| entry.handle)
    }

    /// Geometry of an object, without cloning the tag.
    pub fn geometry(&self, handle: ObjectHandle) -> Option<&Geometry> {
        self.entry(handle).map(|entry| &entry.geometry)
    }

    fn entry(&self, handle: ObjectHandle) -> Option<&Entry> {
        self.entries.iter().find(|entry| entry.handle == handle)
    }

    fn entry_mut(&mut self, handle: ObjectHandle) -> Option<&mut Entry> {
        self.entries.iter_mut().find(|entry| entry.handle == handle)
    }

    /// Topmost group listing `id` as a member.
    fn group_of(&self, id: ShapeId) -> Option<ObjectHandle> {
        self.entries
            .iter()
            .rev()
            .find(|entry| entry.geometry.body.members().contains(&id))
            .map(|entry| entry.handle)
    }

    /// Resolve a hit object to the group it belongs to, if any.
    fn resolve(&self, entry: &Entry) -> ObjectHandle {
        entry
            .id
            .and_then(|id| self.group_of(id))
            .unwrap_or(entry.handle)
    }
}

fn overlaps(a: Rect, b: Rect) -> bool {
    a.x0 <= b.x1 && a.x1 >= b.x0 && a.y0 <= b.y1 && a.y1 >= b.y0
}

impl RenderSurface for HeadlessSurface {
    fn create_object(&mut self, geometry: Geometry) -> ObjectHandle {
        let handle = ObjectHandle(self.next_handle);
        self.next_handle += 1;
        self.entries.push(Entry {
            handle,
            id: None,
            geometry,
        });
        self.mutations += 1;
        handle
    }

    fn update_object(&mut self, handle: ObjectHandle, geometry: Geometry) -> bool {
        let Some(entry) = self.entry_mut(handle) else {
            return false;
        };
        entry.geometry = geometry;
        self.mutations += 1;
        true
    }

    fn remove_object(&mut self, handle: ObjectHandle) -> bool {
        let before = self.entries.len();
        self.entries.retain(|entry| entry.handle != handle);
        let removed = self.entries.len() != before;
        if removed {
            self.mutations += 1;
        }
        removed
    }

    fn serialize(&self, handle: ObjectHandle) -> Option<SurfaceObject> {
        self.entry(handle).map(|entry| SurfaceObject {
            handle: entry.handle,
            id: entry.id,
            geometry: entry.geometry.clone(),
        })
    }

    fn hit_test(&self, point: Point) -> Option<ObjectHandle> {
        self.entries
            .iter()
            .rev()
            .find(|entry| {
                entry.geometry.bounds().is_some_and(|bounds| {
                    let slack = HIT_TOLERANCE + entry.geometry.style.stroke_width / 2.0;
                    bounds.inflate(slack, slack).contains(point)
                })
            })
            .map(|entry| self.resolve(entry))
    }

    fn objects_in_rect(&self, rect: Rect) -> Vec<ObjectHandle> {
        let rect = rect.abs();
        let mut hits = Vec::new();
        for entry in &self.entries {
            let Some(bounds) = entry.geometry.bounds() else {
                continue;
            };
            if overlaps(bounds, rect) {
                let handle = self.resolve(entry);
                if !hits.contains(&handle) {
                    hits.push(handle);
                }
            }
        }
        hits
    }

    fn set_viewport_transform(&mut self, pan: Vec2, zoom: f64) {
        self.pan = pan;
        self.zoom = zoom;
    }

    fn object_id(&self, handle: ObjectHandle) -> Option<ShapeId> {
        self.entry(handle).and_then(|entry| entry.id)
    }

    fn set_object_id(&mut self, handle: ObjectHandle, id: ShapeId) -> bool {
        let Some(entry) = self.entry_mut(handle) else {
            return false;
        };
        entry.id = Some(id);
        self.mutations += 1;
        true
    }

    fn objects(&self) -> Vec<ObjectHandle> {
        self.entries.iter().map(|entry| entry.handle).collect()
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.mutations += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::ShapeBody;
    use uuid::Uuid;

    fn rect(x: f64, y: f64, w: f64, h: f64) -> Geometry {
        Geometry::new(
            Point::new(x, y),
            ShapeBody::Rectangle {
                width: w,
                height: h,
            },
        )
    }

    #[test]
    fn test_hit_test_prefers_topmost() {
        let mut surface = HeadlessSurface::new();
        let bottom = surface.create_object(rect(0.0, 0.0, 100.0, 100.0));
        let top = surface.create_object(rect(50.0, 50.0, 100.0, 100.0));

        assert_eq!(surface.hit_test(Point::new(75.0, 75.0)), Some(top));
        assert_eq!(surface.hit_test(Point::new(10.0, 10.0)), Some(bottom));
        assert_eq!(surface.hit_test(Point::new(500.0, 500.0)), None);
    }

    #[test]
    fn test_group_members_hit_as_group() {
        let mut surface = HeadlessSurface::new();
        let a_id = Uuid::new_v4();
        let b_id = Uuid::new_v4();
        let a = surface.create_object(rect(0.0, 0.0, 10.0, 10.0));
        let b = surface.create_object(rect(100.0, 0.0, 10.0, 10.0));
        surface.set_object_id(a, a_id);
        surface.set_object_id(b, b_id);
        let group = surface.create_object(Geometry::new(
            Point::ZERO,
            ShapeBody::Group {
                members: vec![a_id, b_id],
            },
        ));

        assert_eq!(surface.hit_test(Point::new(5.0, 5.0)), Some(group));
        assert_eq!(
            surface.objects_in_rect(Rect::new(-10.0, -10.0, 200.0, 20.0)),
            vec![group]
        );
    }

    #[test]
    fn test_objects_in_rect() {
        let mut surface = HeadlessSurface::new();
        let a = surface.create_object(rect(0.0, 0.0, 10.0, 10.0));
        let _b = surface.create_object(rect(100.0, 100.0, 10.0, 10.0));
        assert_eq!(surface.objects_in_rect(Rect::new(20.0, 20.0, -5.0, -5.0)), vec![a]);
    }

    #[test]
    fn test_mutation_counter() {
        let mut surface = HeadlessSurface::new();
        let handle = surface.create_object(rect(0.0, 0.0, 10.0, 10.0));
        surface.update_object(handle, rect(1.0, 0.0, 10.0, 10.0));
        assert!(!surface.update_object(ObjectHandle(999), rect(0.0, 0.0, 1.0, 1.0)));
        surface.set_viewport_transform(Vec2::new(5.0, 5.0), 2.0);
        assert_eq!(surface.mutation_count(), 2);

        assert!(surface.remove_object(handle));
        assert!(surface.is_empty());
        assert_eq!(surface.mutation_count(), 3);
    }

    #[test]
    fn test_tagging() {
        let mut surface = HeadlessSurface::new();
        let handle = surface.create_object(rect(0.0, 0.0, 10.0, 10.0));
        assert_eq!(surface.object_id(handle), None);

        let id = Uuid::new_v4();
        surface.set_object_id(handle, id);
        assert_eq!(surface.find(id), Some(handle));
        assert_eq!(surface.serialize(handle).unwrap().id, Some(id));
    }
}
