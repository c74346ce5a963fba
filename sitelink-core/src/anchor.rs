//! Anchor point store: the shared 3D coordinate registry. Anchor poses are
//! local to the store's null point so the whole set can be rigidly re-based.

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::math::{look_rotation, Pose};
use crate::ports::{ArPorts, WeakPoseDriver};

/// Distance along a plane's up axis used as the look-at target when aligning
/// an anchor to a detected plane.
const PLANE_LOOK_OFFSET: f32 = 1000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AnchorType {
    Standard,
    ImageTarget,
    CameraImage,
    Custom,
    ExternalSpatialAnchor,
}

/// One persistent 3D reference location.
#[derive(Debug, Clone)]
pub struct AnchorPoint {
    pub id: u32,
    /// Id this anchor had in persisted storage, kept for systems that cached
    /// it; equals `id` unless a load reassigned a colliding id.
    pub original_id: u32,
    pub name: String,
    pub kind: AnchorType,
    /// Pose in the store's local space (relative to the null point).
    pub local_pose: Pose,
    /// Externally-owned transform that drives this anchor's pose each tick.
    pub driver: WeakPoseDriver,
    selected: bool,
}

impl AnchorPoint {
    pub fn is_selected(&self) -> bool {
        self.selected
    }
}

/// Alignment targets for [`AnchorPointStore::align`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlignTarget {
    Camera,
    Plane,
}

/// Observer of store mutations. Pre-delete fires strictly before removal
/// (dependents can still harvest the anchor); deleted strictly after.
pub trait AnchorObserver {
    fn anchor_added(&mut self, anchor: &AnchorPoint) {
        let _ = anchor;
    }
    fn anchor_about_to_delete(&mut self, anchor: &AnchorPoint) {
        let _ = anchor;
    }
    fn anchor_deleted(&mut self, id: u32) {
        let _ = id;
    }
    fn anchors_loading(&mut self) {}
    /// Carries only the ids created by the load that just finished.
    fn anchors_loaded(&mut self, new_ids: &[u32]) {
        let _ = new_ids;
    }
}

/// Ordered collection of anchor points plus the null point and selection.
///
/// Invariants: ids are unique at all times; at most one anchor is selected
/// and it is always a member of the collection.
pub struct AnchorPointStore {
    points: Vec<AnchorPoint>,
    null_point: Pose,
    observers: Vec<Box<dyn AnchorObserver>>,
    ports: ArPorts,
}

impl AnchorPointStore {
    pub fn new(ports: ArPorts) -> Self {
        Self {
            points: Vec::new(),
            null_point: Pose::IDENTITY,
            observers: Vec::new(),
            ports,
        }
    }

    pub fn subscribe(&mut self, observer: Box<dyn AnchorObserver>) {
        self.observers.push(observer);
    }

    /// Smallest id not currently in use (freed slots are reused).
    fn next_free_id(&self) -> u32 {
        let mut id = 0u32;
        while self.points.iter().any(|a| a.id == id) {
            id += 1;
        }
        id
    }

    /// Create an anchor at `pose`, optionally attaching a framework pose
    /// driver. The new anchor becomes the selection. Returns its id.
    pub fn add(&mut self, pose: Pose, create_driver: bool) -> u32 {
        let id = self.next_free_id();
        let driver = if create_driver {
            match self.ports.anchor_creator.create_pose_driver(pose) {
                Some(driver) => driver.downgrade(),
                None => WeakPoseDriver::detached(),
            }
        } else {
            WeakPoseDriver::detached()
        };
        let anchor = AnchorPoint {
            id,
            original_id: id,
            name: String::new(),
            kind: AnchorType::Standard,
            local_pose: pose,
            driver,
            selected: false,
        };
        self.points.push(anchor);
        self.set_selected(Some(id));
        if let Some(idx) = self.index_of(id) {
            for obs in self.observers.iter_mut() {
                obs.anchor_added(&self.points[idx]);
            }
        }
        id
    }

    /// Insert an anchor restored from persisted data. A colliding id gets a
    /// fresh one; the requested id is remembered as `original_id`. Does not
    /// change the selection or fire per-anchor events (loads report through
    /// `anchors_loaded`).
    pub(crate) fn insert_loaded(
        &mut self,
        requested_id: u32,
        name: String,
        kind: AnchorType,
        pose: Pose,
    ) -> u32 {
        let id = if self.points.iter().any(|a| a.id == requested_id) {
            self.next_free_id()
        } else {
            requested_id
        };
        self.points.push(AnchorPoint {
            id,
            original_id: requested_id,
            name,
            kind,
            local_pose: pose,
            driver: WeakPoseDriver::detached(),
            selected: false,
        });
        id
    }

    /// Remove an anchor. No-op on a missing id.
    pub fn remove(&mut self, id: u32) {
        let idx = match self.index_of(id) {
            Some(i) => i,
            None => return,
        };
        for obs in self.observers.iter_mut() {
            obs.anchor_about_to_delete(&self.points[idx]);
        }
        self.points.remove(idx);
        for obs in self.observers.iter_mut() {
            obs.anchor_deleted(id);
        }
    }

    /// Remove every anchor, firing the per-anchor delete notifications.
    pub fn clear(&mut self) {
        while let Some(anchor) = self.points.last() {
            let id = anchor.id;
            self.remove(id);
        }
    }

    /// Overwrite an anchor's local pose. Returns false on a missing id.
    pub fn move_anchor(&mut self, id: u32, pose: Pose) -> bool {
        match self.get_mut(id) {
            Some(anchor) => {
                anchor.local_pose = pose;
                true
            }
            None => false,
        }
    }

    /// Rename an anchor. Returns false on a missing id.
    pub fn rename(&mut self, id: u32, name: impl Into<String>) -> bool {
        match self.get_mut(id) {
            Some(anchor) => {
                anchor.name = name.into();
                true
            }
            None => false,
        }
    }

    pub fn set_kind(&mut self, id: u32, kind: AnchorType) -> bool {
        match self.get_mut(id) {
            Some(anchor) => {
                anchor.kind = kind;
                true
            }
            None => false,
        }
    }

    /// Make `id` the selection. Returns false (and leaves the selection
    /// untouched) on a missing id.
    pub fn select(&mut self, id: u32) -> bool {
        if self.index_of(id).is_none() {
            return false;
        }
        self.set_selected(Some(id));
        true
    }

    pub fn clear_selection(&mut self) {
        self.set_selected(None);
    }

    fn set_selected(&mut self, id: Option<u32>) {
        for anchor in self.points.iter_mut() {
            anchor.selected = Some(anchor.id) == id;
        }
    }

    pub fn selected_anchor(&self) -> Option<&AnchorPoint> {
        self.points.iter().find(|a| a.selected)
    }

    pub fn selected_id(&self) -> Option<u32> {
        self.selected_anchor().map(|a| a.id)
    }

    /// Align an anchor to the camera (rotation copied, position untouched)
    /// or to the currently detected plane (oriented toward a point far along
    /// the plane's up axis). A no-op returning false when the required
    /// tracking data is unavailable; the anchor is never left invalid.
    pub fn align(&mut self, id: u32, target: AlignTarget) -> bool {
        let idx = match self.index_of(id) {
            Some(i) => i,
            None => return false,
        };
        match target {
            AlignTarget::Camera => match self.ports.camera.camera_pose() {
                Some(camera) => {
                    self.points[idx].local_pose.rotation = camera.rotation;
                    true
                }
                None => false,
            },
            AlignTarget::Plane => match self.ports.plane_finder.try_get_plane_pose() {
                Some(plane) => {
                    let plane_up = plane.rotation * Vec3::Y;
                    let look_target = plane.position + plane_up * PLANE_LOOK_OFFSET;
                    let anchor = &mut self.points[idx];
                    let forward = look_target - anchor.local_pose.position;
                    anchor.local_pose.rotation = look_rotation(forward, Vec3::Y);
                    true
                }
                None => false,
            },
        }
    }

    /// Move the coordinate origin all anchors are expressed against.
    ///
    /// With `keep_global_position` the anchors' world poses are captured
    /// before the origin moves and re-applied after (locals are re-derived,
    /// nothing moves in world space). Without it locals are kept verbatim,
    /// so anchors ride along with the origin.
    pub fn set_null_point(&mut self, new_origin: Pose, keep_global_position: bool) {
        if keep_global_position {
            let world: Vec<Pose> = self
                .points
                .iter()
                .map(|a| self.null_point.compose(&a.local_pose))
                .collect();
            self.null_point = new_origin;
            let inv = self.null_point.inverse();
            for (anchor, world_pose) in self.points.iter_mut().zip(world) {
                anchor.local_pose = inv.compose(&world_pose);
            }
        } else {
            self.null_point = new_origin;
        }
    }

    pub fn null_point(&self) -> Pose {
        self.null_point
    }

    /// Copy each live pose driver into its anchor. Host calls this once per
    /// frame/tick.
    pub fn tick(&mut self) {
        for anchor in self.points.iter_mut() {
            if let Some(pose) = anchor.driver.pose() {
                anchor.local_pose = pose;
            }
        }
    }

    fn index_of(&self, id: u32) -> Option<usize> {
        self.points.iter().position(|a| a.id == id)
    }

    pub fn get(&self, id: u32) -> Option<&AnchorPoint> {
        self.points.iter().find(|a| a.id == id)
    }

    fn get_mut(&mut self, id: u32) -> Option<&mut AnchorPoint> {
        self.points.iter_mut().find(|a| a.id == id)
    }

    /// Index-based lookup, insertion order.
    pub fn by_index(&self, index: usize) -> Option<&AnchorPoint> {
        self.points.get(index)
    }

    pub fn world_pose(&self, id: u32) -> Option<Pose> {
        self.get(id).map(|a| self.null_point.compose(&a.local_pose))
    }

    pub fn iter(&self) -> impl Iterator<Item = &AnchorPoint> {
        self.points.iter()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub(crate) fn notify_loading(&mut self) {
        for obs in self.observers.iter_mut() {
            obs.anchors_loading();
        }
    }

    pub(crate) fn notify_loaded(&mut self, new_ids: &[u32]) {
        for obs in self.observers.iter_mut() {
            obs.anchors_loaded(new_ids);
        }
    }
}

impl Default for AnchorPointStore {
    fn default() -> Self {
        Self::new(ArPorts::null())
    }
}
