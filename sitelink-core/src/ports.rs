//! Collaborator interfaces consumed by the core and implemented by the host's
//! AR framework bindings. Every port has a no-op implementation so the store
//! always holds a valid instance, configured or not.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use crate::math::Pose;

/// Opaque handle to a detected plane, for hosts that track plane identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PlaneRef(pub u64);

/// Handle to an externally-owned transform that drives an anchor's pose.
/// The core never owns the driver's lifecycle; anchors hold weak references.
#[derive(Debug, Clone)]
pub struct PoseDriver(Rc<RefCell<Pose>>);

impl PoseDriver {
    pub fn new(pose: Pose) -> Self {
        Self(Rc::new(RefCell::new(pose)))
    }

    pub fn pose(&self) -> Pose {
        *self.0.borrow()
    }

    /// The owning framework moves the tracked transform through this.
    pub fn set_pose(&self, pose: Pose) {
        *self.0.borrow_mut() = pose;
    }

    pub fn downgrade(&self) -> WeakPoseDriver {
        WeakPoseDriver(Rc::downgrade(&self.0))
    }
}

/// Weak side of a [`PoseDriver`]; what anchors store.
#[derive(Debug, Clone, Default)]
pub struct WeakPoseDriver(Weak<RefCell<Pose>>);

impl WeakPoseDriver {
    /// A reference that was never attached to a driver.
    pub fn detached() -> Self {
        Self::default()
    }

    /// Current driver pose, or `None` once the owner dropped it.
    pub fn pose(&self) -> Option<Pose> {
        self.0.upgrade().map(|rc| *rc.borrow())
    }

    pub fn is_alive(&self) -> bool {
        self.0.strong_count() > 0
    }
}

/// Plane detection: the single currently-tracked plane pose, if any.
pub trait PlaneFinder {
    fn try_get_plane_pose(&self) -> Option<Pose> {
        None
    }
}

/// Screen-point raycast into the tracked environment.
pub trait PoseRaycaster {
    fn try_get_pose(&self, screen_x: f32, screen_y: f32) -> Option<(Pose, PlaneRef)> {
        let _ = (screen_x, screen_y);
        None
    }
}

/// The device camera's current pose.
pub trait CameraRig {
    fn camera_pose(&self) -> Option<Pose> {
        None
    }
}

/// Creates framework-tracked transforms for new anchors.
pub trait AnchorCreator {
    fn create_pose_driver(&mut self, pose: Pose) -> Option<PoseDriver> {
        let _ = pose;
        None
    }

    /// Replace an existing driver (e.g. after re-anchoring); the default
    /// drops the old handle and creates afresh.
    fn replace_pose_driver(&mut self, pose: Pose, old: PoseDriver) -> Option<PoseDriver> {
        drop(old);
        self.create_pose_driver(pose)
    }
}

/// No-op port set: nothing detected, no drivers created.
#[derive(Debug, Default)]
pub struct NullArPorts;

impl PlaneFinder for NullArPorts {}
impl PoseRaycaster for NullArPorts {}
impl CameraRig for NullArPorts {}
impl AnchorCreator for NullArPorts {}

/// The full set of AR-side collaborators a store is configured with.
pub struct ArPorts {
    pub plane_finder: Box<dyn PlaneFinder>,
    pub camera: Box<dyn CameraRig>,
    pub raycaster: Box<dyn PoseRaycaster>,
    pub anchor_creator: Box<dyn AnchorCreator>,
}

impl ArPorts {
    /// All ports wired to no-ops.
    pub fn null() -> Self {
        Self {
            plane_finder: Box::new(NullArPorts),
            camera: Box::new(NullArPorts),
            raycaster: Box::new(NullArPorts),
            anchor_creator: Box::new(NullArPorts),
        }
    }
}

impl Default for ArPorts {
    fn default() -> Self {
        Self::null()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[test]
    fn weak_driver_follows_owner_lifetime() {
        let driver = PoseDriver::new(Pose::from_position(Vec3::X));
        let weak = driver.downgrade();
        assert!(weak.is_alive());
        assert_eq!(weak.pose().unwrap().position, Vec3::X);

        driver.set_pose(Pose::from_position(Vec3::Y));
        assert_eq!(weak.pose().unwrap().position, Vec3::Y);

        drop(driver);
        assert!(!weak.is_alive());
        assert!(weak.pose().is_none());
    }

    #[test]
    fn detached_reference_is_dead() {
        let weak = WeakPoseDriver::detached();
        assert!(!weak.is_alive());
        assert!(weak.pose().is_none());
    }

    #[test]
    fn null_ports_always_answer() {
        let mut ports = ArPorts::null();
        assert!(ports.plane_finder.try_get_plane_pose().is_none());
        assert!(ports.camera.camera_pose().is_none());
        assert!(ports.raycaster.try_get_pose(0.5, 0.5).is_none());
        assert!(ports
            .anchor_creator
            .create_pose_driver(Pose::IDENTITY)
            .is_none());
    }
}
