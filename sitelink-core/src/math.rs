//! Rigid 3D poses (position + rotation) and the compositions the anchor
//! store and frame reconciliation are built on.

use glam::{Mat3, Quat, Vec3};
use serde::{Deserialize, Serialize};

/// A rigid transform: position and rotation, no scale.
/// Serializes as `{"position":[x,y,z],"rotation":[x,y,z,w]}`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub position: Vec3,
    pub rotation: Quat,
}

impl Pose {
    pub const IDENTITY: Pose = Pose {
        position: Vec3::ZERO,
        rotation: Quat::IDENTITY,
    };

    pub fn new(position: Vec3, rotation: Quat) -> Self {
        Self { position, rotation }
    }

    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            rotation: Quat::IDENTITY,
        }
    }

    /// Compose two transforms: `self` applied after `other` (i.e. `other`
    /// expressed in `self`'s frame). `compose(a, b).transform_point(p) ==
    /// a.transform_point(b.transform_point(p))`.
    pub fn compose(&self, other: &Pose) -> Pose {
        Pose {
            position: self.rotation * other.position + self.position,
            rotation: self.rotation * other.rotation,
        }
    }

    /// Inverse rigid transform: `p.compose(&p.inverse()) == IDENTITY`.
    pub fn inverse(&self) -> Pose {
        let inv_rot = self.rotation.inverse();
        Pose {
            position: inv_rot * -self.position,
            rotation: inv_rot,
        }
    }

    /// Map a point from this pose's local space to the parent space.
    pub fn transform_point(&self, point: Vec3) -> Vec3 {
        self.rotation * point + self.position
    }

    /// Componentwise approximate equality (quaternion compared up to sign).
    pub fn approx_eq(&self, other: &Pose, epsilon: f32) -> bool {
        let rot_close = self.rotation.abs_diff_eq(other.rotation, epsilon)
            || self.rotation.abs_diff_eq(-other.rotation, epsilon);
        self.position.abs_diff_eq(other.position, epsilon) && rot_close
    }
}

impl Default for Pose {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Rotation whose forward (+Z) axis points along `forward`, with `up` as the
/// reference up vector. Falls back to identity for degenerate input.
pub fn look_rotation(forward: Vec3, up: Vec3) -> Quat {
    let f = forward.normalize_or_zero();
    if f == Vec3::ZERO {
        return Quat::IDENTITY;
    }
    let mut r = up.cross(f).normalize_or_zero();
    if r == Vec3::ZERO {
        // forward parallel to up; pick an arbitrary orthogonal axis
        r = Vec3::Y.cross(f).normalize_or_zero();
        if r == Vec3::ZERO {
            r = Vec3::X;
        }
    }
    let u = f.cross(r);
    Quat::from_mat3(&Mat3::from_cols(r, u, f)).normalize()
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f32 = 1e-5;

    #[test]
    fn compose_with_identity() {
        let p = Pose::new(
            Vec3::new(1.0, 2.0, 3.0),
            Quat::from_rotation_y(0.7),
        );
        assert!(p.compose(&Pose::IDENTITY).approx_eq(&p, EPS));
        assert!(Pose::IDENTITY.compose(&p).approx_eq(&p, EPS));
    }

    #[test]
    fn inverse_cancels() {
        let p = Pose::new(
            Vec3::new(-4.0, 0.5, 9.0),
            Quat::from_euler(glam::EulerRot::XYZ, 0.3, -1.1, 0.8),
        );
        assert!(p.compose(&p.inverse()).approx_eq(&Pose::IDENTITY, EPS));
        assert!(p.inverse().compose(&p).approx_eq(&Pose::IDENTITY, EPS));
    }

    #[test]
    fn compose_matches_point_transform() {
        let a = Pose::new(Vec3::new(1.0, 0.0, 0.0), Quat::from_rotation_z(0.4));
        let b = Pose::new(Vec3::new(0.0, 2.0, 0.0), Quat::from_rotation_x(-0.9));
        let pt = Vec3::new(0.3, -0.7, 1.5);
        let via_compose = a.compose(&b).transform_point(pt);
        let via_chain = a.transform_point(b.transform_point(pt));
        assert!(via_compose.abs_diff_eq(via_chain, EPS));
    }

    #[test]
    fn look_rotation_faces_target() {
        let q = look_rotation(Vec3::new(0.0, 0.0, 5.0), Vec3::Y);
        assert!((q * Vec3::Z).abs_diff_eq(Vec3::Z, EPS));

        let q = look_rotation(Vec3::new(1.0, 0.0, 0.0), Vec3::Y);
        assert!((q * Vec3::Z).abs_diff_eq(Vec3::X, EPS));
    }

    #[test]
    fn look_rotation_degenerate_forward() {
        assert_eq!(look_rotation(Vec3::ZERO, Vec3::Y), Quat::IDENTITY);
    }

    #[test]
    fn look_rotation_forward_parallel_to_up() {
        let q = look_rotation(Vec3::Y, Vec3::Y);
        assert!((q * Vec3::Z).abs_diff_eq(Vec3::Y, EPS));
    }

    #[test]
    fn serde_shape() {
        let p = Pose::new(Vec3::new(1.0, 2.0, 3.0), Quat::IDENTITY);
        let json = serde_json::to_string(&p).unwrap();
        assert_eq!(
            json,
            r#"{"position":[1.0,2.0,3.0],"rotation":[0.0,0.0,0.0,1.0]}"#
        );
        let back: Pose = serde_json::from_str(&json).unwrap();
        assert!(back.approx_eq(&p, EPS));
    }
}
