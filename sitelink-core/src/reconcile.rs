//! Reference-frame reconciliation: re-express anchors created in one AR
//! tracking session consistently inside another.
//!
//! Two sessions share no absolute origin. When a saved anchor is re-observed
//! live, the difference between its stored pose and its live pose is exactly
//! how the coordinate frame moved; applying that rigid correction to every
//! anchor of the batch preserves all relative geometry while mapping the
//! reference anchor onto its live pose.

use crate::math::Pose;

/// The rigid transform taking the stored frame to the live frame: applying
/// it to `old_pose` yields exactly `new_pose`. Identity when the poses agree.
pub fn correction_between(old_pose: &Pose, new_pose: &Pose) -> Pose {
    new_pose.compose(&old_pose.inverse())
}

/// Re-express one stored pose in the live frame.
pub fn apply_correction(correction: &Pose, pose: &Pose) -> Pose {
    correction.compose(pose)
}

/// Correction for a loaded batch of `(id, pose)` pairs. Uses the *first*
/// anchor matching `reference_id` (batch ids are expected unique). A negative
/// id means no reconciliation. An absent id degrades to identity and is
/// reported at warn level so hosts can surface it.
pub fn batch_correction(
    batch: &[(u32, Pose)],
    reference_id: i64,
    live_reference_pose: &Pose,
) -> Pose {
    if reference_id < 0 {
        return Pose::IDENTITY;
    }
    match batch
        .iter()
        .find(|(id, _)| i64::from(*id) == reference_id)
    {
        Some((_, stored)) => correction_between(stored, live_reference_pose),
        None => {
            log::warn!(
                "reference anchor {} not in loaded batch; keeping stored poses",
                reference_id
            );
            Pose::IDENTITY
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{Quat, Vec3};

    const EPS: f32 = 1e-4;

    fn pose(x: f32, y: f32, z: f32, yaw: f32) -> Pose {
        Pose::new(Vec3::new(x, y, z), Quat::from_rotation_y(yaw))
    }

    #[test]
    fn identical_poses_give_identity() {
        let p = pose(3.0, -1.0, 2.0, 0.7);
        let c = correction_between(&p, &p);
        assert!(c.approx_eq(&Pose::IDENTITY, EPS));
    }

    #[test]
    fn reference_anchor_lands_exactly_on_live_pose() {
        let old = pose(1.0, 0.0, 0.0, 0.0);
        let new = pose(-2.0, 3.0, 5.0, 1.3);
        let c = correction_between(&old, &new);
        assert!(apply_correction(&c, &old).approx_eq(&new, EPS));
    }

    #[test]
    fn relative_geometry_preserved() {
        let reference_old = pose(1.0, 0.0, 0.0, 0.4);
        let other_old = pose(4.0, 2.0, -1.0, -0.9);
        let reference_new = pose(10.0, -5.0, 2.0, 2.0);

        let c = correction_between(&reference_old, &reference_new);
        let other_new = apply_correction(&c, &other_old);

        // offsets expressed in the reference anchor's frame are unchanged
        let rel_before = reference_old.inverse().compose(&other_old);
        let rel_after = reference_new.inverse().compose(&other_new);
        assert!(rel_before.approx_eq(&rel_after, EPS));
    }

    #[test]
    fn batch_correction_uses_first_match() {
        let batch = vec![
            (0, pose(0.0, 0.0, 0.0, 0.0)),
            (1, pose(1.0, 0.0, 0.0, 0.0)),
        ];
        let live = pose(1.0, 1.0, 0.0, 0.0);
        let c = batch_correction(&batch, 1, &live);
        assert!(apply_correction(&c, &batch[1].1).approx_eq(&live, EPS));
    }

    #[test]
    fn negative_reference_id_is_identity() {
        let batch = vec![(0, pose(9.0, 9.0, 9.0, 1.0))];
        let c = batch_correction(&batch, -1, &pose(1.0, 2.0, 3.0, 0.5));
        assert!(c.approx_eq(&Pose::IDENTITY, EPS));
    }

    #[test]
    fn absent_reference_id_falls_back_to_identity() {
        let batch = vec![(0, pose(9.0, 9.0, 9.0, 1.0))];
        let c = batch_correction(&batch, 7, &pose(1.0, 2.0, 3.0, 0.5));
        assert!(c.approx_eq(&Pose::IDENTITY, EPS));
    }
}
