//! Rigid-body pose (rotation + translation) in the camera frame.
//!
//! Poses follow the `T_target_source` composition convention: composing
//! `a.compose(&b)` yields the transform that first applies `b`, then `a`.

use nalgebra::{Matrix4, Quaternion, UnitQuaternion, Vector3};

use super::quat::quaternion_from_matrix;

/// A rigid-body transform: unit-quaternion rotation plus translation.
#[derive(Debug, Clone, PartialEq)]
pub struct Pose {
    pub rotation: UnitQuaternion<f64>,
    pub translation: Vector3<f64>,
}

impl Pose {
    /// The identity transform.
    pub fn identity() -> Self {
        Self {
            rotation: UnitQuaternion::identity(),
            translation: Vector3::zeros(),
        }
    }

    /// Build a pose from a w-first quaternion and a position.
    pub fn from_quaternion(qw: f64, qx: f64, qy: f64, qz: f64, position: Vector3<f64>) -> Self {
        Self {
            rotation: UnitQuaternion::from_quaternion(Quaternion::new(qw, qx, qy, qz)),
            translation: position,
        }
    }

    /// Build a pose from a 4x4 homogeneous transform matrix.
    pub fn from_matrix(m: &Matrix4<f64>) -> Self {
        Self {
            rotation: quaternion_from_matrix(m),
            translation: Vector3::new(m[(0, 3)], m[(1, 3)], m[(2, 3)]),
        }
    }

    /// The 4x4 homogeneous matrix of this pose.
    pub fn to_matrix(&self) -> Matrix4<f64> {
        let mut m = Matrix4::identity();
        m.fixed_view_mut::<3, 3>(0, 0)
            .copy_from(self.rotation.to_rotation_matrix().matrix());
        m.fixed_view_mut::<3, 1>(0, 3).copy_from(&self.translation);
        m
    }

    /// Compose with another pose: `self` applied after `other`.
    pub fn compose(&self, other: &Pose) -> Pose {
        Pose {
            rotation: self.rotation * other.rotation,
            translation: self.rotation.transform_vector(&other.translation) + self.translation,
        }
    }

    /// Inverse transform.
    pub fn inverse(&self) -> Pose {
        let inv_rot = self.rotation.inverse();
        Pose {
            rotation: inv_rot,
            translation: -(inv_rot.transform_vector(&self.translation)),
        }
    }

    /// Apply the transform to a point.
    pub fn transform_point(&self, p: &Vector3<f64>) -> Vector3<f64> {
        self.rotation.transform_vector(p) + self.translation
    }
}

impl Default for Pose {
    fn default() -> Self {
        Self::identity()
    }
}
