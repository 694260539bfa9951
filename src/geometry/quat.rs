//! Quaternion helpers: robust matrix conversion and dimension rotation.
//!
//! The trace-based matrix-to-quaternion formula divides by `4w` and breaks
//! down for rotations near 180 degrees where `w` approaches zero. The
//! conversion here selects the largest of the four quaternion components as
//! the division pivot, which is well-conditioned everywhere on SO(3).

use nalgebra::{Matrix4, Quaternion, UnitQuaternion, Vector3};

/// Convert the rotation block of a 4x4 homogeneous matrix to a unit
/// quaternion.
///
/// Uses the largest-pivot variant of Shepperd's method, so inputs with
/// `w ≈ 0` (half-turn rotations) are handled without loss of precision.
pub fn quaternion_from_matrix(m: &Matrix4<f64>) -> UnitQuaternion<f64> {
    let (r00, r01, r02) = (m[(0, 0)], m[(0, 1)], m[(0, 2)]);
    let (r10, r11, r12) = (m[(1, 0)], m[(1, 1)], m[(1, 2)]);
    let (r20, r21, r22) = (m[(2, 0)], m[(2, 1)], m[(2, 2)]);

    let trace = r00 + r11 + r22;

    let (w, x, y, z) = if trace > 0.0 {
        let s = (trace + 1.0).sqrt() * 2.0; // s = 4w
        (s / 4.0, (r21 - r12) / s, (r02 - r20) / s, (r10 - r01) / s)
    } else if r00 > r11 && r00 > r22 {
        let s = (1.0 + r00 - r11 - r22).sqrt() * 2.0; // s = 4x
        ((r21 - r12) / s, s / 4.0, (r01 + r10) / s, (r02 + r20) / s)
    } else if r11 > r22 {
        let s = (1.0 + r11 - r00 - r22).sqrt() * 2.0; // s = 4y
        ((r02 - r20) / s, (r01 + r10) / s, s / 4.0, (r12 + r21) / s)
    } else {
        let s = (1.0 + r22 - r00 - r11).sqrt() * 2.0; // s = 4z
        ((r10 - r01) / s, (r02 + r20) / s, (r12 + r21) / s, s / 4.0)
    };

    UnitQuaternion::from_quaternion(Quaternion::new(w, x, y, z))
}

/// Rotate a bounding-box dimension vector through a reference-frame
/// correction quaternion.
///
/// Computes `|q⁻¹ ⊗ (d, 0) ⊗ q|` component-wise. This yields a physically
/// correct permuted box only when `q` is a multiple of a 90-degree rotation
/// about a coordinate axis; skewed corrections give an approximation of the
/// axis-aligned extent, which callers accept as a known limitation.
pub fn rotate_dimensions(q: &UnitQuaternion<f64>, dims: &Vector3<f64>) -> Vector3<f64> {
    q.inverse_transform_vector(dims).abs()
}
