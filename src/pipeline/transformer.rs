//! Reference-frame correction of raw detector output.
//!
//! Each object class carries a fixed rotation aligning the detector's native
//! object-local axes to the published convention. Both corrections are pure
//! functions of the class configuration.

use nalgebra::{UnitQuaternion, Vector3};

use crate::geometry::rotate_dimensions;

/// Corrected orientation: the class reference rotation applied in the
/// object-local frame, after the model orientation.
pub fn correct_orientation(
    q_raw: &UnitQuaternion<f64>,
    q_ref: &UnitQuaternion<f64>,
) -> UnitQuaternion<f64> {
    q_raw * q_ref
}

/// Corrected bounding dimensions for the class reference rotation.
///
/// Exact only for axis-aligned 90-degree-multiple corrections; see
/// [`rotate_dimensions`] for the limitation on skewed references.
pub fn correct_dimensions(
    dims_cm: &Vector3<f64>,
    q_ref: &UnitQuaternion<f64>,
) -> Vector3<f64> {
    rotate_dimensions(q_ref, dims_cm)
}
