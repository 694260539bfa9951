//! Geometry utilities: rigid-body poses and quaternion helpers.

pub mod pose;
pub mod quat;

pub use pose::Pose;
pub use quat::{quaternion_from_matrix, rotate_dimensions};
