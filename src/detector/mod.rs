//! External detector seam.
//!
//! The neural belief-map detector and its PnP stage are collaborators: they
//! consume a color frame and produce candidate 6D poses in model space plus
//! the projected cuboid corners. This module defines the typed boundary the
//! pipeline consumes; it does not reimplement detection.

pub mod replay;

use image::RgbImage;
use nalgebra::{UnitQuaternion, Vector2, Vector3};

use crate::camera::CameraModel;
use crate::config::DetectionParams;

pub use replay::ReplayDetector;

/// Number of projected cuboid corners per candidate.
pub const CUBOID_VERTEX_COUNT: usize = 8;

/// One candidate object from the detector, in model space.
///
/// Locations are centimeters; individual cuboid corners may be unresolved
/// when their belief peaks were not found.
#[derive(Debug, Clone)]
pub struct RawDetection {
    pub location_cm: Option<Vector3<f64>>,
    pub orientation: UnitQuaternion<f64>,
    pub cuboid_px: [Option<Vector2<f64>>; CUBOID_VERTEX_COUNT],
    pub score: f64,
}

/// Detector output for one class on one frame.
#[derive(Debug, Clone, Default)]
pub struct DetectionOutput {
    pub candidates: Vec<RawDetection>,
    /// Debug belief visualization, produced only when requested.
    pub belief: Option<RgbImage>,
}

/// Per-class detector collaborator. Implementations hold their own network
/// weights; the camera model carries the intrinsics the PnP stage needs.
pub trait ObjectDetector {
    fn detect(
        &mut self,
        image: &RgbImage,
        camera: &CameraModel,
        params: &DetectionParams,
    ) -> anyhow::Result<DetectionOutput>;
}
