//! Per-frame pipeline outputs.
//!
//! These types describe what the pipeline publishes for a single
//! synchronized frame: the accepted detections in order, the single
//! depth-refined closest pose, and the visualization payload.

use image::RgbImage;
use nalgebra::{Matrix3, Vector2, Vector3};

use crate::detector::CUBOID_VERTEX_COUNT;
use crate::geometry::Pose;
use crate::viz::markers::Marker;

/// One accepted detection after reference correction, unit conversion, and
/// surface offset. This is the unit published downstream.
#[derive(Debug, Clone)]
pub struct RefinedDetection {
    pub class_name: String,
    pub class_id: u32,
    pub score: f64,
    /// Object pose in meters, camera frame.
    pub pose: Pose,
    /// Corrected bounding dimensions in centimeters.
    pub dimensions_cm: Vector3<f64>,
    /// Projected 2D centroid in scaled-image pixels; absent when the offset
    /// position lies behind the image plane.
    pub centroid_px: Option<Vector2<f64>>,
    /// Projected cuboid corners as reported by the detector.
    pub cuboid_px: [Option<Vector2<f64>>; CUBOID_VERTEX_COUNT],
}

impl RefinedDetection {
    /// Whether all eight projected corners were resolved. Drawing and box
    /// markers require the full cuboid; publication does not.
    pub fn has_full_cuboid(&self) -> bool {
        self.cuboid_px.iter().all(|c| c.is_some())
    }

    /// Human-readable dimension string, centimeters.
    pub fn dimensions_label(&self) -> String {
        format!(
            "{:.1} x {:.1} x {:.1} cm",
            self.dimensions_cm.x, self.dimensions_cm.y, self.dimensions_cm.z
        )
    }
}

/// The single nearest valid object across every class in the frame, after
/// depth-based re-estimation.
#[derive(Debug, Clone)]
pub struct ClosestPose {
    pub pose: Pose,
    /// False when no detection passed the depth-bounds check; the pose is
    /// then the zeroed default.
    pub refined: bool,
}

impl Default for ClosestPose {
    fn default() -> Self {
        Self {
            pose: Pose::identity(),
            refined: false,
        }
    }
}

/// Ordered detection set for one frame (per-class, then per-candidate
/// order), plus the frame's closest-by-depth pose.
#[derive(Debug, Clone, Default)]
pub struct FrameResult {
    pub detections: Vec<RefinedDetection>,
    pub closest: ClosestPose,
}

/// Everything published for one processed frame.
#[derive(Debug, Clone)]
pub struct FramePublication {
    pub timestamp_ns: u64,
    pub result: FrameResult,
    /// Add markers for this frame's detections plus explicit deletions for
    /// markers retracted since the previous frame.
    pub markers: Vec<Marker>,
    /// Color frame (at processing scale) with cuboid overlays drawn.
    pub overlay: RgbImage,
    /// Camera matrix the frame was processed with, echoed for consumers.
    pub camera_matrix: Matrix3<f64>,
    /// Per-class belief/debug images, present only when configured and the
    /// detector produced one.
    pub beliefs: Vec<(String, RgbImage)>,
}
