//! Depth-based 3D re-estimation and closest-object arbitration.
//!
//! For each corrected pose the refiner projects the surface-offset position
//! into the depth image, samples the raw millimeter value at that pixel,
//! and back-projects to a metric camera-frame point. A single running
//! minimum over the refined z across the whole frame (all classes, all
//! candidates) selects the one closest pose the frame publishes.

use nalgebra::Vector3;

use crate::camera::CameraModel;
use crate::geometry::Pose;
use crate::io::DepthImage;
use crate::pipeline::result::ClosestPose;

/// Initial value of the running minimum; only refined positions strictly
/// nearer than this are ever selected.
pub const CLOSEST_Z_SENTINEL_M: f64 = 1.0;

/// Translate a pose along its local z-axis by half the object height, via
/// full homogeneous composition.
pub fn surface_offset(pose: &Pose, height_m: f64) -> Pose {
    let lift = Pose {
        rotation: nalgebra::UnitQuaternion::identity(),
        translation: Vector3::new(0.0, 0.0, height_m / 2.0),
    };
    pose.compose(&lift)
}

/// Per-frame depth refiner; create one per frame, feed it every candidate,
/// then take the closest pose.
pub struct DepthRefiner<'a> {
    camera: &'a CameraModel,
    depth: &'a DepthImage,
    min_z: f64,
    closest: Option<Pose>,
}

impl<'a> DepthRefiner<'a> {
    pub fn new(camera: &'a CameraModel, depth: &'a DepthImage) -> Self {
        Self {
            camera,
            depth,
            min_z: CLOSEST_Z_SENTINEL_M,
            closest: None,
        }
    }

    /// Attempt a depth-based re-estimation of the (already offset) pose.
    ///
    /// Returns the refined camera-frame position when the projected pixel
    /// falls strictly inside the depth image; out-of-bounds projections are
    /// skipped, not errors. A refined position strictly nearer than the
    /// current minimum becomes the frame's closest pose.
    pub fn refine(&mut self, pose: &Pose) -> Option<Vector3<f64>> {
        let uv = self.camera.project(&pose.translation)?;

        let width = f64::from(self.depth.width());
        let height = f64::from(self.depth.height());
        if uv.x <= 0.0 || uv.x >= width || uv.y <= 0.0 || uv.y >= height {
            return None;
        }

        let depth_mm = self.depth.get_pixel(uv.x as u32, uv.y as u32)[0];
        let refined = self.camera.back_project(&uv, f64::from(depth_mm));

        if refined.z < self.min_z {
            self.min_z = refined.z;
            self.closest = Some(Pose {
                rotation: pose.rotation,
                translation: refined,
            });
        }

        Some(refined)
    }

    /// The frame's closest pose; the zeroed default when nothing qualified.
    pub fn into_closest(self) -> ClosestPose {
        match self.closest {
            Some(pose) => ClosestPose {
                pose,
                refined: true,
            },
            None => ClosestPose::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::RawCameraInfo;
    use approx::assert_relative_eq;
    use nalgebra::{Matrix3, UnitQuaternion};
    use std::f64::consts::FRAC_PI_2;

    fn camera() -> CameraModel {
        let info = RawCameraInfo {
            k: Matrix3::new(100.0, 0.0, 32.0, 0.0, 100.0, 32.0, 0.0, 0.0, 1.0),
            p: None,
            distortion: Vec::new(),
            width: 64,
            height: 64,
        };
        CameraModel::configure(&info, false, 64).unwrap()
    }

    fn uniform_depth(depth_mm: u16) -> DepthImage {
        DepthImage::from_pixel(64, 64, image::Luma([depth_mm]))
    }

    fn pose_at(x: f64, y: f64, z: f64) -> Pose {
        Pose {
            rotation: UnitQuaternion::identity(),
            translation: Vector3::new(x, y, z),
        }
    }

    #[test]
    fn test_surface_offset_identity_orientation_lifts_z() {
        let offset = surface_offset(&pose_at(0.5, 0.0, 1.0), 0.12);
        assert_relative_eq!(
            offset.translation,
            Vector3::new(0.5, 0.0, 1.06),
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_surface_offset_follows_local_axis() {
        // With the object rolled 90 degrees about x, its local z points
        // along camera -y.
        let pose = Pose {
            rotation: UnitQuaternion::from_axis_angle(&Vector3::x_axis(), FRAC_PI_2),
            translation: Vector3::new(0.0, 0.0, 1.0),
        };
        let offset = surface_offset(&pose, 0.2);
        assert_relative_eq!(
            offset.translation,
            Vector3::new(0.0, -0.1, 1.0),
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_refine_selects_minimum_z_candidate() {
        let camera = camera();
        let depth = uniform_depth(800);
        let mut refiner = DepthRefiner::new(&camera, &depth);

        // All candidates project near the center; uniform depth gives every
        // refined point z = 0.8 m, so the first one wins and later equal-z
        // candidates do not replace it.
        let first = pose_at(0.01, 0.0, 0.9);
        let second = pose_at(-0.01, 0.0, 0.5);
        refiner.refine(&first).unwrap();
        refiner.refine(&second).unwrap();

        let closest = refiner.into_closest();
        assert!(closest.refined);
        assert_relative_eq!(closest.pose.translation.z, 0.8, epsilon = 1e-9);
    }

    #[test]
    fn test_refine_prefers_nearer_depth() {
        let camera = camera();
        let mut depth = uniform_depth(900);
        // A nearer depth reading on the right half of the image.
        for y in 0..64 {
            for x in 40..64 {
                depth.put_pixel(x, y, image::Luma([300]));
            }
        }
        let mut refiner = DepthRefiner::new(&camera, &depth);

        refiner.refine(&pose_at(0.0, 0.0, 1.0 - 1e-6)).unwrap(); // center, 0.9 m
        refiner.refine(&pose_at(0.15, 0.0, 1.0 - 1e-6)).unwrap(); // right, 0.3 m

        let closest = refiner.into_closest();
        assert!(closest.refined);
        assert_relative_eq!(closest.pose.translation.z, 0.3, epsilon = 1e-9);
    }

    #[test]
    fn test_candidates_beyond_sentinel_are_never_selected() {
        let camera = camera();
        let depth = uniform_depth(1500); // 1.5 m, beyond the 1.0 m sentinel
        let mut refiner = DepthRefiner::new(&camera, &depth);

        refiner.refine(&pose_at(0.0, 0.0, 0.9)).unwrap();

        let closest = refiner.into_closest();
        assert!(!closest.refined);
        assert_relative_eq!(closest.pose.translation, Vector3::zeros(), epsilon = 1e-12);
    }

    #[test]
    fn test_out_of_bounds_projection_is_skipped() {
        let camera = camera();
        let depth = uniform_depth(500);
        let mut refiner = DepthRefiner::new(&camera, &depth);

        // Projects far outside the 64x64 depth image.
        assert!(refiner.refine(&pose_at(5.0, 0.0, 1.0)).is_none());
        // Behind the camera.
        assert!(refiner.refine(&pose_at(0.0, 0.0, -1.0)).is_none());

        assert!(!refiner.into_closest().refined);
    }
}
