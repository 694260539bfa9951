//! Pinhole camera model: intrinsics preparation, projection, and
//! depth-based back-projection.
//!
//! The model is configured once per frame from the transport's camera info.
//! After `configure`, the stored `K` always describes the image the pipeline
//! actually processes: when the incoming frame is taller than the downscale
//! target, both the image and the first two rows of `K` are scaled by the
//! same factor, so every 2D output is in scaled-image pixel coordinates.

use image::imageops::{self, FilterType};
use image::RgbImage;
use nalgebra::{Matrix3, SMatrix, Vector2, Vector3};

use crate::error::PipelineError;

/// Camera info as delivered by the external frame source.
///
/// `p` is the 3x4 rectified projection matrix, present only for rectified
/// streams; `k` is the raw intrinsic matrix.
#[derive(Debug, Clone)]
pub struct RawCameraInfo {
    pub k: Matrix3<f64>,
    pub p: Option<SMatrix<f64, 3, 4>>,
    pub distortion: Vec<f64>,
    pub width: u32,
    pub height: u32,
}

/// Configured pinhole model for one frame.
#[derive(Debug, Clone)]
pub struct CameraModel {
    k: Matrix3<f64>,
    k_inv: Matrix3<f64>,
    distortion: Vec<f64>,
    scale: f64,
}

impl CameraModel {
    /// Prepare intrinsics for the frame.
    ///
    /// For rectified input the camera matrix is the first three columns of
    /// the projection matrix `P` and distortion is zero; otherwise the raw
    /// `K` and distortion coefficients are used. If the image is taller than
    /// `downscale_target_height`, the focal lengths and principal point are
    /// scaled by `target / height`; the homogeneous third row is untouched.
    pub fn configure(
        info: &RawCameraInfo,
        rectified: bool,
        downscale_target_height: u32,
    ) -> Result<Self, PipelineError> {
        let (mut k, distortion) = if rectified {
            let p = info.p.unwrap_or_else(|| {
                let mut p = SMatrix::<f64, 3, 4>::zeros();
                p.fixed_view_mut::<3, 3>(0, 0).copy_from(&info.k);
                p
            });
            (p.fixed_view::<3, 3>(0, 0).into_owned(), Vec::new())
        } else {
            (info.k, info.distortion.clone())
        };

        let scale = if info.height > downscale_target_height {
            f64::from(downscale_target_height) / f64::from(info.height)
        } else {
            1.0
        };
        for row in 0..2 {
            for col in 0..3 {
                k[(row, col)] *= scale;
            }
        }

        let k_inv = k.try_inverse().ok_or(PipelineError::SingularIntrinsics)?;

        Ok(Self {
            k,
            k_inv,
            distortion,
            scale,
        })
    }

    /// The camera matrix of the processed (possibly downscaled) image.
    pub fn k(&self) -> &Matrix3<f64> {
        &self.k
    }

    /// Distortion coefficients (empty for rectified input).
    pub fn distortion(&self) -> &[f64] {
        &self.distortion
    }

    /// Factor applied to the incoming image, 1.0 when no downscale ran.
    pub fn scale(&self) -> f64 {
        self.scale
    }

    /// Resample the color frame to the scale the intrinsics describe.
    pub fn scale_image(&self, image: &RgbImage) -> RgbImage {
        if self.scale == 1.0 {
            return image.clone();
        }
        let width = (f64::from(image.width()) * self.scale).round() as u32;
        let height = (f64::from(image.height()) * self.scale).round() as u32;
        imageops::resize(image, width.max(1), height.max(1), FilterType::Triangle)
    }

    /// Project a camera-frame point to pixel coordinates.
    ///
    /// Returns `None` for points at or behind the image plane.
    pub fn project(&self, p: &Vector3<f64>) -> Option<Vector2<f64>> {
        if p.z <= 0.0 {
            return None;
        }
        let uvw = self.k * p;
        Some(Vector2::new(uvw.x / uvw.z, uvw.y / uvw.z))
    }

    /// Back-project a pixel with a millimeter depth sample to a 3D
    /// camera-frame point in meters.
    ///
    /// The result is only meaningful for pixels inside the depth image;
    /// callers bounds-check before sampling.
    pub fn back_project(&self, pixel: &Vector2<f64>, depth_mm: f64) -> Vector3<f64> {
        let depth_m = depth_mm * 1e-3;
        self.k_inv * (depth_m * Vector3::new(pixel.x, pixel.y, 1.0))
    }
}
