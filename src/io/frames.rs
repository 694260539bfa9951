//! Synchronized frame input.
//!
//! The transport delivering time-synchronized (color, depth, camera info)
//! triples is external; this module defines the typed boundary plus a
//! directory-replay source used by the demo binary and integration tests.
//! Color frames are 8-bit 3-channel, depth frames single-channel integer
//! millimeters.

use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use image::{ImageBuffer, Luma, RgbImage};
use nalgebra::{Matrix3, SMatrix};
use serde::Deserialize;

use crate::camera::RawCameraInfo;

/// Single-channel depth image, raw millimeter values.
pub type DepthImage = ImageBuffer<Luma<u16>, Vec<u16>>;

/// One time-synchronized input triple.
#[derive(Debug, Clone)]
pub struct SyncedFrame {
    pub timestamp_ns: u64,
    pub color: RgbImage,
    pub depth: DepthImage,
    pub camera: RawCameraInfo,
}

/// Source of synchronized frames.
pub trait FrameSource {
    /// Next frame, or `None` when the stream is exhausted.
    fn next_frame(&mut self) -> Result<Option<SyncedFrame>>;
}

/// Camera info sidecar (`camera.yaml`) for a replay directory.
#[derive(Debug, Deserialize)]
struct CameraInfoYaml {
    /// Row-major 3x3 intrinsic matrix.
    k: Vec<f64>,
    /// Row-major 3x4 rectified projection matrix, optional.
    p: Option<Vec<f64>>,
    #[serde(default)]
    distortion: Vec<f64>,
    width: u32,
    height: u32,
}

fn load_camera_info(path: &Path) -> Result<RawCameraInfo> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let raw: CameraInfoYaml = serde_yaml::from_reader(file)
        .with_context(|| format!("Failed to parse {}", path.display()))?;

    if raw.k.len() != 9 {
        anyhow::bail!("Expected 9 elements for camera matrix, got {}", raw.k.len());
    }
    let k = Matrix3::from_row_slice(&raw.k);

    let p = match &raw.p {
        Some(values) => {
            if values.len() != 12 {
                anyhow::bail!(
                    "Expected 12 elements for projection matrix, got {}",
                    values.len()
                );
            }
            Some(SMatrix::<f64, 3, 4>::from_row_slice(values))
        }
        None => None,
    };

    Ok(RawCameraInfo {
        k,
        p,
        distortion: raw.distortion,
        width: raw.width,
        height: raw.height,
    })
}

/// Replays `color_NNNNNN.png` / `depth_NNNNNN.png` pairs from a directory
/// with a shared `camera.yaml` sidecar.
pub struct DirectoryFrameSource {
    root: PathBuf,
    camera: RawCameraInfo,
    next_index: usize,
}

impl DirectoryFrameSource {
    pub fn new<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        let camera = load_camera_info(&root.join("camera.yaml"))?;
        Ok(Self {
            root,
            camera,
            next_index: 0,
        })
    }
}

impl FrameSource for DirectoryFrameSource {
    fn next_frame(&mut self) -> Result<Option<SyncedFrame>> {
        let index = self.next_index;
        let color_path = self.root.join(format!("color_{index:06}.png"));
        if !color_path.exists() {
            return Ok(None);
        }
        let depth_path = self.root.join(format!("depth_{index:06}.png"));

        let color = image::open(&color_path)
            .with_context(|| format!("Failed to read {}", color_path.display()))?
            .to_rgb8();
        let depth = image::open(&depth_path)
            .with_context(|| format!("Failed to read {}", depth_path.display()))?
            .to_luma16();

        self.next_index += 1;
        Ok(Some(SyncedFrame {
            timestamp_ns: index as u64,
            color,
            depth,
            camera: self.camera.clone(),
        }))
    }
}
