//! Replay detector: serves pre-recorded detections frame by frame.
//!
//! Useful for driving the pipeline without network weights, both from the
//! demo binary and from integration tests. The recording is one YAML
//! document per class listing candidate detections for consecutive frames.

use std::collections::VecDeque;
use std::fs::File;
use std::path::Path;

use anyhow::{Context, Result};
use image::RgbImage;
use nalgebra::{Quaternion, UnitQuaternion, Vector2, Vector3};
use serde::Deserialize;

use crate::camera::CameraModel;
use crate::config::DetectionParams;

use super::{DetectionOutput, ObjectDetector, RawDetection, CUBOID_VERTEX_COUNT};

/// Recorded candidate; quaternions are w-first, locations centimeters.
#[derive(Debug, Deserialize)]
struct RecordedDetection {
    location: Option<[f64; 3]>,
    #[serde(default = "identity_quat")]
    orientation: [f64; 4],
    #[serde(default)]
    cuboid: Vec<Option<[f64; 2]>>,
    #[serde(default)]
    score: f64,
}

fn identity_quat() -> [f64; 4] {
    [1.0, 0.0, 0.0, 0.0]
}

#[derive(Debug, Deserialize)]
struct RecordedFrame {
    #[serde(default)]
    detections: Vec<RecordedDetection>,
}

#[derive(Debug, Deserialize)]
struct Recording {
    frames: Vec<RecordedFrame>,
}

/// Detector collaborator that replays a recording.
#[derive(Debug, Default)]
pub struct ReplayDetector {
    frames: VecDeque<Vec<RawDetection>>,
}

impl ReplayDetector {
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file =
            File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
        let recording: Recording = serde_yaml::from_reader(file)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        Ok(Self::from_recording(recording))
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let recording: Recording = serde_yaml::from_str(yaml)?;
        Ok(Self::from_recording(recording))
    }

    /// Build a replay directly from per-frame candidate lists.
    pub fn from_frames<I>(frames: I) -> Self
    where
        I: IntoIterator<Item = Vec<RawDetection>>,
    {
        Self {
            frames: frames.into_iter().collect(),
        }
    }

    fn from_recording(recording: Recording) -> Self {
        let frames = recording
            .frames
            .into_iter()
            .map(|frame| frame.detections.iter().map(convert_detection).collect())
            .collect();
        Self { frames }
    }
}

fn convert_detection(rec: &RecordedDetection) -> RawDetection {
    let [w, x, y, z] = rec.orientation;
    let mut cuboid_px = [None; CUBOID_VERTEX_COUNT];
    for (slot, corner) in cuboid_px.iter_mut().zip(rec.cuboid.iter()) {
        *slot = corner.map(|[u, v]| Vector2::new(u, v));
    }
    RawDetection {
        location_cm: rec.location.map(|[x, y, z]| Vector3::new(x, y, z)),
        orientation: UnitQuaternion::from_quaternion(Quaternion::new(w, x, y, z)),
        cuboid_px,
        score: rec.score,
    }
}

impl ObjectDetector for ReplayDetector {
    fn detect(
        &mut self,
        _image: &RgbImage,
        _camera: &CameraModel,
        _params: &DetectionParams,
    ) -> Result<DetectionOutput> {
        let candidates = self.frames.pop_front().unwrap_or_default();
        Ok(DetectionOutput {
            candidates,
            belief: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::RawCameraInfo;
    use nalgebra::Matrix3;

    fn camera() -> CameraModel {
        let info = RawCameraInfo {
            k: Matrix3::new(100.0, 0.0, 2.0, 0.0, 100.0, 2.0, 0.0, 0.0, 1.0),
            p: None,
            distortion: Vec::new(),
            width: 4,
            height: 4,
        };
        CameraModel::configure(&info, false, 4).unwrap()
    }

    #[test]
    fn test_replay_serves_frames_in_order() {
        let yaml = r#"
frames:
  - detections:
      - location: [50.0, 0.0, 100.0]
        orientation: [1.0, 0.0, 0.0, 0.0]
        cuboid: [[10, 10], [20, 10], [20, 20], [10, 20], [12, 12], [22, 12], [22, 22], [12, 22]]
        score: 0.9
  - detections: []
"#;
        let mut detector = ReplayDetector::from_yaml_str(yaml).unwrap();
        let image = RgbImage::new(4, 4);
        let params = DetectionParams::default();

        let first = detector.detect(&image, &camera(), &params).unwrap();
        assert_eq!(first.candidates.len(), 1);
        let det = &first.candidates[0];
        assert_eq!(det.location_cm, Some(Vector3::new(50.0, 0.0, 100.0)));
        assert!(det.cuboid_px.iter().all(|c| c.is_some()));

        let second = detector.detect(&image, &camera(), &params).unwrap();
        assert!(second.candidates.is_empty());

        // Past the end of the recording the replay yields empty frames.
        let third = detector.detect(&image, &camera(), &params).unwrap();
        assert!(third.candidates.is_empty());
    }

    #[test]
    fn test_partial_cuboid_preserved_as_missing() {
        let yaml = r#"
frames:
  - detections:
      - location: [0.0, 0.0, 50.0]
        cuboid: [[10, 10], null, [20, 20]]
"#;
        let mut detector = ReplayDetector::from_yaml_str(yaml).unwrap();
        let out = detector
            .detect(&RgbImage::new(4, 4), &camera(), &DetectionParams::default())
            .unwrap();
        let det = &out.candidates[0];
        assert!(det.cuboid_px[0].is_some());
        assert!(det.cuboid_px[1].is_none());
        // Corners beyond the recorded list stay unresolved.
        assert!(det.cuboid_px[3].is_none());
    }
}
