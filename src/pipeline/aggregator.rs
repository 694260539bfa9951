//! Aggregation of detector candidates into published detection records.
//!
//! For one frame the aggregator is fed each class's candidates in detector
//! order; the frame-level set keeps that insertion order (per class, then
//! per candidate). Depth refinement runs per accepted candidate but only
//! feeds the frame's closest-pose arbitration, never the published pose.

use crate::camera::CameraModel;
use crate::config::ClassTable;
use crate::detector::RawDetection;
use crate::error::PipelineError;
use crate::geometry::Pose;

use super::depth::{surface_offset, DepthRefiner};
use super::result::RefinedDetection;
use super::transformer::{correct_dimensions, correct_orientation};

const CM_TO_M: f64 = 1e-2;

/// Per-frame collector of accepted detections.
pub struct DetectionAggregator<'a> {
    camera: &'a CameraModel,
    classes: &'a ClassTable,
    detections: Vec<RefinedDetection>,
}

impl<'a> DetectionAggregator<'a> {
    pub fn new(camera: &'a CameraModel, classes: &'a ClassTable) -> Self {
        Self {
            camera,
            classes,
            detections: Vec::new(),
        }
    }

    /// Record one class's candidates.
    ///
    /// An unknown class name is a detector/configuration contract violation
    /// and fails the frame loudly. Candidates without a resolved location
    /// are skipped.
    pub fn accept(
        &mut self,
        class_name: &str,
        candidates: &[RawDetection],
        refiner: &mut DepthRefiner<'_>,
    ) -> Result<(), PipelineError> {
        let class = self
            .classes
            .get(class_name)
            .ok_or_else(|| PipelineError::ClassLookup {
                name: class_name.to_string(),
            })?;

        for candidate in candidates {
            let Some(location_cm) = candidate.location_cm else {
                continue;
            };

            let orientation = correct_orientation(&candidate.orientation, &class.model_transform);
            let dimensions_cm = correct_dimensions(&class.dimensions_cm, &class.model_transform);

            // Model-space centimeters to metric camera frame, then lift the
            // pose from the object center to its surface along local z.
            let centered = Pose {
                rotation: orientation,
                translation: location_cm * CM_TO_M,
            };
            let pose = surface_offset(&centered, dimensions_cm.z * CM_TO_M);

            // Depth re-estimation only arbitrates the closest-pose output.
            refiner.refine(&pose);

            let centroid_px = self.camera.project(&pose.translation);

            self.detections.push(RefinedDetection {
                class_name: class.name.clone(),
                class_id: class.class_id,
                score: candidate.score,
                pose,
                dimensions_cm,
                centroid_px,
                cuboid_px: candidate.cuboid_px,
            });
        }

        Ok(())
    }

    pub fn len(&self) -> usize {
        self.detections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }

    pub fn into_detections(self) -> Vec<RefinedDetection> {
        self.detections
    }
}

/// Identity-orientation raw detection helper for tests.
#[cfg(test)]
pub(crate) fn raw_at(x_cm: f64, y_cm: f64, z_cm: f64, score: f64) -> RawDetection {
    use crate::detector::CUBOID_VERTEX_COUNT;
    use nalgebra::{UnitQuaternion, Vector2, Vector3};

    RawDetection {
        location_cm: Some(Vector3::new(x_cm, y_cm, z_cm)),
        orientation: UnitQuaternion::identity(),
        cuboid_px: [Some(Vector2::new(0.0, 0.0)); CUBOID_VERTEX_COUNT],
        score,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::RawCameraInfo;
    use crate::config::PipelineConfig;
    use crate::io::DepthImage;
    use approx::assert_relative_eq;
    use nalgebra::{Matrix3, Vector3};

    const CONFIG_YAML: &str = r#"
classes:
  mug:
    weights: weights/mug.pth
    dimensions: [10.0, 8.0, 12.0]
    class_id: 1
  bottle:
    weights: weights/bottle.pth
    dimensions: [6.0, 6.0, 20.0]
    class_id: 2
"#;

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

    #[test]
    fn test_accept_converts_units_and_offsets_surface() {
        let camera = camera();
        let config = PipelineConfig::from_yaml_str(CONFIG_YAML).unwrap();
        let depth = DepthImage::new(64, 64);
        let mut refiner = DepthRefiner::new(&camera, &depth);
        let mut aggregator = DetectionAggregator::new(&camera, &config.classes);

        aggregator
            .accept("mug", &[raw_at(50.0, 0.0, 100.0, 0.9)], &mut refiner)
            .unwrap();

        let detections = aggregator.into_detections();
        assert_eq!(detections.len(), 1);
        let det = &detections[0];
        assert_eq!(det.class_id, 1);
        // (50, 0, 100) cm plus half of the 12 cm height along local z.
        assert_relative_eq!(
            det.pose.translation,
            Vector3::new(0.5, 0.0, 1.06),
            epsilon = 1e-12
        );
        assert_relative_eq!(det.dimensions_cm, Vector3::new(10.0, 8.0, 12.0), epsilon = 1e-12);
        assert!(det.centroid_px.is_some());
    }

    #[test]
    fn test_unknown_class_fails_loudly() {
        let camera = camera();
        let config = PipelineConfig::from_yaml_str(CONFIG_YAML).unwrap();
        let depth = DepthImage::new(64, 64);
        let mut refiner = DepthRefiner::new(&camera, &depth);
        let mut aggregator = DetectionAggregator::new(&camera, &config.classes);

        let err = aggregator
            .accept("teapot", &[raw_at(0.0, 0.0, 50.0, 0.5)], &mut refiner)
            .unwrap_err();
        assert!(matches!(err, PipelineError::ClassLookup { ref name } if name == "teapot"));
    }

    #[test]
    fn test_null_location_candidates_are_skipped() {
        let camera = camera();
        let config = PipelineConfig::from_yaml_str(CONFIG_YAML).unwrap();
        let depth = DepthImage::new(64, 64);
        let mut refiner = DepthRefiner::new(&camera, &depth);
        let mut aggregator = DetectionAggregator::new(&camera, &config.classes);

        let mut unresolved = raw_at(0.0, 0.0, 50.0, 0.5);
        unresolved.location_cm = None;

        aggregator
            .accept("mug", &[unresolved, raw_at(10.0, 0.0, 80.0, 0.7)], &mut refiner)
            .unwrap();
        assert_eq!(aggregator.len(), 1);
    }

    #[test]
    fn test_insertion_order_is_per_class_then_per_candidate() {
        let camera = camera();
        let config = PipelineConfig::from_yaml_str(CONFIG_YAML).unwrap();
        let depth = DepthImage::new(64, 64);
        let mut refiner = DepthRefiner::new(&camera, &depth);
        let mut aggregator = DetectionAggregator::new(&camera, &config.classes);

        aggregator
            .accept(
                "mug",
                &[raw_at(0.0, 0.0, 60.0, 0.9), raw_at(5.0, 0.0, 70.0, 0.8)],
                &mut refiner,
            )
            .unwrap();
        aggregator
            .accept("bottle", &[raw_at(-5.0, 0.0, 90.0, 0.7)], &mut refiner)
            .unwrap();

        let names: Vec<&str> = aggregator
            .detections
            .iter()
            .map(|d| d.class_name.as_str())
            .collect();
        assert_eq!(names, vec!["mug", "mug", "bottle"]);
        assert_relative_eq!(aggregator.detections[1].score, 0.8, epsilon = 1e-12);
    }
}
