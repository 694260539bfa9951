//! Frame coordination: sequences the per-frame pipeline and collects
//! outputs for publication.
//!
//! Per frame the coordinator runs
//! `Idle -> IntrinsicsPrepared -> PerClassDetectionLoop -> Aggregated ->
//! Published -> Idle`; it owns no business logic beyond that sequencing.
//! The only state crossing frames is the marker bookkeeping.

pub mod aggregator;
pub mod depth;
pub mod result;
pub mod transformer;

use std::collections::HashMap;

use anyhow::Result;
use tracing::{debug, info};

use crate::camera::CameraModel;
use crate::config::PipelineConfig;
use crate::detector::ObjectDetector;
use crate::error::PipelineError;
use crate::io::SyncedFrame;
use crate::viz::markers::{markers_for_detection, Marker, MarkerStateTracker};
use crate::viz::overlay;

use aggregator::DetectionAggregator;
use depth::DepthRefiner;

pub use depth::CLOSEST_Z_SENTINEL_M;
pub use result::{ClosestPose, FramePublication, FrameResult, RefinedDetection};

/// Stage of the per-frame sequence, for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStage {
    Idle,
    IntrinsicsPrepared,
    PerClassDetectionLoop,
    Aggregated,
    Published,
}

impl Default for FrameStage {
    fn default() -> Self {
        Self::Idle
    }
}

/// Orchestrates the pose pipeline over synchronized frames.
pub struct FrameCoordinator {
    config: PipelineConfig,
    detectors: HashMap<String, Box<dyn ObjectDetector>>,
    marker_state: MarkerStateTracker,
    stage: FrameStage,
    frame_count: usize,
}

impl FrameCoordinator {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            detectors: HashMap::new(),
            marker_state: MarkerStateTracker::new(),
            stage: FrameStage::Idle,
            frame_count: 0,
        }
    }

    /// Attach the detector collaborator for a configured class.
    pub fn register_detector(
        &mut self,
        class_name: &str,
        detector: Box<dyn ObjectDetector>,
    ) -> Result<(), PipelineError> {
        if self.config.classes.get(class_name).is_none() {
            return Err(PipelineError::ClassLookup {
                name: class_name.to_string(),
            });
        }
        self.detectors.insert(class_name.to_string(), detector);
        Ok(())
    }

    pub fn stage(&self) -> FrameStage {
        self.stage
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Process one synchronized frame to completion.
    ///
    /// A frame with zero detections in every class is still fully processed
    /// and published: empty detection array, deletion markers as needed,
    /// closest pose at its default.
    pub fn process_frame(&mut self, frame: &SyncedFrame) -> Result<FramePublication> {
        let config = &self.config;
        let detectors = &mut self.detectors;

        let camera = CameraModel::configure(
            &frame.camera,
            config.input_is_rectified,
            config.downscale_height,
        )?;
        self.stage = FrameStage::IntrinsicsPrepared;
        let scaled = camera.scale_image(&frame.color);

        let mut refiner = DepthRefiner::new(&camera, &frame.depth);
        let mut collector = DetectionAggregator::new(&camera, &config.classes);
        let mut beliefs = Vec::new();

        self.stage = FrameStage::PerClassDetectionLoop;
        for class in config.classes.iter() {
            let detector =
                detectors
                    .get_mut(&class.name)
                    .ok_or_else(|| PipelineError::MissingClassKey {
                        class: class.name.clone(),
                        key: "detector",
                    })?;

            let output = detector.detect(&scaled, &camera, &config.params)?;
            debug!(
                class = class.name.as_str(),
                candidates = output.candidates.len(),
                "class processed"
            );
            collector.accept(&class.name, &output.candidates, &mut refiner)?;

            if config.overlay_belief_images {
                if let Some(belief) = output.belief {
                    beliefs.push((class.name.clone(), belief));
                }
            }
        }

        self.stage = FrameStage::Aggregated;
        let detections = collector.into_detections();
        let closest = refiner.into_closest();

        let mut overlay_image = scaled;
        overlay::draw_detections(&mut overlay_image, &detections, &config.classes);

        let mut markers: Vec<Marker> = Vec::new();
        for (id, detection) in detections.iter().enumerate() {
            if let Some(class) = config.classes.get(&detection.class_name) {
                markers.extend(markers_for_detection(detection, class, id as u32));
            }
        }
        // Marker state mutates only after all per-class work for the frame.
        markers.extend(self.marker_state.reconcile(detections.len()));

        self.stage = FrameStage::Published;
        self.frame_count += 1;
        info!(
            frame = self.frame_count,
            detections = detections.len(),
            closest_refined = closest.refined,
            "frame published"
        );

        let publication = FramePublication {
            timestamp_ns: frame.timestamp_ns,
            result: FrameResult { detections, closest },
            markers,
            overlay: overlay_image,
            camera_matrix: *camera.k(),
            beliefs,
        };

        self.stage = FrameStage::Idle;
        Ok(publication)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::RawCameraInfo;
    use crate::detector::ReplayDetector;
    use crate::io::DepthImage;
    use crate::viz::markers::MarkerAction;
    use approx::assert_relative_eq;
    use image::RgbImage;
    use nalgebra::Matrix3;

    const CONFIG_YAML: &str = r#"
downscale_height: 64
classes:
  mug:
    weights: weights/mug.pth
    dimensions: [10.0, 8.0, 12.0]
    class_id: 1
"#;

    fn frame() -> SyncedFrame {
        SyncedFrame {
            timestamp_ns: 0,
            color: RgbImage::new(64, 64),
            depth: DepthImage::from_pixel(64, 64, image::Luma([800])),
            camera: RawCameraInfo {
                k: Matrix3::new(100.0, 0.0, 32.0, 0.0, 100.0, 32.0, 0.0, 0.0, 1.0),
                p: None,
                distortion: Vec::new(),
                width: 64,
                height: 64,
            },
        }
    }

    fn coordinator_with_frames(
        frames: Vec<Vec<crate::detector::RawDetection>>,
    ) -> FrameCoordinator {
        let config = PipelineConfig::from_yaml_str(CONFIG_YAML).unwrap();
        let mut coordinator = FrameCoordinator::new(config);
        coordinator
            .register_detector("mug", Box::new(ReplayDetector::from_frames(frames)))
            .unwrap();
        coordinator
    }

    #[test]
    fn test_empty_frame_is_still_published() {
        let mut coordinator = coordinator_with_frames(vec![vec![]]);
        let publication = coordinator.process_frame(&frame()).unwrap();

        assert!(publication.result.detections.is_empty());
        assert!(!publication.result.closest.refined);
        assert!(publication.markers.is_empty());
        assert_eq!(coordinator.stage(), FrameStage::Idle);
    }

    #[test]
    fn test_retraction_after_detections_disappear() {
        use crate::pipeline::aggregator::raw_at;

        let mut coordinator = coordinator_with_frames(vec![
            vec![
                raw_at(0.0, 0.0, 60.0, 0.9),
                raw_at(5.0, 0.0, 70.0, 0.8),
                raw_at(-5.0, 0.0, 80.0, 0.7),
            ],
            vec![],
        ]);

        let first = coordinator.process_frame(&frame()).unwrap();
        assert_eq!(first.result.detections.len(), 3);
        assert!(first
            .markers
            .iter()
            .all(|m| m.action == MarkerAction::Add));

        let second = coordinator.process_frame(&frame()).unwrap();
        assert!(second.result.detections.is_empty());
        // Only retractions: ids 0..3 across the three namespaces.
        assert_eq!(second.markers.len(), 9);
        assert!(second
            .markers
            .iter()
            .all(|m| m.action == MarkerAction::Delete));
    }

    #[test]
    fn test_unregistered_class_fails_frame() {
        let config = PipelineConfig::from_yaml_str(CONFIG_YAML).unwrap();
        let mut coordinator = FrameCoordinator::new(config);

        let err = coordinator.process_frame(&frame()).unwrap_err();
        let pipeline_err = err.downcast_ref::<PipelineError>().unwrap();
        assert!(matches!(
            pipeline_err,
            PipelineError::MissingClassKey { key: "detector", .. }
        ));
    }

    #[test]
    fn test_register_detector_rejects_unknown_class() {
        let config = PipelineConfig::from_yaml_str(CONFIG_YAML).unwrap();
        let mut coordinator = FrameCoordinator::new(config);
        assert!(matches!(
            coordinator.register_detector("teapot", Box::<ReplayDetector>::default()),
            Err(PipelineError::ClassLookup { .. })
        ));
    }

    #[test]
    fn test_closest_pose_uses_depth_not_detector_location() {
        use crate::pipeline::aggregator::raw_at;

        // Detector says 0.66 m (plus offset), depth image says 0.8 m.
        let mut coordinator = coordinator_with_frames(vec![vec![raw_at(0.0, 0.0, 60.0, 0.9)]]);
        let publication = coordinator.process_frame(&frame()).unwrap();

        let closest = &publication.result.closest;
        assert!(closest.refined);
        assert_relative_eq!(closest.pose.translation.z, 0.8, epsilon = 1e-9);
        // The published per-object pose keeps the detector-derived position.
        assert_relative_eq!(
            publication.result.detections[0].pose.translation.z,
            0.66,
            epsilon = 1e-12
        );
    }
}
