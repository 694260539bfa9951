use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::{info, warn};

use pose_fusion::config::PipelineConfig;
use pose_fusion::detector::ReplayDetector;
use pose_fusion::io::{DirectoryFrameSource, FrameSource};
use pose_fusion::pipeline::FrameCoordinator;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let config_path = args
        .next()
        .unwrap_or_else(|| "config/pipeline.yaml".to_string());
    let frames_dir = args.next().unwrap_or_else(|| "data/frames".to_string());
    let detections_dir = args
        .next()
        .unwrap_or_else(|| "data/detections".to_string());
    let out_dir = PathBuf::from(args.next().unwrap_or_else(|| "out".to_string()));

    let config = PipelineConfig::from_yaml_file(&config_path)?;
    info!(
        classes = config.classes.len(),
        rectified = config.input_is_rectified,
        "configuration loaded from {config_path}"
    );

    let mut coordinator = FrameCoordinator::new(config);

    // One recorded-detection replay per class; a class without a recording
    // gets an empty replay so its frames simply yield no candidates.
    let class_names: Vec<String> = coordinator
        .config()
        .classes
        .iter()
        .map(|c| c.name.clone())
        .collect();
    for name in class_names {
        let recording = PathBuf::from(&detections_dir).join(format!("{name}.yaml"));
        let detector = if recording.exists() {
            ReplayDetector::from_yaml_file(&recording)?
        } else {
            warn!(class = name.as_str(), "no recording found, replaying empty frames");
            ReplayDetector::default()
        };
        coordinator.register_detector(&name, Box::new(detector))?;
    }

    std::fs::create_dir_all(&out_dir)
        .with_context(|| format!("Failed to create {}", out_dir.display()))?;

    let mut source = DirectoryFrameSource::new(&frames_dir)?;
    let mut frame_index = 0usize;
    while let Some(frame) = source.next_frame()? {
        let publication = coordinator.process_frame(&frame)?;

        for detection in &publication.result.detections {
            info!(
                class = detection.class_name.as_str(),
                score = detection.score,
                dims = detection.dimensions_label().as_str(),
                "pose ({:.3}, {:.3}, {:.3}) m",
                detection.pose.translation.x,
                detection.pose.translation.y,
                detection.pose.translation.z,
            );
        }
        if publication.result.closest.refined {
            let p = &publication.result.closest.pose.translation;
            info!("closest object at ({:.3}, {:.3}, {:.3}) m", p.x, p.y, p.z);
        }

        let overlay_path = out_dir.join(format!("overlay_{frame_index:06}.png"));
        publication
            .overlay
            .save(&overlay_path)
            .with_context(|| format!("Failed to write {}", overlay_path.display()))?;
        frame_index += 1;
    }

    info!(frames = frame_index, "replay finished");
    Ok(())
}
