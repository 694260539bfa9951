//! Pipeline configuration: per-class records, detection thresholds, and
//! global options.
//!
//! Every per-class attribute lives in a single `ObjectClassConfig` record
//! keyed through `ClassTable`, so name->id, name->dimensions, name->color and
//! friends cannot drift out of sync. All records are built once at startup
//! and immutable afterwards.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::fs::File;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use nalgebra::{Matrix4, UnitQuaternion, Vector3};
use serde::Deserialize;
use tracing::warn;

use crate::error::PipelineError;
use crate::geometry::quaternion_from_matrix;

/// Detection thresholds handed to the external detector.
///
/// Explicit struct with documented defaults; unrecognized options are a
/// deserialization error rather than silently ignored attributes.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DetectionParams {
    /// Minimum belief-map value for a cuboid vertex peak.
    pub vertex_threshold: f64,
    /// Minimum affinity-field magnitude along a cuboid edge.
    pub edge_threshold: f64,
    /// Minimum aggregate belief for a candidate object face.
    pub face_threshold: f64,
    /// Temperature applied to belief maps before peak extraction.
    pub softmax_temperature: f64,
    /// Local-maximum acceptance threshold during peak extraction.
    pub peak_threshold: f64,
    /// Maximum angular deviation (radians) between a vertex-to-centroid
    /// affinity vector and the candidate direction.
    pub angle_threshold: f64,
    /// Standard deviation (pixels) of the Gaussian used to smooth belief
    /// maps before peak extraction.
    pub gaussian_sigma: f64,
}

impl Default for DetectionParams {
    fn default() -> Self {
        Self {
            vertex_threshold: 0.01,
            edge_threshold: 0.01,
            face_threshold: 0.5,
            softmax_temperature: 1.0,
            peak_threshold: 0.1,
            angle_threshold: 0.5,
            gaussian_sigma: 3.0,
        }
    }
}

/// Optional mesh attached to a class for visualization.
#[derive(Debug, Clone, Deserialize)]
pub struct MeshResource {
    /// Resource locator understood by the downstream viewer.
    pub uri: String,
    /// Uniform scale applied to the mesh; 1.0 when unset.
    #[serde(default = "default_mesh_scale")]
    pub scale: f64,
}

fn default_mesh_scale() -> f64 {
    1.0
}

/// Immutable per-class configuration.
#[derive(Debug, Clone)]
pub struct ObjectClassConfig {
    pub name: String,
    /// Path to the detector weights for this class.
    pub weights: PathBuf,
    /// Nominal bounding dimensions (length, width, height) in centimeters.
    pub dimensions_cm: Vector3<f64>,
    /// Numeric identifier used in published detection records.
    pub class_id: u32,
    /// Reference-frame correction aligning detector-local axes to the
    /// output convention. Identity when not configured.
    pub model_transform: UnitQuaternion<f64>,
    /// Display color (RGB).
    pub color: [u8; 3],
    pub mesh: Option<MeshResource>,
}

/// All object classes, with consistent bidirectional name/id lookup.
#[derive(Debug, Clone, Default)]
pub struct ClassTable {
    classes: Vec<ObjectClassConfig>,
    by_name: HashMap<String, usize>,
    by_id: HashMap<u32, usize>,
}

impl ClassTable {
    pub fn new(classes: Vec<ObjectClassConfig>) -> Self {
        let mut by_name = HashMap::new();
        let mut by_id = HashMap::new();
        for (idx, class) in classes.iter().enumerate() {
            by_name.insert(class.name.clone(), idx);
            by_id.insert(class.class_id, idx);
        }
        Self {
            classes,
            by_name,
            by_id,
        }
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ObjectClassConfig> {
        self.classes.iter()
    }

    pub fn get(&self, name: &str) -> Option<&ObjectClassConfig> {
        self.by_name.get(name).map(|&idx| &self.classes[idx])
    }

    pub fn get_by_id(&self, id: u32) -> Option<&ObjectClassConfig> {
        self.by_id.get(&id).map(|&idx| &self.classes[idx])
    }

    /// Identifier for a class name; a miss is a detector/configuration
    /// contract violation and propagates as an error.
    pub fn id_for(&self, name: &str) -> Result<u32, PipelineError> {
        self.get(name)
            .map(|c| c.class_id)
            .ok_or_else(|| PipelineError::ClassLookup {
                name: name.to_string(),
            })
    }
}

/// Top-level pipeline configuration.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub classes: ClassTable,
    pub params: DetectionParams,
    /// Whether the transport delivers rectified images (camera matrix taken
    /// from the projection matrix, zero distortion).
    pub input_is_rectified: bool,
    /// Frames taller than this are downscaled before processing.
    pub downscale_height: u32,
    /// Publish per-class belief/debug images alongside the overlay.
    pub overlay_belief_images: bool,
}

#[derive(Debug, Deserialize)]
struct RawClassConfig {
    weights: Option<PathBuf>,
    dimensions: Option<[f64; 3]>,
    class_id: Option<u32>,
    /// Row-major 4x4 reference transform; converted to a quaternion.
    model_transform: Option<[[f64; 4]; 4]>,
    color: Option<[u8; 3]>,
    mesh: Option<MeshResource>,
}

#[derive(Debug, Deserialize)]
struct RawPipelineConfig {
    #[serde(default = "default_rectified")]
    input_is_rectified: bool,
    #[serde(default = "default_downscale_height")]
    downscale_height: u32,
    #[serde(default)]
    overlay_belief_images: bool,
    #[serde(default)]
    params: DetectionParams,
    classes: HashMap<String, RawClassConfig>,
}

fn default_rectified() -> bool {
    true
}

fn default_downscale_height() -> u32 {
    500
}

impl PipelineConfig {
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file =
            File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
        let raw: RawPipelineConfig = serde_yaml::from_reader(file)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        Self::from_raw(raw)
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let raw: RawPipelineConfig = serde_yaml::from_str(yaml)?;
        Self::from_raw(raw)
    }

    fn from_raw(raw: RawPipelineConfig) -> Result<Self> {
        let mut names: Vec<&String> = raw.classes.keys().collect();
        names.sort();

        let mut classes = Vec::with_capacity(names.len());
        for name in names {
            let class = &raw.classes[name];
            classes.push(validate_class(name, class)?);
        }

        Ok(Self {
            classes: ClassTable::new(classes),
            params: raw.params,
            input_is_rectified: raw.input_is_rectified,
            downscale_height: raw.downscale_height,
            overlay_belief_images: raw.overlay_belief_images,
        })
    }
}

fn validate_class(name: &str, raw: &RawClassConfig) -> Result<ObjectClassConfig, PipelineError> {
    let missing = |key| PipelineError::MissingClassKey {
        class: name.to_string(),
        key,
    };

    let weights = raw.weights.clone().ok_or_else(|| missing("weights"))?;
    let dims = raw.dimensions.ok_or_else(|| missing("dimensions"))?;
    let class_id = raw.class_id.ok_or_else(|| missing("class_id"))?;

    let model_transform = match raw.model_transform {
        Some(rows) => {
            let mut m = Matrix4::zeros();
            for (r, row) in rows.iter().enumerate() {
                for (c, value) in row.iter().enumerate() {
                    m[(r, c)] = *value;
                }
            }
            quaternion_from_matrix(&m)
        }
        None => UnitQuaternion::identity(),
    };

    let color = raw.color.unwrap_or_else(|| {
        let fallback = fallback_color(name);
        warn!(
            class = name,
            "no draw color configured, using deterministic fallback {:?}", fallback
        );
        fallback
    });

    Ok(ObjectClassConfig {
        name: name.to_string(),
        weights,
        dimensions_cm: Vector3::new(dims[0], dims[1], dims[2]),
        class_id,
        model_transform,
        color,
        mesh: raw.mesh.clone(),
    })
}

/// Deterministic per-name fallback color, stable across runs.
fn fallback_color(name: &str) -> [u8; 3] {
    let mut hasher = DefaultHasher::new();
    name.hash(&mut hasher);
    let h = hasher.finish();
    // Keep channels away from full black so overlays stay visible.
    [
        64 + (h & 0xBF) as u8,
        64 + ((h >> 8) & 0xBF) as u8,
        64 + ((h >> 16) & 0xBF) as u8,
    ]
}
