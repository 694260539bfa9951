//! Visualization marker primitives and cross-frame marker bookkeeping.
//!
//! Marker stream layout, one entry per accepted detection:
//!     boxes/<id>   - cube sized to the corrected dimensions
//!     labels/<id>  - class-name text at the object pose
//!     meshes/<id>  - class mesh, only for classes that configure one
//!
//! Markers are data; the transport that renders them is external. Stale
//! entries from the previous frame are retracted with explicit Delete
//! markers so no overlay outlives its detection.

use nalgebra::Vector3;

use crate::config::ObjectClassConfig;
use crate::geometry::Pose;
use crate::pipeline::result::RefinedDetection;

/// The three fixed marker namespaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerNamespace {
    BoundingBox,
    Label,
    Mesh,
}

impl MarkerNamespace {
    pub const ALL: [MarkerNamespace; 3] = [
        MarkerNamespace::BoundingBox,
        MarkerNamespace::Label,
        MarkerNamespace::Mesh,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            MarkerNamespace::BoundingBox => "boxes",
            MarkerNamespace::Label => "labels",
            MarkerNamespace::Mesh => "meshes",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerAction {
    Add,
    Delete,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MarkerKind {
    Cube,
    Text,
    Mesh { uri: String },
}

/// One visualization primitive.
#[derive(Debug, Clone)]
pub struct Marker {
    pub namespace: MarkerNamespace,
    pub id: u32,
    pub action: MarkerAction,
    pub kind: MarkerKind,
    pub pose: Pose,
    pub scale: Vector3<f64>,
    /// RGBA, 0-255.
    pub color: [u8; 4],
    /// Label text; empty for non-text markers.
    pub text: String,
}

impl Marker {
    /// Explicit retraction of a previously published marker id.
    pub fn delete(namespace: MarkerNamespace, id: u32) -> Self {
        Self {
            namespace,
            id,
            action: MarkerAction::Delete,
            kind: MarkerKind::Cube,
            pose: Pose::identity(),
            scale: Vector3::zeros(),
            color: [0, 0, 0, 0],
            text: String::new(),
        }
    }
}

const BOX_ALPHA: u8 = 128;
const CM_TO_M: f64 = 1e-2;

/// Build the Add markers for one accepted detection.
///
/// Always a cube and a label (the pose is published even when cuboid
/// corners are missing); a mesh only when the class configures one
/// (absence is not an error).
pub fn markers_for_detection(
    detection: &RefinedDetection,
    class: &ObjectClassConfig,
    id: u32,
) -> Vec<Marker> {
    let [r, g, b] = class.color;
    let mut markers = Vec::with_capacity(3);

    markers.push(Marker {
        namespace: MarkerNamespace::BoundingBox,
        id,
        action: MarkerAction::Add,
        kind: MarkerKind::Cube,
        pose: detection.pose.clone(),
        scale: detection.dimensions_cm * CM_TO_M,
        color: [r, g, b, BOX_ALPHA],
        text: String::new(),
    });

    markers.push(Marker {
        namespace: MarkerNamespace::Label,
        id,
        action: MarkerAction::Add,
        kind: MarkerKind::Text,
        pose: detection.pose.clone(),
        scale: Vector3::new(0.0, 0.0, 0.05),
        color: [255, 255, 255, 255],
        text: format!("{} ({:.2})", detection.class_name, detection.score),
    });

    if let Some(mesh) = &class.mesh {
        markers.push(Marker {
            namespace: MarkerNamespace::Mesh,
            id,
            action: MarkerAction::Add,
            kind: MarkerKind::Mesh {
                uri: mesh.uri.clone(),
            },
            pose: detection.pose.clone(),
            scale: Vector3::new(mesh.scale, mesh.scale, mesh.scale),
            color: [r, g, b, 255],
            text: String::new(),
        });
    }

    markers
}

/// Previous-frame marker count; the only state that crosses frames.
#[derive(Debug, Default)]
pub struct MarkerStateTracker {
    previous_count: usize,
}

impl MarkerStateTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Retract markers the current frame no longer covers and record the new
    /// count. The count updates unconditionally, including to zero.
    pub fn reconcile(&mut self, current_count: usize) -> Vec<Marker> {
        let mut deletions = Vec::new();
        for id in current_count..self.previous_count {
            for namespace in MarkerNamespace::ALL {
                deletions.push(Marker::delete(namespace, id as u32));
            }
        }
        self.previous_count = current_count;
        deletions
    }

    pub fn previous_count(&self) -> usize {
        self.previous_count
    }
}
