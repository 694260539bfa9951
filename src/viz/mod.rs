//! Visualization outputs: marker primitives, stale-marker reconciliation,
//! and cuboid overlays. The rendering transport is external.

pub mod markers;
pub mod overlay;

pub use markers::{Marker, MarkerAction, MarkerKind, MarkerNamespace, MarkerStateTracker};
