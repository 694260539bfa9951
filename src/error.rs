//! Error taxonomy for configuration and per-frame processing.
//!
//! Degenerate geometry (non-positive projection depth, missing cuboid
//! corners) and absent optional configuration are not errors: those paths
//! substitute documented defaults or skip the affected step and the frame is
//! still published.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// An object class is unusable without this key; startup must fail or
    /// the class must be excluded entirely, never processed with defaults.
    #[error("object class `{class}` is missing required key `{key}`")]
    MissingClassKey { class: String, key: &'static str },

    /// A detection named a class with no configured identifier. This is a
    /// detector/configuration contract violation, not a per-frame condition
    /// to swallow.
    #[error("detection reported unknown object class `{name}`")]
    ClassLookup { name: String },

    /// The camera matrix could not be inverted at configure time.
    #[error("camera matrix is singular and cannot be inverted")]
    SingularIntrinsics,
}
