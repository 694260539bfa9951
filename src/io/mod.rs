//! Frame input boundary: synchronized triples and replay sources.

pub mod frames;

pub use frames::{DepthImage, DirectoryFrameSource, FrameSource, SyncedFrame};
