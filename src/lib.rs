//! Depth-order sorting for Gaussian splat rendering.
//!
//! Splats are alpha-blended, so they must be drawn back to front. This crate
//! keeps a full per-splat ordering current as the camera moves, computing it
//! on a dedicated thread with a quantized-depth counting sort and handing
//! ordering buffers back and forth by move.

pub mod camera;
pub mod config;
pub mod math;
pub mod scene;
pub mod sort;

pub use config::SortConfig;
pub use math::Vec3;
pub use sort::{
    CameraPose, DepthBucketSorter, HostVertexStorage, IndexMode, OrderingBuffer, SortCoordinator,
    SortError, SortEvent, SortResult, VertexStorage,
};
