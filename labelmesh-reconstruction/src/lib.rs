//! # labelmesh Reconstruction
//!
//! Surface extraction from labeled voxel volumes.
//!
//! The discrete marching cubes extractor turns every voxel carrying one
//! integer label into a closed, outward-wound triangle surface.

pub mod discrete_marching_cubes;

// Re-export commonly used items
pub use discrete_marching_cubes::*;
