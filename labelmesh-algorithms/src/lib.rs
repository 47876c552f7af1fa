//! # labelmesh Algorithms
//!
//! Surface conditioning for extracted label meshes: windowed sinc
//! smoothing, vertex normal generation and the edge adjacency they share.

pub mod adjacency;
pub mod normals;
pub mod smoothing;

// Re-export commonly used items
pub use adjacency::*;
pub use normals::*;
pub use smoothing::*;
