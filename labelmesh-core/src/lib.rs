//! Core data structures and traits for labelmesh
//! 
//! This crate provides the fundamental types shared by the segmentation-to-mesh
//! pipeline: triangle meshes, labeled voxel volumes, affine transforms and the
//! common error type.

pub mod point;
pub mod mesh;
pub mod volume;
pub mod traits;
pub mod transform;
pub mod error;

pub use point::*;
pub use mesh::*;
pub use volume::*;
pub use traits::*;
pub use transform::*;
pub use error::*;

/// Re-export commonly used types from nalgebra
pub use nalgebra::{Point3, Vector3, Matrix3, Matrix4};

// Type aliases for easier imports
pub type Point = Point3f;
pub type Mesh = TriangleMesh;
