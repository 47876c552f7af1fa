//! Mesh simplification and decimation algorithms
//!
//! This crate provides edge collapse decimation on a half-edge mesh with
//! quadric error metrics:
//! - Topology-preserving decimation with feature edge protection
//! - Quadric error decimation with optional volume preservation
//! - The shared edge collapse engine both are built on

mod half_edge;

pub mod edge_collapse;
pub mod quadric_error;
pub mod topology;

pub use edge_collapse::*;
pub use quadric_error::*;
pub use topology::*;

use labelmesh_core::{Result, TriangleMesh};

/// Simplify a mesh by reducing the number of faces/vertices
pub trait MeshSimplifier {
    /// Simplify mesh with target reduction ratio (0.0 = no reduction, 1.0 = maximum reduction)
    fn simplify(&self, mesh: &TriangleMesh, reduction_ratio: f32) -> Result<TriangleMesh>;
}
