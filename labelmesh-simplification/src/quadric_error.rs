//! Quadric error decimation

use crate::{EdgeCollapseSimplifier, MeshSimplifier};
use labelmesh_core::{Result, TriangleMesh};

/// Quadric error decimation simplifier.
///
/// Collapses the cheapest edges by quadric error until the target face count
/// is reached. With volume preservation each merged vertex is placed so the
/// signed volume enclosed by its incident faces does not change.
#[derive(Debug, Clone)]
pub struct QuadricErrorSimplifier {
    /// Constrain collapse positions to keep the enclosed volume
    pub volume_preservation: bool,
    /// Extra cost added to collapses touching the boundary
    pub boundary_weight: f64,
}

impl Default for QuadricErrorSimplifier {
    fn default() -> Self {
        Self {
            volume_preservation: false,
            boundary_weight: 1.0,
        }
    }
}

impl QuadricErrorSimplifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_volume_preservation(mut self, preserve: bool) -> Self {
        self.volume_preservation = preserve;
        self
    }

    fn engine(&self) -> EdgeCollapseSimplifier {
        EdgeCollapseSimplifier::with_params(None, false, self.boundary_weight)
            .with_volume_preservation(self.volume_preservation)
    }
}

impl MeshSimplifier for QuadricErrorSimplifier {
    fn simplify(&self, mesh: &TriangleMesh, reduction_ratio: f32) -> Result<TriangleMesh> {
        self.engine().simplify(mesh, reduction_ratio)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edge_collapse::tests::{is_closed_manifold, make_single_triangle, make_sphere};

    #[test]
    fn test_defaults() {
        let s = QuadricErrorSimplifier::new();
        assert!(!s.volume_preservation);
        assert!(s.with_volume_preservation(true).volume_preservation);
    }

    #[test]
    fn test_rejects_bad_input() {
        let s = QuadricErrorSimplifier::new();
        assert!(s.simplify(&TriangleMesh::new(), 0.5).is_err());
        assert!(s.simplify(&make_single_triangle(), 1.5).is_err());
    }

    #[test]
    fn test_ninety_percent_reduction() {
        let mesh = make_sphere(3);
        let result = QuadricErrorSimplifier::new().simplify(&mesh, 0.9).unwrap();

        // 512 faces, target 51
        assert!(result.face_count() <= 60, "got {} faces", result.face_count());
        assert!(result.face_count() >= 40);
        assert!(is_closed_manifold(&result));
    }

    #[test]
    fn test_volume_preservation() {
        let mesh = make_sphere(3);
        let original = mesh.signed_volume();

        let s = QuadricErrorSimplifier::new().with_volume_preservation(true);
        let result = s.simplify(&mesh, 0.9).unwrap();

        assert!(result.face_count() < mesh.face_count() / 4);
        assert!(is_closed_manifold(&result));
        let drift = (result.signed_volume() - original).abs() / original;
        assert!(drift < 1e-3, "volume drifted by {:.5}", drift);
    }
}
