//! Topology-preserving decimation

use crate::{EdgeCollapseSimplifier, MeshSimplifier};
use labelmesh_core::{Result, TriangleMesh};

/// Decimation that never changes the topology of the surface.
///
/// Collapses pass the link condition and may not flip a surviving face.
/// Edges whose faces meet at more than `feature_angle` degrees are kept, the
/// mesh is never split, and decimation stops once the geometric error would
/// exceed `max_error` times the bounding box diagonal.
#[derive(Debug, Clone)]
pub struct TopologyPreservingSimplifier {
    pub feature_angle: f32,
    pub max_error: f64,
    pub preserve_boundary: bool,
}

impl Default for TopologyPreservingSimplifier {
    fn default() -> Self {
        Self {
            feature_angle: 60.0,
            max_error: 1.0,
            preserve_boundary: true,
        }
    }
}

impl TopologyPreservingSimplifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_feature_angle(mut self, degrees: f32) -> Self {
        self.feature_angle = degrees;
        self
    }

    pub fn with_max_error(mut self, max_error: f64) -> Self {
        self.max_error = max_error;
        self
    }

    fn engine(&self) -> EdgeCollapseSimplifier {
        EdgeCollapseSimplifier::with_params(None, self.preserve_boundary, 0.0)
            .with_feature_angle(self.feature_angle)
            .with_max_relative_error(self.max_error)
            .with_flip_rejection(true)
    }
}

impl MeshSimplifier for TopologyPreservingSimplifier {
    fn simplify(&self, mesh: &TriangleMesh, reduction_ratio: f32) -> Result<TriangleMesh> {
        self.engine().simplify(mesh, reduction_ratio)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edge_collapse::tests::{is_closed_manifold, make_box, make_sphere};

    #[test]
    fn test_defaults() {
        let s = TopologyPreservingSimplifier::new();
        assert_eq!(s.feature_angle, 60.0);
        assert_eq!(s.max_error, 1.0);
    }

    #[test]
    fn test_zero_ratio_is_identity() {
        let mesh = make_sphere(1);
        let result = TopologyPreservingSimplifier::new().simplify(&mesh, 0.0).unwrap();
        assert_eq!(result.face_count(), mesh.face_count());
        assert_eq!(result.vertices, mesh.vertices);
    }

    #[test]
    fn test_sphere_keeps_genus() {
        let mesh = make_sphere(3);
        let result = TopologyPreservingSimplifier::new().simplify(&mesh, 0.5).unwrap();

        assert!(result.face_count() < mesh.face_count());
        assert!(is_closed_manifold(&result));
        assert_eq!(result.vertex_count() as i64 - result.face_count() as i64 / 2, 2);
    }

    #[test]
    fn test_box_corners_survive() {
        let mesh = make_box(4);
        let result = TopologyPreservingSimplifier::new().simplify(&mesh, 0.5).unwrap();

        assert!(result.face_count() < mesh.face_count());
        for corner in [[0.0, 0.0, 0.0], [4.0, 4.0, 4.0], [4.0, 0.0, 4.0], [0.0, 4.0, 0.0]] {
            let found = result.vertices.iter().any(|v| {
                (v.x - corner[0]).abs() < 1e-4 && (v.y - corner[1]).abs() < 1e-4 && (v.z - corner[2]).abs() < 1e-4
            });
            assert!(found, "corner {:?} was removed", corner);
        }
    }

    #[test]
    fn test_max_error_halts_decimation() {
        let mesh = make_sphere(2);
        let result = TopologyPreservingSimplifier::new()
            .with_max_error(1e-9)
            .simplify(&mesh, 0.9)
            .unwrap();
        assert_eq!(result.face_count(), mesh.face_count());
    }
}
