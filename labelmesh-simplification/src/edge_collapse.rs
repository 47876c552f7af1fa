//! Edge collapse simplification
//!
//! Implements iterative edge collapse mesh simplification on a half-edge
//! mesh, using quadric error metrics (QEM) to prioritize collapses. After
//! every collapse the edges around the merged vertex are re-evaluated so the
//! queue always reflects the current surface.

use crate::half_edge::{HalfEdgeMesh, INVALID};
use crate::MeshSimplifier;
use labelmesh_core::{Error, Point3f, Result, TriangleMesh};
use priority_queue::PriorityQueue;
use std::cmp::Ordering;
use std::collections::HashSet;
use std::iter;

// ============================================================
// Edge Cost for Priority Queue
// ============================================================

#[derive(Debug, Clone)]
struct EdgeCost {
    v1: usize,
    v2: usize,
    position: Point3f,
    cost: f64,
}

impl PartialEq for EdgeCost {
    fn eq(&self, other: &Self) -> bool {
        self.cost.total_cmp(&other.cost) == Ordering::Equal
    }
}
impl Eq for EdgeCost {}

impl PartialOrd for EdgeCost {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for EdgeCost {
    fn cmp(&self, other: &Self) -> Ordering {
        // Min-heap: smallest cost first
        other.cost.total_cmp(&self.cost)
    }
}

type EdgeQueue = PriorityQueue<(usize, usize), EdgeCost>;

#[inline]
fn edge_key(a: usize, b: usize) -> (usize, usize) {
    (a.min(b), a.max(b))
}

// ============================================================
// Edge Collapse Simplifier
// ============================================================

/// Edge collapse mesh simplifier using half-edge data structure and QEM.
///
/// This is the engine behind both decimation stages. Its options cover the
/// constraints each stage needs:
///
/// - `error_threshold` stops on an absolute quadric cost,
///   `max_relative_error` on the geometric error (square root of the cost)
///   relative to the bounding box diagonal;
/// - `preserve_boundary` never touches boundary vertices, otherwise
///   `boundary_weight` is added to their collapse cost;
/// - `feature_angle` (degrees) protects edges whose adjacent faces meet at
///   a sharper angle;
/// - `reject_flips` refuses collapses that invert a surviving face;
/// - `preserve_volume` places the merged vertex so the enclosed volume is
///   unchanged.
#[derive(Debug, Clone)]
pub struct EdgeCollapseSimplifier {
    /// Stop when the minimum collapse cost exceeds this threshold
    pub error_threshold: Option<f64>,
    /// Stop when the geometric error exceeds this fraction of the bounding box diagonal
    pub max_relative_error: Option<f64>,
    /// Preserve mesh boundary edges
    pub preserve_boundary: bool,
    /// Extra penalty weight applied to boundary edge costs
    pub boundary_weight: f64,
    /// Dihedral angle in degrees above which an edge is never collapsed
    pub feature_angle: Option<f32>,
    /// Reject collapses that flip surviving faces
    pub reject_flips: bool,
    /// Constrain collapse positions to keep the enclosed volume
    pub preserve_volume: bool,
}

impl Default for EdgeCollapseSimplifier {
    fn default() -> Self {
        Self {
            error_threshold: None,
            max_relative_error: None,
            preserve_boundary: true,
            boundary_weight: 100.0,
            feature_angle: None,
            reject_flips: true,
            preserve_volume: false,
        }
    }
}

impl EdgeCollapseSimplifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_params(
        error_threshold: Option<f64>,
        preserve_boundary: bool,
        boundary_weight: f64,
    ) -> Self {
        Self {
            error_threshold,
            preserve_boundary,
            boundary_weight,
            ..Self::default()
        }
    }

    pub fn with_max_relative_error(mut self, max_error: f64) -> Self {
        self.max_relative_error = Some(max_error);
        self
    }

    pub fn with_feature_angle(mut self, degrees: f32) -> Self {
        self.feature_angle = Some(degrees);
        self
    }

    pub fn with_flip_rejection(mut self, reject: bool) -> Self {
        self.reject_flips = reject;
        self
    }

    pub fn with_volume_preservation(mut self, preserve: bool) -> Self {
        self.preserve_volume = preserve;
        self
    }

    /// Largest collapse cost allowed, combining both stop criteria
    fn cost_limit(&self, hem: &HalfEdgeMesh) -> Option<f64> {
        let relative = self.max_relative_error.map(|fraction| {
            let error = fraction * hem.diagonal_length();
            error * error
        });
        match (self.error_threshold, relative) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Cost of collapsing the half-edge `he` (v1 -> v2), or None when the
    /// edge must not be collapsed at all.
    fn evaluate(&self, hem: &HalfEdgeMesh, he: usize) -> Option<EdgeCost> {
        let v1 = hem.source(he);
        let v2 = hem.half_edges[he].target;
        if v1 == v2 || hem.vertex_locked[v1] || hem.vertex_locked[v2] {
            return None;
        }

        let boundary = hem.is_boundary_vertex(v1) || hem.is_boundary_vertex(v2);
        if boundary && self.preserve_boundary {
            return None;
        }

        if let Some(angle) = self.feature_angle {
            if hem.is_feature_edge(he, (angle as f64).to_radians().cos()) {
                return None;
            }
        }

        let (position, mut cost) = hem.compute_collapse_cost(v1, v2, self.preserve_volume);
        if boundary {
            cost += self.boundary_weight;
        }

        Some(EdgeCost {
            v1,
            v2,
            position,
            cost,
        })
    }

    /// Build the initial priority queue of edge collapse candidates.
    fn build_queue(&self, hem: &HalfEdgeMesh) -> EdgeQueue {
        let mut queue = PriorityQueue::new();
        let mut seen_edges: HashSet<(usize, usize)> = HashSet::new();

        for vi in 0..hem.positions.len() {
            if !hem.is_alive(vi) {
                continue;
            }
            for he in hem.outgoing_half_edges(vi) {
                let key = edge_key(vi, hem.half_edges[he].target);
                if !seen_edges.insert(key) {
                    continue;
                }
                if let Some(candidate) = self.evaluate(hem, he) {
                    queue.push(key, candidate);
                }
            }
        }

        queue
    }

    /// Re-evaluate every edge touching the merged vertex or its one-ring.
    fn requeue_neighborhood(&self, hem: &HalfEdgeMesh, v: usize, queue: &mut EdgeQueue) {
        let mut seen_edges: HashSet<(usize, usize)> = HashSet::new();
        let ring = hem.neighbors(v);

        for u in iter::once(v).chain(ring) {
            if !hem.is_alive(u) {
                continue;
            }
            for he in hem.outgoing_half_edges(u) {
                if hem.half_edges[he].face == INVALID {
                    continue;
                }
                let key = edge_key(u, hem.half_edges[he].target);
                if !seen_edges.insert(key) {
                    continue;
                }
                match self.evaluate(hem, he) {
                    Some(candidate) => {
                        queue.push(key, candidate);
                    }
                    None => {
                        queue.remove(&key);
                    }
                }
            }
        }
    }
}

impl MeshSimplifier for EdgeCollapseSimplifier {
    fn simplify(&self, mesh: &TriangleMesh, reduction_ratio: f32) -> Result<TriangleMesh> {
        if mesh.is_empty() {
            return Err(Error::InvalidData("Mesh is empty".to_string()));
        }
        if !(0.0..=1.0).contains(&reduction_ratio) {
            return Err(Error::InvalidData(
                "Reduction ratio must be between 0.0 and 1.0".to_string(),
            ));
        }
        if reduction_ratio == 0.0 {
            return Ok(mesh.clone());
        }

        let target_faces = ((1.0 - reduction_ratio as f64) * mesh.faces.len() as f64) as usize;
        let mut hem = HalfEdgeMesh::from_triangle_mesh(mesh);
        let limit = self.cost_limit(&hem);
        let mut queue = self.build_queue(&hem);
        let mut collapse_count = 0usize;

        while hem.active_face_count > target_faces {
            let (key, queued) = match queue.pop() {
                Some(item) => item,
                None => break,
            };

            // Queue is ordered by cost, nothing cheaper remains
            if let Some(limit) = limit {
                if queued.cost > limit {
                    break;
                }
            }

            let (v1, v2) = (queued.v1, queued.v2);

            // Validate: both vertices still alive and still neighbors
            if !hem.is_alive(v1) || !hem.is_alive(v2) {
                continue;
            }
            let Some(he) = hem.find_half_edge(v1, v2) else {
                continue;
            };

            let Some(current) = self.evaluate(&hem, he) else {
                continue;
            };
            // Stale entry: put it back at its real cost
            if current.cost > queued.cost * (1.0 + 1e-9) + 1e-12 {
                queue.push(key, current);
                continue;
            }

            // Check link condition to avoid non-manifold topology
            if !hem.check_link_condition(v1, v2) {
                continue;
            }
            if self.reject_flips && hem.collapse_flips_faces(v1, v2, &current.position) {
                continue;
            }

            if hem.collapse_edge(v1, v2, current.position) {
                collapse_count += 1;
                self.requeue_neighborhood(&hem, v1, &mut queue);
            }
        }

        log::debug!(
            "Edge collapse: {} -> {} faces after {} collapses (target {})",
            mesh.faces.len(),
            hem.active_face_count,
            collapse_count,
            target_faces
        );

        Ok(hem.to_triangle_mesh())
    }
}
