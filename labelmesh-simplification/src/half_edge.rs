//! Half-edge connectivity for edge collapse
//!
//! Stores directed edges with twin/next/prev links so that one-ring queries,
//! boundary detection and the collapse itself stay local. Every vertex carries
//! a quadric error matrix accumulated from its incident face planes.

use labelmesh_core::{Point3f, TriangleMesh, Vector3f};
use nalgebra::{Matrix3, Matrix4, Vector3, Vector4};
use std::collections::{HashMap, HashSet};

pub(crate) const INVALID: usize = usize::MAX;

#[derive(Debug, Clone)]
pub(crate) struct HalfEdge {
    pub target: usize,
    pub twin: usize,
    pub next: usize,
    pub prev: usize,
    pub face: usize,
}

/// Half-edge mesh for topology-aware edge collapse operations.
pub(crate) struct HalfEdgeMesh {
    pub half_edges: Vec<HalfEdge>,
    /// One outgoing half-edge per vertex (INVALID if removed)
    pub vertex_edge: Vec<usize>,
    /// One half-edge per face (INVALID if removed)
    pub face_edge: Vec<usize>,
    pub active_face_count: usize,
    pub positions: Vec<Point3f>,
    pub normals: Option<Vec<Vector3f>>,
    pub colors: Option<Vec<[u8; 3]>>,
    pub quadrics: Vec<Matrix4<f64>>,
    pub vertex_removed: Vec<bool>,
    /// Vertices whose incident faces do not form a single fan
    pub vertex_locked: Vec<bool>,
}

impl HalfEdgeMesh {
    pub fn from_triangle_mesh(mesh: &TriangleMesh) -> Self {
        let nv = mesh.vertices.len();
        let nf = mesh.faces.len();

        let mut half_edges = Vec::with_capacity(nf * 3);
        let mut vertex_edge = vec![INVALID; nv];
        let mut face_edge = Vec::with_capacity(nf);
        let mut vertex_locked = vec![false; nv];
        let mut incident_faces = vec![0usize; nv];

        for (fi, face) in mesh.faces.iter().enumerate() {
            let base = fi * 3;
            let degenerate = face[0] == face[1] || face[1] == face[2] || face[2] == face[0];
            for j in 0..3usize {
                half_edges.push(HalfEdge {
                    target: face[(j + 1) % 3],
                    twin: INVALID,
                    next: base + (j + 1) % 3,
                    prev: base + (j + 2) % 3,
                    face: fi,
                });
                if vertex_edge[face[j]] == INVALID {
                    vertex_edge[face[j]] = base + j;
                }
                incident_faces[face[j]] += 1;
                if degenerate {
                    vertex_locked[face[j]] = true;
                }
            }
            face_edge.push(base);
        }

        // Directed edges used by more than one face mark non-manifold or
        // inconsistently wound regions
        let mut edge_map: HashMap<(usize, usize), usize> = HashMap::with_capacity(nf * 3);
        for (he_idx, he) in half_edges.iter().enumerate() {
            let src = half_edges[he.prev].target;
            if edge_map.insert((src, he.target), he_idx).is_some() {
                vertex_locked[src] = true;
                vertex_locked[he.target] = true;
            }
        }
        for he_idx in 0..half_edges.len() {
            if half_edges[he_idx].twin != INVALID {
                continue;
            }
            let src = half_edges[half_edges[he_idx].prev].target;
            let tgt = half_edges[he_idx].target;
            if let Some(&twin_idx) = edge_map.get(&(tgt, src)) {
                if half_edges[twin_idx].twin == INVALID && twin_idx != he_idx {
                    half_edges[he_idx].twin = twin_idx;
                    half_edges[twin_idx].twin = he_idx;
                }
            }
        }

        let mut hem = HalfEdgeMesh {
            half_edges,
            vertex_edge,
            face_edge,
            active_face_count: nf,
            positions: mesh.vertices.clone(),
            normals: mesh.normals.clone(),
            colors: mesh.colors.clone(),
            quadrics: vec![Matrix4::zeros(); nv],
            vertex_removed: vec![false; nv],
            vertex_locked,
        };

        // A vertex whose fan walk misses some of its faces is pinched
        for v in 0..nv {
            if hem.vertex_edge[v] != INVALID && hem.outgoing_half_edges(v).len() != incident_faces[v] {
                hem.vertex_locked[v] = true;
            }
        }

        hem.initialize_quadrics();
        hem
    }

    #[inline]
    pub fn source(&self, he: usize) -> usize {
        self.half_edges[self.half_edges[he].prev].target
    }

    #[inline]
    pub fn is_alive(&self, v: usize) -> bool {
        !self.vertex_removed[v] && self.vertex_edge[v] != INVALID
    }

    #[inline]
    fn position_f64(&self, v: usize) -> Vector3<f64> {
        self.positions[v].coords.cast::<f64>()
    }

    fn compute_plane(v0: &Vector3<f64>, v1: &Vector3<f64>, v2: &Vector3<f64>) -> Option<Vector4<f64>> {
        let n = (v1 - v0).cross(&(v2 - v0)).try_normalize(1e-12)?;
        let d = -n.dot(v0);
        Some(Vector4::new(n.x, n.y, n.z, d))
    }

    fn plane_to_quadric(p: &Vector4<f64>) -> Matrix4<f64> {
        p * p.transpose()
    }

    fn initialize_quadrics(&mut self) {
        for fi in 0..self.face_edge.len() {
            let he0 = self.face_edge[fi];
            if he0 == INVALID {
                continue;
            }
            let [v0, v1, v2] = self.face_vertices(he0);
            let plane = Self::compute_plane(
                &self.position_f64(v0),
                &self.position_f64(v1),
                &self.position_f64(v2),
            );
            // Degenerate faces contribute nothing
            if let Some(plane) = plane {
                let q = Self::plane_to_quadric(&plane);
                self.quadrics[v0] += q;
                self.quadrics[v1] += q;
                self.quadrics[v2] += q;
            }
        }
    }

    /// Vertices of the face containing `he`, starting at its source
    pub fn face_vertices(&self, he: usize) -> [usize; 3] {
        let next = self.half_edges[he].next;
        [self.source(he), self.half_edges[he].target, self.half_edges[next].target]
    }

    fn face_normal(&self, he: usize) -> Option<Vector3<f64>> {
        let [a, b, c] = self.face_vertices(he);
        let pa = self.position_f64(a);
        (self.position_f64(b) - pa)
            .cross(&(self.position_f64(c) - pa))
            .try_normalize(1e-12)
    }

    /// Get all outgoing half-edges from a vertex (handles boundary vertices).
    pub fn outgoing_half_edges(&self, v: usize) -> Vec<usize> {
        let start = self.vertex_edge[v];
        if start == INVALID {
            return vec![];
        }

        let mut result = Vec::new();
        let mut current = start;

        // Rotate counterclockwise: current.prev.twin
        loop {
            result.push(current);
            let prev = self.half_edges[current].prev;
            let twin = self.half_edges[prev].twin;
            if twin == INVALID {
                break;
            }
            current = twin;
            if current == start {
                return result;
            }
        }

        // Boundary: also rotate clockwise from start via twin.next
        let twin_of_start = self.half_edges[start].twin;
        if twin_of_start != INVALID {
            let mut current = self.half_edges[twin_of_start].next;
            loop {
                if current == start {
                    break;
                }
                result.push(current);
                let twin = self.half_edges[current].twin;
                if twin == INVALID {
                    break;
                }
                current = self.half_edges[twin].next;
            }
        }

        result
    }

    pub fn neighbors(&self, v: usize) -> HashSet<usize> {
        let mut result = HashSet::new();
        for he in self.outgoing_half_edges(v) {
            result.insert(self.half_edges[he].target);
            // The far vertex of the previous edge closes boundary fans
            let prev = self.half_edges[he].prev;
            result.insert(self.source(prev));
        }
        result
    }

    pub fn is_boundary_vertex(&self, v: usize) -> bool {
        self.outgoing_half_edges(v).iter().any(|&he| {
            self.half_edges[he].twin == INVALID
                || self.half_edges[self.half_edges[he].prev].twin == INVALID
        })
    }

    /// Check the link condition: common neighbors must equal exactly the
    /// face apices opposite the edge (2 for interior, 1 for boundary), and
    /// the merged vertex must keep enough neighbors to stay a surface.
    pub fn check_link_condition(&self, v1: usize, v2: usize) -> bool {
        let h = match self.find_half_edge(v1, v2) {
            Some(h) => h,
            None => return false,
        };
        let is_boundary = self.half_edges[h].twin == INVALID;

        let n1 = self.neighbors(v1);
        let n2 = self.neighbors(v2);
        let common_count = n1.intersection(&n2).count();
        let expected = if is_boundary { 1 } else { 2 };
        if common_count != expected {
            return false;
        }

        // An interior edge joining two boundary vertices would pinch the surface
        if !is_boundary && self.is_boundary_vertex(v1) && self.is_boundary_vertex(v2) {
            return false;
        }

        let merged = n1.union(&n2).filter(|&&v| v != v1 && v != v2).count();
        let minimum = if is_boundary { 2 } else { 3 };
        merged >= minimum
    }

    pub fn find_half_edge(&self, from: usize, to: usize) -> Option<usize> {
        self.outgoing_half_edges(from)
            .into_iter()
            .find(|&he| self.half_edges[he].target == to)
    }

    /// True if the faces on either side of `he` meet at a dihedral angle
    /// whose normal cosine is below `cos_threshold`
    pub fn is_feature_edge(&self, he: usize, cos_threshold: f64) -> bool {
        let twin = self.half_edges[he].twin;
        if twin == INVALID {
            return false;
        }
        match (self.face_normal(he), self.face_normal(twin)) {
            (Some(n1), Some(n2)) => n1.dot(&n2) < cos_threshold,
            _ => false,
        }
    }

    /// Sum of `b × c` over the faces that survive collapsing (v1, v2), and
    /// the signed volume term of every face incident to either vertex.
    ///
    /// Each face is taken with the collapsing vertex first, so moving the
    /// merged vertex to `p` keeps the enclosed volume iff `p · g = h`.
    fn volume_constraint(&self, v1: usize, v2: usize) -> (Vector3<f64>, f64) {
        let mut g = Vector3::zeros();
        let mut h = 0.0;
        for &(v, other) in &[(v1, v2), (v2, v1)] {
            let pv = self.position_f64(v);
            for he in self.outgoing_half_edges(v) {
                if self.half_edges[he].face == INVALID {
                    continue;
                }
                let a = self.half_edges[he].target;
                let b = self.half_edges[self.half_edges[he].next].target;
                let cross = self.position_f64(a).cross(&self.position_f64(b));
                let shared = a == other || b == other;
                if !shared {
                    g += cross;
                }
                // Faces holding both vertices are visited twice
                if v == v1 || !shared {
                    h += pv.dot(&cross);
                }
            }
        }
        (g, h)
    }

    fn quadric_cost(q: &Matrix4<f64>, p: &Vector3<f64>) -> f64 {
        let vh = p.push(1.0);
        (vh.transpose() * q * vh)[0].max(0.0)
    }

    /// Position of the merged vertex and its quadric error.
    ///
    /// With `preserve_volume` the position is constrained to the plane that
    /// keeps the signed volume of the incident faces unchanged.
    pub fn compute_collapse_cost(&self, v1: usize, v2: usize, preserve_volume: bool) -> (Point3f, f64) {
        let q = self.quadrics[v1] + self.quadrics[v2];
        let a: Matrix3<f64> = q.fixed_view::<3, 3>(0, 0).into_owned();
        let b: Vector3<f64> = q.fixed_view::<3, 1>(0, 3).into_owned();

        let p1 = self.position_f64(v1);
        let p2 = self.position_f64(v2);
        let midpoint = (p1 + p2) * 0.5;
        let reach = 2.0 * (p2 - p1).norm();
        let plausible = |p: &Vector3<f64>| p.iter().all(|x| x.is_finite()) && (p - midpoint).norm() <= reach;

        // Best of the endpoints and midpoint when the quadric is degenerate
        let fallback = |project: &dyn Fn(Vector3<f64>) -> Vector3<f64>| {
            [p1, p2, midpoint]
                .into_iter()
                .map(project)
                .min_by(|x, y| Self::quadric_cost(&q, x).total_cmp(&Self::quadric_cost(&q, y)))
                .unwrap_or(midpoint)
        };

        let optimal = if preserve_volume {
            let (g, h) = self.volume_constraint(v1, v2);
            let project = |p: Vector3<f64>| -> Vector3<f64> {
                let gg = g.norm_squared();
                if gg > 1e-18 {
                    p + g * ((h - g.dot(&p)) / gg)
                } else {
                    p
                }
            };
            let system = Matrix4::new(
                a[(0, 0)], a[(0, 1)], a[(0, 2)], g.x,
                a[(1, 0)], a[(1, 1)], a[(1, 2)], g.y,
                a[(2, 0)], a[(2, 1)], a[(2, 2)], g.z,
                g.x,       g.y,       g.z,       0.0,
            );
            let rhs = Vector4::new(-b.x, -b.y, -b.z, h);
            system
                .lu()
                .solve(&rhs)
                .map(|x| Vector3::new(x[0], x[1], x[2]))
                .filter(|p| plausible(p))
                .unwrap_or_else(|| fallback(&project))
        } else {
            a.try_inverse()
                .map(|inv| -inv * b)
                .filter(|p| plausible(p))
                .unwrap_or_else(|| fallback(&|p: Vector3<f64>| p))
        };

        let cost = Self::quadric_cost(&q, &optimal);
        (
            Point3f::new(optimal.x as f32, optimal.y as f32, optimal.z as f32),
            cost,
        )
    }

    /// True if moving the merged vertex to `position` would flip or
    /// flatten any face that survives the collapse of (v1, v2)
    pub fn collapse_flips_faces(&self, v1: usize, v2: usize, position: &Point3f) -> bool {
        let p = position.coords.cast::<f64>();
        for &(v, other) in &[(v1, v2), (v2, v1)] {
            let pv = self.position_f64(v);
            for he in self.outgoing_half_edges(v) {
                if self.half_edges[he].face == INVALID {
                    continue;
                }
                let a = self.half_edges[he].target;
                let b = self.half_edges[self.half_edges[he].next].target;
                if a == other || b == other {
                    continue;
                }
                let pa = self.position_f64(a);
                let pb = self.position_f64(b);
                let before = (pa - pv).cross(&(pb - pv));
                if before.norm_squared() == 0.0 {
                    continue;
                }
                let after = (pa - p).cross(&(pb - p));
                if before.dot(&after) <= 0.0 {
                    return true;
                }
            }
        }
        false
    }

    /// Length of the bounding box diagonal of the live vertices
    pub fn diagonal_length(&self) -> f64 {
        let mut live = (0..self.positions.len()).filter(|&v| self.is_alive(v));
        let Some(first) = live.next() else {
            return 0.0;
        };
        let mut min = self.position_f64(first);
        let mut max = min;
        for v in live {
            let p = self.position_f64(v);
            min = min.inf(&p);
            max = max.sup(&p);
        }
        (max - min).norm()
    }

    /// Find any valid outgoing half-edge from a vertex (linear scan fallback).
    fn find_valid_outgoing(&self, v: usize) -> usize {
        for (i, he) in self.half_edges.iter().enumerate() {
            if he.face != INVALID && self.source(i) == v {
                return i;
            }
        }
        INVALID
    }

    /// Collapse edge (v1, v2), merging v2 into v1 at new_pos.
    /// Returns true on success.
    pub fn collapse_edge(&mut self, v1: usize, v2: usize, new_pos: Point3f) -> bool {
        let h = match self.find_half_edge(v1, v2) {
            Some(h) => h,
            None => return false,
        };

        let h_twin = self.half_edges[h].twin;
        let h_next = self.half_edges[h].next;
        let h_prev = self.half_edges[h].prev;
        let face_a = self.half_edges[h].face;
        let h_next_twin = self.half_edges[h_next].twin;
        let h_prev_twin = self.half_edges[h_prev].twin;
        let c = self.half_edges[h_next].target;

        let (face_b, ht_next, ht_prev, ht_next_twin, ht_prev_twin, d) = if h_twin != INVALID {
            let hn = self.half_edges[h_twin].next;
            let hp = self.half_edges[h_twin].prev;
            (
                self.half_edges[h_twin].face,
                hn,
                hp,
                self.half_edges[hn].twin,
                self.half_edges[hp].twin,
                self.half_edges[hn].target,
            )
        } else {
            (INVALID, INVALID, INVALID, INVALID, INVALID, INVALID)
        };

        // Collect v2 outgoing edges BEFORE any modifications
        let v2_outgoing = self.outgoing_half_edges(v2);

        // Re-pair twins for face A border edges
        if h_next_twin != INVALID {
            self.half_edges[h_next_twin].twin = h_prev_twin;
        }
        if h_prev_twin != INVALID {
            self.half_edges[h_prev_twin].twin = h_next_twin;
        }

        // Mark face A as removed
        self.half_edges[h].face = INVALID;
        self.half_edges[h_next].face = INVALID;
        self.half_edges[h_prev].face = INVALID;
        self.face_edge[face_a] = INVALID;
        self.active_face_count -= 1;

        // Handle face B
        if face_b != INVALID {
            if ht_next_twin != INVALID {
                self.half_edges[ht_next_twin].twin = ht_prev_twin;
            }
            if ht_prev_twin != INVALID {
                self.half_edges[ht_prev_twin].twin = ht_next_twin;
            }
            self.half_edges[h_twin].face = INVALID;
            self.half_edges[ht_next].face = INVALID;
            self.half_edges[ht_prev].face = INVALID;
            self.face_edge[face_b] = INVALID;
            self.active_face_count -= 1;
        }

        // Redirect all v2 references to v1
        for &he in &v2_outgoing {
            let prev = self.half_edges[he].prev;
            self.half_edges[prev].target = v1;

            let twin = self.half_edges[he].twin;
            if twin != INVALID && self.half_edges[twin].face != INVALID {
                self.half_edges[twin].target = v1;
            }
        }

        // Fix vertex_edge pointers for v1, c and d
        if self.half_edges[self.vertex_edge[v1]].face == INVALID {
            self.vertex_edge[v1] =
                if h_prev_twin != INVALID && self.half_edges[h_prev_twin].face != INVALID {
                    h_prev_twin
                } else {
                    self.find_valid_outgoing(v1)
                };
        }
        self.repair_vertex_edge(c, h_next_twin);
        if d != c {
            self.repair_vertex_edge(d, ht_next_twin);
        }

        // Mark v2 as removed
        self.vertex_edge[v2] = INVALID;
        self.vertex_removed[v2] = true;

        // Update position and quadric for v1
        let v2_quadric = self.quadrics[v2];
        self.positions[v1] = new_pos;
        self.quadrics[v1] += v2_quadric;

        if let Some(ref mut normals) = self.normals {
            if let Some(avg) = (normals[v1] + normals[v2]).try_normalize(f32::EPSILON) {
                normals[v1] = avg;
            }
        }

        if let Some(ref mut colors) = self.colors {
            let (c1, c2) = (colors[v1], colors[v2]);
            colors[v1] = [
                ((c1[0] as u16 + c2[0] as u16) / 2) as u8,
                ((c1[1] as u16 + c2[1] as u16) / 2) as u8,
                ((c1[2] as u16 + c2[2] as u16) / 2) as u8,
            ];
        }

        true
    }

    fn repair_vertex_edge(&mut self, v: usize, candidate: usize) {
        if v == INVALID
            || self.vertex_edge[v] == INVALID
            || self.half_edges[self.vertex_edge[v]].face != INVALID
        {
            return;
        }
        self.vertex_edge[v] = if candidate != INVALID && self.half_edges[candidate].face != INVALID {
            candidate
        } else {
            self.find_valid_outgoing(v)
        };
    }

    pub fn to_triangle_mesh(&self) -> TriangleMesh {
        let mut old_to_new: HashMap<usize, usize> = HashMap::new();
        let mut kept = Vec::new();
        for v in 0..self.positions.len() {
            if self.is_alive(v) {
                old_to_new.insert(v, kept.len());
                kept.push(v);
            }
        }

        let mut new_faces = Vec::with_capacity(self.active_face_count);
        for &he0 in &self.face_edge {
            if he0 == INVALID {
                continue;
            }
            let [v0, v1, v2] = self.face_vertices(he0);
            if let (Some(&nv0), Some(&nv1), Some(&nv2)) =
                (old_to_new.get(&v0), old_to_new.get(&v1), old_to_new.get(&v2))
            {
                if nv0 != nv1 && nv1 != nv2 && nv2 != nv0 {
                    new_faces.push([nv0, nv1, nv2]);
                }
            }
        }

        let positions = kept.iter().map(|&v| self.positions[v]).collect();
        let mut mesh = TriangleMesh::from_vertices_and_faces(positions, new_faces);
        if let Some(ref normals) = self.normals {
            mesh.set_normals(kept.iter().map(|&v| normals[v]).collect());
        }
        if let Some(ref colors) = self.colors {
            mesh.set_colors(kept.iter().map(|&v| colors[v]).collect());
        }
        mesh
    }
}
