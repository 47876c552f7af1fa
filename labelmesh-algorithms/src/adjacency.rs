//! Edge and vertex adjacency for triangle meshes

use labelmesh_core::{TriangleMesh, Vector3f};
use std::collections::{BTreeSet, HashMap, HashSet};

/// Undirected edge key with the smaller vertex index first
#[inline]
pub fn edge_key(a: usize, b: usize) -> (usize, usize) {
    (a.min(b), a.max(b))
}

/// Connectivity derived from a triangle mesh's face list
#[derive(Debug, Clone)]
pub struct MeshAdjacency {
    /// Edge-connected neighbors of each vertex, ascending
    pub vertex_neighbors: Vec<Vec<usize>>,
    /// Faces incident to each vertex
    pub vertex_faces: Vec<Vec<usize>>,
    /// Faces using each undirected edge
    pub edge_faces: HashMap<(usize, usize), Vec<usize>>,
}

impl MeshAdjacency {
    pub fn from_mesh(mesh: &TriangleMesh) -> Self {
        let nv = mesh.vertex_count();
        let mut neighbors: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); nv];
        let mut vertex_faces = vec![Vec::new(); nv];
        let mut edge_faces: HashMap<(usize, usize), Vec<usize>> = HashMap::new();

        for (fi, face) in mesh.faces.iter().enumerate() {
            for i in 0..3 {
                let a = face[i];
                let b = face[(i + 1) % 3];
                vertex_faces[a].push(fi);
                if a == b {
                    continue;
                }
                neighbors[a].insert(b);
                neighbors[b].insert(a);
                edge_faces.entry(edge_key(a, b)).or_default().push(fi);
            }
        }

        Self {
            vertex_neighbors: neighbors.into_iter().map(|n| n.into_iter().collect()).collect(),
            vertex_faces,
            edge_faces,
        }
    }

    /// Number of faces using edge (a, b)
    pub fn edge_valence(&self, a: usize, b: usize) -> usize {
        self.edge_faces.get(&edge_key(a, b)).map_or(0, Vec::len)
    }

    pub fn is_boundary_edge(&self, a: usize, b: usize) -> bool {
        self.edge_valence(a, b) == 1
    }

    pub fn is_manifold_edge(&self, a: usize, b: usize) -> bool {
        self.edge_valence(a, b) == 2
    }

    /// True if every edge is shared by exactly two faces
    pub fn is_closed(&self) -> bool {
        self.edge_faces.values().all(|faces| faces.len() == 2)
    }

    /// Vertices touching an edge used by a single face
    pub fn boundary_vertices(&self) -> Vec<bool> {
        let mut boundary = vec![false; self.vertex_neighbors.len()];
        for (&(a, b), faces) in &self.edge_faces {
            if faces.len() == 1 {
                boundary[a] = true;
                boundary[b] = true;
            }
        }
        boundary
    }

    /// Vertices touching an edge used by more than two faces, or whose
    /// incident faces split into several fans joined only at the vertex
    pub fn non_manifold_vertices(&self, mesh: &TriangleMesh) -> Vec<bool> {
        let mut flags = vec![false; self.vertex_neighbors.len()];
        for (&(a, b), faces) in &self.edge_faces {
            if faces.len() > 2 {
                flags[a] = true;
                flags[b] = true;
            }
        }

        for (v, faces) in self.vertex_faces.iter().enumerate() {
            if flags[v] || faces.len() < 2 {
                continue;
            }
            if self.fan_count(mesh, v) > 1 {
                flags[v] = true;
            }
        }
        flags
    }

    /// Number of edge-connected face groups around vertex `v`
    fn fan_count(&self, mesh: &TriangleMesh, v: usize) -> usize {
        let faces = &self.vertex_faces[v];
        let mut visited: HashSet<usize> = HashSet::new();
        let mut fans = 0;

        for &start in faces {
            if !visited.insert(start) {
                continue;
            }
            fans += 1;
            let mut stack = vec![start];
            while let Some(f) = stack.pop() {
                for &u in &mesh.faces[f] {
                    if u == v {
                        continue;
                    }
                    if let Some(shared) = self.edge_faces.get(&edge_key(v, u)) {
                        for &g in shared {
                            if visited.insert(g) {
                                stack.push(g);
                            }
                        }
                    }
                }
            }
        }
        fans
    }

    /// Manifold edges whose two faces meet at more than `angle_degrees`
    pub fn feature_edges(&self, face_normals: &[Vector3f], angle_degrees: f32) -> HashSet<(usize, usize)> {
        let cos_threshold = angle_degrees.to_radians().cos();
        self.edge_faces
            .iter()
            .filter(|(_, faces)| faces.len() == 2)
            .filter(|(_, faces)| {
                let n1 = face_normals[faces[0]];
                let n2 = face_normals[faces[1]];
                // Degenerate faces have zero normals and never form features
                n1.norm_squared() > 0.0 && n2.norm_squared() > 0.0 && n1.dot(&n2) < cos_threshold
            })
            .map(|(&key, _)| key)
            .collect()
    }
}
