//! Vertex normal generation
//!
//! Normals are computed after the face winding has been made consistent
//! across manifold edges and, for closed components, turned outward.

use crate::adjacency::{edge_key, MeshAdjacency};
use labelmesh_core::{TriangleMesh, Vector3f};
use std::collections::{HashSet, VecDeque};

/// Options for [`NormalGenerator`]
#[derive(Debug, Clone)]
pub struct NormalOptions {
    /// Duplicate vertices across sharp edges so each side gets its own normal
    pub splitting: bool,
    /// Dihedral angle in degrees above which an edge is sharp when splitting
    pub feature_angle: f32,
    /// Re-wind faces so neighbors across manifold edges agree
    pub consistency: bool,
    /// Flip closed components that enclose negative volume
    pub auto_orient: bool,
}

impl Default for NormalOptions {
    fn default() -> Self {
        Self {
            splitting: false,
            feature_angle: 30.0,
            consistency: true,
            auto_orient: true,
        }
    }
}

/// Generates per-vertex normals for triangle meshes
#[derive(Debug, Clone, Default)]
pub struct NormalGenerator {
    pub options: NormalOptions,
}

impl NormalGenerator {
    pub fn new(options: NormalOptions) -> Self {
        Self { options }
    }

    /// Orient faces as configured and attach vertex normals.
    pub fn compute(&self, mut mesh: TriangleMesh) -> TriangleMesh {
        if mesh.faces.is_empty() {
            let normals = vec![Vector3f::z(); mesh.vertex_count()];
            mesh.set_normals(normals);
            return mesh;
        }

        if self.options.consistency || self.options.auto_orient {
            self.orient(&mut mesh);
        }
        if self.options.splitting {
            split_sharp_edges(&mut mesh, self.options.feature_angle);
        }

        let normals = compute_vertex_normals(&mesh);
        mesh.set_normals(normals);
        mesh
    }

    fn orient(&self, mesh: &mut TriangleMesh) {
        let adjacency = MeshAdjacency::from_mesh(mesh);
        let components = face_components(&adjacency, mesh);

        let mut rewound = 0usize;
        let mut reversed = 0usize;
        for component in &components {
            if self.options.consistency {
                rewound += make_consistent(&adjacency, mesh, component);
            }
            if self.options.auto_orient
                && is_closed(&adjacency, mesh, component)
                && component_volume(mesh, component) < 0.0
            {
                for &f in component {
                    mesh.faces[f].swap(1, 2);
                }
                reversed += 1;
            }
        }

        log::debug!(
            "Normal orientation: {} components, {} faces re-wound, {} components reversed",
            components.len(),
            rewound,
            reversed
        );
    }
}

/// Normalized sum of the unit normals of each vertex's faces; `+Z` for
/// vertices without usable faces.
pub fn compute_vertex_normals(mesh: &TriangleMesh) -> Vec<Vector3f> {
    let face_normals = mesh.calculate_face_normals();
    let mut sums = vec![Vector3f::zeros(); mesh.vertex_count()];
    for (face, normal) in mesh.faces.iter().zip(&face_normals) {
        for &v in face {
            sums[v] += normal;
        }
    }
    sums.into_iter()
        .map(|n| n.try_normalize(f32::EPSILON).unwrap_or_else(Vector3f::z))
        .collect()
}

/// Faces grouped by connectivity through manifold edges
fn face_components(adjacency: &MeshAdjacency, mesh: &TriangleMesh) -> Vec<Vec<usize>> {
    let mut component_of = vec![usize::MAX; mesh.face_count()];
    let mut components = Vec::new();

    for seed in 0..mesh.face_count() {
        if component_of[seed] != usize::MAX {
            continue;
        }
        let id = components.len();
        let mut members = vec![seed];
        component_of[seed] = id;
        let mut queue = VecDeque::from([seed]);
        while let Some(f) = queue.pop_front() {
            for g in manifold_neighbors(adjacency, mesh, f) {
                if component_of[g] == usize::MAX {
                    component_of[g] = id;
                    members.push(g);
                    queue.push_back(g);
                }
            }
        }
        components.push(members);
    }
    components
}

fn manifold_neighbors<'a>(
    adjacency: &'a MeshAdjacency,
    mesh: &'a TriangleMesh,
    f: usize,
) -> impl Iterator<Item = usize> + 'a {
    let face = mesh.faces[f];
    (0..3).filter_map(move |i| {
        let shared = adjacency.edge_faces.get(&edge_key(face[i], face[(i + 1) % 3]))?;
        match shared.as_slice() {
            [a, b] if *a == f => Some(*b),
            [a, b] if *b == f => Some(*a),
            _ => None,
        }
    })
}

/// True if face `face` contains the directed edge `a -> b`
fn has_directed_edge(face: &[usize; 3], a: usize, b: usize) -> bool {
    (0..3).any(|i| face[i] == a && face[(i + 1) % 3] == b)
}

/// Breadth-first re-winding from the component's first face. Returns the
/// number of faces flipped.
fn make_consistent(adjacency: &MeshAdjacency, mesh: &mut TriangleMesh, component: &[usize]) -> usize {
    let Some(&seed) = component.first() else {
        return 0;
    };
    let mut visited: HashSet<usize> = HashSet::from([seed]);
    let mut queue = VecDeque::from([seed]);
    let mut flipped = 0;

    while let Some(f) = queue.pop_front() {
        let face = mesh.faces[f];
        for i in 0..3 {
            let (a, b) = (face[i], face[(i + 1) % 3]);
            let Some(shared) = adjacency.edge_faces.get(&edge_key(a, b)) else {
                continue;
            };
            if shared.len() != 2 {
                continue;
            }
            let g = if shared[0] == f { shared[1] } else { shared[0] };
            if !visited.insert(g) {
                continue;
            }
            // A consistent neighbor walks the shared edge the other way
            if has_directed_edge(&mesh.faces[g], a, b) {
                mesh.faces[g].swap(1, 2);
                flipped += 1;
            }
            queue.push_back(g);
        }
    }
    flipped
}

fn is_closed(adjacency: &MeshAdjacency, mesh: &TriangleMesh, component: &[usize]) -> bool {
    component.iter().all(|&f| {
        let face = mesh.faces[f];
        (0..3).all(|i| adjacency.edge_valence(face[i], face[(i + 1) % 3]) == 2)
    })
}

fn component_volume(mesh: &TriangleMesh, component: &[usize]) -> f64 {
    component
        .iter()
        .map(|&f| {
            let [a, b, c] = mesh.faces[f].map(|v| mesh.vertices[v].coords.cast::<f64>());
            a.cross(&b).dot(&c)
        })
        .sum::<f64>()
        / 6.0
}

/// Give each group of faces around a vertex that is separated by sharp or
/// non-manifold edges its own copy of the vertex.
fn split_sharp_edges(mesh: &mut TriangleMesh, feature_angle: f32) {
    let adjacency = MeshAdjacency::from_mesh(mesh);
    let face_normals = mesh.calculate_face_normals();
    let sharp = adjacency.feature_edges(&face_normals, feature_angle);
    let original_count = mesh.vertex_count();
    let original_faces = mesh.faces.clone();

    for v in 0..original_count {
        let faces = &adjacency.vertex_faces[v];
        let mut group_of: Vec<Option<usize>> = vec![None; faces.len()];
        let mut groups = 0;

        for start in 0..faces.len() {
            if group_of[start].is_some() {
                continue;
            }
            group_of[start] = Some(groups);
            let mut stack = vec![start];
            while let Some(i) = stack.pop() {
                for &u in &original_faces[faces[i]] {
                    let key = edge_key(v, u);
                    if u == v || sharp.contains(&key) || adjacency.edge_valence(v, u) != 2 {
                        continue;
                    }
                    for (j, &g) in faces.iter().enumerate() {
                        if group_of[j].is_none() && original_faces[g].contains(&u) {
                            group_of[j] = Some(groups);
                            stack.push(j);
                        }
                    }
                }
            }
            groups += 1;
        }

        for group in 1..groups {
            let copy = mesh.add_vertex(mesh.vertices[v]);
            if let Some(colors) = mesh.colors.as_mut() {
                let color = colors[v];
                colors.push(color);
            }
            for (j, &f) in faces.iter().enumerate() {
                if group_of[j] == Some(group) {
                    for slot in mesh.faces[f].iter_mut() {
                        if *slot == v {
                            *slot = copy;
                        }
                    }
                }
            }
        }
    }

    // Stale normals no longer match the vertex count
    mesh.normals = None;
    log::debug!(
        "Normal splitting: {} sharp edges, {} vertices added",
        sharp.len(),
        mesh.vertex_count() - original_count
    );
}
