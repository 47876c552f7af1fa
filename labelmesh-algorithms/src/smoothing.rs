//! Windowed sinc mesh smoothing
//!
//! A low-pass filter on vertex positions built from a Hamming-windowed sinc
//! transfer function, expanded in Chebyshev polynomials of the umbrella
//! Laplacian. Unlike plain Laplacian smoothing it does not shrink closed
//! surfaces.

use crate::adjacency::{edge_key, MeshAdjacency};
use labelmesh_core::{Drawable, Point3f, TriangleMesh, Vector3f};
use std::collections::HashSet;
use std::f64::consts::PI;

/// Upper bound on the filter degree accepted by [`SmoothingParameters::from_factor`]
pub const MAX_ITERATIONS: usize = 1000;

/// Iteration count and pass band of the filter
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SmoothingParameters {
    /// Degree of the Chebyshev expansion
    pub iterations: usize,
    /// Pass band in `(0, 2]`; lower values smooth more
    pub pass_band: f64,
}

impl SmoothingParameters {
    /// Map a smoothing factor in `[0, 1]` to filter parameters.
    ///
    /// `iterations = round(20 + 40 * factor)` and
    /// `pass_band = 10^(-4 * factor)`. The factor is not clamped, but the
    /// iteration count is capped at [`MAX_ITERATIONS`] and a NaN factor
    /// yields zero iterations.
    ///
    /// # Example
    /// ```rust
    /// use labelmesh_algorithms::SmoothingParameters;
    ///
    /// let params = SmoothingParameters::from_factor(0.5);
    /// assert_eq!(params.iterations, 40);
    /// assert!((params.pass_band - 0.01).abs() < 1e-12);
    /// ```
    pub fn from_factor(factor: f32) -> Self {
        let factor = factor as f64;
        Self {
            iterations: (20.0 + 40.0 * factor).round().clamp(0.0, MAX_ITERATIONS as f64) as usize,
            pass_band: 10f64.powf(-4.0 * factor),
        }
    }
}

impl Default for SmoothingParameters {
    fn default() -> Self {
        Self::from_factor(0.5)
    }
}

/// Which vertices may move, and how positions are conditioned
#[derive(Debug, Clone)]
pub struct SmoothingOptions {
    /// Smooth boundary vertices along the boundary; otherwise they are fixed
    pub boundary_smoothing: bool,
    /// Smooth vertices on feature edges along those edges; otherwise
    /// feature edges are not classified at all
    pub feature_edge_smoothing: bool,
    /// Dihedral angle in degrees above which an edge is a feature edge
    pub feature_angle: f32,
    /// Smooth vertices on non-manifold edges or pinched fans; otherwise they are fixed
    pub non_manifold_smoothing: bool,
    /// Translate and scale positions into a unit box while filtering
    pub normalize_coordinates: bool,
}

impl Default for SmoothingOptions {
    fn default() -> Self {
        Self {
            boundary_smoothing: false,
            feature_edge_smoothing: false,
            feature_angle: 45.0,
            non_manifold_smoothing: true,
            normalize_coordinates: true,
        }
    }
}

/// Windowed sinc smoothing filter
#[derive(Debug, Clone, Default)]
pub struct WindowedSincSmoother {
    pub parameters: SmoothingParameters,
    pub options: SmoothingOptions,
}

/// How a vertex takes part in the filter
#[derive(Debug, Clone)]
enum VertexRole {
    Fixed,
    /// Averages over the listed neighbors
    Smoothed(Vec<usize>),
}

impl WindowedSincSmoother {
    pub fn new(parameters: SmoothingParameters, options: SmoothingOptions) -> Self {
        Self { parameters, options }
    }

    /// Filter for a smoothing factor with default options
    pub fn from_factor(factor: f32) -> Self {
        Self::new(SmoothingParameters::from_factor(factor), SmoothingOptions::default())
    }

    /// Chebyshev coefficients of the windowed sinc transfer function.
    ///
    /// The cutoff is shifted outwards until the response at the pass band
    /// edge is one, then the coefficients are scaled to unit gain at zero
    /// frequency so that constant offsets pass through untouched.
    pub fn coefficients(&self) -> Vec<f64> {
        let n = self.parameters.iterations;
        let theta_pb = (1.0 - 0.5 * self.parameters.pass_band).clamp(-1.0, 1.0).acos();
        let window: Vec<f64> = (0..=n)
            .map(|i| 0.54 + 0.46 * (i as f64 * PI / (n as f64 + 1.0)).cos())
            .collect();

        let build = |theta: f64| -> Vec<f64> {
            (0..=n)
                .map(|i| {
                    if i == 0 {
                        window[0] * theta / PI
                    } else {
                        let i = i as f64;
                        window[i as usize] * 2.0 * (i * theta).sin() / (i * PI)
                    }
                })
                .collect()
        };
        let response = |c: &[f64]| -> f64 {
            c.iter()
                .enumerate()
                .map(|(i, c)| c * (i as f64 * theta_pb).cos())
                .sum()
        };

        // Newton search on the cutoff offset
        let mut sigma = 0.0;
        if n > 1 {
            for _ in 0..500 {
                let gain = response(&build(theta_pb + sigma));
                if (gain - 1.0).abs() < 1e-3 {
                    break;
                }
                let slope: f64 = (0..=n)
                    .map(|i| {
                        let derivative = if i == 0 {
                            window[0] / PI
                        } else {
                            window[i] * 2.0 * (i as f64 * (theta_pb + sigma)).cos() / PI
                        };
                        derivative * (i as f64 * theta_pb).cos()
                    })
                    .sum();
                if slope.abs() < f64::EPSILON {
                    break;
                }
                sigma -= (gain - 1.0) / slope;
            }
        }

        let mut coefficients = build(theta_pb + sigma);
        let sum: f64 = coefficients.iter().sum();
        if sum.abs() > f64::EPSILON {
            for c in &mut coefficients {
                *c /= sum;
            }
        }
        coefficients
    }

    /// Smooth the mesh; connectivity, normals and colors are carried over.
    pub fn smooth(&self, mesh: TriangleMesh) -> TriangleMesh {
        if mesh.vertices.is_empty() || mesh.faces.is_empty() {
            return mesh;
        }

        let roles = self.classify(&mesh);
        let movable = roles
            .iter()
            .filter(|r| matches!(r, VertexRole::Smoothed(_)))
            .count();
        log::debug!(
            "Windowed sinc: {} iterations, pass band {:.5}, {} of {} vertices movable",
            self.parameters.iterations,
            self.parameters.pass_band,
            movable,
            mesh.vertex_count()
        );

        let (center, scale) = if self.options.normalize_coordinates {
            let (min, max) = mesh.bounding_box();
            let extent = (max - min).max();
            let scale = if extent > 0.0 { extent as f64 } else { 1.0 };
            (mesh.center().coords.cast::<f64>(), scale)
        } else {
            (nalgebra::Vector3::zeros(), 1.0)
        };

        let x0: Vec<nalgebra::Vector3<f64>> = mesh
            .vertices
            .iter()
            .map(|p| (p.coords.cast::<f64>() - center) / scale)
            .collect();

        let coefficients = self.coefficients();
        let mut result: Vec<nalgebra::Vector3<f64>> = x0.iter().map(|x| x * coefficients[0]).collect();

        if coefficients.len() > 1 {
            // x1 = x0 + 0.5 * laplacian(x0)
            let mut previous = x0.clone();
            let mut current: Vec<_> = x0
                .iter()
                .enumerate()
                .map(|(v, x)| x + laplacian(&roles, &x0, v) * 0.5)
                .collect();
            accumulate(&mut result, &current, coefficients[1]);

            for &c in &coefficients[2..] {
                // x_{i+1} = 2 * x_i + laplacian(x_i) - x_{i-1}
                let next: Vec<_> = current
                    .iter()
                    .zip(&previous)
                    .enumerate()
                    .map(|(v, (x, prev))| x * 2.0 + laplacian(&roles, &current, v) - prev)
                    .collect();
                accumulate(&mut result, &next, c);
                previous = std::mem::replace(&mut current, next);
            }
        }

        let mut mesh = mesh;
        for (v, role) in roles.iter().enumerate() {
            if let VertexRole::Smoothed(_) = role {
                let p = result[v] * scale + center;
                mesh.vertices[v] = Point3f::new(p.x as f32, p.y as f32, p.z as f32);
            }
        }
        mesh
    }

    fn classify(&self, mesh: &TriangleMesh) -> Vec<VertexRole> {
        let adjacency = MeshAdjacency::from_mesh(mesh);
        let boundary = adjacency.boundary_vertices();
        let non_manifold = adjacency.non_manifold_vertices(mesh);
        let features: HashSet<(usize, usize)> = if self.options.feature_edge_smoothing {
            adjacency.feature_edges(&mesh.calculate_face_normals(), self.options.feature_angle)
        } else {
            HashSet::new()
        };

        adjacency
            .vertex_neighbors
            .iter()
            .enumerate()
            .map(|(v, neighbors)| {
                if neighbors.is_empty() {
                    return VertexRole::Fixed;
                }
                if non_manifold[v] {
                    return if self.options.non_manifold_smoothing {
                        VertexRole::Smoothed(neighbors.clone())
                    } else {
                        VertexRole::Fixed
                    };
                }
                if boundary[v] {
                    if !self.options.boundary_smoothing {
                        return VertexRole::Fixed;
                    }
                    let along: Vec<usize> = neighbors
                        .iter()
                        .copied()
                        .filter(|&u| adjacency.is_boundary_edge(v, u))
                        .collect();
                    return chain_role(along);
                }
                let along: Vec<usize> = neighbors
                    .iter()
                    .copied()
                    .filter(|&u| features.contains(&edge_key(v, u)))
                    .collect();
                if along.is_empty() {
                    VertexRole::Smoothed(neighbors.clone())
                } else {
                    chain_role(along)
                }
            })
            .collect()
    }
}

/// Vertices on a boundary or feature line move along it only when it passes
/// straight through them; ends and junctions stay put.
fn chain_role(along: Vec<usize>) -> VertexRole {
    if along.len() == 2 {
        VertexRole::Smoothed(along)
    } else {
        VertexRole::Fixed
    }
}

fn laplacian(roles: &[VertexRole], x: &[nalgebra::Vector3<f64>], v: usize) -> nalgebra::Vector3<f64> {
    match &roles[v] {
        VertexRole::Fixed => nalgebra::Vector3::zeros(),
        VertexRole::Smoothed(neighbors) => {
            let sum: nalgebra::Vector3<f64> = neighbors.iter().map(|&u| x[u]).sum();
            sum / neighbors.len() as f64 - x[v]
        }
    }
}

fn accumulate(result: &mut [nalgebra::Vector3<f64>], x: &[nalgebra::Vector3<f64>], c: f64) {
    for (r, x) in result.iter_mut().zip(x) {
        *r += x * c;
    }
}

/// Mean squared distance of each vertex from the average of its neighbors
pub fn roughness(mesh: &TriangleMesh) -> f64 {
    let adjacency = MeshAdjacency::from_mesh(mesh);
    let mut total = 0.0;
    let mut count = 0usize;
    for (v, neighbors) in adjacency.vertex_neighbors.iter().enumerate() {
        if neighbors.is_empty() {
            continue;
        }
        let average: Vector3f =
            neighbors.iter().map(|&u| mesh.vertices[u].coords).sum::<Vector3f>() / neighbors.len() as f32;
        total += (average - mesh.vertices[v].coords).norm_squared() as f64;
        count += 1;
    }
    if count == 0 {
        0.0
    } else {
        total / count as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::{Rng, SeedableRng};
    use std::collections::HashMap;

    fn make_grid(size: usize) -> TriangleMesh {
        let mut vertices = Vec::new();
        for y in 0..size {
            for x in 0..size {
                vertices.push(Point3f::new(x as f32, y as f32, 0.0));
            }
        }
        let mut faces = Vec::new();
        for y in 0..(size - 1) {
            for x in 0..(size - 1) {
                let tl = y * size + x;
                let tr = tl + 1;
                let bl = (y + 1) * size + x;
                let br = bl + 1;
                faces.push([tl, bl, tr]);
                faces.push([tr, bl, br]);
            }
        }
        TriangleMesh::from_vertices_and_faces(vertices, faces)
    }

    fn make_sphere(levels: usize) -> TriangleMesh {
        let mut vertices = vec![
            Point3f::new(1.0, 0.0, 0.0),
            Point3f::new(-1.0, 0.0, 0.0),
            Point3f::new(0.0, 1.0, 0.0),
            Point3f::new(0.0, -1.0, 0.0),
            Point3f::new(0.0, 0.0, 1.0),
            Point3f::new(0.0, 0.0, -1.0),
        ];
        let mut faces = vec![
            [0, 2, 4],
            [2, 1, 4],
            [1, 3, 4],
            [3, 0, 4],
            [2, 0, 5],
            [1, 2, 5],
            [3, 1, 5],
            [0, 3, 5],
        ];
        for _ in 0..levels {
            let mut midpoints: HashMap<(usize, usize), usize> = HashMap::new();
            let mut next = Vec::new();
            for [a, b, c] in faces {
                let mut mid = |i: usize, j: usize| {
                    *midpoints.entry(edge_key(i, j)).or_insert_with(|| {
                        vertices.push(Point3f::from((vertices[i].coords + vertices[j].coords).normalize()));
                        vertices.len() - 1
                    })
                };
                let (ab, bc, ca) = (mid(a, b), mid(b, c), mid(c, a));
                next.extend([[a, ab, ca], [ab, b, bc], [ca, bc, c], [ab, bc, ca]]);
            }
            faces = next;
        }
        TriangleMesh::from_vertices_and_faces(vertices, faces)
    }

    fn mean_radius(mesh: &TriangleMesh) -> f64 {
        mesh.vertices.iter().map(|p| p.coords.norm() as f64).sum::<f64>() / mesh.vertex_count() as f64
    }

    #[test]
    fn test_parameters_from_factor() {
        let none = SmoothingParameters::from_factor(0.0);
        assert_eq!(none.iterations, 20);
        assert_relative_eq!(none.pass_band, 1.0);

        let full = SmoothingParameters::from_factor(1.0);
        assert_eq!(full.iterations, 60);
        assert_relative_eq!(full.pass_band, 1e-4, epsilon = 1e-12);

        let quarter = SmoothingParameters::from_factor(0.25);
        assert_eq!(quarter.iterations, 30);
        assert_relative_eq!(quarter.pass_band, 0.1, epsilon = 1e-12);
    }

    #[test]
    fn test_out_of_range_factor_is_bounded() {
        let huge = SmoothingParameters::from_factor(1e9);
        assert_eq!(huge.iterations, MAX_ITERATIONS);
        assert_eq!(huge.pass_band, 0.0);

        let nan = SmoothingParameters::from_factor(f32::NAN);
        assert_eq!(nan.iterations, 0);

        assert_eq!(SmoothingParameters::from_factor(-1e9).iterations, 0);
        assert_eq!(SmoothingParameters::from_factor(2.0).iterations, 100);

        let smoother = WindowedSincSmoother::from_factor(1e9);
        assert_eq!(smoother.coefficients().len(), MAX_ITERATIONS + 1);
    }

    #[test]
    fn test_coefficients_have_unit_gain() {
        for factor in [0.0, 0.3, 0.5, 1.0] {
            let smoother = WindowedSincSmoother::from_factor(factor);
            let coefficients = smoother.coefficients();
            assert_eq!(coefficients.len(), smoother.parameters.iterations + 1);
            assert_relative_eq!(coefficients.iter().sum::<f64>(), 1.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_default_options() {
        let options = SmoothingOptions::default();
        assert!(!options.boundary_smoothing);
        assert!(!options.feature_edge_smoothing);
        assert!(options.non_manifold_smoothing);
        assert!(options.normalize_coordinates);
    }

    #[test]
    fn test_boundary_vertices_fixed() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(7);
        let mut mesh = make_grid(8);
        for v in &mut mesh.vertices {
            v.z = rng.gen_range(-0.3..0.3);
        }
        let original = mesh.vertices.clone();

        let smoothed = WindowedSincSmoother::from_factor(0.5).smooth(mesh);
        for y in 0..8 {
            for x in 0..8 {
                let i = y * 8 + x;
                if x == 0 || y == 0 || x == 7 || y == 7 {
                    assert_eq!(smoothed.vertices[i], original[i]);
                }
            }
        }
        assert!(smoothed.vertices[3 * 8 + 3] != original[3 * 8 + 3]);
    }

    #[test]
    fn test_flat_grid_stays_flat() {
        let mesh = make_grid(6);
        let smoothed = WindowedSincSmoother::from_factor(1.0).smooth(mesh);
        for v in &smoothed.vertices {
            assert!(v.z.abs() < 1e-6);
        }
    }

    #[test]
    fn test_noisy_sphere_gets_smoother_without_shrinking() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(42);
        let mut mesh = make_sphere(5);
        for v in &mut mesh.vertices {
            let scale = 1.0 + rng.gen_range(-0.02f32..0.02);
            *v = Point3f::from(v.coords * scale);
        }
        let before = roughness(&mesh);

        let smoothed = WindowedSincSmoother::from_factor(0.5).smooth(mesh);
        assert!(roughness(&smoothed) < before * 0.5);
        assert!((mean_radius(&smoothed) - 1.0).abs() < 0.05);
    }

    #[test]
    fn test_normalization_does_not_change_result() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(3);
        let mut mesh = make_sphere(2);
        for v in &mut mesh.vertices {
            *v = Point3f::new(v.x * 40.0 + 100.0, v.y * 40.0 - 20.0, v.z * 40.0 + rng.gen_range(-1.0..1.0));
        }

        let normalized = WindowedSincSmoother::from_factor(0.5).smooth(mesh.clone());
        let raw = WindowedSincSmoother::new(
            SmoothingParameters::from_factor(0.5),
            SmoothingOptions {
                normalize_coordinates: false,
                ..SmoothingOptions::default()
            },
        )
        .smooth(mesh);

        for (a, b) in normalized.vertices.iter().zip(&raw.vertices) {
            assert_relative_eq!(a, b, epsilon = 1e-3);
        }
    }

    #[test]
    fn test_feature_edge_smoothing_keeps_corners() {
        // Closed unit-spaced cube, 3 x 3 quads per side
        let n = 3i32;
        let sides: [([i32; 3], [i32; 3], [i32; 3]); 6] = [
            ([0, 0, 0], [0, 1, 0], [1, 0, 0]),
            ([0, 0, n], [1, 0, 0], [0, 1, 0]),
            ([0, 0, 0], [1, 0, 0], [0, 0, 1]),
            ([0, n, 0], [0, 0, 1], [1, 0, 0]),
            ([0, 0, 0], [0, 0, 1], [0, 1, 0]),
            ([n, 0, 0], [0, 1, 0], [0, 0, 1]),
        ];
        let mut index: HashMap<[i32; 3], usize> = HashMap::new();
        let mut vertices = Vec::new();
        let mut faces = Vec::new();
        for (o, u, v) in sides {
            let mut id = |i: i32, j: i32| {
                let p = [0, 1, 2].map(|k| o[k] + i * u[k] + j * v[k]);
                *index.entry(p).or_insert_with(|| {
                    vertices.push(Point3f::new(p[0] as f32, p[1] as f32, p[2] as f32));
                    vertices.len() - 1
                })
            };
            for i in 0..n {
                for j in 0..n {
                    let (p00, p10, p11, p01) = (id(i, j), id(i + 1, j), id(i + 1, j + 1), id(i, j + 1));
                    faces.push([p00, p10, p11]);
                    faces.push([p00, p11, p01]);
                }
            }
        }
        let mesh = TriangleMesh::from_vertices_and_faces(vertices, faces);
        let corner = *index.get(&[0, 0, 0]).unwrap();

        let smoother = WindowedSincSmoother::new(
            SmoothingParameters::from_factor(0.5),
            SmoothingOptions {
                feature_edge_smoothing: true,
                feature_angle: 60.0,
                ..SmoothingOptions::default()
            },
        );
        let smoothed = smoother.smooth(mesh);
        assert_eq!(smoothed.vertices[corner], Point3f::new(0.0, 0.0, 0.0));
    }

    #[test]
    fn test_empty_mesh_passes_through() {
        let smoothed = WindowedSincSmoother::default().smooth(TriangleMesh::new());
        assert!(smoothed.is_empty());
    }
}
