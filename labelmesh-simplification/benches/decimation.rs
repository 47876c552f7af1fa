//! Benchmarks for the topology-preserving and quadric decimators

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use labelmesh_core::{Point3f, TriangleMesh};
use labelmesh_simplification::{MeshSimplifier, QuadricErrorSimplifier, TopologyPreservingSimplifier};
use std::collections::HashMap;

/// Unit sphere from a subdivided octahedron
fn generate_sphere_mesh(levels: usize) -> TriangleMesh {
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
        let mut next = Vec::with_capacity(faces.len() * 4);
        for [a, b, c] in faces {
            let mut mid = |i: usize, j: usize| {
                *midpoints.entry((i.min(j), i.max(j))).or_insert_with(|| {
                    vertices.push(Point3f::from((vertices[i].coords + vertices[j].coords).normalize()));
                    vertices.len() - 1
                })
            };
            let ab = mid(a, b);
            let bc = mid(b, c);
            let ca = mid(c, a);
            next.extend([[a, ab, ca], [ab, b, bc], [ca, bc, c], [ab, bc, ca]]);
        }
        faces = next;
    }

    TriangleMesh::from_vertices_and_faces(vertices, faces)
}

fn bench_decimation(c: &mut Criterion) {
    let mut group = c.benchmark_group("decimation");

    for levels in [3, 4, 5] {
        let mesh = generate_sphere_mesh(levels);
        let face_count = mesh.face_count();

        group.bench_with_input(
            BenchmarkId::new("topology_preserving_r50", face_count),
            &mesh,
            |b, mesh| {
                let simplifier = TopologyPreservingSimplifier::new();
                b.iter(|| {
                    let result = simplifier.simplify(black_box(mesh), 0.5).unwrap();
                    black_box(result);
                });
            },
        );

        group.bench_with_input(
            BenchmarkId::new("quadric_volume_r90", face_count),
            &mesh,
            |b, mesh| {
                let simplifier = QuadricErrorSimplifier::new().with_volume_preservation(true);
                b.iter(|| {
                    let result = simplifier.simplify(black_box(mesh), 0.9).unwrap();
                    black_box(result);
                });
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_decimation);
criterion_main!(benches);
