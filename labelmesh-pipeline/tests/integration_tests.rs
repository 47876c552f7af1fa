//! End-to-end runs of the segmentation-to-mesh pipeline on NIfTI files

use labelmesh_core::{LabelVolume, Point3f, Vector3f};
use labelmesh_io::{
    DisplayColor, MeshReader, NiftiDatatype, NiftiReader, NiftiWriter, OutputFormat, PlyReader, Scene, VolumeReader,
};
use labelmesh_pipeline::{convert_to_mesh, LabelMap, SegmentationConfig, SegmentationPipeline, Stage};
use std::path::PathBuf;

fn temp_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("labelmesh_it_{}_{}", std::process::id(), name))
}

/// Ball of `label` with the given radius, centered in a cubic grid
fn ball_volume(size: usize, radius: f32, label: i32) -> LabelVolume {
    let mut volume = LabelVolume::new([size; 3], [1.0, 1.0, 1.0], Point3f::origin());
    let c = (size as f32 - 1.0) / 2.0;
    for z in 0..size {
        for y in 0..size {
            for x in 0..size {
                let d = Vector3f::new(x as f32 - c, y as f32 - c, z as f32 - c);
                if d.norm() <= radius {
                    volume.set(x, y, z, label).unwrap();
                }
            }
        }
    }
    volume
}

#[test]
fn test_heart_scenario() {
    let path = temp_path("heart.nii.gz");
    NiftiWriter::default().write_volume(&ball_volume(24, 8.0, 4), &path).unwrap();

    let outcome = convert_to_mesh(&path, 4, 0.5, 0.0).unwrap();
    let surface = outcome.into_surface().expect("label 4 is present");
    std::fs::remove_file(&path).unwrap();

    let extracted = surface.summary(Stage::Extraction).unwrap();
    assert!(surface.mesh.vertex_count() < extracted.vertices);
    assert!(surface.summary(Stage::Simplification).is_none());

    let normals = surface.normals();
    assert_eq!(normals.len(), surface.mesh.vertex_count());
    for n in normals {
        assert!((n.norm() - 1.0).abs() < 1e-4);
    }

    // Outward after the X/Y flip: normals agree with the direction from the center
    let center = surface.mesh.vertices.iter().fold(Vector3f::zeros(), |acc, p| acc + p.coords)
        / surface.mesh.vertex_count() as f32;
    let outward = surface
        .mesh
        .vertices
        .iter()
        .zip(normals)
        .filter(|(p, n)| n.dot(&(p.coords - center)) > 0.0)
        .count();
    assert!(outward as f32 >= 0.98 * normals.len() as f32);
    assert!(surface.mesh.signed_volume() > 0.0);
}

#[test]
fn test_volume_is_roughly_kept() {
    let volume = ball_volume(24, 8.0, 1);
    let voxels = volume.count(1) as f64;
    let surface = SegmentationPipeline::default()
        .run(&volume, 1)
        .unwrap()
        .into_surface()
        .unwrap();
    let enclosed = surface.mesh.signed_volume();
    assert!(enclosed > 0.7 * voxels && enclosed < 1.1 * voxels, "{} vs {}", enclosed, voxels);
}

#[test]
fn test_empty_label_is_reported() {
    let path = temp_path("empty.nii");
    NiftiWriter::new(NiftiDatatype::UInt8).write_volume(&ball_volume(12, 3.0, 2), &path).unwrap();

    let outcome = convert_to_mesh(&path, 9, 0.5, 0.0).unwrap();
    std::fs::remove_file(&path).unwrap();
    assert!(outcome.is_empty());
    assert_eq!(outcome.stages().len(), 1);
}

#[test]
fn test_reduction_ratio_zero_skips_only_the_optional_stage() {
    let volume = ball_volume(16, 5.0, 3);
    let skipped = SegmentationPipeline::default().run(&volume, 3).unwrap();
    let reduced = SegmentationPipeline::new(SegmentationConfig::default().with_reduction_ratio(0.3))
        .run(&volume, 3)
        .unwrap();

    let has = |stages: &[labelmesh_pipeline::StageSummary], stage| stages.iter().any(|s| s.stage == stage);
    assert!(!has(skipped.stages(), Stage::Simplification));
    assert!(has(reduced.stages(), Stage::Simplification));
    assert!(has(skipped.stages(), Stage::Decimation));
    assert!(has(reduced.stages(), Stage::Decimation));
}

#[test]
fn test_multi_label_scene() {
    let mut volume = LabelVolume::new([20, 12, 12], [1.5, 1.5, 2.0], Point3f::origin());
    volume.fill_box([2, 2, 2], [7, 8, 8], 1).unwrap();
    volume.fill_box([11, 2, 2], [17, 9, 9], 2).unwrap();
    let path = temp_path("organs.nii");
    NiftiWriter::new(NiftiDatatype::Int16).write_volume(&volume, &path).unwrap();
    let decoded = NiftiReader::read_volume(&path).unwrap();
    assert_eq!(decoded.unique_labels(), vec![1, 2]);

    let pipeline = SegmentationPipeline::default();
    let mut scene = Scene::default();
    let mut skipped = Vec::new();
    for (index, name) in LabelMap::default().iter().take(3) {
        match pipeline.run_file(&path, index).unwrap().into_surface() {
            Some(surface) => {
                scene
                    .add_mesh(name, surface.mesh, DisplayColor::new(0.8, 0.2, 0.2), Vector3f::new(200.0, 30.0, 200.0))
                    .unwrap();
            }
            None => skipped.push(name.to_string()),
        }
    }
    std::fs::remove_file(&path).unwrap();

    assert_eq!(skipped, vec!["Pancreas".to_string()]);
    assert_eq!(scene.len(), 2);
    assert_eq!(scene.get("Liver").unwrap().path, "/Human/Liver");
    assert!(scene.get("Spleen").unwrap().transform.is_some());

    let out = temp_path("organs.ply");
    scene.save(&out, OutputFormat::PlyBinary).unwrap();
    let merged = scene.merged();
    let loaded = PlyReader::read_mesh(&out).unwrap();
    std::fs::remove_file(&out).unwrap();

    assert_eq!(loaded.vertex_count(), merged.vertex_count());
    assert_eq!(loaded.face_count(), merged.face_count());
    assert_eq!(loaded.normals.as_ref().map(Vec::len), Some(loaded.vertex_count()));
    assert!(loaded.colors.is_some());
}
