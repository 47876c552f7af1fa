//! Segmentation-to-mesh pipeline
//!
//! Seven strictly sequential stages turn one label of a segmented volume
//! into a decimated, smoothed, shaded surface:
//!
//! 1. NIfTI decode (file entry points only)
//! 2. Discrete marching cubes
//! 3. Optional topology-preserving decimation
//! 4. Windowed sinc smoothing
//! 5. Volume-preserving quadric decimation at a fixed ratio
//! 6. Vertex normals with consistent, outward orientation
//! 7. RAS to LPS flip of X and Y

use labelmesh_algorithms::{NormalGenerator, SmoothingOptions, SmoothingParameters, WindowedSincSmoother};
use labelmesh_core::{LabelVolume, Result, Transform3D, Transformable, TriangleMesh, Vector3f};
use labelmesh_io::{NiftiReader, VolumeReader};
use labelmesh_reconstruction::DiscreteMarchingCubes;
use labelmesh_simplification::{MeshSimplifier, QuadricErrorSimplifier, TopologyPreservingSimplifier};
use std::fmt;
use std::path::Path;

/// Pipeline parameters
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentationConfig {
    /// Drives smoothing iterations and pass band, nominally `[0, 1]`
    pub smoothing_factor: f32,
    /// Target reduction of the optional decimation; exactly `0.0` skips it
    pub reduction_ratio: f32,
    /// Target reduction of the final quadric decimation
    pub final_reduction: f32,
    /// Feature angle of the optional decimation, degrees
    pub feature_angle: f32,
    /// Error cap of the optional decimation, relative to the bounding box diagonal
    pub max_error: f64,
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            smoothing_factor: 0.5,
            reduction_ratio: 0.0,
            final_reduction: 0.9,
            feature_angle: 60.0,
            max_error: 1.0,
        }
    }
}

impl SegmentationConfig {
    pub fn with_smoothing_factor(mut self, factor: f32) -> Self {
        self.smoothing_factor = factor;
        self
    }

    pub fn with_reduction_ratio(mut self, ratio: f32) -> Self {
        self.reduction_ratio = ratio;
        self
    }
}

/// Pipeline stages that produce a mesh
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Extraction,
    Simplification,
    Smoothing,
    Decimation,
    Normals,
    CoordinateTransform,
}

impl Stage {
    pub fn name(self) -> &'static str {
        match self {
            Stage::Extraction => "discrete marching cubes",
            Stage::Simplification => "topology-preserving decimation",
            Stage::Smoothing => "windowed sinc smoothing",
            Stage::Decimation => "quadric decimation",
            Stage::Normals => "normal generation",
            Stage::CoordinateTransform => "RAS to LPS",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Mesh size after a stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageSummary {
    pub stage: Stage,
    pub vertices: usize,
    pub faces: usize,
}

/// A finished surface for one label
#[derive(Debug, Clone)]
pub struct LabelSurface {
    pub label: i32,
    pub mesh: TriangleMesh,
    pub stages: Vec<StageSummary>,
}

impl LabelSurface {
    /// Always 3 per face
    pub fn face_vertex_counts(&self) -> Vec<u32> {
        self.mesh.face_vertex_counts()
    }

    pub fn face_vertex_indices(&self) -> Vec<u32> {
        self.mesh.face_vertex_indices()
    }

    pub fn normals(&self) -> &[Vector3f] {
        self.mesh.normals.as_deref().unwrap_or_default()
    }

    pub fn summary(&self, stage: Stage) -> Option<&StageSummary> {
        self.stages.iter().find(|s| s.stage == stage)
    }
}

/// Result of one pipeline run
#[derive(Debug, Clone)]
pub enum MeshOutcome {
    Surface(LabelSurface),
    /// The label produced no surface; only extraction ran
    Empty { label: i32, stages: Vec<StageSummary> },
}

impl MeshOutcome {
    pub fn is_empty(&self) -> bool {
        matches!(self, MeshOutcome::Empty { .. })
    }

    pub fn label(&self) -> i32 {
        match self {
            MeshOutcome::Surface(surface) => surface.label,
            MeshOutcome::Empty { label, .. } => *label,
        }
    }

    pub fn stages(&self) -> &[StageSummary] {
        match self {
            MeshOutcome::Surface(surface) => &surface.stages,
            MeshOutcome::Empty { stages, .. } => stages,
        }
    }

    pub fn into_surface(self) -> Option<LabelSurface> {
        match self {
            MeshOutcome::Surface(surface) => Some(surface),
            MeshOutcome::Empty { .. } => None,
        }
    }
}

/// Runs the segmentation-to-mesh stages for one label at a time
#[derive(Debug, Clone, Default)]
pub struct SegmentationPipeline {
    config: SegmentationConfig,
}

impl SegmentationPipeline {
    pub fn new(config: SegmentationConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SegmentationConfig {
        &self.config
    }

    /// Decode the volume at `path`, then [`run`](Self::run). The volume is
    /// read afresh on every call.
    pub fn run_file<P: AsRef<Path>>(&self, path: P, label: i32) -> Result<MeshOutcome> {
        let volume = NiftiReader::read_volume(path)?;
        self.run(&volume, label)
    }

    /// Convert one label of an in-memory volume
    pub fn run(&self, volume: &LabelVolume, label: i32) -> Result<MeshOutcome> {
        let config = &self.config;
        let mut stages = Vec::with_capacity(6);

        let mesh = DiscreteMarchingCubes::default().extract(volume, label);
        record(&mut stages, Stage::Extraction, &mesh);
        if mesh.vertices.is_empty() {
            log::info!("Label {} produced no surface, skipping", label);
            return Ok(MeshOutcome::Empty { label, stages });
        }

        let mesh = if config.reduction_ratio > 0.0 {
            let mesh = TopologyPreservingSimplifier::new()
                .with_feature_angle(config.feature_angle)
                .with_max_error(config.max_error)
                .simplify(&mesh, config.reduction_ratio)?;
            record(&mut stages, Stage::Simplification, &mesh);
            mesh
        } else {
            mesh
        };

        let smoother = WindowedSincSmoother::new(
            SmoothingParameters::from_factor(config.smoothing_factor),
            SmoothingOptions::default(),
        );
        let mesh = smoother.smooth(mesh);
        record(&mut stages, Stage::Smoothing, &mesh);

        let mesh = QuadricErrorSimplifier::new()
            .with_volume_preservation(true)
            .simplify(&mesh, config.final_reduction)?;
        record(&mut stages, Stage::Decimation, &mesh);

        let mut mesh = NormalGenerator::default().compute(mesh);
        record(&mut stages, Stage::Normals, &mesh);

        mesh.transform(&Transform3D::ras_to_lps());
        record(&mut stages, Stage::CoordinateTransform, &mesh);

        Ok(MeshOutcome::Surface(LabelSurface { label, mesh, stages }))
    }
}

fn record(stages: &mut Vec<StageSummary>, stage: Stage, mesh: &TriangleMesh) {
    log::debug!("{}: {} vertices, {} faces", stage, mesh.vertex_count(), mesh.face_count());
    stages.push(StageSummary {
        stage,
        vertices: mesh.vertex_count(),
        faces: mesh.face_count(),
    });
}

/// Convert one label of the NIfTI file at `path` with the given smoothing
/// factor and reduction ratio.
pub fn convert_to_mesh<P: AsRef<Path>>(
    path: P,
    label: i32,
    smoothing_factor: f32,
    reduction_ratio: f32,
) -> Result<MeshOutcome> {
    let config = SegmentationConfig::default()
        .with_smoothing_factor(smoothing_factor)
        .with_reduction_ratio(reduction_ratio);
    SegmentationPipeline::new(config).run_file(path, label)
}

#[cfg(test)]
mod tests {
    use super::*;
    use labelmesh_core::{Drawable, Point3f};

    fn box_volume(label: i32) -> LabelVolume {
        let mut volume = LabelVolume::new([20, 20, 20], [1.0, 1.0, 1.0], Point3f::origin());
        volume.fill_box([4, 5, 6], [14, 15, 16], label).unwrap();
        volume
    }

    #[test]
    fn test_default_config() {
        let config = SegmentationConfig::default();
        assert_eq!(config.smoothing_factor, 0.5);
        assert_eq!(config.reduction_ratio, 0.0);
        assert_eq!(config.final_reduction, 0.9);
        assert_eq!(config.feature_angle, 60.0);
        assert_eq!(config.max_error, 1.0);
    }

    #[test]
    fn test_missing_label_is_empty() {
        let outcome = SegmentationPipeline::default().run(&box_volume(4), 7).unwrap();
        assert!(outcome.is_empty());
        assert_eq!(outcome.label(), 7);
        assert_eq!(outcome.stages().len(), 1);
        assert_eq!(outcome.stages()[0].stage, Stage::Extraction);
        assert_eq!(outcome.stages()[0].vertices, 0);
    }

    #[test]
    fn test_stage_order_without_reduction() {
        let outcome = SegmentationPipeline::default().run(&box_volume(4), 4).unwrap();
        let stages: Vec<Stage> = outcome.stages().iter().map(|s| s.stage).collect();
        assert_eq!(
            stages,
            vec![
                Stage::Extraction,
                Stage::Smoothing,
                Stage::Decimation,
                Stage::Normals,
                Stage::CoordinateTransform
            ]
        );
    }

    #[test]
    fn test_reduction_runs_optional_stage() {
        let config = SegmentationConfig::default().with_reduction_ratio(0.5);
        let outcome = SegmentationPipeline::new(config).run(&box_volume(4), 4).unwrap();
        let surface = outcome.into_surface().unwrap();
        let extracted = surface.summary(Stage::Extraction).unwrap();
        let simplified = surface.summary(Stage::Simplification).unwrap();
        assert!(simplified.faces < extracted.faces);
    }

    #[test]
    fn test_final_mesh_is_flipped_into_lps() {
        let volume = box_volume(4);
        let surface = SegmentationPipeline::default().run(&volume, 4).unwrap().into_surface().unwrap();

        // The box spans x in [3.5, 14.5] before the flip
        let (min, max) = surface.mesh.bounding_box();
        assert!(max.x < 0.0 && min.x > -15.0);
        assert!(max.y < 0.0 && min.y > -16.0);
        assert!(min.z > 0.0);
        assert_eq!(surface.normals().len(), surface.mesh.vertex_count());
    }

    #[test]
    fn test_counts_and_indices_match_mesh() {
        let surface = SegmentationPipeline::default()
            .run(&box_volume(2), 2)
            .unwrap()
            .into_surface()
            .unwrap();
        assert_eq!(surface.face_vertex_counts().len(), surface.mesh.face_count());
        assert!(surface.face_vertex_counts().iter().all(|&c| c == 3));
        assert_eq!(surface.face_vertex_indices().len(), 3 * surface.mesh.face_count());
        assert_eq!(surface.stages.last().unwrap().faces, surface.mesh.face_count());
    }

    #[test]
    fn test_out_of_range_smoothing_factor_completes() {
        for factor in [1e9, -1.0, 2.0, f32::NAN] {
            let config = SegmentationConfig::default().with_smoothing_factor(factor);
            let outcome = SegmentationPipeline::new(config).run(&box_volume(1), 1);
            assert!(outcome.is_ok(), "factor {} failed", factor);
        }
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let result = convert_to_mesh("/nonexistent/volume.nii.gz", 1, 0.5, 0.0);
        assert!(matches!(result, Err(labelmesh_core::Error::Io(_))));
    }
}
