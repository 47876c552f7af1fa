//! Convert the labels of a segmented NIfTI volume into a scene of colored
//! meshes placed under `/Human`.
//!
//! ```text
//! create_medical_mesh -i segmentation.nii.gz --index 4 --value Heart -p heart.ply
//! ```
//!
//! Set `RUST_LOG=debug` to see per-stage vertex and face counts.

use anyhow::{bail, Context, Result};
use clap::Parser;
use labelmesh_core::Vector3f;
use labelmesh_io::{resolve_output, DisplayColor, Scene, DEFAULT_ROOT};
use labelmesh_pipeline::{LabelMap, SegmentationConfig, SegmentationPipeline};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Offset of every mesh under the scene root
const MESH_TRANSLATION: [f32; 3] = [200.0, 30.0, 200.0];

#[derive(Parser, Debug)]
#[command(name = "create_medical_mesh")]
#[command(about = "Convert segmentation labels into a mesh scene", long_about = None)]
struct Args {
    /// Input NIfTI volume (.nii or .nii.gz)
    #[arg(short, long)]
    input: PathBuf,

    /// Convert only this label value
    #[arg(long, requires = "value")]
    index: Option<i32>,

    /// Mesh name for --index
    #[arg(long, requires = "index")]
    value: Option<String>,

    /// Write a text format (OBJ, or ASCII PLY for .ply paths)
    #[arg(short, long)]
    ascii: bool,

    /// Output path (.stl, .obj or .ply)
    #[arg(short, long)]
    path: Option<PathBuf>,

    /// JSON label map such as {"4": "Heart"}, replacing the built-in table
    #[arg(long, conflicts_with = "index")]
    labels: Option<PathBuf>,

    /// Smoothing factor in [0, 1]
    #[arg(long, default_value_t = 0.5)]
    smoothing: f32,

    /// Optional topology-preserving reduction in [0, 1]; 0 skips it
    #[arg(long, default_value_t = 0.0)]
    reduction: f32,

    /// Seed for the display colors
    #[arg(long)]
    seed: Option<u64>,
}

fn label_map(args: &Args) -> Result<LabelMap> {
    if let (Some(index), Some(name)) = (args.index, args.value.as_deref()) {
        return Ok(LabelMap::single(index, name));
    }
    match &args.labels {
        Some(path) => LabelMap::from_json_file(path)
            .with_context(|| format!("Failed to load label map {}", path.display())),
        None => Ok(LabelMap::default()),
    }
}

/// One color per entry of `labels`, drawn up front so a label's color does
/// not depend on which other labels produce a mesh
fn palette<R: Rng>(labels: &LabelMap, rng: &mut R) -> BTreeMap<i32, DisplayColor> {
    labels
        .iter()
        .map(|(index, _)| (index, DisplayColor::new(rng.gen(), rng.gen(), rng.gen())))
        .collect()
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let (output, format) = resolve_output(args.path.as_deref(), args.ascii)?;
    let labels = label_map(&args)?;
    let pipeline = SegmentationPipeline::new(
        SegmentationConfig::default()
            .with_smoothing_factor(args.smoothing)
            .with_reduction_ratio(args.reduction),
    );
    let mut rng = match args.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let colors = palette(&labels, &mut rng);

    let mut scene = Scene::new(DEFAULT_ROOT)?;
    for (index, name) in labels.iter() {
        let outcome = pipeline
            .run_file(&args.input, index)
            .with_context(|| format!("Failed to read {}", args.input.display()))?;

        let Some(surface) = outcome.into_surface() else {
            log::warn!("Failed to create mesh for {}", name);
            continue;
        };
        log::info!(
            "Created mesh for {}: {} vertices, {} faces",
            name,
            surface.mesh.vertex_count(),
            surface.mesh.face_count()
        );

        let color = colors.get(&index).copied().unwrap_or(DisplayColor::new(1.0, 1.0, 1.0));
        scene
            .add_mesh(name, surface.mesh, color, Vector3f::from(MESH_TRANSLATION))
            .with_context(|| format!("Failed to place mesh {}", name))?;
    }

    if scene.is_empty() {
        bail!("No meshes were created from {}", args.input.display());
    }
    scene
        .save(&output, format)
        .with_context(|| format!("Failed to save {}", output.display()))?;
    println!("{}", output.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_label_override() {
        let args = Args::parse_from(["create_medical_mesh", "-i", "in.nii", "--index", "4", "--value", "Heart"]);
        let map = label_map(&args).unwrap();
        assert_eq!(map.iter().collect::<Vec<_>>(), vec![(4, "Heart")]);
    }

    #[test]
    fn test_defaults() {
        let args = Args::parse_from(["create_medical_mesh", "--input", "in.nii"]);
        assert_eq!(args.smoothing, 0.5);
        assert_eq!(args.reduction, 0.0);
        assert!(!args.ascii);
        assert_eq!(label_map(&args).unwrap().len(), 17);
    }

    #[test]
    fn test_palette_is_keyed_by_label() {
        let labels = LabelMap::default();
        let a = palette(&labels, &mut StdRng::seed_from_u64(7));
        let b = palette(&labels, &mut StdRng::seed_from_u64(7));
        assert_eq!(a.len(), 17);
        assert_eq!(a, b);

        // Heart takes the fourth draw even if Liver, Spleen and Pancreas are empty
        let mut rng = StdRng::seed_from_u64(7);
        let draws: Vec<DisplayColor> = (0..4)
            .map(|_| DisplayColor::new(rng.gen(), rng.gen(), rng.gen()))
            .collect();
        assert_eq!(a[&4], draws[3]);
        assert_ne!(a[&1], a[&2]);
    }

    #[test]
    fn test_index_requires_value() {
        let result = Args::try_parse_from(["create_medical_mesh", "-i", "in.nii", "--index", "4"]);
        assert!(result.is_err());
    }
}
