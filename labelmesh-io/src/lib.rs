//! I/O for labelmesh
//!
//! Reads labeled NIfTI-1 volumes and writes meshes and assembled scenes to
//! OBJ, PLY and binary STL.

pub mod error;
pub mod nifti;
pub mod obj;
pub mod output;
pub mod ply;
pub mod scene;
pub mod stl;

pub use error::*;
pub use nifti::{NiftiDatatype, NiftiHeader, NiftiReader, NiftiWriter};
pub use obj::{ObjObject, ObjWriter};
pub use output::{default_output_path, resolve_output, OutputFormat};
pub use ply::{PlyFormat, PlyReader, PlyWriteOptions, PlyWriter};
pub use scene::{DisplayColor, PlacedMesh, Scene, DEFAULT_ROOT};
pub use stl::StlWriter;

use labelmesh_core::{LabelVolume, Result, TriangleMesh};
use std::path::Path;

/// Trait for reading label volumes from files
pub trait VolumeReader {
    fn read_volume<P: AsRef<Path>>(path: P) -> Result<LabelVolume>;
}

/// Trait for reading meshes from files
pub trait MeshReader {
    fn read_mesh<P: AsRef<Path>>(path: P) -> Result<TriangleMesh>;
}

/// Trait for writing meshes to files
pub trait MeshWriter {
    fn write_mesh<P: AsRef<Path>>(mesh: &TriangleMesh, path: P) -> Result<()>;
}

/// Auto-detect format and read a label volume
pub fn read_volume<P: AsRef<Path>>(path: P) -> Result<LabelVolume> {
    let path = path.as_ref();
    let name = path
        .file_name()
        .and_then(|s| s.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    if name.ends_with(".nii") || name.ends_with(".nii.gz") {
        NiftiReader::read_volume(path)
    } else {
        Err(labelmesh_core::Error::UnsupportedFormat(format!(
            "Unsupported volume format: {}",
            path.display()
        )))
    }
}

/// Auto-detect format and write a single mesh
pub fn write_mesh<P: AsRef<Path>>(mesh: &TriangleMesh, path: P) -> Result<()> {
    let path = path.as_ref();
    match path.extension().and_then(|s| s.to_str()).map(str::to_ascii_lowercase).as_deref() {
        Some("obj") => ObjWriter::write_mesh(mesh, path),
        Some("ply") => PlyWriter::write_mesh(mesh, path),
        Some("stl") => StlWriter::write_mesh(mesh, path),
        _ => Err(labelmesh_core::Error::UnsupportedFormat(format!(
            "Unsupported mesh format: {:?}",
            path.extension()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use labelmesh_core::Point3f;

    #[test]
    fn test_read_volume_by_extension() {
        let path = std::env::temp_dir().join(format!("labelmesh_lib_{}.nii.gz", std::process::id()));
        let mut volume = LabelVolume::new([3, 3, 3], [1.0; 3], Point3f::origin());
        volume.set(1, 1, 1, 5).unwrap();
        NiftiWriter::default().write_volume(&volume, &path).unwrap();

        let loaded = read_volume(&path).unwrap();
        assert_eq!(loaded.count(5), 1);
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_unsupported_formats() {
        assert!(matches!(
            read_volume("scan.mha"),
            Err(labelmesh_core::Error::UnsupportedFormat(_))
        ));
        let mesh = TriangleMesh::new();
        assert!(matches!(
            write_mesh(&mesh, "mesh.usd"),
            Err(labelmesh_core::Error::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_write_mesh_dispatch() {
        let mesh = TriangleMesh::from_vertices_and_faces(
            vec![
                Point3f::new(0.0, 0.0, 0.0),
                Point3f::new(1.0, 0.0, 0.0),
                Point3f::new(0.0, 1.0, 0.0),
            ],
            vec![[0, 1, 2]],
        );
        for extension in ["obj", "ply", "stl"] {
            let path = std::env::temp_dir().join(format!("labelmesh_lib_{}.{}", std::process::id(), extension));
            write_mesh(&mesh, &path).unwrap();
            assert!(std::fs::metadata(&path).unwrap().len() > 0);
            std::fs::remove_file(&path).unwrap();
        }
    }
}
