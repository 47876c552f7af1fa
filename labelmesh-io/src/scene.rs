//! Scene assembly
//!
//! A flat collection of named meshes under one root, each with a constant
//! display color and an optional local transform, persisted to OBJ, PLY
//! or STL.

use crate::obj::{ObjObject, ObjWriter};
use crate::output::OutputFormat;
use crate::ply::{PlyFormat, PlyWriteOptions, PlyWriter};
use crate::stl::StlWriter;
use labelmesh_core::{Error, Point3f, Result, Transform3D, TriangleMesh, Vector3f};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Root used when none is given
pub const DEFAULT_ROOT: &str = "Human";

/// Rotation applied after translation to placed meshes, in degrees
pub const DEFAULT_ROTATION_DEGREES: [f32; 3] = [0.0, 0.0, 180.0];

/// Constant RGB color with channels in `[0, 1]`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DisplayColor {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl DisplayColor {
    pub fn new(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b }
    }

    /// Channels scaled to bytes, clamped to the valid range
    pub fn to_rgb8(self) -> [u8; 3] {
        [self.r, self.g, self.b].map(|c| (c.clamp(0.0, 1.0) * 255.0).round() as u8)
    }
}

/// A mesh placed in the scene
#[derive(Debug, Clone)]
pub struct PlacedMesh {
    pub name: String,
    /// Scene path, `/<root>/<name>`
    pub path: String,
    pub mesh: TriangleMesh,
    pub color: DisplayColor,
    /// Local transform; `None` when the mesh sits at the root's origin
    pub transform: Option<Transform3D>,
}

impl PlacedMesh {
    pub fn face_vertex_counts(&self) -> Vec<u32> {
        self.mesh.face_vertex_counts()
    }

    pub fn face_vertex_indices(&self) -> Vec<u32> {
        self.mesh.face_vertex_indices()
    }

    /// Vertex positions with the local transform applied
    pub fn world_vertices(&self) -> Vec<Point3f> {
        match &self.transform {
            Some(t) => self.mesh.vertices.iter().map(|p| t.transform_point(p)).collect(),
            None => self.mesh.vertices.clone(),
        }
    }

    /// Vertex normals with the local transform applied
    pub fn world_normals(&self) -> Option<Vec<Vector3f>> {
        let normals = self.mesh.normals.as_ref()?;
        Some(match &self.transform {
            Some(t) => normals.iter().map(|n| t.transform_normal(n)).collect(),
            None => normals.clone(),
        })
    }

    /// World-space copy carrying the display color on every vertex
    pub fn world_mesh(&self) -> TriangleMesh {
        let mut faces = self.mesh.faces.clone();
        if self.transform.is_some_and(|t| t.is_orientation_reversing()) {
            for face in &mut faces {
                face.swap(1, 2);
            }
        }
        let mut mesh = TriangleMesh::from_vertices_and_faces(self.world_vertices(), faces);
        if let Some(normals) = self.world_normals() {
            mesh.set_normals(normals);
        }
        mesh.set_colors(vec![self.color.to_rgb8(); mesh.vertex_count()]);
        mesh
    }
}

/// Named meshes under a single root
#[derive(Debug, Clone)]
pub struct Scene {
    root: String,
    meshes: Vec<PlacedMesh>,
}

impl Default for Scene {
    fn default() -> Self {
        Self {
            root: DEFAULT_ROOT.to_string(),
            meshes: Vec::new(),
        }
    }
}

/// `[A-Za-z_][A-Za-z0-9_]*`
pub fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => chars.all(|c| c.is_ascii_alphanumeric() || c == '_'),
        _ => false,
    }
}

impl Scene {
    pub fn new(root: &str) -> Result<Self> {
        if !is_valid_identifier(root) {
            return Err(Error::InvalidData(format!("Invalid scene root name '{}'", root)));
        }
        Ok(Self {
            root: root.to_string(),
            meshes: Vec::new(),
        })
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn meshes(&self) -> &[PlacedMesh] {
        &self.meshes
    }

    pub fn len(&self) -> usize {
        self.meshes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.meshes.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&PlacedMesh> {
        self.meshes.iter().find(|m| m.name == name)
    }

    /// Place a mesh at `/<root>/<name>` with the default rotation
    pub fn add_mesh(
        &mut self,
        name: &str,
        mesh: TriangleMesh,
        color: DisplayColor,
        translation: Vector3f,
    ) -> Result<&PlacedMesh> {
        self.add_mesh_with_rotation(name, mesh, color, translation, Vector3f::from(DEFAULT_ROTATION_DEGREES))
    }

    /// Place a mesh with an explicit XYZ rotation in degrees.
    ///
    /// The local transform translates then rotates, and is only authored
    /// when the translation is non-zero.
    pub fn add_mesh_with_rotation(
        &mut self,
        name: &str,
        mesh: TriangleMesh,
        color: DisplayColor,
        translation: Vector3f,
        rotation_degrees: Vector3f,
    ) -> Result<&PlacedMesh> {
        if !is_valid_identifier(name) {
            return Err(Error::InvalidData(format!("Invalid mesh name '{}'", name)));
        }
        if self.get(name).is_some() {
            return Err(Error::InvalidData(format!("Mesh '{}' already exists under /{}", name, self.root)));
        }

        let transform = (translation != Vector3f::zeros())
            .then(|| Transform3D::from_translation_euler_xyz(translation, rotation_degrees));
        let path = format!("/{}/{}", self.root, name);
        log::debug!(
            "Placing {} ({} vertices, {} faces)",
            path,
            mesh.vertex_count(),
            mesh.face_count()
        );

        self.meshes.push(PlacedMesh {
            name: name.to_string(),
            path,
            mesh,
            color,
            transform,
        });
        let placed = self.meshes.len() - 1;
        Ok(&self.meshes[placed])
    }

    /// All meshes in world space, concatenated
    pub fn merged(&self) -> TriangleMesh {
        let mut merged = TriangleMesh::new();
        let mut normals = Vec::new();
        let mut colors = Vec::new();
        let mut all_normals = true;

        for placed in &self.meshes {
            let mesh = placed.world_mesh();
            let offset = merged.vertex_count();
            merged.faces.extend(mesh.faces.iter().map(|f| f.map(|i| i + offset)));
            match &mesh.normals {
                Some(n) => normals.extend_from_slice(n),
                None => all_normals = false,
            }
            if let Some(c) = &mesh.colors {
                colors.extend_from_slice(c);
            }
            merged.vertices.extend(mesh.vertices);
        }
        if all_normals {
            merged.set_normals(normals);
        }
        merged.set_colors(colors);
        merged
    }

    /// Write the scene; parent directories are created as needed.
    pub fn save<P: AsRef<Path>>(&self, path: P, format: OutputFormat) -> Result<()> {
        let path = path.as_ref();
        if self.meshes.is_empty() {
            return Err(Error::InvalidData("Cannot save a scene without meshes".to_string()));
        }
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let mut writer = BufWriter::new(File::create(path)?);
        match format {
            OutputFormat::Obj => {
                let world: Vec<TriangleMesh> = self.meshes.iter().map(PlacedMesh::world_mesh).collect();
                let objects: Vec<ObjObject<'_>> = self
                    .meshes
                    .iter()
                    .zip(&world)
                    .map(|(placed, mesh)| ObjObject {
                        name: &placed.name,
                        mesh,
                    })
                    .collect();
                ObjWriter::write_objects(&mut writer, &objects)?;
            }
            OutputFormat::PlyAscii | OutputFormat::PlyBinary => {
                let ply_format = if format == OutputFormat::PlyAscii {
                    PlyFormat::Ascii
                } else {
                    PlyFormat::BinaryLittleEndian
                };
                let options = PlyWriteOptions {
                    format: ply_format,
                    comments: self.meshes.iter().map(|m| format!("mesh {}", m.path)).collect(),
                    ..Default::default()
                };
                PlyWriter::write_to(&self.merged(), &mut writer, &options)?;
            }
            OutputFormat::Stl => StlWriter::write_to(&self.merged(), &mut writer)?,
        }
        writer.flush()?;

        log::info!(
            "Saved {} meshes under /{} to {} ({:?})",
            self.meshes.len(),
            self.root,
            path.display(),
            format
        );
        Ok(())
    }
}
