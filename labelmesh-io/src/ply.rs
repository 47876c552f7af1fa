//! PLY format support

use crate::{MeshReader, MeshWriter};
use labelmesh_core::{Error, Point3f, Result, TriangleMesh, Vector3f};
use ply_rs::{
    parser::Parser,
    ply::{Addable, DefaultElement, ElementDef, Encoding, Ply, Property, PropertyDef, PropertyType, ScalarType},
    writer::Writer,
};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

/// PLY body encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlyFormat {
    Ascii,
    BinaryLittleEndian,
    BinaryBigEndian,
}

impl From<PlyFormat> for Encoding {
    fn from(format: PlyFormat) -> Self {
        match format {
            PlyFormat::Ascii => Encoding::Ascii,
            PlyFormat::BinaryLittleEndian => Encoding::BinaryLittleEndian,
            PlyFormat::BinaryBigEndian => Encoding::BinaryBigEndian,
        }
    }
}

/// Options for writing PLY meshes
#[derive(Debug, Clone)]
pub struct PlyWriteOptions {
    pub format: PlyFormat,
    /// Write `nx ny nz` when the mesh has normals
    pub include_normals: bool,
    /// Write `red green blue` when the mesh has colors
    pub include_colors: bool,
    pub comments: Vec<String>,
}

impl Default for PlyWriteOptions {
    fn default() -> Self {
        Self {
            format: PlyFormat::BinaryLittleEndian,
            include_normals: true,
            include_colors: true,
            comments: Vec::new(),
        }
    }
}

impl PlyWriteOptions {
    pub fn ascii() -> Self {
        Self {
            format: PlyFormat::Ascii,
            ..Default::default()
        }
    }

    pub fn binary_little_endian() -> Self {
        Self::default()
    }

    pub fn binary_big_endian() -> Self {
        Self {
            format: PlyFormat::BinaryBigEndian,
            ..Default::default()
        }
    }

    pub fn with_normals(mut self, include: bool) -> Self {
        self.include_normals = include;
        self
    }

    pub fn with_colors(mut self, include: bool) -> Self {
        self.include_colors = include;
        self
    }

    pub fn with_comment<S: Into<String>>(mut self, comment: S) -> Self {
        self.comments.push(comment.into());
        self
    }
}

pub struct PlyReader;
pub struct PlyWriter;

impl PlyWriter {
    /// Write a mesh with explicit options
    pub fn write_mesh_with_options<P: AsRef<Path>>(
        mesh: &TriangleMesh,
        path: P,
        options: &PlyWriteOptions,
    ) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        Self::write_to(mesh, &mut writer, options)?;
        writer.flush()?;
        Ok(())
    }

    /// Encode a mesh into any writer
    pub fn write_to<W: Write>(mesh: &TriangleMesh, writer: &mut W, options: &PlyWriteOptions) -> Result<()> {
        let normals = mesh.normals.as_ref().filter(|_| options.include_normals);
        let colors = mesh.colors.as_ref().filter(|_| options.include_colors);

        let mut ply = Ply::<DefaultElement>::new();
        ply.header.encoding = options.format.into();
        ply.header.comments.extend(options.comments.iter().cloned());

        // Define vertex element
        let mut vertex_element = ElementDef::new("vertex".to_string());
        vertex_element.count = mesh.vertices.len();
        let mut scalar = |name: &str, kind: ScalarType| {
            vertex_element
                .properties
                .add(PropertyDef::new(name.to_string(), PropertyType::Scalar(kind)));
        };
        for name in ["x", "y", "z"] {
            scalar(name, ScalarType::Float);
        }
        if normals.is_some() {
            for name in ["nx", "ny", "nz"] {
                scalar(name, ScalarType::Float);
            }
        }
        if colors.is_some() {
            for name in ["red", "green", "blue"] {
                scalar(name, ScalarType::UChar);
            }
        }
        ply.header.elements.add(vertex_element);

        // Define face element
        let mut face_element = ElementDef::new("face".to_string());
        face_element.count = mesh.faces.len();
        face_element.properties.add(PropertyDef::new(
            "vertex_indices".to_string(),
            PropertyType::List(ScalarType::UChar, ScalarType::Int),
        ));
        ply.header.elements.add(face_element);

        // Add vertex data
        let mut vertices = Vec::with_capacity(mesh.vertices.len());
        for (i, vertex) in mesh.vertices.iter().enumerate() {
            let mut element = DefaultElement::new();
            element.insert("x".to_string(), Property::Float(vertex.x));
            element.insert("y".to_string(), Property::Float(vertex.y));
            element.insert("z".to_string(), Property::Float(vertex.z));
            if let Some(normals) = normals {
                element.insert("nx".to_string(), Property::Float(normals[i].x));
                element.insert("ny".to_string(), Property::Float(normals[i].y));
                element.insert("nz".to_string(), Property::Float(normals[i].z));
            }
            if let Some(colors) = colors {
                let [r, g, b] = colors[i];
                element.insert("red".to_string(), Property::UChar(r));
                element.insert("green".to_string(), Property::UChar(g));
                element.insert("blue".to_string(), Property::UChar(b));
            }
            vertices.push(element);
        }
        ply.payload.insert("vertex".to_string(), vertices);

        // Add face data
        let mut faces = Vec::with_capacity(mesh.faces.len());
        for face in &mesh.faces {
            let mut element = DefaultElement::new();
            let indices = face
                .iter()
                .map(|&i| {
                    i32::try_from(i).map_err(|_| Error::InvalidData(format!("vertex index {} exceeds PLY int range", i)))
                })
                .collect::<Result<Vec<i32>>>()?;
            element.insert("vertex_indices".to_string(), Property::ListInt(indices));
            faces.push(element);
        }
        ply.payload.insert("face".to_string(), faces);

        Writer::new().write_ply(writer, &mut ply)?;
        Ok(())
    }
}

impl MeshWriter for PlyWriter {
    fn write_mesh<P: AsRef<Path>>(mesh: &TriangleMesh, path: P) -> Result<()> {
        Self::write_mesh_with_options(mesh, path, &PlyWriteOptions::default())
    }
}

impl MeshReader for PlyReader {
    fn read_mesh<P: AsRef<Path>>(path: P) -> Result<TriangleMesh> {
        let mut reader = BufReader::new(File::open(path)?);
        let ply = Parser::<DefaultElement>::new().read_ply(&mut reader)?;

        let vertex_elements = ply.payload.get("vertex").map(Vec::as_slice).unwrap_or_default();
        let vertices = vertex_elements
            .iter()
            .map(|v| {
                Ok(Point3f::new(
                    extract_property_value(v, "x")?,
                    extract_property_value(v, "y")?,
                    extract_property_value(v, "z")?,
                ))
            })
            .collect::<Result<Vec<_>>>()?;

        let mut faces = Vec::new();
        if let Some(face_elements) = ply.payload.get("face") {
            for face in face_elements {
                let indices = extract_face_indices(face)?;
                // Fan-triangulate polygons
                for k in 1..indices.len().saturating_sub(1) {
                    faces.push([indices[0], indices[k], indices[k + 1]]);
                }
            }
        }
        if let Some(bad) = faces.iter().flatten().find(|&&i| i >= vertices.len()) {
            return Err(Error::InvalidData(format!("face references missing vertex {}", bad)));
        }

        // Normals and colors only when every vertex carries them
        let normals: Option<Vec<Vector3f>> = vertex_elements
            .iter()
            .map(|v| {
                Some(Vector3f::new(
                    extract_property_value(v, "nx").ok()?,
                    extract_property_value(v, "ny").ok()?,
                    extract_property_value(v, "nz").ok()?,
                ))
            })
            .collect();
        let colors: Option<Vec<[u8; 3]>> = vertex_elements
            .iter()
            .map(|v| Some([color_channel(v, "red")?, color_channel(v, "green")?, color_channel(v, "blue")?]))
            .collect();

        let mut mesh = TriangleMesh::from_vertices_and_faces(vertices, faces);
        if let Some(normals) = normals.filter(|n| !n.is_empty()) {
            mesh.set_normals(normals);
        }
        if let Some(colors) = colors.filter(|c| !c.is_empty()) {
            mesh.set_colors(colors);
        }
        Ok(mesh)
    }
}

/// Extract a property value as f32 from a PLY element
fn extract_property_value(element: &DefaultElement, name: &str) -> Result<f32> {
    match element.get(name) {
        Some(Property::Float(val)) => Ok(*val),
        Some(Property::Double(val)) => Ok(*val as f32),
        Some(Property::Int(val)) => Ok(*val as f32),
        Some(Property::UInt(val)) => Ok(*val as f32),
        Some(Property::Short(val)) => Ok(*val as f32),
        Some(Property::UShort(val)) => Ok(*val as f32),
        _ => Err(Error::InvalidData(format!(
            "Property '{}' not found or invalid type",
            name
        ))),
    }
}

fn color_channel(element: &DefaultElement, name: &str) -> Option<u8> {
    match element.get(name) {
        Some(Property::UChar(val)) => Some(*val),
        Some(Property::Float(val)) => Some((val.clamp(0.0, 1.0) * 255.0).round() as u8),
        _ => None,
    }
}

/// Extract face indices from a PLY face element
fn extract_face_indices(element: &DefaultElement) -> Result<Vec<usize>> {
    let to_index = |idx: i64| {
        usize::try_from(idx).map_err(|_| Error::InvalidData(format!("negative vertex index {}", idx)))
    };
    match element.get("vertex_indices").or_else(|| element.get("vertex_index")) {
        Some(Property::ListInt(indices)) => indices.iter().map(|&idx| to_index(idx as i64)).collect(),
        Some(Property::ListUInt(indices)) => indices.iter().map(|&idx| to_index(idx as i64)).collect(),
        _ => Err(Error::InvalidData("Face indices not found".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("labelmesh_ply_{}_{}", std::process::id(), name))
    }

    fn colored_triangle() -> TriangleMesh {
        let mut mesh = TriangleMesh::from_vertices_and_faces(
            vec![
                Point3f::new(-1.0, -1.0, 0.0),
                Point3f::new(1.0, -1.0, 0.0),
                Point3f::new(0.0, 1.0, 0.0),
            ],
            vec![[0, 1, 2]],
        );
        mesh.set_normals(vec![Vector3f::z(); 3]);
        mesh.set_colors(vec![[255, 0, 0], [0, 255, 0], [0, 0, 255]]);
        mesh
    }

    #[test]
    fn test_round_trip_all_formats() {
        let formats = [PlyFormat::Ascii, PlyFormat::BinaryLittleEndian, PlyFormat::BinaryBigEndian];
        for (i, format) in formats.into_iter().enumerate() {
            let path = temp_path(&format!("roundtrip_{}.ply", i));
            let mesh = colored_triangle();
            let options = PlyWriteOptions {
                format,
                comments: vec!["round trip".to_string()],
                ..Default::default()
            };
            PlyWriter::write_mesh_with_options(&mesh, &path, &options).unwrap();

            let loaded = PlyReader::read_mesh(&path).unwrap();
            assert_eq!(loaded.vertices, mesh.vertices, "format {:?}", format);
            assert_eq!(loaded.faces, mesh.faces);
            assert_eq!(loaded.normals, mesh.normals);
            assert_eq!(loaded.colors, mesh.colors);

            std::fs::remove_file(&path).unwrap();
        }
    }

    #[test]
    fn test_ascii_header() {
        let mut buffer = Vec::new();
        let options = PlyWriteOptions::ascii().with_comment("labelmesh").with_colors(false);
        PlyWriter::write_to(&colored_triangle(), &mut buffer, &options).unwrap();

        let text = String::from_utf8(buffer).unwrap();
        assert!(text.starts_with("ply\nformat ascii 1.0\n"));
        assert!(text.contains("comment labelmesh"));
        assert!(text.contains("property float nx"));
        assert!(!text.contains("property uchar red"));
        assert!(text.contains("element face 1"));
    }

    #[test]
    fn test_attributes_can_be_omitted() {
        let path = temp_path("plain.ply");
        let options = PlyWriteOptions::binary_big_endian().with_normals(false).with_colors(false);
        PlyWriter::write_mesh_with_options(&colored_triangle(), &path, &options).unwrap();

        let loaded = PlyReader::read_mesh(&path).unwrap();
        assert_eq!(loaded.face_count(), 1);
        assert!(loaded.normals.is_none());
        assert!(loaded.colors.is_none());

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_reader_triangulates_quads() {
        let path = temp_path("quad.ply");
        let content = "ply\nformat ascii 1.0\nelement vertex 4\nproperty float x\nproperty float y\nproperty float z\n\
                       element face 1\nproperty list uchar int vertex_indices\nend_header\n\
                       0 0 0\n1 0 0\n1 1 0\n0 1 0\n4 0 1 2 3\n";
        std::fs::write(&path, content).unwrap();

        let mesh = PlyReader::read_mesh(&path).unwrap();
        assert_eq!(mesh.faces, vec![[0, 1, 2], [0, 2, 3]]);

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_reader_rejects_dangling_indices() {
        let path = temp_path("dangling.ply");
        let content = "ply\nformat ascii 1.0\nelement vertex 1\nproperty float x\nproperty float y\nproperty float z\n\
                       element face 1\nproperty list uchar int vertex_indices\nend_header\n\
                       0 0 0\n3 0 1 2\n";
        std::fs::write(&path, content).unwrap();
        assert!(PlyReader::read_mesh(&path).is_err());
        std::fs::remove_file(&path).unwrap();
    }
}
