//! Binary STL writing

use crate::MeshWriter;
use byteorder::{LittleEndian, WriteBytesExt};
use labelmesh_core::{Error, Result, TriangleMesh, Vector3f};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

const STL_HEADER: &[u8] = b"labelmesh binary STL";

pub struct StlWriter;

impl StlWriter {
    /// 80-byte header, triangle count, then one 50-byte record per face
    pub fn write_to<W: Write>(mesh: &TriangleMesh, writer: &mut W) -> Result<()> {
        let count = u32::try_from(mesh.face_count())
            .map_err(|_| Error::InvalidData(format!("{} faces exceed the STL limit", mesh.face_count())))?;

        let mut header = [0u8; 80];
        header[..STL_HEADER.len()].copy_from_slice(STL_HEADER);
        writer.write_all(&header)?;
        writer.write_u32::<LittleEndian>(count)?;

        for (face, normal) in mesh.faces.iter().zip(mesh.calculate_face_normals()) {
            write_vector(writer, &normal)?;
            for &v in face {
                write_vector(writer, &mesh.vertices[v].coords)?;
            }
            writer.write_u16::<LittleEndian>(0)?;
        }
        Ok(())
    }
}

fn write_vector<W: Write>(writer: &mut W, v: &Vector3f) -> Result<()> {
    writer.write_f32::<LittleEndian>(v.x)?;
    writer.write_f32::<LittleEndian>(v.y)?;
    writer.write_f32::<LittleEndian>(v.z)?;
    Ok(())
}

impl MeshWriter for StlWriter {
    fn write_mesh<P: AsRef<Path>>(mesh: &TriangleMesh, path: P) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        Self::write_to(mesh, &mut writer)?;
        writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use byteorder::ReadBytesExt;
    use labelmesh_core::Point3f;
    use std::io::Cursor;

    #[test]
    fn test_binary_layout() {
        let mesh = TriangleMesh::from_vertices_and_faces(
            vec![
                Point3f::new(0.0, 0.0, 0.0),
                Point3f::new(2.0, 0.0, 0.0),
                Point3f::new(0.0, 2.0, 0.0),
                Point3f::new(0.0, 0.0, 2.0),
            ],
            vec![[0, 2, 1], [0, 1, 3]],
        );
        let mut buffer = Vec::new();
        StlWriter::write_to(&mesh, &mut buffer).unwrap();
        assert_eq!(buffer.len(), 84 + 2 * 50);
        assert!(buffer.starts_with(STL_HEADER));

        let mut cursor = Cursor::new(&buffer[80..]);
        assert_eq!(cursor.read_u32::<LittleEndian>().unwrap(), 2);
        let normal: Vec<f32> = (0..3).map(|_| cursor.read_f32::<LittleEndian>().unwrap()).collect();
        assert_eq!(normal, vec![0.0, 0.0, -1.0]);
        let first: Vec<f32> = (0..3).map(|_| cursor.read_f32::<LittleEndian>().unwrap()).collect();
        assert_eq!(first, vec![0.0, 0.0, 0.0]);
        let second: Vec<f32> = (0..3).map(|_| cursor.read_f32::<LittleEndian>().unwrap()).collect();
        assert_eq!(second, vec![0.0, 2.0, 0.0]);
    }

    #[test]
    fn test_empty_mesh() {
        let mut buffer = Vec::new();
        StlWriter::write_to(&TriangleMesh::new(), &mut buffer).unwrap();
        assert_eq!(buffer.len(), 84);
    }
}
