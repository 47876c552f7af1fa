//! Wavefront OBJ writing
//!
//! Several named objects can share one file. Vertex colors use the common
//! `v x y z r g b` extension with channels in `[0, 1]`.

use crate::MeshWriter;
use labelmesh_core::{Result, TriangleMesh};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

pub struct ObjWriter;

/// One `o` block of an OBJ file
pub struct ObjObject<'a> {
    pub name: &'a str,
    pub mesh: &'a TriangleMesh,
}

impl ObjWriter {
    /// Write objects in order; indices are global and 1-based as OBJ requires
    pub fn write_objects<W: Write>(writer: &mut W, objects: &[ObjObject<'_>]) -> Result<()> {
        writeln!(writer, "# labelmesh")?;
        let mut offset = 1usize;

        for object in objects {
            let mesh = object.mesh;
            writeln!(writer, "o {}", object.name)?;

            for (i, v) in mesh.vertices.iter().enumerate() {
                match &mesh.colors {
                    Some(colors) => {
                        let [r, g, b] = colors[i].map(|c| c as f32 / 255.0);
                        writeln!(writer, "v {} {} {} {:.6} {:.6} {:.6}", v.x, v.y, v.z, r, g, b)?;
                    }
                    None => writeln!(writer, "v {} {} {}", v.x, v.y, v.z)?,
                }
            }
            if let Some(normals) = &mesh.normals {
                for n in normals {
                    writeln!(writer, "vn {} {} {}", n.x, n.y, n.z)?;
                }
            }

            let has_normals = mesh.normals.is_some();
            for face in &mesh.faces {
                let [a, b, c] = face.map(|i| i + offset);
                if has_normals {
                    writeln!(writer, "f {a}//{a} {b}//{b} {c}//{c}")?;
                } else {
                    writeln!(writer, "f {a} {b} {c}")?;
                }
            }
            offset += mesh.vertex_count();
        }
        Ok(())
    }
}

impl MeshWriter for ObjWriter {
    fn write_mesh<P: AsRef<Path>>(mesh: &TriangleMesh, path: P) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        Self::write_objects(&mut writer, &[ObjObject { name: "mesh", mesh }])?;
        writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use labelmesh_core::{Point3f, Vector3f};

    fn triangle() -> TriangleMesh {
        TriangleMesh::from_vertices_and_faces(
            vec![
                Point3f::new(0.0, 0.0, 0.0),
                Point3f::new(1.0, 0.0, 0.0),
                Point3f::new(0.5, 1.0, 0.0),
            ],
            vec![[0, 1, 2]],
        )
    }

    fn render(objects: &[ObjObject<'_>]) -> String {
        let mut buffer = Vec::new();
        ObjWriter::write_objects(&mut buffer, objects).unwrap();
        String::from_utf8(buffer).unwrap()
    }

    #[test]
    fn test_plain_mesh() {
        let mesh = triangle();
        let text = render(&[ObjObject { name: "Liver", mesh: &mesh }]);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[1], "o Liver");
        assert_eq!(lines[2], "v 0 0 0");
        assert_eq!(lines[4], "v 0.5 1 0");
        assert_eq!(lines[5], "f 1 2 3");
    }

    #[test]
    fn test_colors_and_normals() {
        let mut mesh = triangle();
        mesh.set_colors(vec![[255, 0, 51]; 3]);
        mesh.set_normals(vec![Vector3f::z(); 3]);
        let text = render(&[ObjObject { name: "Heart", mesh: &mesh }]);

        assert!(text.contains("v 1 0 0 1.000000 0.000000 0.200000"));
        assert!(text.contains("vn 0 0 1"));
        assert!(text.contains("f 1//1 2//2 3//3"));
    }

    #[test]
    fn test_indices_continue_across_objects() {
        let first = triangle();
        let second = triangle();
        let text = render(&[
            ObjObject { name: "a", mesh: &first },
            ObjObject { name: "b", mesh: &second },
        ]);
        assert!(text.contains("o b\n"));
        assert!(text.trim_end().ends_with("f 4 5 6"));
    }

    #[test]
    fn test_write_file() {
        let path = std::env::temp_dir().join(format!("labelmesh_obj_{}.obj", std::process::id()));
        ObjWriter::write_mesh(&triangle(), &path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().filter(|l| l.starts_with("v ")).count(), 3);
        std::fs::remove_file(&path).unwrap();
    }
}
