//! Output path and format resolution

use labelmesh_core::{Error, Result};
use std::path::{Path, PathBuf};

/// Scene file encodings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Obj,
    PlyAscii,
    PlyBinary,
    Stl,
}

impl OutputFormat {
    pub fn is_ascii(self) -> bool {
        matches!(self, Self::Obj | Self::PlyAscii)
    }
}

/// `<tmp>/labelmesh/sample.stl`
pub fn default_output_path() -> PathBuf {
    std::env::temp_dir().join("labelmesh").join("sample.stl")
}

/// Pick the output path and encoding from an optional user path and the
/// ASCII flag.
///
/// Without a path the default binary STL is used, or `sample.obj` next to
/// it when ASCII is requested. STL has no text form here and OBJ no binary
/// form, so `ascii` with `.stl` is an error while `ascii` with `.obj` is
/// accepted as redundant.
pub fn resolve_output(path: Option<&Path>, ascii: bool) -> Result<(PathBuf, OutputFormat)> {
    let Some(path) = path else {
        let default = default_output_path();
        return Ok(if ascii {
            (default.with_extension("obj"), OutputFormat::Obj)
        } else {
            (default, OutputFormat::Stl)
        });
    };

    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    let format = match (extension.as_str(), ascii) {
        ("stl", true) => {
            return Err(Error::InvalidData(format!(
                "ASCII output requested but {} names a binary STL file",
                path.display()
            )))
        }
        ("stl", false) => OutputFormat::Stl,
        ("obj", _) => OutputFormat::Obj,
        ("ply", true) => OutputFormat::PlyAscii,
        ("ply", false) => OutputFormat::PlyBinary,
        _ => {
            return Err(Error::UnsupportedFormat(format!(
                "Unsupported output format: {}",
                path.display()
            )))
        }
    };
    Ok((path.to_path_buf(), format))
}
