//! Error types for I/O operations

use thiserror::Error;

/// Errors that can occur during I/O operations
#[derive(Error, Debug)]
pub enum IoError {
    #[error("File not found: {path}")]
    FileNotFound { path: String },

    #[error("Invalid file format: {format}")]
    InvalidFormat { format: String },

    #[error("Unsupported format: {format}")]
    UnsupportedFormat { format: String },

    #[error("Parse error: {message}")]
    ParseError { message: String },

    #[error("Write error: {message}")]
    WriteError { message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<IoError> for labelmesh_core::Error {
    fn from(err: IoError) -> Self {
        match err {
            IoError::FileNotFound { path } => labelmesh_core::Error::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("File not found: {}", path),
            )),
            IoError::InvalidFormat { format } => labelmesh_core::Error::InvalidData(format),
            IoError::UnsupportedFormat { format } => labelmesh_core::Error::UnsupportedFormat(format),
            IoError::ParseError { message } => labelmesh_core::Error::InvalidData(message),
            IoError::WriteError { message } => labelmesh_core::Error::InvalidData(message),
            IoError::Io(err) => labelmesh_core::Error::Io(err),
        }
    }
}
