//! Error types for sequence streaming.
//!
//! Two classes of failure exist:
//! - **Sequence-level** (`InvalidDirectory`, `EmptySequence`, `MaterialMissing`):
//!   returned synchronously from open/load, nothing stays allocated.
//! - **Frame-local** (everything else): absorbed by the scheduler, logged,
//!   and the affected frame index is skipped for the rest of the sequence.

use std::path::PathBuf;
use thiserror::Error;

use crate::entities::header::Topology;

/// Main error type for geoseq operations.
#[derive(Error, Debug)]
pub enum StreamError {
    /// Sequence directory does not exist or cannot be listed
    #[error("Sequence path is not valid or has restricted access: {path}")]
    InvalidDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Directory contains no geometry files with the expected extension
    #[error("No geometry files in sequence directory: {0}")]
    EmptySequence(PathBuf),

    /// Header structure is malformed or truncated
    #[error("Corrupt header in {path}: {reason}")]
    CorruptHeader { path: PathBuf, reason: String },

    /// Header is well-formed but declares a payload layout we cannot stream
    #[error("Unsupported encoding in {path}: {reason}")]
    UnsupportedEncoding { path: PathBuf, reason: String },

    /// Texture payload size differs from the buffer prepared for it
    #[error("Texture size mismatch in {path}: expected {expected} bytes, got {actual}")]
    SizeMismatch {
        path: PathBuf,
        expected: usize,
        actual: usize,
    },

    /// Sink has no material/shader configured for the sequence topology
    #[error("No material configured for {0:?} topology")]
    MaterialMissing(Topology),

    /// Decode job was dropped or panicked before reporting a result
    #[error("Decode task aborted before completion")]
    TaskAborted,

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StreamError {
    /// Create a corrupt header error.
    pub fn corrupt(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::CorruptHeader {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create an unsupported encoding error.
    pub fn unsupported(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::UnsupportedEncoding {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// True for errors that only affect one frame and never abort a sequence.
    pub fn is_frame_local(&self) -> bool {
        !matches!(
            self,
            Self::InvalidDirectory { .. } | Self::EmptySequence(_) | Self::MaterialMissing(_)
        )
    }
}

/// Result type alias for geoseq operations.
pub type Result<T> = std::result::Result<T, StreamError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let e = StreamError::corrupt("/seq/frame1.ply", "missing end_header");
        assert!(e.to_string().contains("frame1.ply"));
        assert!(e.to_string().contains("end_header"));

        let e = StreamError::SizeMismatch {
            path: PathBuf::from("t.dds"),
            expected: 128,
            actual: 256,
        };
        assert!(e.to_string().contains("128"));
        assert!(e.to_string().contains("256"));
    }

    #[test]
    fn test_frame_local_classification() {
        assert!(StreamError::corrupt("a", "b").is_frame_local());
        assert!(StreamError::unsupported("a", "ascii").is_frame_local());
        assert!(StreamError::TaskAborted.is_frame_local());
        assert!(!StreamError::EmptySequence(PathBuf::from("x")).is_frame_local());
        assert!(!StreamError::MaterialMissing(Topology::Mesh).is_frame_local());
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "test");
        let err: StreamError = io_err.into();
        assert!(matches!(err, StreamError::Io(_)));
    }
}
