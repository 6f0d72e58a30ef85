//! Sequence directory indexing
//!
//! Lists geometry and texture files of a sequence directory, orders them
//! numerically and decides the texture mode. The result is an immutable
//! [`SequenceHandle`] shared by the reader and the facade.

use std::path::{Path, PathBuf};

use log::{info, warn};

use super::traits::FileSource;
use crate::error::{Result, StreamError};
use crate::utils::media::{GEOMETRY_EXT, TEXTURE_EXT};
use crate::utils::natural_cmp_paths;

/// How textures map onto geometry frames
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureMode {
    /// No textures in the directory
    None,
    /// One texture shared by all frames
    Single,
    /// One texture per frame, decoded alongside the geometry
    PerFrame,
}

/// One opened sequence. Immutable for its lifetime.
#[derive(Debug, Clone)]
pub struct SequenceHandle {
    pub directory: PathBuf,
    pub geometry_paths: Vec<PathBuf>,
    pub texture_paths: Vec<PathBuf>,
    pub texture_mode: TextureMode,
    /// Target frame interval (1000 / fps)
    pub frame_interval_ms: f64,
}

impl SequenceHandle {
    pub fn total_frames(&self) -> usize {
        self.geometry_paths.len()
    }

    /// Sequence length in milliseconds
    pub fn total_duration_ms(&self) -> f64 {
        self.total_frames() as f64 * self.frame_interval_ms
    }

    pub fn fps(&self) -> f64 {
        1000.0 / self.frame_interval_ms
    }

    pub fn geometry_path(&self, index: usize) -> Option<&Path> {
        self.geometry_paths.get(index).map(PathBuf::as_path)
    }

    /// Texture decoded together with frame `index` (PerFrame mode only)
    pub fn frame_texture_path(&self, index: usize) -> Option<&Path> {
        match self.texture_mode {
            TextureMode::PerFrame => self.texture_paths.get(index).map(PathBuf::as_path),
            _ => None,
        }
    }

    /// Texture shared by all frames (Single mode only)
    pub fn single_texture_path(&self) -> Option<&Path> {
        match self.texture_mode {
            TextureMode::Single => self.texture_paths.first().map(PathBuf::as_path),
            _ => None,
        }
    }
}

/// Builder for [`SequenceHandle`]
#[derive(Debug, Clone)]
pub struct SequenceIndex {
    pub geometry_extension: String,
    pub texture_extension: String,
}

impl Default for SequenceIndex {
    fn default() -> Self {
        Self {
            geometry_extension: GEOMETRY_EXT.to_string(),
            texture_extension: TEXTURE_EXT.to_string(),
        }
    }
}

impl SequenceIndex {
    pub fn new(geometry_extension: impl Into<String>, texture_extension: impl Into<String>) -> Self {
        Self {
            geometry_extension: geometry_extension.into(),
            texture_extension: texture_extension.into(),
        }
    }

    /// Index `directory` for playback at `fps`.
    ///
    /// Fails with `InvalidDirectory` if it cannot be listed and with
    /// `EmptySequence` if it holds no geometry files. Texture listing never fails
    /// the build.
    pub fn build(&self, source: &dyn FileSource, directory: &Path, fps: f64) -> Result<SequenceHandle> {
        let mut geometry_paths = source
            .list(directory, &self.geometry_extension)
            .map_err(|e| StreamError::InvalidDirectory {
                path: directory.to_path_buf(),
                source: e,
            })?;

        if geometry_paths.is_empty() {
            return Err(StreamError::EmptySequence(directory.to_path_buf()));
        }
        geometry_paths.sort_by(|a, b| natural_cmp_paths(a, b));

        let mut texture_paths = match source.list(directory, &self.texture_extension) {
            Ok(paths) => paths,
            Err(e) => {
                warn!("Texture listing failed in {}: {}", directory.display(), e);
                Vec::new()
            }
        };
        texture_paths.sort_by(|a, b| natural_cmp_paths(a, b));

        let texture_mode = texture_mode_for(geometry_paths.len(), texture_paths.len(), directory);

        let fps = if fps.is_finite() && fps > 0.0 {
            fps
        } else {
            warn!("Invalid playback fps {}, using 30", fps);
            30.0
        };

        info!(
            "Indexed sequence {}: {} frames, {} textures ({:?}) @ {} fps",
            directory.display(),
            geometry_paths.len(),
            texture_paths.len(),
            texture_mode,
            fps
        );

        Ok(SequenceHandle {
            directory: directory.to_path_buf(),
            geometry_paths,
            texture_paths,
            texture_mode,
            frame_interval_ms: 1000.0 / fps,
        })
    }
}

/// Mismatched counts fall back to PerFrame: frames past the last texture get none.
fn texture_mode_for(geometry: usize, textures: usize, directory: &Path) -> TextureMode {
    match textures {
        0 => TextureMode::None,
        1 => TextureMode::Single,
        n => {
            if n != geometry {
                warn!(
                    "Texture count {} does not match geometry count {} in {}",
                    n,
                    geometry,
                    directory.display()
                );
            }
            TextureMode::PerFrame
        }
    }
}
