//! Abstract traits for dependency inversion.
//!
//! The streaming core never reaches into global state: the executor, the
//! storage backend and the display sink are all injected through these traits.
//!
//! Implementations: `core::workers` (executors), [`FsSource`] (storage).
//! Sinks live with the caller (renderer).

use std::io::{self, Read, Seek};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::frame::{FrameView, TextureView};
use super::header::Topology;
use crate::utils::media::has_extension;

/// Boxed job accepted by worker pools
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Abstract worker pool interface.
///
/// Allows the reader to schedule decode work without knowing
/// the concrete thread pool implementation.
pub trait WorkerPool: Send + Sync {
    /// Run `job` on some worker. Fire-and-forget: completion is tracked by the job itself.
    fn execute(&self, job: Job);

    /// Number of threads backing the pool (0 for inline execution)
    fn threads(&self) -> usize;
}

/// Seekable byte stream handed out by a [`FileSource`]
pub trait ReadSeek: Read + Seek + Send {}

impl<T: Read + Seek + Send> ReadSeek for T {}

/// Directory-listing and file-read facility.
pub trait FileSource: Send + Sync {
    /// List files in `dir` with extension `ext` (no dot, case-insensitive), unordered.
    ///
    /// Must fail if `dir` does not exist or cannot be listed.
    fn list(&self, dir: &Path, ext: &str) -> io::Result<Vec<PathBuf>>;

    /// Open a file for reading.
    fn open(&self, path: &Path) -> io::Result<Box<dyn ReadSeek>>;
}

/// Rendering sink that receives decoded frames.
///
/// Views handed to the sink borrow reader-owned buffers and are only valid
/// for the duration of the call.
pub trait FrameSink {
    /// Whether a material/shader is configured for `topology`.
    ///
    /// Queried once per sequence load; `false` fails the load with `MaterialMissing`.
    fn has_material(&self, _topology: Topology) -> bool {
        true
    }

    /// Display one decoded frame (geometry plus per-frame texture if any).
    fn show_frame(&mut self, frame: FrameView<'_>);

    /// Upload a texture shared by all frames (single texture mode).
    fn apply_texture(&mut self, texture: TextureView<'_>);
}

/// Local filesystem source
#[derive(Debug, Clone, Copy, Default)]
pub struct FsSource;

impl FileSource for FsSource {
    fn list(&self, dir: &Path, ext: &str) -> io::Result<Vec<PathBuf>> {
        let meta = std::fs::metadata(dir)?;
        if !meta.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::NotADirectory,
                format!("{} is not a directory", dir.display()),
            ));
        }

        let pattern = format!(
            "{}/*.{}",
            glob::Pattern::escape(&dir.to_string_lossy()),
            ext.trim_start_matches('.')
        );
        let options = glob::MatchOptions {
            case_sensitive: false,
            ..Default::default()
        };

        let entries = glob::glob_with(&pattern, options)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, format!("Glob error for pattern {}: {}", pattern, e)))?;

        let mut paths = Vec::new();
        for entry in entries {
            match entry {
                Ok(path) if path.is_file() && has_extension(&path, ext) => paths.push(path),
                Ok(_) => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(paths)
    }

    fn open(&self, path: &Path) -> io::Result<Box<dyn ReadSeek>> {
        Ok(Box::new(std::fs::File::open(path)?))
    }
}

/// Blanket impls: Arc<T> implements traits if T does
impl<T: WorkerPool + ?Sized> WorkerPool for Arc<T> {
    fn execute(&self, job: Job) {
        (**self).execute(job)
    }

    fn threads(&self) -> usize {
        (**self).threads()
    }
}

impl<T: FileSource + ?Sized> FileSource for Arc<T> {
    fn list(&self, dir: &Path, ext: &str) -> io::Result<Vec<PathBuf>> {
        (**self).list(dir, ext)
    }

    fn open(&self, path: &Path) -> io::Result<Box<dyn ReadSeek>> {
        (**self).open(path)
    }
}
