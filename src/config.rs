//! Stream settings, persisted as JSON
//!
//! Missing fields fall back to defaults so older settings files keep loading.

use anyhow::{Context, Result};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::core::reader::ReaderOptions;
use crate::entities::header::DEFAULT_HEADER_LINE_LIMIT;
use crate::entities::sequence::SequenceIndex;
use crate::utils::media::{GEOMETRY_EXT, TEXTURE_EXT};

/// Settings file name inside the config dir
pub const SETTINGS_FILE: &str = "geoseq.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamSettings {
    // Buffering
    pub buffer_size: usize, // Slots in the ring buffer (window width)
    pub header_line_limit: usize,
    pub header_cache_size: usize,

    // Workers
    pub use_all_threads: bool,
    pub thread_count: usize, // Used when use_all_threads is false

    // Playback
    pub playback_fps: f64,
    pub loop_play: bool,
    pub play_at_start: bool,

    // Files
    pub geometry_extension: String,
    pub texture_extension: String,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            buffer_size: 30,
            header_line_limit: DEFAULT_HEADER_LINE_LIMIT,
            header_cache_size: 1024,
            use_all_threads: true,
            thread_count: 4,
            playback_fps: 30.0,
            loop_play: true,
            play_at_start: true,
            geometry_extension: GEOMETRY_EXT.to_string(),
            texture_extension: TEXTURE_EXT.to_string(),
        }
    }
}

impl StreamSettings {
    /// Load from `path`; a missing file yields defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("No settings at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings: {}", path.display()))?;
        let settings: Self = serde_json::from_str(&json)
            .with_context(|| format!("Failed to parse settings: {}", path.display()))?;
        info!("Loaded settings from {}", path.display());
        Ok(settings)
    }

    /// Write as pretty JSON, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create settings dir: {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(self).context("Failed to serialize settings")?;
        std::fs::write(path, json).with_context(|| format!("Failed to write settings: {}", path.display()))?;
        debug!("Saved settings to {}", path.display());
        Ok(())
    }

    /// Worker thread count, "use all" resolved with `num_cpus`
    pub fn worker_threads(&self) -> usize {
        if self.use_all_threads {
            num_cpus::get().max(1)
        } else {
            self.thread_count.max(1)
        }
    }

    pub fn reader_options(&self) -> ReaderOptions {
        ReaderOptions {
            buffer_size: self.buffer_size,
            header_line_limit: self.header_line_limit,
            header_cache_size: self.header_cache_size,
        }
    }

    pub fn sequence_index(&self) -> SequenceIndex {
        SequenceIndex::new(&self.geometry_extension, &self.texture_extension)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let s = StreamSettings::default();
        assert_eq!(s.buffer_size, 30);
        assert_eq!(s.thread_count, 4);
        assert!(s.use_all_threads && s.loop_play && s.play_at_start);
        assert_eq!(s.geometry_extension, "ply");
        assert_eq!(s.reader_options().header_line_limit, 64);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let s: StreamSettings = serde_json::from_str(r#"{"buffer_size": 8, "loop_play": false}"#).unwrap();
        assert_eq!(s.buffer_size, 8);
        assert!(!s.loop_play);
        assert_eq!(s.playback_fps, 30.0);
    }

    #[test]
    fn test_save_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(SETTINGS_FILE);

        assert_eq!(StreamSettings::load(&path).unwrap(), StreamSettings::default());

        let s = StreamSettings {
            buffer_size: 12,
            use_all_threads: false,
            thread_count: 3,
            ..Default::default()
        };
        s.save(&path).unwrap();
        let loaded = StreamSettings::load(&path).unwrap();
        assert_eq!(loaded, s);
        assert_eq!(loaded.worker_threads(), 3);
    }

    #[test]
    fn test_bad_json_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SETTINGS_FILE);
        std::fs::write(&path, "{ not json").unwrap();
        let err = StreamSettings::load(&path).unwrap_err();
        assert!(err.to_string().contains("parse"));
    }
}
