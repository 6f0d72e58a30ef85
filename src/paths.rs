//! Config/data directory lookup and sequence path resolution
//!
//! Directory priority:
//! 1. CLI `--config-dir` argument
//! 2. `GEOSEQ_CONFIG_DIR` environment variable
//! 3. Platform directories from dirs-next
//!
//! Platform paths:
//! - Linux: ~/.config/geoseq, ~/.local/share/geoseq
//! - macOS: ~/Library/Application Support/geoseq
//! - Windows: %APPDATA%\geoseq

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const APP_DIR: &str = "geoseq";

/// Environment override for the config directory
pub const CONFIG_DIR_ENV: &str = "GEOSEQ_CONFIG_DIR";

/// Overrides for default directories
#[derive(Debug, Clone, Default)]
pub struct PathConfig {
    /// Custom config directory (from CLI or ENV)
    pub config_dir: Option<PathBuf>,
}

impl PathConfig {
    /// Priority: CLI arg -> `GEOSEQ_CONFIG_DIR` -> None (platform defaults)
    pub fn from_env_and_cli(cli_dir: Option<PathBuf>) -> Self {
        let config_dir = cli_dir.or_else(|| std::env::var(CONFIG_DIR_ENV).ok().map(PathBuf::from));
        Self { config_dir }
    }

    pub fn config_dir(&self) -> PathBuf {
        if let Some(dir) = &self.config_dir {
            return dir.clone();
        }
        dirs_next::config_dir()
            .map(|d| d.join(APP_DIR))
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Data directory (sequences relative to data resolve here)
    pub fn data_dir(&self) -> PathBuf {
        if let Some(dir) = &self.config_dir {
            return dir.clone();
        }
        dirs_next::data_dir()
            .map(|d| d.join(APP_DIR))
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

/// Path to a configuration file
pub fn config_file(name: &str, config: &PathConfig) -> PathBuf {
    config.config_dir().join(name)
}

/// Create config and data directories if missing
pub fn ensure_dirs(config: &PathConfig) -> Result<()> {
    let config_dir = config.config_dir();
    let data_dir = config.data_dir();

    std::fs::create_dir_all(&config_dir)
        .with_context(|| format!("Failed to create config directory: {}", config_dir.display()))?;
    if data_dir != config_dir {
        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data directory: {}", data_dir.display()))?;
    }
    Ok(())
}

/// What a sequence path is relative to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PathRelation {
    #[default]
    Absolute,
    RelativeToDataDir,
    RelativeToConfigDir,
    RelativeToCurrentDir,
}

/// Turn a user-supplied sequence path into the directory to open.
pub fn resolve_sequence_path(path: &Path, relation: PathRelation, config: &PathConfig) -> Result<PathBuf> {
    let resolved = match relation {
        PathRelation::Absolute => path.to_path_buf(),
        PathRelation::RelativeToDataDir => config.data_dir().join(path),
        PathRelation::RelativeToConfigDir => config.config_dir().join(path),
        PathRelation::RelativeToCurrentDir => std::env::current_dir()
            .context("Failed to get current directory")?
            .join(path),
    };
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn custom() -> PathConfig {
        PathConfig {
            config_dir: Some(PathBuf::from("/custom")),
        }
    }

    #[test]
    fn test_config_file_with_custom_dir() {
        assert_eq!(config_file("geoseq.json", &custom()), PathBuf::from("/custom/geoseq.json"));
        assert_eq!(custom().data_dir(), PathBuf::from("/custom"));
    }

    #[test]
    fn test_platform_defaults_name_app_dir() {
        let config = PathConfig::default();
        let path = config_file("geoseq.json", &config);
        assert!(path.to_string_lossy().contains("geoseq"));
    }

    #[test]
    fn test_cli_beats_env() {
        let config = PathConfig::from_env_and_cli(Some(PathBuf::from("/from/cli")));
        assert_eq!(config.config_dir(), PathBuf::from("/from/cli"));
    }

    #[test]
    fn test_resolve_sequence_path() {
        let config = custom();
        let seq = Path::new("captures/take1");
        assert_eq!(
            resolve_sequence_path(seq, PathRelation::RelativeToDataDir, &config).unwrap(),
            PathBuf::from("/custom/captures/take1")
        );
        assert_eq!(
            resolve_sequence_path(Path::new("/abs/seq"), PathRelation::Absolute, &config).unwrap(),
            PathBuf::from("/abs/seq")
        );
        let cwd = resolve_sequence_path(seq, PathRelation::RelativeToCurrentDir, &config).unwrap();
        assert!(cwd.is_absolute());
        assert!(cwd.ends_with("captures/take1"));
    }

    #[test]
    fn test_ensure_dirs_creates() {
        let dir = tempfile::tempdir().unwrap();
        let config = PathConfig {
            config_dir: Some(dir.path().join("cfg")),
        };
        ensure_dirs(&config).unwrap();
        assert!(dir.path().join("cfg").is_dir());
    }
}
