//! Application paths for config, cache, and data.

use directories::{BaseDirs, ProjectDirs};
use std::path::{Path, PathBuf};

/// Application paths.
#[derive(Debug, Clone)]
pub struct AppPaths {
    /// Configuration directory.
    pub config: PathBuf,
    /// Cache directory.
    pub cache: PathBuf,
    /// Data directory (record database, downloaded videos).
    pub data: PathBuf,
}

impl AppPaths {
    /// Platform directories for vidgate.
    #[must_use]
    pub fn new() -> Self {
        if let Some(proj_dirs) = ProjectDirs::from("dev", "vidgate", "vidgate") {
            Self {
                config: proj_dirs.config_dir().to_path_buf(),
                cache: proj_dirs.cache_dir().to_path_buf(),
                data: proj_dirs.data_dir().to_path_buf(),
            }
        } else {
            let home = BaseDirs::new()
                .map_or_else(|| PathBuf::from("."), |d| d.home_dir().to_path_buf());
            Self {
                config: home.join(".config/vidgate"),
                cache: home.join(".cache/vidgate"),
                data: home.join(".local/share/vidgate"),
            }
        }
    }

    /// All three directories under one root. Used for `--data-dir` style
    /// overrides and tests.
    #[must_use]
    pub fn rooted_at(root: &Path) -> Self {
        Self {
            config: root.join("config"),
            cache: root.join("cache"),
            data: root.join("data"),
        }
    }

    /// Default config file.
    #[must_use]
    pub fn config_file(&self) -> PathBuf {
        self.config.join("config.toml")
    }

    /// Generation record database.
    #[must_use]
    pub fn records_db_file(&self) -> PathBuf {
        self.data.join("generations.sqlite")
    }

    /// Directory downloaded videos are written to.
    #[must_use]
    pub fn videos_dir(&self) -> PathBuf {
        self.data.join("videos")
    }

    /// Ensure all directories exist.
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.config)?;
        std::fs::create_dir_all(&self.cache)?;
        std::fs::create_dir_all(&self.data)?;
        std::fs::create_dir_all(self.videos_dir())?;
        Ok(())
    }
}

impl Default for AppPaths {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rooted_layout() {
        let dir = tempfile::tempdir().unwrap();
        let paths = AppPaths::rooted_at(dir.path());
        paths.ensure_dirs().unwrap();
        assert!(paths.videos_dir().is_dir());
        assert!(paths.records_db_file().ends_with("data/generations.sqlite"));
        assert!(paths.config_file().ends_with("config/config.toml"));
    }
}
