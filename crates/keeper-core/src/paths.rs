//! Data directory resolution.
//!
//! Keeper keeps everything under one root directory:
//!
//! ```text
//! ~/.keeper/                 (or $KEEPER_HOME, or --data-dir)
//! ├── data/
//! │   └── keeper.json        # Primary store file
//! ├── backups/
//! │   └── keeper-<timestamp>[-<label>].json
//! └── logs/
//! ```
//!
//! Paths are resolved and created once at startup. The store itself treats
//! them as opaque.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Environment variable that overrides the root directory.
pub const HOME_ENV: &str = "KEEPER_HOME";

const ROOT_DIR_NAME: &str = ".keeper";

#[derive(Error, Debug)]
pub enum PathError {
    #[error("Home directory not set")]
    NoHome,

    #[error("Failed to create {path}: {source}")]
    Create {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Return the user's home directory path.
///
/// Uses HOME on Unix-like systems and USERPROFILE on Windows.
pub fn get_home_dir() -> Result<String, PathError> {
    if let Ok(home) = env::var("HOME") {
        if !home.is_empty() {
            return Ok(home);
        }
    }

    if let Ok(profile) = env::var("USERPROFILE") {
        if !profile.is_empty() {
            return Ok(profile);
        }
    }

    Err(PathError::NoHome)
}

/// Resolved directories for one process lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataPaths {
    pub root: PathBuf,
    pub data_dir: PathBuf,
    pub backup_dir: PathBuf,
    pub log_dir: PathBuf,
}

impl DataPaths {
    /// Lay out the standard subdirectories under `root` without touching disk.
    pub fn under(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            data_dir: root.join("data"),
            backup_dir: root.join("backups"),
            log_dir: root.join("logs"),
            root,
        }
    }

    /// Resolve the root directory and create every subdirectory.
    ///
    /// Precedence: explicit `root`, then `$KEEPER_HOME`, then `~/.keeper`.
    pub fn resolve(root: Option<&Path>) -> Result<Self, PathError> {
        let root = match root {
            Some(dir) => dir.to_path_buf(),
            None => match env::var(HOME_ENV) {
                Ok(dir) if !dir.is_empty() => PathBuf::from(dir),
                _ => PathBuf::from(get_home_dir()?).join(ROOT_DIR_NAME),
            },
        };

        let paths = Self::under(absolute(root));
        paths.create_all()?;
        Ok(paths)
    }

    fn create_all(&self) -> Result<(), PathError> {
        for dir in [&self.data_dir, &self.backup_dir, &self.log_dir] {
            fs::create_dir_all(dir).map_err(|source| PathError::Create {
                path: dir.clone(),
                source,
            })?;
        }
        Ok(())
    }
}

fn absolute(path: PathBuf) -> PathBuf {
    if path.is_absolute() {
        return path;
    }
    match env::current_dir() {
        Ok(cwd) => cwd.join(path),
        Err(_) => path,
    }
}
