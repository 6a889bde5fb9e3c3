//! Store configuration.
//!
//! Loaded from TOML. Every field is optional:
//!
//! ```toml
//! root = "/srv/studentfs"
//! initial_version = "1"
//! dir_mode = 0o755
//! ```
//!
//! The allocation attempt bound is deliberately not configurable.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use studentfs_types::{DIR_MODE, VersionString};
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Where entities live and how new ones are laid out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreConfig {
    /// Store root; each entity is a directory directly below it.
    pub root: PathBuf,
    /// Version of an entity's first snapshot.
    pub initial_version: VersionString,
    /// Mode bits for entity and snapshot directories.
    pub dir_mode: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            initial_version: VersionString::initial(),
            dir_mode: DIR_MODE,
        }
    }
}

/// `~/.local/share/studentfs`, or `./studentfs` without a data dir.
fn default_root() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("studentfs"))
        .unwrap_or_else(|| PathBuf::from("studentfs"))
}

impl StoreConfig {
    /// Default config file location (`~/.config/studentfs/config.toml`).
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("studentfs").join("config.toml"))
    }

    /// Load from an explicit file, or the default location if it exists.
    ///
    /// An explicit path must exist. A missing default file yields defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match explicit {
            Some(p) => p.to_path_buf(),
            None => match Self::default_path() {
                Some(p) if p.exists() => p,
                _ => {
                    tracing::debug!("no config file, using defaults");
                    return Ok(Self::default());
                }
            },
        };

        let text = std::fs::read_to_string(&path).map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;
        let config = Self::from_toml(&text).map_err(|e| match e {
            ConfigError::Parse { source, .. } => ConfigError::Parse {
                path: path.clone(),
                source,
            },
            other => other,
        })?;

        tracing::debug!(path = %path.display(), "loaded config");
        Ok(config)
    }

    /// Parse and validate TOML text.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: StoreConfig = toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: PathBuf::new(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.dir_mode > 0o7777 {
            return Err(ConfigError::Invalid(format!(
                "dir_mode {:#o} has bits outside 0o7777",
                self.dir_mode
            )));
        }
        if self.dir_mode & 0o700 != 0o700 {
            return Err(ConfigError::Invalid(format!(
                "dir_mode {:#o} must grant the owner rwx",
                self.dir_mode
            )));
        }
        // Group and other may be narrowed from r-x, never widened.
        if self.dir_mode & 0o022 != 0 {
            return Err(ConfigError::Invalid(format!(
                "dir_mode {:#o} must not grant group or other write",
                self.dir_mode
            )));
        }
        Ok(())
    }
}
