//! Configuration management for Lightbox.
//!
//! Configuration is loaded from the platform config directory
//! (`config.toml`) with defaults for every section.

mod types;
mod validate;

pub use types::*;

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Root configuration structure for Lightbox.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Source, output and repository locations
    pub general: GeneralConfig,

    /// Directory scanning rules
    pub scan: ScanConfig,

    /// Record store settings
    pub store: StoreConfig,

    /// Orchestration and versioning
    pub build: BuildConfig,

    /// Derived image settings
    pub images: ImageConfig,

    /// Logging settings
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from the default location.
    ///
    /// Returns default configuration if the file doesn't exist.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default config file path.
    ///
    /// Uses platform-appropriate directories:
    /// - macOS: ~/Library/Application Support/com.lightbox.lightbox/config.toml
    /// - Linux: ~/.config/lightbox/config.toml
    /// - Windows: C:\Users\<User>\AppData\Roaming\lightbox\config\config.toml
    ///
    /// Falls back to ~/.lightbox/config.toml if directory detection fails.
    pub fn default_path() -> PathBuf {
        directories::ProjectDirs::from("com", "lightbox", "lightbox")
            .map(|dirs| dirs.config_dir().to_path_buf().join("config.toml"))
            .unwrap_or_else(|| {
                let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
                PathBuf::from(home).join(".lightbox").join("config.toml")
            })
    }

    /// Resolved source tree root (with ~ expansion).
    pub fn source_dir(&self) -> PathBuf {
        expand(&self.general.source_dir)
    }

    /// Resolved output root (with ~ expansion).
    pub fn output_dir(&self) -> PathBuf {
        expand(&self.general.output_dir)
    }

    /// Resolved record repository root (with ~ expansion).
    pub fn repository_dir(&self) -> PathBuf {
        expand(&self.general.repository_dir)
    }

    /// Serialize the config to a pretty TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::ValidationError(e.to_string()))
    }
}

fn expand(path: &Path) -> PathBuf {
    let path_str = path.to_string_lossy();
    let expanded = shellexpand::tilde(&path_str);
    PathBuf::from(expanded.into_owned())
}
