//! Sub-configuration structs with their defaults.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Locations of the source tree, derived outputs and the record repository.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Root of the source photograph tree
    pub source_dir: PathBuf,

    /// Root of the generated image outputs
    pub output_dir: PathBuf,

    /// Root of the record repository (a git working copy)
    pub repository_dir: PathBuf,

    /// Public base URL items are published under
    pub base_url: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            source_dir: PathBuf::from("~/Pictures"),
            output_dir: PathBuf::from("~/.lightbox/output"),
            repository_dir: PathBuf::from("~/.lightbox/repository"),
            base_url: "https://example.com/gallery".to_string(),
        }
    }
}

/// Directory scanning rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Extensions in priority order; the first present becomes the primary file
    pub extension_precedence: Vec<String>,

    /// Companion extensions that never justify an item on their own
    pub sidecar_extensions: Vec<String>,

    /// Directory names skipped during the scan (case-insensitive)
    pub ignored_folders: Vec<String>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            extension_precedence: ["jpg", "jpeg", "cr2", "mrw", "rw2", "tif", "tiff", "psd", "xmp"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            sidecar_extensions: vec!["xmp".to_string()],
            ignored_folders: [".git", ".svn", ".hg", "archive", "_archive", "sort", "_sort", "sorted"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl ScanConfig {
    /// Scan rules for the record repository: only `.info` files, no sidecars.
    pub fn repository() -> Self {
        Self {
            extension_precedence: vec!["info".to_string()],
            sidecar_extensions: vec![],
            ignored_folders: vec![".git".to_string()],
        }
    }
}

/// Repository store write and commit settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Attempts per record write
    pub retry_attempts: u32,

    /// Delays between attempts; the last entry repeats
    pub retry_delays_ms: Vec<u64>,

    /// Commit each changed record to the repository's git working copy
    pub commit: bool,

    /// Author identity used for commits
    pub commit_author: String,

    /// Auxiliary files staged alongside every commit when present
    pub always_staged: Vec<String>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            retry_attempts: 5,
            retry_delays_ms: vec![500, 1500],
            commit: true,
            commit_author: "Lightbox <lightbox@localhost>".to_string(),
            always_staged: vec![".gitignore".to_string(), ".gitattributes".to_string()],
        }
    }
}

/// Orchestration settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// Maximum items processed concurrently
    pub parallel_workers: usize,

    /// Version stamped on every record written by this build
    pub current_version: i32,

    /// Records below this version get their images regenerated
    pub requires_rebuild_below: i32,

    /// Records below this version get their metadata re-extracted
    pub out_of_date_below: i32,

    /// Short link value that stands for "not yet shortened"
    pub short_url_placeholder: String,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            parallel_workers: 4,
            current_version: 3,
            requires_rebuild_below: 2,
            out_of_date_below: 3,
            short_url_placeholder: "https://example.com/".to_string(),
        }
    }
}

/// Derived image settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageConfig {
    /// Output widths in pixels
    pub widths: Vec<u32>,

    /// Width that also gets a PNG companion
    pub thumbnail_width: u32,

    /// JPEG encoding quality (1-100)
    pub jpeg_quality: u8,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            widths: vec![400, 800, 1600],
            thumbnail_width: 400,
            jpeg_quality: 85,
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: error, warn, info, debug, trace
    pub level: String,

    /// Log format: "pretty" or "json"
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}
