//! Core data types for the Lightbox build pipeline.
//!
//! [`Photo`] is both the unit of build and the persisted record. The source
//! snapshot builds one per discovered item on every run; the target snapshot
//! loads the records written by the last successful build.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One logical item found by the scanner: a primary file plus siblings
/// sharing its base name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    /// Absolute folder containing the files
    pub folder: PathBuf,

    /// Folder relative to the scanned root ("" for the root itself)
    pub relative_folder: PathBuf,

    /// File name of the highest-precedence member
    pub primary_file_name: String,

    /// Remaining members, in precedence order
    pub alternate_file_names: Vec<String>,
}

impl FileEntry {
    /// All member file names, primary first.
    pub fn file_names(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.primary_file_name.as_str())
            .chain(self.alternate_file_names.iter().map(String::as_str))
    }

    /// Full path of the primary file.
    pub fn primary_path(&self) -> PathBuf {
        self.folder.join(&self.primary_file_name)
    }
}

/// One physical file backing an item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentFile {
    /// Extension as found on disk, without the dot; compared case-insensitively
    pub extension: String,

    /// SHA-512 of the contents, absent until computed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,

    /// Last modification time
    pub last_modified: DateTime<Utc>,

    /// File size in bytes
    pub file_size: u64,
}

/// Dimensions of one derived raster output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageSize {
    pub width: u32,
    pub height: u32,
}

impl ImageSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// A descriptive name/value pair extracted from an item.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PhotoMetadata {
    pub name: String,
    pub value: String,
}

impl PhotoMetadata {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// The persisted record for one item.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Photo {
    /// Pipeline version that last wrote this record
    #[serde(default)]
    pub version: i32,

    /// URL-safe logical path, e.g. `2019/holiday/img-1234`
    pub url_safe_path: String,

    /// Folder of the item relative to the source root
    #[serde(default)]
    pub base_path: String,

    /// Original file stem shared by the component files on disk
    #[serde(default)]
    pub base_name: String,

    /// SHA-512 of `url_safe_path`
    pub path_hash: String,

    /// Extension of the primary file
    #[serde(default)]
    pub image_extension: String,

    #[serde(default)]
    pub files: Vec<ComponentFile>,

    #[serde(default)]
    pub metadata: Vec<PhotoMetadata>,

    #[serde(default)]
    pub image_sizes: Vec<ImageSize>,

    #[serde(default)]
    pub short_url: String,
}

impl Photo {
    /// Last segment of the url-safe path; names the record and output files.
    pub fn tail(&self) -> &str {
        self.url_safe_path
            .rsplit('/')
            .next()
            .unwrap_or(&self.url_safe_path)
    }

    /// Items under any folder named `private` never get short links.
    pub fn is_private(&self) -> bool {
        self.url_safe_path.split('/').any(|s| s == "private")
    }

    /// Look up a metadata value by name.
    pub fn metadata_value(&self, name: &str) -> Option<&str> {
        self.metadata
            .iter()
            .find(|m| m.name == name)
            .map(|m| m.value.as_str())
    }

    /// Look up the component file with the given extension.
    pub fn file(&self, extension: &str) -> Option<&ComponentFile> {
        self.files
            .iter()
            .find(|f| f.extension.eq_ignore_ascii_case(extension))
    }

    /// Source path of one of this item's component files.
    pub fn source_path(&self, source_root: &std::path::Path, file: &ComponentFile) -> PathBuf {
        source_root
            .join(&self.base_path)
            .join(format!("{}.{}", self.file_stem(), file.extension))
    }

    /// Stem shared by all component files on disk; falls back to the tail
    /// for records written without `baseName`.
    pub fn file_stem(&self) -> &str {
        if self.base_name.is_empty() {
            self.tail()
        } else {
            &self.base_name
        }
    }
}

/// One step of a gallery's navigation trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Breadcrumb {
    pub path: String,
    pub title: String,
}

/// A child gallery or item listed by a parent gallery page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildReference {
    pub path: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}
