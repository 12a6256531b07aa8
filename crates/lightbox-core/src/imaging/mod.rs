//! Collaborators that do the per-item pixel and metadata work.
//!
//! The orchestrator only talks to these traits; the shipped implementations
//! use the `image` and `kamadak-exif` crates.

pub mod metadata;
pub mod resize;
pub mod shortener;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::Path;

use crate::config::ImageConfig;
use crate::error::ImageError;
use crate::types::{ImageSize, Photo, PhotoMetadata};

pub use metadata::ExifMetadataExtractor;
pub use resize::ResizingImageExtractor;
pub use shortener::UrlShortener;

/// Everything needed to (re)generate one item's raster outputs.
#[derive(Debug, Clone, Copy)]
pub struct ImageBuildRequest<'a> {
    pub photo: &'a Photo,
    pub source_root: &'a Path,
    pub output_root: &'a Path,
    /// Stamped as the modification time of every output
    pub creation_date: DateTime<Utc>,
    /// Canonical public URL of the item
    pub url: &'a str,
    pub short_url: &'a str,
    pub settings: &'a ImageConfig,
}

/// Generates an item's derived images.
#[async_trait]
pub trait ImageExtractor: Send + Sync {
    /// Write all outputs and return the sizes produced.
    ///
    /// [`ImageError::Corrupt`] signals an output that failed re-validation.
    async fn build_images(
        &self,
        request: &ImageBuildRequest<'_>,
    ) -> Result<Vec<ImageSize>, ImageError>;
}

/// Extracts descriptive metadata from an item's source files.
#[async_trait]
pub trait MetadataExtractor: Send + Sync {
    async fn extract(
        &self,
        photo: &Photo,
        source_root: &Path,
    ) -> Result<Vec<PhotoMetadata>, ImageError>;
}
