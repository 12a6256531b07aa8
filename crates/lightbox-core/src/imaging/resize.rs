//! Resized JPEG/PNG outputs with the `image` crate.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageFormat};
use std::fs::File;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::config::ImageConfig;
use crate::error::ImageError;
use crate::pipeline::layout;
use crate::types::{ComponentFile, ImageSize, Photo};

use super::{ImageBuildRequest, ImageExtractor};

/// Component file extensions the `image` crate can decode here.
const DECODABLE: &[&str] = &["jpg", "jpeg", "png", "tif", "tiff", "webp"];

/// Decodes the best source file and writes one JPEG per configured width,
/// plus a PNG at the thumbnail width.
///
/// Widths wider than the source are skipped, except the thumbnail width,
/// which is always produced.
#[derive(Debug, Default, Clone, Copy)]
pub struct ResizingImageExtractor;

impl ResizingImageExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Component file to decode: the primary if decodable, else the first
    /// decodable alternate.
    fn pick_source(photo: &Photo) -> Option<&ComponentFile> {
        let decodable = |f: &&ComponentFile| {
            DECODABLE
                .iter()
                .any(|ext| f.extension.eq_ignore_ascii_case(ext))
        };
        photo
            .file(&photo.image_extension)
            .filter(decodable)
            .or_else(|| photo.files.iter().find(decodable))
    }

    /// Encode an image as JPEG at the given quality.
    pub fn save_as_jpeg_bytes(image: &DynamicImage, quality: u8) -> Result<Vec<u8>, ImageError> {
        let mut buffer = Cursor::new(Vec::new());
        let rgb = image.to_rgb8();
        JpegEncoder::new_with_quality(&mut buffer, quality)
            .encode_image(&rgb)
            .map_err(|e| ImageError::Encode {
                path: PathBuf::from("<memory>"),
                message: e.to_string(),
            })?;
        Ok(buffer.into_inner())
    }

    fn save_as_png_bytes(image: &DynamicImage) -> Result<Vec<u8>, ImageError> {
        let mut buffer = Cursor::new(Vec::new());
        image
            .write_to(&mut buffer, ImageFormat::Png)
            .map_err(|e| ImageError::Encode {
                path: PathBuf::from("<memory>"),
                message: e.to_string(),
            })?;
        Ok(buffer.into_inner())
    }

    /// Write `bytes` to `path` and stamp its modification time.
    pub fn write_image(
        path: &Path,
        bytes: &[u8],
        creation_date: DateTime<Utc>,
    ) -> Result<(), ImageError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, bytes)?;
        File::options()
            .write(true)
            .open(path)?
            .set_modified(SystemTime::from(creation_date))?;
        Ok(())
    }

    /// Decode a written output back and check its dimensions.
    fn validate_output(path: &Path, expected: ImageSize) -> Result<(), ImageError> {
        let corrupt = |message: String| ImageError::Corrupt {
            path: path.to_path_buf(),
            message,
        };
        let bytes = std::fs::read(path).map_err(|e| corrupt(e.to_string()))?;
        let decoded = image::load_from_memory(&bytes).map_err(|e| corrupt(e.to_string()))?;
        let (width, height) = decoded.dimensions();
        if width != expected.width || height != expected.height {
            return Err(corrupt(format!(
                "expected {}x{}, found {width}x{height}",
                expected.width, expected.height
            )));
        }
        Ok(())
    }

    fn decode(bytes: Vec<u8>, path: &Path) -> Result<DynamicImage, ImageError> {
        image::ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .map_err(|e| ImageError::Decode {
                path: path.to_path_buf(),
                message: format!("Cannot detect image format: {e}"),
            })?
            .decode()
            .map_err(|e| ImageError::Decode {
                path: path.to_path_buf(),
                message: e.to_string(),
            })
    }

    /// Widths to produce for a source `source_width` pixels wide.
    fn target_widths(settings: &ImageConfig, source_width: u32) -> Vec<u32> {
        let mut widths: Vec<u32> = settings
            .widths
            .iter()
            .copied()
            .filter(|&w| w <= source_width || w == settings.thumbnail_width)
            .collect();
        widths.sort_unstable();
        widths.dedup();
        widths
    }

    /// Synchronous body of [`ImageExtractor::build_images`].
    fn build_sync(
        source: &Path,
        bytes: Vec<u8>,
        photo: &Photo,
        output_root: &Path,
        settings: &ImageConfig,
        creation_date: DateTime<Utc>,
    ) -> Result<Vec<ImageSize>, ImageError> {
        let image = Self::decode(bytes, source)?;
        let (source_width, source_height) = image.dimensions();

        let mut sizes = Vec::new();
        for width in Self::target_widths(settings, source_width) {
            let height = scaled_height(source_width, source_height, width);
            let resized = image.resize_exact(width, height, FilterType::Lanczos3);
            let size = ImageSize::new(width, height);

            let jpg = layout::output_path(output_root, photo, size, "jpg");
            let bytes = Self::save_as_jpeg_bytes(&resized, settings.jpeg_quality)?;
            Self::write_image(&jpg, &bytes, creation_date)?;
            Self::validate_output(&jpg, size)?;

            if width == settings.thumbnail_width {
                let png = layout::output_path(output_root, photo, size, "png");
                let bytes = Self::save_as_png_bytes(&resized)?;
                Self::write_image(&png, &bytes, creation_date)?;
                Self::validate_output(&png, size)?;
            }

            sizes.push(size);
        }

        tracing::debug!(
            "{}: wrote {} size(s) from {}x{} source",
            photo.url_safe_path,
            sizes.len(),
            source_width,
            source_height
        );
        Ok(sizes)
    }
}

/// Height preserving aspect ratio, never zero.
fn scaled_height(source_width: u32, source_height: u32, width: u32) -> u32 {
    let height = (u64::from(source_height) * u64::from(width) + u64::from(source_width) / 2)
        / u64::from(source_width.max(1));
    u32::try_from(height).unwrap_or(u32::MAX).max(1)
}

#[async_trait]
impl ImageExtractor for ResizingImageExtractor {
    async fn build_images(
        &self,
        request: &ImageBuildRequest<'_>,
    ) -> Result<Vec<ImageSize>, ImageError> {
        let photo = request.photo;
        let file = Self::pick_source(photo)
            .ok_or_else(|| ImageError::NoSource(photo.url_safe_path.clone()))?;
        let source = photo.source_path(request.source_root, file);
        let bytes = tokio::fs::read(&source).await?;

        let photo = photo.clone();
        let output_root = request.output_root.to_path_buf();
        let settings = request.settings.clone();
        let creation_date = request.creation_date;

        tokio::task::spawn_blocking(move || {
            Self::build_sync(&source, bytes, &photo, &output_root, &settings, creation_date)
        })
        .await
        .map_err(|e| ImageError::Io(std::io::Error::other(format!("Task join error: {e}"))))?
    }
}
