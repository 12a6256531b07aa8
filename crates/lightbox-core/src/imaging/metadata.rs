//! EXIF metadata extraction from source files.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use exif::{In, Reader, Tag, Value};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use crate::error::ImageError;
use crate::types::{Photo, PhotoMetadata};

use super::MetadataExtractor;

/// Metadata names written by [`ExifMetadataExtractor`].
pub mod names {
    pub const DATE_TAKEN: &str = "DateTaken";
    pub const CAMERA_MAKE: &str = "CameraMake";
    pub const CAMERA_MODEL: &str = "CameraModel";
    pub const LATITUDE: &str = "Latitude";
    pub const LONGITUDE: &str = "Longitude";
    pub const ISO: &str = "Iso";
    pub const APERTURE: &str = "Aperture";
    pub const SHUTTER_SPEED: &str = "ShutterSpeed";
    pub const FOCAL_LENGTH: &str = "FocalLength";
    pub const ORIENTATION: &str = "Orientation";
}

/// Extensions that can carry an EXIF block readable by `kamadak-exif`.
const EXIF_CONTAINERS: &[&str] = &["jpg", "jpeg", "tif", "tiff", "cr2", "rw2", "png", "webp"];

/// Reads EXIF fields from the first component file that has them.
///
/// Lenient: files without EXIF yield no metadata rather than an error.
#[derive(Debug, Default, Clone, Copy)]
pub struct ExifMetadataExtractor;

impl ExifMetadataExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Candidate files, primary first.
    fn candidates(photo: &Photo, source_root: &Path) -> Vec<PathBuf> {
        let mut files: Vec<_> = photo
            .files
            .iter()
            .filter(|f| {
                EXIF_CONTAINERS
                    .iter()
                    .any(|ext| f.extension.eq_ignore_ascii_case(ext))
            })
            .collect();
        files.sort_by_key(|f| !f.extension.eq_ignore_ascii_case(&photo.image_extension));
        files
            .into_iter()
            .map(|f| photo.source_path(source_root, f))
            .collect()
    }

    /// Extract metadata from one file. `Ok(None)` when it has no EXIF block.
    pub fn extract_file(path: &Path) -> Result<Option<Vec<PhotoMetadata>>, ImageError> {
        let file = File::open(path).map_err(|e| ImageError::Metadata {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        let mut reader = BufReader::new(file);
        let Ok(exif) = Reader::new().read_from_container(&mut reader) else {
            return Ok(None);
        };

        let mut metadata = Vec::new();
        let mut push = |name: &str, value: Option<String>| {
            if let Some(value) = value {
                metadata.push(PhotoMetadata::new(name, value));
            }
        };

        push(
            names::DATE_TAKEN,
            Self::get_datetime(&exif).map(|d| d.to_rfc3339()),
        );
        push(names::CAMERA_MAKE, Self::get_string(&exif, Tag::Make));
        push(names::CAMERA_MODEL, Self::get_string(&exif, Tag::Model));
        push(
            names::LATITUDE,
            Self::get_gps_coord(&exif, Tag::GPSLatitude, Tag::GPSLatitudeRef)
                .map(|v| format!("{v:.6}")),
        );
        push(
            names::LONGITUDE,
            Self::get_gps_coord(&exif, Tag::GPSLongitude, Tag::GPSLongitudeRef)
                .map(|v| format!("{v:.6}")),
        );
        push(
            names::ISO,
            Self::get_u32(&exif, Tag::PhotographicSensitivity).map(|v| v.to_string()),
        );
        push(
            names::APERTURE,
            exif.get_field(Tag::FNumber, In::PRIMARY)
                .map(|f| format!("f/{}", f.display_value())),
        );
        push(
            names::SHUTTER_SPEED,
            exif.get_field(Tag::ExposureTime, In::PRIMARY)
                .map(|f| f.display_value().to_string()),
        );
        push(
            names::FOCAL_LENGTH,
            exif.get_field(Tag::FocalLength, In::PRIMARY)
                .and_then(|f| match &f.value {
                    Value::Rational(v) => v.first().map(|r| format!("{:.1}", r.to_f64())),
                    _ => None,
                }),
        );
        push(
            names::ORIENTATION,
            Self::get_u32(&exif, Tag::Orientation).map(|v| v.to_string()),
        );

        Ok(Some(metadata))
    }

    fn get_string(exif: &exif::Exif, tag: Tag) -> Option<String> {
        exif.get_field(tag, In::PRIMARY).map(|f| {
            f.display_value()
                .to_string()
                .trim_matches('"')
                .trim()
                .to_string()
        })
    }

    fn get_u32(exif: &exif::Exif, tag: Tag) -> Option<u32> {
        exif.get_field(tag, In::PRIMARY)
            .and_then(|f| match &f.value {
                Value::Short(v) => v.first().map(|&x| x as u32),
                Value::Long(v) => v.first().copied(),
                _ => None,
            })
    }

    /// Capture time, preferring DateTimeOriginal over DateTime.
    fn get_datetime(exif: &exif::Exif) -> Option<DateTime<Utc>> {
        let field = exif
            .get_field(Tag::DateTimeOriginal, In::PRIMARY)
            .or_else(|| exif.get_field(Tag::DateTime, In::PRIMARY))?;
        match &field.value {
            Value::Ascii(values) => {
                let text = std::str::from_utf8(values.first()?).ok()?;
                parse_exif_datetime(text)
            }
            _ => None,
        }
    }

    /// Decimal degrees from degrees/minutes/seconds plus hemisphere.
    fn get_gps_coord(exif: &exif::Exif, coord_tag: Tag, ref_tag: Tag) -> Option<f64> {
        let coord = exif.get_field(coord_tag, In::PRIMARY)?;
        let reference = exif.get_field(ref_tag, In::PRIMARY)?;

        let degrees = match &coord.value {
            Value::Rational(r) if r.len() >= 3 => {
                r[0].to_f64() + r[1].to_f64() / 60.0 + r[2].to_f64() / 3600.0
            }
            _ => return None,
        };
        let hemisphere = reference.display_value().to_string();
        let sign = if hemisphere.contains('S') || hemisphere.contains('W') {
            -1.0
        } else {
            1.0
        };
        Some(sign * degrees)
    }
}

/// Parse an EXIF `YYYY:MM:DD HH:MM:SS` timestamp (taken as UTC).
pub fn parse_exif_datetime(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim_end_matches('\0').trim();
    NaiveDateTime::parse_from_str(text, "%Y:%m:%d %H:%M:%S")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Read back a `DateTaken` value written by [`ExifMetadataExtractor`].
pub fn parse_date_taken(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|d| d.with_timezone(&Utc))
}

#[async_trait]
impl MetadataExtractor for ExifMetadataExtractor {
    async fn extract(
        &self,
        photo: &Photo,
        source_root: &Path,
    ) -> Result<Vec<PhotoMetadata>, ImageError> {
        let candidates = Self::candidates(photo, source_root);
        let name = photo.url_safe_path.clone();

        tokio::task::spawn_blocking(move || -> Result<Vec<PhotoMetadata>, ImageError> {
            for path in &candidates {
                if let Some(metadata) = Self::extract_file(path)? {
                    return Ok(metadata);
                }
            }
            tracing::trace!("{name}: no EXIF found");
            Ok(Vec::new())
        })
        .await
        .map_err(|e| ImageError::Io(std::io::Error::other(format!("Task join error: {e}"))))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ComponentFile;
    use chrono::TimeZone;

    fn photo(extensions: &[&str]) -> Photo {
        Photo {
            url_safe_path: "2020/dawn".to_string(),
            base_path: "2020".to_string(),
            base_name: "Dawn".to_string(),
            image_extension: extensions[0].to_string(),
            files: extensions
                .iter()
                .map(|ext| ComponentFile {
                    extension: ext.to_string(),
                    hash: None,
                    last_modified: Utc::now(),
                    file_size: 0,
                })
                .collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_extract_missing_file() {
        let result = ExifMetadataExtractor::extract_file(Path::new("/nonexistent/file.jpg"));
        assert!(matches!(result, Err(ImageError::Metadata { .. })));
    }

    #[test]
    fn test_file_without_exif_yields_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plain.jpg");
        let img = image::DynamicImage::new_rgb8(8, 8);
        let bytes = super::super::ResizingImageExtractor::save_as_jpeg_bytes(&img, 80).unwrap();
        std::fs::write(&path, bytes).unwrap();
        assert!(ExifMetadataExtractor::extract_file(&path).unwrap().is_none());
    }

    #[test]
    fn test_candidates_primary_first_and_skip_sidecars() {
        let root = Path::new("/src");
        let p = photo(&["cr2", "jpg", "xmp"]);
        let candidates = ExifMetadataExtractor::candidates(&p, root);
        assert_eq!(
            candidates,
            vec![
                PathBuf::from("/src/2020/Dawn.cr2"),
                PathBuf::from("/src/2020/Dawn.jpg")
            ]
        );
    }

    #[test]
    fn test_parse_exif_datetime() {
        assert_eq!(
            parse_exif_datetime("2020:05:01 10:30:05"),
            Some(Utc.with_ymd_and_hms(2020, 5, 1, 10, 30, 5).unwrap())
        );
        assert_eq!(parse_exif_datetime("0000:00:00 00:00:00"), None);
        assert_eq!(parse_exif_datetime(""), None);
    }

    #[test]
    fn test_date_taken_round_trips_through_rfc3339() {
        let date = Utc.with_ymd_and_hms(2019, 12, 31, 23, 59, 0).unwrap();
        assert_eq!(parse_date_taken(&date.to_rfc3339()), Some(date));
        assert_eq!(parse_date_taken("yesterday"), None);
    }

    #[tokio::test]
    async fn test_extract_sidecar_only_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let p = photo(&["xmp"]);
        let metadata = ExifMetadataExtractor::new()
            .extract(&p, dir.path())
            .await
            .unwrap();
        assert!(metadata.is_empty());
    }
}
