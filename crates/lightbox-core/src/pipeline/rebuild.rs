//! Rebuild detection: does an item need new images, new metadata, or nothing?
//!
//! Checks run in a fixed order and the first hit wins:
//!
//! 1. no persisted record → build
//! 2. record version below `requires_rebuild_below` → full rebuild
//! 3. component files changed → full rebuild
//! 4. a recorded output is missing on disk → full rebuild
//! 5. record version below `out_of_date_below` → metadata-only rebuild
//!
//! Content hashes are only computed when a file's size matches but its
//! timestamp doesn't, and are memoized in [`SourceHashes`] for the item.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::config::BuildConfig;
use crate::pipeline::hash::Hasher;
use crate::pipeline::layout;
use crate::types::{ComponentFile, Photo};

/// Why a full rebuild was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebuildReason {
    VersionRequiresRebuild,
    FilesChanged,
    MissingResizes,
    ShortUrlChanged,
}

/// Classification of one item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebuildDecision {
    /// Never built before
    Build,
    /// Regenerate images and metadata
    RebuildFull(RebuildReason),
    /// Re-extract metadata, keep the existing images
    RebuildMetadata,
    Unchanged,
}

impl RebuildDecision {
    pub fn needs_images(&self) -> bool {
        matches!(self, Self::Build | Self::RebuildFull(_))
    }

    pub fn needs_metadata(&self) -> bool {
        !matches!(self, Self::Unchanged)
    }
}

impl fmt::Display for RebuildDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Build => write!(f, "build"),
            Self::RebuildFull(reason) => write!(f, "rebuild ({reason:?})"),
            Self::RebuildMetadata => write!(f, "metadata refresh"),
            Self::Unchanged => write!(f, "unchanged"),
        }
    }
}

/// Content hashes of one item's source files, computed on demand.
///
/// Owned by the task processing the item; never shared between items.
#[derive(Debug, Default)]
pub struct SourceHashes {
    hashes: HashMap<String, String>,
}

impl SourceHashes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hash previously computed for an extension.
    pub fn get(&self, extension: &str) -> Option<&str> {
        self.hashes
            .get(&extension.to_lowercase())
            .map(String::as_str)
    }

    /// Return the memoized hash or read the file and hash it.
    pub async fn get_or_compute(
        &mut self,
        source_root: &Path,
        photo: &Photo,
        file: &ComponentFile,
    ) -> std::io::Result<String> {
        let key = file.extension.to_lowercase();
        if let Some(hash) = self.hashes.get(&key) {
            return Ok(hash.clone());
        }
        let hash = Hasher::hash_file_async(&photo.source_path(source_root, file)).await?;
        self.hashes.insert(key, hash.clone());
        Ok(hash)
    }
}

/// Version thresholds for forced rebuilds.
#[derive(Debug, Clone, Copy)]
pub struct BuildVersions {
    pub requires_rebuild_below: i32,
    pub out_of_date_below: i32,
}

impl From<&BuildConfig> for BuildVersions {
    fn from(config: &BuildConfig) -> Self {
        Self {
            requires_rebuild_below: config.requires_rebuild_below,
            out_of_date_below: config.out_of_date_below,
        }
    }
}

/// Classifies items by comparing the source snapshot with persisted records.
#[derive(Debug, Clone)]
pub struct RebuildDetector {
    versions: BuildVersions,
    thumbnail_width: u32,
    source_root: PathBuf,
    output_root: PathBuf,
}

impl RebuildDetector {
    pub fn new(
        versions: BuildVersions,
        thumbnail_width: u32,
        source_root: PathBuf,
        output_root: PathBuf,
    ) -> Self {
        Self {
            versions,
            thumbnail_width,
            source_root,
            output_root,
        }
    }

    pub fn source_root(&self) -> &Path {
        &self.source_root
    }

    /// Classify one item.
    pub async fn classify(
        &self,
        source: &Photo,
        target: Option<&Photo>,
        hashes: &mut SourceHashes,
    ) -> RebuildDecision {
        let Some(target) = target else {
            return RebuildDecision::Build;
        };

        if target.version < self.versions.requires_rebuild_below {
            return RebuildDecision::RebuildFull(RebuildReason::VersionRequiresRebuild);
        }

        if self.have_files_changed(source, target, hashes).await {
            return RebuildDecision::RebuildFull(RebuildReason::FilesChanged);
        }

        if self.has_missing_resizes(target).await {
            return RebuildDecision::RebuildFull(RebuildReason::MissingResizes);
        }

        if target.version < self.versions.out_of_date_below {
            return RebuildDecision::RebuildMetadata;
        }

        RebuildDecision::Unchanged
    }

    /// Whether the source files differ from the ones the record was built from.
    pub async fn have_files_changed(
        &self,
        source: &Photo,
        target: &Photo,
        hashes: &mut SourceHashes,
    ) -> bool {
        if source.files.len() != target.files.len() {
            tracing::debug!("{}: file count changed", source.url_safe_path);
            return true;
        }

        for file in &source.files {
            let Some(recorded) = target.file(&file.extension) else {
                tracing::debug!("{}: new file .{}", source.url_safe_path, file.extension);
                return true;
            };

            if file.file_size != recorded.file_size {
                tracing::debug!("{}: .{} size changed", source.url_safe_path, file.extension);
                return true;
            }

            if file.last_modified == recorded.last_modified {
                continue;
            }

            let Some(recorded_hash) = recorded.hash.as_deref() else {
                return true;
            };

            match hashes.get_or_compute(&self.source_root, source, file).await {
                Ok(hash) if hash == recorded_hash => {}
                Ok(_) => {
                    tracing::debug!(
                        "{}: .{} content changed",
                        source.url_safe_path,
                        file.extension
                    );
                    return true;
                }
                Err(e) => {
                    tracing::debug!(
                        "{}: .{} unreadable: {e}",
                        source.url_safe_path,
                        file.extension
                    );
                    return true;
                }
            }
        }

        false
    }

    /// Whether any output the record lists is absent on disk.
    ///
    /// A record without sizes never had its images generated.
    pub async fn has_missing_resizes(&self, target: &Photo) -> bool {
        if target.image_sizes.is_empty() {
            return true;
        }

        for &size in &target.image_sizes {
            let jpg = layout::output_path(&self.output_root, target, size, "jpg");
            if !exists(&jpg).await {
                tracing::debug!("{}: missing {}", target.url_safe_path, jpg.display());
                return true;
            }

            if size.width == self.thumbnail_width {
                let png = layout::output_path(&self.output_root, target, size, "png");
                if !exists(&png).await {
                    tracing::debug!("{}: missing {}", target.url_safe_path, png.display());
                    return true;
                }
            }
        }

        false
    }
}

async fn exists(path: &Path) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ImageSize;
    use chrono::{DateTime, Utc};

    const CURRENT: i32 = 3;

    struct Fixture {
        _dir: tempfile::TempDir,
        source_root: PathBuf,
        output_root: PathBuf,
        detector: RebuildDetector,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let source_root = dir.path().join("source");
        let output_root = dir.path().join("output");
        std::fs::create_dir_all(source_root.join("2020")).unwrap();
        let detector = RebuildDetector::new(
            BuildVersions {
                requires_rebuild_below: 2,
                out_of_date_below: 3,
            },
            400,
            source_root.clone(),
            output_root.clone(),
        );
        Fixture {
            _dir: dir,
            source_root,
            output_root,
            detector,
        }
    }

    fn time(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    fn photo(content: &[u8], modified: i64) -> Photo {
        let url_safe_path = "2020/dawn".to_string();
        Photo {
            version: CURRENT,
            path_hash: Hasher::path_hash(&url_safe_path),
            url_safe_path,
            base_path: "2020".to_string(),
            base_name: "dawn".to_string(),
            image_extension: "jpg".to_string(),
            files: vec![ComponentFile {
                extension: "jpg".to_string(),
                hash: Some(Hasher::hash_bytes(content)),
                last_modified: time(modified),
                file_size: content.len() as u64,
            }],
            metadata: vec![],
            image_sizes: vec![ImageSize::new(400, 300), ImageSize::new(800, 600)],
            short_url: String::new(),
        }
    }

    fn write_outputs(fx: &Fixture, target: &Photo) {
        for &size in &target.image_sizes {
            let jpg = layout::output_path(&fx.output_root, target, size, "jpg");
            std::fs::create_dir_all(jpg.parent().unwrap()).unwrap();
            std::fs::write(&jpg, b"jpg").unwrap();
            if size.width == 400 {
                std::fs::write(layout::output_path(&fx.output_root, target, size, "png"), b"png")
                    .unwrap();
            }
        }
    }

    fn source_of(target: &Photo) -> Photo {
        let mut source = target.clone();
        source.version = 0;
        source.metadata.clear();
        source.image_sizes.clear();
        for f in &mut source.files {
            f.hash = None;
        }
        source
    }

    #[tokio::test]
    async fn test_no_target_builds() {
        let fx = fixture();
        let source = photo(b"abc", 100);
        let decision = fx
            .detector
            .classify(&source, None, &mut SourceHashes::new())
            .await;
        assert_eq!(decision, RebuildDecision::Build);
    }

    #[tokio::test]
    async fn test_matching_record_is_unchanged() {
        let fx = fixture();
        let target = photo(b"abc", 100);
        write_outputs(&fx, &target);
        let decision = fx
            .detector
            .classify(&source_of(&target), Some(&target), &mut SourceHashes::new())
            .await;
        assert_eq!(decision, RebuildDecision::Unchanged);
    }

    #[tokio::test]
    async fn test_missing_output_forces_rebuild() {
        let fx = fixture();
        let target = photo(b"abc", 100);
        write_outputs(&fx, &target);
        std::fs::remove_file(layout::output_path(
            &fx.output_root,
            &target,
            ImageSize::new(800, 600),
            "jpg",
        ))
        .unwrap();
        let decision = fx
            .detector
            .classify(&source_of(&target), Some(&target), &mut SourceHashes::new())
            .await;
        assert_eq!(
            decision,
            RebuildDecision::RebuildFull(RebuildReason::MissingResizes)
        );
    }

    #[tokio::test]
    async fn test_missing_thumbnail_png_forces_rebuild() {
        let fx = fixture();
        let target = photo(b"abc", 100);
        write_outputs(&fx, &target);
        std::fs::remove_file(layout::output_path(
            &fx.output_root,
            &target,
            ImageSize::new(400, 300),
            "png",
        ))
        .unwrap();
        assert!(fx.detector.has_missing_resizes(&target).await);
    }

    #[tokio::test]
    async fn test_empty_sizes_count_as_missing() {
        let fx = fixture();
        let mut target = photo(b"abc", 100);
        target.image_sizes.clear();
        assert!(fx.detector.has_missing_resizes(&target).await);
    }

    #[tokio::test]
    async fn test_size_change_forces_rebuild() {
        let fx = fixture();
        let target = photo(b"abc", 100);
        write_outputs(&fx, &target);
        let mut source = source_of(&target);
        source.files[0].file_size += 1;
        let decision = fx
            .detector
            .classify(&source, Some(&target), &mut SourceHashes::new())
            .await;
        assert_eq!(
            decision,
            RebuildDecision::RebuildFull(RebuildReason::FilesChanged)
        );
    }

    #[tokio::test]
    async fn test_new_sibling_forces_rebuild() {
        let fx = fixture();
        let target = photo(b"abc", 100);
        write_outputs(&fx, &target);
        let mut source = source_of(&target);
        source.files.push(ComponentFile {
            extension: "xmp".into(),
            hash: None,
            last_modified: time(100),
            file_size: 10,
        });
        let decision = fx
            .detector
            .classify(&source, Some(&target), &mut SourceHashes::new())
            .await;
        assert_eq!(
            decision,
            RebuildDecision::RebuildFull(RebuildReason::FilesChanged)
        );
    }

    #[tokio::test]
    async fn test_touched_file_with_same_content_is_unchanged() {
        let fx = fixture();
        let target = photo(b"abc", 100);
        write_outputs(&fx, &target);
        std::fs::write(fx.source_root.join("2020/dawn.jpg"), b"abc").unwrap();

        let mut source = source_of(&target);
        source.files[0].last_modified = time(200);
        let mut hashes = SourceHashes::new();
        let decision = fx
            .detector
            .classify(&source, Some(&target), &mut hashes)
            .await;
        assert_eq!(decision, RebuildDecision::Unchanged);
        assert_eq!(hashes.get("JPG"), Some(Hasher::hash_bytes(b"abc").as_str()));
    }

    #[tokio::test]
    async fn test_touched_file_with_new_content_rebuilds() {
        let fx = fixture();
        let target = photo(b"abc", 100);
        write_outputs(&fx, &target);
        std::fs::write(fx.source_root.join("2020/dawn.jpg"), b"xyz").unwrap();

        let mut source = source_of(&target);
        source.files[0].last_modified = time(200);
        let decision = fx
            .detector
            .classify(&source, Some(&target), &mut SourceHashes::new())
            .await;
        assert_eq!(
            decision,
            RebuildDecision::RebuildFull(RebuildReason::FilesChanged)
        );
    }

    #[tokio::test]
    async fn test_same_timestamp_skips_hashing() {
        let fx = fixture();
        let target = photo(b"abc", 100);
        write_outputs(&fx, &target);
        // Source file deliberately absent: hashing it would fail.
        let mut hashes = SourceHashes::new();
        let changed = fx
            .detector
            .have_files_changed(&source_of(&target), &target, &mut hashes)
            .await;
        assert!(!changed);
        assert!(hashes.get("jpg").is_none());
    }

    #[tokio::test]
    async fn test_unreadable_source_counts_as_changed() {
        let fx = fixture();
        let target = photo(b"abc", 100);
        let mut source = source_of(&target);
        source.files[0].last_modified = time(200);
        assert!(
            fx.detector
                .have_files_changed(&source, &target, &mut SourceHashes::new())
                .await
        );
    }

    #[tokio::test]
    async fn test_out_of_date_version_refreshes_metadata_only() {
        let fx = fixture();
        let mut target = photo(b"abc", 100);
        target.version = 2;
        write_outputs(&fx, &target);
        let decision = fx
            .detector
            .classify(&source_of(&target), Some(&target), &mut SourceHashes::new())
            .await;
        assert_eq!(decision, RebuildDecision::RebuildMetadata);
        assert!(!decision.needs_images());
        assert!(decision.needs_metadata());
    }

    #[tokio::test]
    async fn test_ancient_version_forces_full_rebuild() {
        let fx = fixture();
        let mut target = photo(b"abc", 100);
        target.version = 1;
        write_outputs(&fx, &target);
        let decision = fx
            .detector
            .classify(&source_of(&target), Some(&target), &mut SourceHashes::new())
            .await;
        assert_eq!(
            decision,
            RebuildDecision::RebuildFull(RebuildReason::VersionRequiresRebuild)
        );
    }

    #[tokio::test]
    async fn test_files_changed_checked_before_metadata_version() {
        let fx = fixture();
        let mut target = photo(b"abc", 100);
        target.version = 2;
        write_outputs(&fx, &target);
        let mut source = source_of(&target);
        source.files[0].file_size = 99;
        let decision = fx
            .detector
            .classify(&source, Some(&target), &mut SourceHashes::new())
            .await;
        assert!(decision.needs_images());
    }
}
