//! Gallery build orchestration.
//!
//! Loads the source and repository snapshots, then processes every source
//! item in its own task, bounded by a semaphore. A failed item is recorded
//! in [`BrokenItems`] and the run continues; an abort-class failure (a
//! corrupt generated image) fails the run. Items still waiting for a worker
//! are not started, and items already running are allowed to finish so no
//! record write is interrupted halfway.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::config::{BuildConfig, Config, ImageConfig};
use crate::error::{LightboxError, Result};
use crate::imaging::metadata::{names, parse_date_taken};
use crate::imaging::shortener::{canonical_url, needs_short_url};
use crate::imaging::{
    ExifMetadataExtractor, ImageBuildRequest, ImageExtractor, MetadataExtractor,
    ResizingImageExtractor, UrlShortener,
};
use crate::store::{CommitQueue, Committer, GitCommitter, RepositoryStore, RetryPolicy, WriteOutcome};
use crate::types::{ComponentFile, Photo};

use super::broken::{BrokenItems, ProcessedItems};
use super::compare::{image_sizes_equal, metadata_equal};
use super::rebuild::{BuildVersions, RebuildDecision, RebuildDetector, RebuildReason, SourceHashes};

/// External collaborators used per item.
#[derive(Clone)]
pub struct Collaborators {
    pub images: Arc<dyn ImageExtractor>,
    pub metadata: Arc<dyn MetadataExtractor>,
    /// No short links are generated when absent
    pub shortener: Option<Arc<dyn UrlShortener>>,
    /// No commits are made when absent or when `store.commit` is off
    pub committer: Option<Arc<dyn Committer>>,
}

impl Collaborators {
    /// The shipped implementations: `image` resizing, EXIF metadata, git.
    pub fn from_config(config: &Config) -> Self {
        Self {
            images: Arc::new(ResizingImageExtractor::new()),
            metadata: Arc::new(ExifMetadataExtractor::new()),
            shortener: None,
            committer: Some(Arc::new(GitCommitter::from_config(&config.store))),
        }
    }
}

/// What happened to one successfully processed item.
#[derive(Debug, Clone)]
pub struct ItemOutcome {
    pub url_safe_path: String,
    pub path_hash: String,
    pub decision: RebuildDecision,
    /// `None` when the item was unchanged and never reached the store
    pub write: Option<WriteOutcome>,
}

/// Result of one item task.
#[derive(Debug)]
pub enum ItemResult {
    Ok(ItemOutcome),
    /// The item is broken; the run continues
    ItemFailed(String, LightboxError),
    /// The run must stop
    FatalAbort(LightboxError),
}

/// Summary of one run.
#[derive(Debug, Clone, Default)]
pub struct GalleryReport {
    pub discovered: usize,
    pub built: usize,
    pub rebuilt: usize,
    pub metadata_refreshed: usize,
    pub unchanged: usize,
    pub failed: usize,
    /// Records actually rewritten
    pub written: usize,
    pub processed: ProcessedItems,
    pub broken: BrokenItems,
}

impl GalleryReport {
    fn tally(&mut self, result: &ItemResult) {
        match result {
            ItemResult::Ok(outcome) => {
                match outcome.decision {
                    RebuildDecision::Build => self.built += 1,
                    RebuildDecision::RebuildFull(_) => self.rebuilt += 1,
                    RebuildDecision::RebuildMetadata => self.metadata_refreshed += 1,
                    RebuildDecision::Unchanged => self.unchanged += 1,
                }
                if outcome.write == Some(WriteOutcome::Written) {
                    self.written += 1;
                }
            }
            ItemResult::ItemFailed(path, error) => {
                tracing::error!("{path}: {error}");
                self.broken.record(path.clone(), error.to_string());
                self.failed += 1;
            }
            ItemResult::FatalAbort(_) => {}
        }
    }
}

/// Runs incremental gallery builds.
pub struct GalleryBuilder {
    config: Config,
    collaborators: Collaborators,
}

impl GalleryBuilder {
    pub fn new(config: Config, collaborators: Collaborators) -> Self {
        Self {
            config,
            collaborators,
        }
    }

    /// Builder with the shipped collaborators.
    pub fn from_config(config: Config) -> Self {
        let collaborators = Collaborators::from_config(&config);
        Self::new(config, collaborators)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Process every item in the source tree.
    pub async fn process_gallery(&self) -> Result<GalleryReport> {
        self.process_gallery_with(|_| {}).await
    }

    /// Like [`process_gallery`](Self::process_gallery), calling `on_item` as
    /// each item finishes (in completion order).
    pub async fn process_gallery_with<F>(&self, mut on_item: F) -> Result<GalleryReport>
    where
        F: FnMut(&ItemResult),
    {
        let start = Instant::now();
        let source_root = self.config.source_dir();
        let output_root = self.config.output_dir();
        let repository_root = self.config.repository_dir();

        let commits = match &self.collaborators.committer {
            Some(committer) if self.config.store.commit => Some(CommitQueue::start(
                repository_root.clone(),
                committer.clone(),
            )),
            _ => None,
        };
        let store = RepositoryStore::new(
            repository_root,
            RetryPolicy::from(&self.config.store),
            commits.clone(),
        );

        tracing::info!(
            "Scanning {:?} against repository {:?}",
            source_root,
            store.root()
        );
        let (sources, targets) = tokio::try_join!(
            RepositoryStore::load_empty_repository(&source_root, &self.config.scan),
            store.load_repository(),
        )?;
        let mut targets: HashMap<String, Photo> = targets
            .into_iter()
            .map(|photo| (photo.path_hash.clone(), photo))
            .collect();

        let mut report = GalleryReport {
            discovered: sources.len(),
            ..Default::default()
        };
        tracing::info!(
            "Found {} source item(s), {} record(s)",
            sources.len(),
            targets.len()
        );

        let context = Arc::new(ItemContext {
            detector: RebuildDetector::new(
                BuildVersions::from(&self.config.build),
                self.config.images.thumbnail_width,
                source_root.clone(),
                output_root.clone(),
            ),
            store,
            collaborators: self.collaborators.clone(),
            images: self.config.images.clone(),
            build: self.config.build.clone(),
            base_url: self.config.general.base_url.clone(),
            source_root,
            output_root,
        });
        let semaphore = Arc::new(Semaphore::new(self.config.build.parallel_workers));
        let mut tasks = JoinSet::new();

        for source in sources {
            if !report.processed.insert(source.path_hash.clone()) {
                let result = ItemResult::ItemFailed(
                    source.url_safe_path.clone(),
                    LightboxError::Io(std::io::Error::other(
                        "another source item maps to the same url-safe path",
                    )),
                );
                report.tally(&result);
                on_item(&result);
                continue;
            }

            let target = targets.remove(&source.path_hash);
            let context = context.clone();
            let semaphore = semaphore.clone();
            tasks.spawn(async move {
                let path = source.url_safe_path.clone();
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return None;
                };
                // Run the item in its own task so a panic is reported against its path.
                let item = tokio::spawn(async move { context.process_item(source, target).await });
                Some(item.await.unwrap_or_else(|e| {
                    ItemResult::ItemFailed(
                        path,
                        LightboxError::Io(std::io::Error::other(format!("item task failed: {e}"))),
                    )
                }))
            });
        }

        let mut aborted: Option<LightboxError> = None;
        while let Some(joined) = tasks.join_next().await {
            let result = match joined {
                Ok(Some(result)) => result,
                // Never started: the run was aborted while it waited for a worker.
                Ok(None) => continue,
                Err(e) => {
                    tracing::error!("Item task failed: {e}");
                    continue;
                }
            };

            if aborted.is_some() {
                tracing::debug!("Finished in-flight item after abort");
                continue;
            }

            report.tally(&result);
            on_item(&result);

            if let ItemResult::FatalAbort(error) = result {
                tracing::error!("Aborting build: {error}");
                semaphore.close();
                aborted = Some(error);
            }
        }

        if let Some(commits) = &commits {
            commits.flush().await;
        }
        if let Some(error) = aborted {
            return Err(error);
        }

        tracing::info!(
            "Processed {} item(s) in {:.1?}: {} built, {} rebuilt, {} metadata, {} unchanged, {} failed",
            report.discovered,
            start.elapsed(),
            report.built,
            report.rebuilt,
            report.metadata_refreshed,
            report.unchanged,
            report.failed
        );
        Ok(report)
    }
}

/// Everything an item task needs, shared by all tasks.
struct ItemContext {
    detector: RebuildDetector,
    store: RepositoryStore,
    collaborators: Collaborators,
    images: ImageConfig,
    build: BuildConfig,
    base_url: String,
    source_root: PathBuf,
    output_root: PathBuf,
}

impl ItemContext {
    async fn process_item(&self, source: Photo, target: Option<Photo>) -> ItemResult {
        let path = source.url_safe_path.clone();
        match self.build_item(source, target).await {
            Ok(outcome) => ItemResult::Ok(outcome),
            Err(LightboxError::Image(source)) if source.is_abort() => {
                ItemResult::FatalAbort(LightboxError::Aborted { path, source })
            }
            Err(e) => ItemResult::ItemFailed(path, e),
        }
    }

    async fn build_item(&self, source: Photo, target: Option<Photo>) -> Result<ItemOutcome> {
        let mut hashes = SourceHashes::new();
        let mut decision = self
            .detector
            .classify(&source, target.as_ref(), &mut hashes)
            .await;

        let mut record = target.unwrap_or_else(|| source.clone());
        let url = canonical_url(&self.base_url, &source);

        if self.refresh_short_url(&mut record, &url).await
            && decision != RebuildDecision::Build
        {
            decision = RebuildDecision::RebuildFull(RebuildReason::ShortUrlChanged);
        }

        tracing::debug!("{}: {decision}", source.url_safe_path);
        if decision == RebuildDecision::Unchanged {
            let write = if refresh_timestamps(&mut record, &source) {
                tracing::debug!("{}: content unchanged, timestamps refreshed", record.url_safe_path);
                Some(self.store.store(&record).await?)
            } else {
                None
            };
            return Ok(ItemOutcome {
                url_safe_path: source.url_safe_path,
                path_hash: source.path_hash,
                decision,
                write,
            });
        }

        record.url_safe_path = source.url_safe_path.clone();
        record.path_hash = source.path_hash.clone();
        record.base_path = source.base_path.clone();
        record.base_name = source.base_name.clone();
        record.image_extension = source.image_extension.clone();
        record.files = self.hashed_files(&source, &mut hashes).await?;

        let metadata = self
            .collaborators
            .metadata
            .extract(&record, &self.source_root)
            .await?;
        if !metadata_equal(&record.metadata, &metadata) {
            tracing::debug!("{}: metadata changed", record.url_safe_path);
        }
        record.metadata = metadata;

        if decision.needs_images() {
            let request = ImageBuildRequest {
                photo: &record,
                source_root: &self.source_root,
                output_root: &self.output_root,
                creation_date: creation_date(&record),
                url: &url,
                short_url: &record.short_url,
                settings: &self.images,
            };
            let sizes = self.collaborators.images.build_images(&request).await?;
            if !image_sizes_equal(&record.image_sizes, &sizes) {
                tracing::debug!("{}: image sizes changed", record.url_safe_path);
            }
            record.image_sizes = sizes;
        }

        record.version = self.build.current_version;
        let write = self.store.store(&record).await?;

        Ok(ItemOutcome {
            url_safe_path: record.url_safe_path,
            path_hash: record.path_hash,
            decision,
            write: Some(write),
        })
    }

    /// Fetch a new short link if the record needs one. Returns whether the
    /// link changed. Shortener failures are logged and ignored.
    async fn refresh_short_url(&self, record: &mut Photo, url: &str) -> bool {
        let Some(shortener) = &self.collaborators.shortener else {
            return false;
        };
        if !needs_short_url(record, url, &self.build.short_url_placeholder) {
            return false;
        }

        match shortener.shorten(url).await {
            Ok(short_url) if short_url != record.short_url => {
                tracing::debug!("{}: short link {short_url}", record.url_safe_path);
                record.short_url = short_url;
                true
            }
            Ok(_) => false,
            Err(e) => {
                tracing::warn!("{}: {e}", record.url_safe_path);
                false
            }
        }
    }

    /// Source files with content hashes, reusing any computed during
    /// classification.
    async fn hashed_files(
        &self,
        source: &Photo,
        hashes: &mut SourceHashes,
    ) -> Result<Vec<ComponentFile>> {
        let mut files = Vec::with_capacity(source.files.len());
        for file in &source.files {
            let hash = hashes
                .get_or_compute(&self.source_root, source, file)
                .await?;
            files.push(ComponentFile {
                hash: Some(hash),
                ..file.clone()
            });
        }
        Ok(files)
    }
}

/// Copy modification times from `source` onto the record's matching files.
/// Returns whether any changed.
///
/// Only called for unchanged items, whose touched files were already proven
/// identical by content hash, so the recorded hashes stay valid.
fn refresh_timestamps(record: &mut Photo, source: &Photo) -> bool {
    let mut changed = false;
    for file in &mut record.files {
        if let Some(current) = source.file(&file.extension) {
            if current.last_modified != file.last_modified {
                file.last_modified = current.last_modified;
                changed = true;
            }
        }
    }
    changed
}

/// Capture date from metadata, else the primary file's modification time.
fn creation_date(record: &Photo) -> DateTime<Utc> {
    record
        .metadata_value(names::DATE_TAKEN)
        .and_then(parse_date_taken)
        .or_else(|| record.file(&record.image_extension).map(|f| f.last_modified))
        .unwrap_or(DateTime::UNIX_EPOCH)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ImageError;
    use crate::pipeline::layout;
    use crate::types::{ImageSize, PhotoMetadata};
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Writes placeholder outputs; fails for paths containing `broken`,
    /// aborts for paths containing `corrupt`, panics for `panic`.
    #[derive(Default)]
    struct MockImages {
        calls: AtomicU32,
        in_flight: AtomicU32,
        max_in_flight: AtomicU32,
        short_urls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ImageExtractor for MockImages {
        async fn build_images(
            &self,
            request: &ImageBuildRequest<'_>,
        ) -> std::result::Result<Vec<ImageSize>, ImageError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(5)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            self.short_urls
                .lock()
                .unwrap()
                .push(request.short_url.to_string());

            let photo = request.photo;
            if photo.url_safe_path.contains("panic") {
                panic!("extractor bug");
            }
            if photo.url_safe_path.contains("broken") {
                return Err(ImageError::Decode {
                    path: PathBuf::from(&photo.url_safe_path),
                    message: "unsupported".into(),
                });
            }
            if photo.url_safe_path.contains("corrupt") {
                return Err(ImageError::Corrupt {
                    path: PathBuf::from(&photo.url_safe_path),
                    message: "truncated".into(),
                });
            }

            let mut sizes = Vec::new();
            for &width in &request.settings.widths {
                let size = ImageSize::new(width, width / 2);
                write_output(request.output_root, photo, size, "jpg");
                if width == request.settings.thumbnail_width {
                    write_output(request.output_root, photo, size, "png");
                }
                sizes.push(size);
            }
            Ok(sizes)
        }
    }

    fn write_output(root: &Path, photo: &Photo, size: ImageSize, ext: &str) {
        let path = layout::output_path(root, photo, size, ext);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, b"img").unwrap();
    }

    struct MockMetadata;

    #[async_trait]
    impl MetadataExtractor for MockMetadata {
        async fn extract(
            &self,
            _photo: &Photo,
            _source_root: &Path,
        ) -> std::result::Result<Vec<PhotoMetadata>, ImageError> {
            Ok(vec![PhotoMetadata::new(names::CAMERA_MAKE, "Test")])
        }
    }

    #[derive(Default)]
    struct MockShortener {
        calls: AtomicU32,
        fail: bool,
    }

    #[async_trait]
    impl UrlShortener for MockShortener {
        async fn shorten(&self, long_url: &str) -> std::result::Result<String, ImageError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(ImageError::Shortener {
                    url: long_url.to_string(),
                    message: "rate limited".into(),
                });
            }
            Ok(format!("https://sho.rt/{n}"))
        }
    }

    #[derive(Default)]
    struct CountingCommitter {
        count: AtomicU32,
    }

    #[async_trait]
    impl Committer for CountingCommitter {
        async fn commit(&self, _root: &Path, _relative: &Path, _message: &str) -> std::io::Result<()> {
            self.count.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        config: Config,
        images: Arc<MockImages>,
        committer: Arc<CountingCommitter>,
    }

    impl Fixture {
        fn new(items: &[&str]) -> Self {
            let dir = tempfile::tempdir().unwrap();
            let mut config = Config::default();
            config.general.source_dir = dir.path().join("source");
            config.general.output_dir = dir.path().join("output");
            config.general.repository_dir = dir.path().join("repository");
            config.store.retry_delays_ms = vec![0];
            config.build.parallel_workers = 2;

            let fixture = Self {
                _dir: dir,
                config,
                images: Arc::new(MockImages::default()),
                committer: Arc::new(CountingCommitter::default()),
            };
            for item in items {
                fixture.write_source(item, b"source bytes");
            }
            fixture
        }

        fn write_source(&self, relative: &str, bytes: &[u8]) {
            let path = self.config.general.source_dir.join(relative);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, bytes).unwrap();
        }

        fn builder(&self, shortener: Option<Arc<dyn UrlShortener>>) -> GalleryBuilder {
            GalleryBuilder::new(
                self.config.clone(),
                Collaborators {
                    images: self.images.clone(),
                    metadata: Arc::new(MockMetadata),
                    shortener,
                    committer: Some(self.committer.clone()),
                },
            )
        }

        fn commits(&self) -> u32 {
            self.committer.count.load(Ordering::SeqCst)
        }

        fn image_calls(&self) -> u32 {
            self.images.calls.load(Ordering::SeqCst)
        }

        async fn record(&self, url_safe_path: &str) -> Photo {
            let store = RepositoryStore::new(
                self.config.general.repository_dir.clone(),
                RetryPolicy::immediate(1),
                None,
            );
            store
                .load_repository()
                .await
                .unwrap()
                .into_iter()
                .find(|p| p.url_safe_path == url_safe_path)
                .unwrap()
        }

        async fn rewrite(&self, photo: &Photo) {
            let store = RepositoryStore::new(
                self.config.general.repository_dir.clone(),
                RetryPolicy::immediate(1),
                None,
            );
            store.store(photo).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_first_run_builds_and_rerun_is_unchanged() {
        let fx = Fixture::new(&["2020/a.jpg", "2020/b.jpg", "misc/c.jpg"]);

        let report = fx.builder(None).process_gallery().await.unwrap();
        assert_eq!(report.discovered, 3);
        assert_eq!(report.built, 3);
        assert_eq!(report.written, 3);
        assert_eq!(report.processed.len(), 3);
        assert_eq!(fx.commits(), 3);

        let record = fx.record("2020/a").await;
        assert_eq!(record.version, 3);
        assert_eq!(record.image_sizes.len(), 3);
        assert!(record.files.iter().all(|f| f.hash.is_some()));
        assert_eq!(record.metadata_value(names::CAMERA_MAKE), Some("Test"));

        let report = fx.builder(None).process_gallery().await.unwrap();
        assert_eq!(report.unchanged, 3);
        assert_eq!(report.written, 0);
        assert_eq!(fx.commits(), 3);
        assert_eq!(fx.image_calls(), 3);
    }

    #[tokio::test]
    async fn test_changed_source_file_triggers_full_rebuild() {
        let fx = Fixture::new(&["2020/a.jpg", "2020/b.jpg"]);
        fx.builder(None).process_gallery().await.unwrap();

        fx.write_source("2020/a.jpg", b"edited source bytes");
        let mut decisions = Vec::new();
        let report = fx
            .builder(None)
            .process_gallery_with(|result| {
                if let ItemResult::Ok(outcome) = result {
                    decisions.push((outcome.url_safe_path.clone(), outcome.decision));
                }
            })
            .await
            .unwrap();

        assert_eq!(report.rebuilt, 1);
        assert_eq!(report.unchanged, 1);
        assert!(decisions.contains(&(
            "2020/a".to_string(),
            RebuildDecision::RebuildFull(RebuildReason::FilesChanged)
        )));
        assert_eq!(fx.image_calls(), 3);
    }

    #[tokio::test]
    async fn test_missing_output_triggers_full_rebuild() {
        let fx = Fixture::new(&["2020/a.jpg"]);
        fx.builder(None).process_gallery().await.unwrap();

        let record = fx.record("2020/a").await;
        let output = layout::output_path(
            &fx.config.general.output_dir,
            &record,
            record.image_sizes[1],
            "jpg",
        );
        std::fs::remove_file(output).unwrap();

        let report = fx.builder(None).process_gallery().await.unwrap();
        assert_eq!(report.rebuilt, 1);
        assert_eq!(fx.image_calls(), 2);
    }

    #[tokio::test]
    async fn test_out_of_date_version_refreshes_metadata_only() {
        let fx = Fixture::new(&["2020/a.jpg"]);
        fx.builder(None).process_gallery().await.unwrap();

        let mut record = fx.record("2020/a").await;
        record.version = 2;
        fx.rewrite(&record).await;

        let report = fx.builder(None).process_gallery().await.unwrap();
        assert_eq!(report.metadata_refreshed, 1);
        assert_eq!(report.written, 1);
        assert_eq!(fx.image_calls(), 1);
        assert_eq!(fx.record("2020/a").await.version, 3);
    }

    #[tokio::test]
    async fn test_old_version_requires_full_rebuild() {
        let fx = Fixture::new(&["2020/a.jpg"]);
        fx.builder(None).process_gallery().await.unwrap();

        let mut record = fx.record("2020/a").await;
        record.version = 1;
        fx.rewrite(&record).await;

        let report = fx.builder(None).process_gallery().await.unwrap();
        assert_eq!(report.rebuilt, 1);
        assert_eq!(fx.image_calls(), 2);
    }

    #[tokio::test]
    async fn test_failed_item_is_isolated() {
        let fx = Fixture::new(&["2020/a.jpg", "2020/broken.jpg", "2020/c.jpg"]);

        let report = fx.builder(None).process_gallery().await.unwrap();
        assert_eq!(report.built, 2);
        assert_eq!(report.failed, 1);
        assert!(report.broken.contains("2020/broken"));
        assert_eq!(report.processed.len(), 3);
        assert_eq!(fx.commits(), 2);
    }

    #[tokio::test]
    async fn test_corrupt_output_aborts_run() {
        let fx = Fixture::new(&["2020/corrupt.jpg"]);

        let err = fx.builder(None).process_gallery().await.unwrap_err();
        assert!(err.is_abort());
        assert!(matches!(err, LightboxError::Aborted { ref path, .. } if path == "2020/corrupt"));
        assert_eq!(fx.commits(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_abort_keeps_records_of_in_flight_items() {
        let items: Vec<String> = (0..60).map(|i| format!("2020/p{i:02}.jpg")).collect();
        let refs: Vec<&str> = items.iter().map(String::as_str).collect();
        let mut fx = Fixture::new(&refs);
        fx.config.build.parallel_workers = 16;
        fx.builder(None).process_gallery().await.unwrap();

        // Every record is out of date, so the next run rewrites all of them.
        let store = RepositoryStore::new(
            fx.config.general.repository_dir.clone(),
            RetryPolicy::immediate(1),
            None,
        );
        for mut record in store.load_repository().await.unwrap() {
            record.version = 2;
            fx.rewrite(&record).await;
        }
        fx.write_source("2020/zz-corrupt.jpg", b"source bytes");

        let err = fx.builder(None).process_gallery().await.unwrap_err();
        assert!(err.is_abort());

        let records = store.load_repository().await.unwrap();
        assert_eq!(records.len(), 60);
        assert!(records.iter().all(|r| r.version == 2 || r.version == 3));
    }

    #[tokio::test]
    async fn test_panicking_item_is_recorded_broken() {
        let fx = Fixture::new(&["2020/a.jpg", "2020/panic.jpg"]);

        let mut failed_paths = Vec::new();
        let report = fx
            .builder(None)
            .process_gallery_with(|result| {
                if let ItemResult::ItemFailed(path, _) = result {
                    failed_paths.push(path.clone());
                }
            })
            .await
            .unwrap();

        assert_eq!(report.built, 1);
        assert_eq!(report.failed, 1);
        assert!(report.broken.contains("2020/panic"));
        assert_eq!(failed_paths, vec!["2020/panic".to_string()]);
    }

    #[tokio::test]
    async fn test_touched_file_refreshes_timestamp_once() {
        let fx = Fixture::new(&["2020/a.jpg"]);
        fx.builder(None).process_gallery().await.unwrap();
        let before = fx.record("2020/a").await.files[0].last_modified;

        let path = fx.config.general.source_dir.join("2020/a.jpg");
        let touched = std::time::SystemTime::UNIX_EPOCH + Duration::from_secs(1_600_000_000);
        std::fs::File::options()
            .write(true)
            .open(&path)
            .unwrap()
            .set_modified(touched)
            .unwrap();

        let report = fx.builder(None).process_gallery().await.unwrap();
        assert_eq!(report.unchanged, 1);
        assert_eq!(report.written, 1);
        assert_eq!(fx.image_calls(), 1);
        let after = fx.record("2020/a").await.files[0].last_modified;
        assert_ne!(after, before);
        assert_eq!(after, DateTime::<Utc>::from(touched));

        let report = fx.builder(None).process_gallery().await.unwrap();
        assert_eq!(report.unchanged, 1);
        assert_eq!(report.written, 0);
        assert_eq!(fx.commits(), 2);
    }

    #[tokio::test]
    async fn test_symbol_only_name_is_unchanged_on_rerun() {
        let fx = Fixture::new(&["___.jpg"]);

        let report = fx.builder(None).process_gallery().await.unwrap();
        assert_eq!(report.built, 1);
        assert_eq!(report.failed, 0);

        let report = fx.builder(None).process_gallery().await.unwrap();
        assert_eq!(report.unchanged, 1);
        assert_eq!(report.built, 0);
        assert_eq!(fx.image_calls(), 1);
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let items: Vec<String> = (0..8).map(|i| format!("2020/p{i}.jpg")).collect();
        let refs: Vec<&str> = items.iter().map(String::as_str).collect();
        let fx = Fixture::new(&refs);

        let report = fx.builder(None).process_gallery().await.unwrap();
        assert_eq!(report.built, 8);
        assert!(fx.images.max_in_flight.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_new_short_link_forces_full_rebuild() {
        let fx = Fixture::new(&["2020/a.jpg", "private/b.jpg"]);
        fx.builder(None).process_gallery().await.unwrap();

        let shortener = Arc::new(MockShortener::default());
        let report = fx
            .builder(Some(shortener.clone()))
            .process_gallery()
            .await
            .unwrap();

        assert_eq!(shortener.calls.load(Ordering::SeqCst), 1);
        assert_eq!(report.rebuilt, 1);
        assert_eq!(report.unchanged, 1);
        assert_eq!(fx.record("2020/a").await.short_url, "https://sho.rt/0");
        assert!(fx
            .images
            .short_urls
            .lock()
            .unwrap()
            .contains(&"https://sho.rt/0".to_string()));
        assert_eq!(fx.record("private/b").await.short_url, "");

        let report = fx
            .builder(Some(shortener.clone()))
            .process_gallery()
            .await
            .unwrap();
        assert_eq!(report.unchanged, 2);
        assert_eq!(shortener.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_shortener_failure_does_not_fail_item() {
        let fx = Fixture::new(&["2020/a.jpg"]);
        let shortener = Arc::new(MockShortener {
            fail: true,
            ..Default::default()
        });

        let report = fx.builder(Some(shortener)).process_gallery().await.unwrap();
        assert_eq!(report.built, 1);
        assert_eq!(report.failed, 0);
        assert_eq!(fx.record("2020/a").await.short_url, "");
    }

    #[tokio::test]
    async fn test_commits_disabled() {
        let mut fx = Fixture::new(&["2020/a.jpg"]);
        fx.config.store.commit = false;
        let report = fx.builder(None).process_gallery().await.unwrap();
        assert_eq!(report.written, 1);
        assert_eq!(fx.commits(), 0);
    }

    #[tokio::test]
    async fn test_colliding_url_safe_paths_marked_broken() {
        let fx = Fixture::new(&["2020/Beach Day.jpg", "2020/beach-day.jpg"]);
        let report = fx.builder(None).process_gallery().await.unwrap();
        assert_eq!(report.discovered, 2);
        assert_eq!(report.built, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(report.processed.len(), 1);
    }

    #[test]
    fn test_creation_date_prefers_date_taken() {
        let taken = DateTime::from_timestamp(1_500_000_000, 0).unwrap();
        let modified = DateTime::from_timestamp(1_600_000_000, 0).unwrap();
        let mut photo = Photo {
            image_extension: "jpg".into(),
            files: vec![ComponentFile {
                extension: "jpg".into(),
                hash: None,
                last_modified: modified,
                file_size: 1,
            }],
            ..Default::default()
        };
        assert_eq!(creation_date(&photo), modified);

        photo.metadata = vec![PhotoMetadata::new(names::DATE_TAKEN, taken.to_rfc3339())];
        assert_eq!(creation_date(&photo), taken);
    }
}
