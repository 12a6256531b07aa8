//! Persisted per-item records.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};

use crate::config::ScanConfig;
use crate::error::{ScanError, StoreError, StoreResult};
use crate::pipeline::discovery::{split_name, DirectoryScanner, FileEmitter};
use crate::pipeline::hash::Hasher;
use crate::pipeline::layout;
use crate::types::{ComponentFile, FileEntry, Photo};

use super::commit::CommitQueue;
use super::io::{DiskIo, RecordIo};
use super::retry::RetryPolicy;

/// Result of [`RepositoryStore::store`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The file already held these exact bytes; nothing written or committed
    Unchanged,
    /// New bytes written, verified and queued for commit
    Written,
}

/// Loads and saves records under a repository root.
#[derive(Clone)]
pub struct RepositoryStore {
    root: PathBuf,
    retry: RetryPolicy,
    commits: Option<CommitQueue>,
    io: Arc<dyn RecordIo>,
}

impl RepositoryStore {
    pub fn new(root: PathBuf, retry: RetryPolicy, commits: Option<CommitQueue>) -> Self {
        Self {
            root,
            retry,
            commits,
            io: Arc::new(DiskIo),
        }
    }

    /// Replace the byte-level IO (used to simulate a faulty disk).
    pub fn with_io(mut self, io: Arc<dyn RecordIo>) -> Self {
        self.io = io;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Where `photo` is persisted.
    pub fn record_path(&self, photo: &Photo) -> PathBuf {
        layout::record_path(&self.root, photo)
    }

    /// Parse one record file.
    pub async fn load(&self, path: &Path) -> StoreResult<Photo> {
        let bytes = self
            .io
            .read(path)
            .await
            .map_err(|source| StoreError::Io {
                path: path.to_path_buf(),
                source,
            })?
            .ok_or_else(|| StoreError::Io {
                path: path.to_path_buf(),
                source: std::io::Error::from(std::io::ErrorKind::NotFound),
            })?;
        serde_json::from_slice(&bytes).map_err(|source| StoreError::Serialization {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Serialize and persist `photo`.
    ///
    /// Identical bytes on disk make this a no-op. Otherwise the old file is
    /// removed, the new bytes written and read back for verification, all
    /// retried per the [`RetryPolicy`]. A successful write queues exactly
    /// one commit.
    pub async fn store(&self, photo: &Photo) -> StoreResult<WriteOutcome> {
        let path = self.record_path(photo);
        let bytes = serialize(photo).map_err(|source| StoreError::Serialization {
            path: path.clone(),
            source,
        })?;

        if let Ok(Some(existing)) = self.io.read(&path).await {
            if existing == bytes {
                tracing::trace!("Record unchanged: {:?}", path);
                return Ok(WriteOutcome::Unchanged);
            }
        }

        let mut last_error = None;
        for attempt in 0..self.retry.attempts {
            if attempt > 0 {
                let delay = self.retry.backoff_duration(attempt - 1);
                tracing::debug!(
                    "Retry {attempt}/{} for {:?} after {delay:?}",
                    self.retry.attempts - 1,
                    path
                );
                tokio::time::sleep(delay).await;
            }

            match self.write_verified(&path, &bytes).await {
                Ok(()) => {
                    if let Some(commits) = &self.commits {
                        let relative = path.strip_prefix(&self.root).unwrap_or(&path);
                        commits.submit(relative.to_path_buf()).await;
                    }
                    return Ok(WriteOutcome::Written);
                }
                Err(e) => {
                    tracing::warn!("Write attempt {} failed: {e}", attempt + 1);
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| StoreError::Io {
            path,
            source: std::io::Error::other("no write attempted"),
        }))
    }

    async fn write_verified(&self, path: &Path, bytes: &[u8]) -> StoreResult<()> {
        let io_err = |source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        };

        self.io.remove(path).await.map_err(io_err)?;
        self.io.write(path, bytes).await.map_err(io_err)?;

        let written = self.io.read(path).await.map_err(io_err)?.unwrap_or_default();
        if written != bytes {
            return Err(StoreError::FileContent {
                path: path.to_path_buf(),
                expected: bytes.len(),
                actual: written.len(),
            });
        }
        Ok(())
    }

    /// Load every record under the repository root.
    pub async fn load_repository(&self) -> Result<Vec<Photo>, ScanError> {
        if !tokio::fs::try_exists(&self.root).await.unwrap_or(false) {
            tracing::info!("Repository {:?} is empty", self.root);
            return Ok(Vec::new());
        }

        let emitter = Arc::new(RecordLoader {
            store: self.clone(),
            photos: Mutex::new(Vec::new()),
        });
        let count = DirectoryScanner::new(ScanConfig::repository())
            .scan_folder(&self.root, emitter.clone())
            .await?;
        tracing::debug!("Loaded {count} record(s) from {:?}", self.root);
        Ok(take(&emitter.photos))
    }

    /// Build fresh records for every item in a source tree.
    ///
    /// Component files are stat'ed but not hashed; metadata and sizes are
    /// left empty for the build to fill in.
    pub async fn load_empty_repository(
        source_root: &Path,
        scan: &ScanConfig,
    ) -> Result<Vec<Photo>, ScanError> {
        let emitter = Arc::new(SourceRecordBuilder {
            photos: Mutex::new(Vec::new()),
        });
        let count = DirectoryScanner::new(scan.clone())
            .scan_folder(source_root, emitter.clone())
            .await?;
        tracing::debug!("Found {count} source item(s) in {:?}", source_root);
        Ok(take(&emitter.photos))
    }
}

/// Record bytes: pretty JSON with a trailing newline.
fn serialize(photo: &Photo) -> serde_json::Result<Vec<u8>> {
    let mut bytes = serde_json::to_vec_pretty(photo)?;
    bytes.push(b'\n');
    Ok(bytes)
}

fn take(photos: &Mutex<Vec<Photo>>) -> Vec<Photo> {
    std::mem::take(&mut *photos.lock().unwrap_or_else(|e| e.into_inner()))
}

fn push(photos: &Mutex<Vec<Photo>>, photo: Photo) {
    photos.lock().unwrap_or_else(|e| e.into_inner()).push(photo);
}

struct RecordLoader {
    store: RepositoryStore,
    photos: Mutex<Vec<Photo>>,
}

#[async_trait]
impl FileEmitter for RecordLoader {
    async fn file_found(&self, entry: FileEntry) -> Result<(), ScanError> {
        let path = entry.primary_path();
        let photo = self.store.load(&path).await.map_err(|e| ScanError::Emit {
            path: path.clone(),
            message: e.to_string(),
        })?;
        push(&self.photos, photo);
        Ok(())
    }
}

struct SourceRecordBuilder {
    photos: Mutex<Vec<Photo>>,
}

#[async_trait]
impl FileEmitter for SourceRecordBuilder {
    async fn file_found(&self, entry: FileEntry) -> Result<(), ScanError> {
        let photo = source_record(&entry).await?;
        push(&self.photos, photo);
        Ok(())
    }
}

/// Turn a scanned entry into an unhashed record.
pub async fn source_record(entry: &FileEntry) -> Result<Photo, ScanError> {
    let (stem, image_extension) = split_name(&entry.primary_file_name).ok_or_else(|| {
        ScanError::Emit {
            path: entry.primary_path(),
            message: "file name has no extension".to_string(),
        }
    })?;

    let mut files = Vec::new();
    for name in entry.file_names() {
        let path = entry.folder.join(name);
        let meta = tokio::fs::metadata(&path)
            .await
            .map_err(|source| ScanError::Enumerate {
                path: path.clone(),
                source,
            })?;
        let last_modified: DateTime<Utc> = meta
            .modified()
            .map(DateTime::from)
            .unwrap_or(DateTime::UNIX_EPOCH);
        let extension = split_name(name).map(|(_, ext)| ext).unwrap_or_default();
        files.push(ComponentFile {
            extension: extension.to_string(),
            hash: None,
            last_modified,
            file_size: meta.len(),
        });
    }

    let url_safe_path = layout::url_safe_path(&entry.relative_folder, stem);
    let base_path = entry
        .relative_folder
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/");

    Ok(Photo {
        version: 0,
        path_hash: Hasher::path_hash(&url_safe_path),
        url_safe_path,
        base_path,
        base_name: stem.to_string(),
        image_extension: image_extension.to_string(),
        files,
        metadata: Vec::new(),
        image_sizes: Vec::new(),
        short_url: String::new(),
    })
}
