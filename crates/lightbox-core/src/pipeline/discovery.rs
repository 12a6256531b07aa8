//! Directory scanning that groups sibling files into logical items.
//!
//! Files sharing a base name (case-insensitive) in one folder form a group.
//! A group made only of sidecar files is dropped; otherwise the member with
//! the best extension precedence becomes the primary file. Every folder is
//! read by its own task, so sibling subtrees are scanned concurrently and
//! emitted in no particular order.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::task::JoinSet;

use crate::config::ScanConfig;
use crate::error::ScanError;
use crate::types::FileEntry;

/// Receives every item the scanner discovers.
///
/// The emitter decides what an entry becomes (a fresh source record, a
/// persisted record load, ...), keeping scan policy separate from use.
#[async_trait]
pub trait FileEmitter: Send + Sync {
    async fn file_found(&self, entry: FileEntry) -> Result<(), ScanError>;
}

/// Recursive, concurrent folder scanner.
#[derive(Debug, Clone)]
pub struct DirectoryScanner {
    config: Arc<ScanConfig>,
}

impl DirectoryScanner {
    pub fn new(config: ScanConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    /// Scan `base` and hand one [`FileEntry`] per item to `emitter`.
    ///
    /// Returns the number of entries emitted. A folder that cannot be read
    /// stops the scan of its own subtree only; the remaining folders are
    /// still visited and the first error is returned at the end.
    pub async fn scan_folder(
        &self,
        base: &Path,
        emitter: Arc<dyn FileEmitter>,
    ) -> Result<usize, ScanError> {
        let count = Arc::new(AtomicUsize::new(0));
        let mut tasks: JoinSet<Result<Vec<PathBuf>, ScanError>> = JoinSet::new();
        let mut first_error: Option<ScanError> = None;

        self.spawn_folder(&mut tasks, base, base, &emitter, &count);

        while let Some(joined) = tasks.join_next().await {
            let result = joined.map_err(|e| ScanError::Task(e.to_string()));
            match result.and_then(|r| r) {
                Ok(subfolders) => {
                    for folder in subfolders {
                        self.spawn_folder(&mut tasks, base, &folder, &emitter, &count);
                    }
                }
                Err(e) => {
                    tracing::warn!("{e}");
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(count.load(Ordering::SeqCst)),
        }
    }

    fn spawn_folder(
        &self,
        tasks: &mut JoinSet<Result<Vec<PathBuf>, ScanError>>,
        base: &Path,
        folder: &Path,
        emitter: &Arc<dyn FileEmitter>,
        count: &Arc<AtomicUsize>,
    ) {
        let config = self.config.clone();
        let base = base.to_path_buf();
        let folder = folder.to_path_buf();
        let emitter = emitter.clone();
        let count = count.clone();
        tasks.spawn(async move { scan_one(&config, &base, &folder, &*emitter, &count).await });
    }
}

/// Read one folder: emit its items and return its subfolders.
async fn scan_one(
    config: &ScanConfig,
    base: &Path,
    folder: &Path,
    emitter: &dyn FileEmitter,
    count: &AtomicUsize,
) -> Result<Vec<PathBuf>, ScanError> {
    let enumerate_err = |source| ScanError::Enumerate {
        path: folder.to_path_buf(),
        source,
    };

    let mut reader = tokio::fs::read_dir(folder).await.map_err(enumerate_err)?;
    let mut subfolders = Vec::new();
    let mut file_names = Vec::new();

    while let Some(entry) = reader.next_entry().await.map_err(enumerate_err)? {
        let file_type = entry.file_type().await.map_err(enumerate_err)?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if file_type.is_dir() {
            if !is_ignored_folder(config, &name) {
                subfolders.push(entry.path());
            }
        } else if file_type.is_file() {
            file_names.push(name);
        }
    }

    let relative_folder = folder.strip_prefix(base).unwrap_or(Path::new("")).to_path_buf();
    for (primary, alternates) in group_files(config, &file_names) {
        let entry = FileEntry {
            folder: folder.to_path_buf(),
            relative_folder: relative_folder.clone(),
            primary_file_name: primary,
            alternate_file_names: alternates,
        };
        emitter.file_found(entry).await?;
        count.fetch_add(1, Ordering::SeqCst);
    }

    Ok(subfolders)
}

fn is_ignored_folder(config: &ScanConfig, name: &str) -> bool {
    config
        .ignored_folders
        .iter()
        .any(|ignored| ignored.eq_ignore_ascii_case(name))
}

/// Group file names by case-insensitive stem and pick each group's primary.
///
/// Returns `(primary, alternates)` pairs sorted by stem. Files whose
/// extension is neither ranked nor a sidecar are ignored, as are duplicate
/// extensions within a group (first seen wins).
pub fn group_files(config: &ScanConfig, file_names: &[String]) -> Vec<(String, Vec<String>)> {
    let mut groups: BTreeMap<String, Vec<(String, String)>> = BTreeMap::new();

    for name in file_names {
        let Some((stem, extension)) = split_name(name) else {
            continue;
        };
        if rank(config, extension).is_none() && !is_sidecar(config, extension) {
            continue;
        }
        let members = groups.entry(stem.to_lowercase()).or_default();
        if members
            .iter()
            .any(|(_, ext)| ext.eq_ignore_ascii_case(extension))
        {
            continue;
        }
        members.push((name.clone(), extension.to_string()));
    }

    groups
        .into_values()
        .filter(|members| members.iter().any(|(_, ext)| !is_sidecar(config, ext)))
        .map(|mut members| {
            members.sort_by(|(_, a), (_, b)| {
                let rank_a = rank(config, a).unwrap_or(usize::MAX);
                let rank_b = rank(config, b).unwrap_or(usize::MAX);
                rank_a
                    .cmp(&rank_b)
                    .then_with(|| a.to_lowercase().cmp(&b.to_lowercase()))
            });
            let mut names = members.into_iter().map(|(name, _)| name);
            let primary = names.next().unwrap_or_default();
            (primary, names.collect())
        })
        .collect()
}

/// Split `name` into stem and extension; names without an extension are skipped.
pub(crate) fn split_name(name: &str) -> Option<(&str, &str)> {
    let (stem, extension) = name.rsplit_once('.')?;
    if stem.is_empty() || extension.is_empty() {
        return None;
    }
    Some((stem, extension))
}

fn rank(config: &ScanConfig, extension: &str) -> Option<usize> {
    config
        .extension_precedence
        .iter()
        .position(|e| e.eq_ignore_ascii_case(extension))
}

fn is_sidecar(config: &ScanConfig, extension: &str) -> bool {
    config
        .sidecar_extensions
        .iter()
        .any(|e| e.eq_ignore_ascii_case(extension))
}
