//! Run-wide registries shared by all item tasks.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Items that failed this run, keyed by url-safe path.
#[derive(Debug, Clone, Default)]
pub struct BrokenItems {
    inner: Arc<Mutex<BTreeMap<String, String>>>,
}

impl BrokenItems {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a failure; a later failure for the same path replaces the reason.
    pub fn record(&self, path: impl Into<String>, reason: impl Into<String>) {
        lock(&self.inner).insert(path.into(), reason.into());
    }

    pub fn contains(&self, path: &str) -> bool {
        lock(&self.inner).contains_key(path)
    }

    pub fn len(&self) -> usize {
        lock(&self.inner).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.inner).is_empty()
    }

    /// Sorted `(path, reason)` pairs.
    pub fn entries(&self) -> Vec<(String, String)> {
        lock(&self.inner)
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

/// Path hashes of every item seen this run.
///
/// Anything in the repository not in this set has no source any more.
#[derive(Debug, Clone, Default)]
pub struct ProcessedItems {
    inner: Arc<Mutex<HashSet<String>>>,
}

impl ProcessedItems {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` if the hash was already present.
    pub fn insert(&self, path_hash: impl Into<String>) -> bool {
        lock(&self.inner).insert(path_hash.into())
    }

    pub fn contains(&self, path_hash: &str) -> bool {
        lock(&self.inner).contains(path_hash)
    }

    pub fn len(&self) -> usize {
        lock(&self.inner).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.inner).is_empty()
    }

    pub fn snapshot(&self) -> HashSet<String> {
        lock(&self.inner).clone()
    }
}
