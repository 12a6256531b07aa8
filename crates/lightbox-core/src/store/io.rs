//! Byte-level record IO behind a trait, so the write path can be exercised
//! against a filesystem that misbehaves.

use async_trait::async_trait;
use std::io;
use std::path::Path;

/// Raw reads and writes used by the repository store.
#[async_trait]
pub trait RecordIo: Send + Sync {
    /// Read a file, `None` if it does not exist.
    async fn read(&self, path: &Path) -> io::Result<Option<Vec<u8>>>;

    /// Write a file, creating parent directories as needed.
    async fn write(&self, path: &Path, bytes: &[u8]) -> io::Result<()>;

    /// Remove a file; removing a missing file is not an error.
    async fn remove(&self, path: &Path) -> io::Result<()>;
}

/// [`RecordIo`] on the local filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct DiskIo;

#[async_trait]
impl RecordIo for DiskIo {
    async fn read(&self, path: &Path) -> io::Result<Option<Vec<u8>>> {
        match tokio::fs::read(path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn write(&self, path: &Path, bytes: &[u8]) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, bytes).await
    }

    async fn remove(&self, path: &Path) -> io::Result<()> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}
