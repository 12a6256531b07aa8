//! Content and identity hashing.

use sha2::{Digest, Sha512};
use std::path::Path;

/// SHA-512 hashing of buffers, files and logical item paths.
///
/// Every digest is rendered as 128 lowercase hex characters so the values
/// are stable across platforms and usable as directory names.
pub struct Hasher;

impl Hasher {
    /// Hash an in-memory byte buffer.
    pub fn hash_bytes(data: &[u8]) -> String {
        format!("{:x}", Sha512::digest(data))
    }

    /// Hash a file by reading it whole.
    pub fn hash_file(path: &Path) -> std::io::Result<String> {
        let bytes = std::fs::read(path)?;
        Ok(Self::hash_bytes(&bytes))
    }

    /// Async variant of [`Hasher::hash_file`] that keeps the read and the
    /// digest off the runtime's worker threads.
    pub async fn hash_file_async(path: &Path) -> std::io::Result<String> {
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || Self::hash_file(&path))
            .await
            .map_err(std::io::Error::other)?
    }

    /// Identity key of an item: the hash of its url-safe path.
    pub fn path_hash(url_safe_path: &str) -> String {
        Self::hash_bytes(url_safe_path.as_bytes())
    }
}
