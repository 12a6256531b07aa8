//! On-disk naming: url-safe paths, hash sharding, record and output paths.
//!
//! Records and outputs live under a directory derived from the item's path
//! hash, split at fixed offsets so no single directory grows unbounded:
//!
//! ```text
//! <root>/ab/cd/ef01/2345/6789abcd/<rest-of-hash>/<tail>.info
//! <root>/ab/cd/ef01/2345/6789abcd/<rest-of-hash>/<tail>-800x600.jpg
//! ```

use std::path::{Path, PathBuf};

use crate::pipeline::hash::Hasher;
use crate::types::{ImageSize, Photo};

/// Offsets at which a path hash is split into directories.
pub const SHARD_OFFSETS: [usize; 5] = [2, 4, 8, 12, 20];

/// Extension of persisted records.
pub const RECORD_EXTENSION: &str = "info";

/// Build the url-safe logical path for an item.
///
/// Each folder segment and the stem are lowercased, characters outside
/// `[a-z0-9]` become `-`, runs of `-` collapse and empty folder segments
/// drop out. A stem with nothing url-safe in it becomes the first eight hex
/// characters of its hash, so the last segment is never empty.
pub fn url_safe_path(relative_folder: &Path, stem: &str) -> String {
    let mut segments: Vec<String> = relative_folder
        .components()
        .map(|c| url_safe_segment(&c.as_os_str().to_string_lossy()))
        .filter(|segment| !segment.is_empty())
        .collect();
    segments.push(url_safe_stem(stem));
    segments.join("/")
}

fn url_safe_stem(stem: &str) -> String {
    let segment = url_safe_segment(stem);
    if segment.is_empty() {
        Hasher::hash_bytes(stem.as_bytes())[..8].to_string()
    } else {
        segment
    }
}

fn url_safe_segment(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len());
    for c in segment.chars().flat_map(char::to_lowercase) {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            out.push(c);
        } else if !out.is_empty() && !out.ends_with('-') {
            out.push('-');
        }
    }
    while out.ends_with('-') {
        out.pop();
    }
    out
}

/// Split a path hash into its shard segments.
pub fn shard_segments(path_hash: &str) -> Vec<&str> {
    let mut segments = Vec::with_capacity(SHARD_OFFSETS.len() + 1);
    let mut start = 0;
    for &offset in &SHARD_OFFSETS {
        if offset >= path_hash.len() {
            break;
        }
        segments.push(&path_hash[start..offset]);
        start = offset;
    }
    if start < path_hash.len() {
        segments.push(&path_hash[start..]);
    }
    segments
}

/// Relative directory for a path hash.
pub fn shard(path_hash: &str) -> PathBuf {
    shard_segments(path_hash).into_iter().collect()
}

/// Where a record is persisted under the repository root.
pub fn record_path(repository_root: &Path, photo: &Photo) -> PathBuf {
    repository_root
        .join(shard(&photo.path_hash))
        .join(format!("{}.{}", photo.tail(), RECORD_EXTENSION))
}

/// Where one derived output is written under the output root.
pub fn output_path(output_root: &Path, photo: &Photo, size: ImageSize, extension: &str) -> PathBuf {
    output_root.join(shard(&photo.path_hash)).join(format!(
        "{}-{}x{}.{}",
        photo.tail(),
        size.width,
        size.height,
        extension
    ))
}
