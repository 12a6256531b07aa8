//! Incremental build pipeline.
//!
//! - **hash**: SHA-512 content and identity hashes
//! - **layout**: url-safe paths and sharded on-disk locations
//! - **discovery**: find source files and group them into items
//! - **compare**: change-tolerant equality helpers
//! - **rebuild**: decide what each item needs
//! - **broken**: run-wide failure and processed-item registries
//! - **builder**: orchestrates a whole run

pub mod broken;
pub mod builder;
pub mod compare;
pub mod discovery;
pub mod hash;
pub mod layout;
pub mod rebuild;

// Re-exports for convenient access
pub use broken::{BrokenItems, ProcessedItems};
pub use builder::{Collaborators, GalleryBuilder, GalleryReport, ItemOutcome, ItemResult};
pub use discovery::{DirectoryScanner, FileEmitter};
pub use hash::Hasher;
pub use rebuild::{RebuildDecision, RebuildDetector, RebuildReason, SourceHashes};
