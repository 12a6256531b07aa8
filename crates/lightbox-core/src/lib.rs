//! Lightbox Core - incremental, content-addressed gallery builds.
//!
//! Turns a tree of source photographs into resized images and per-item JSON
//! records, doing only the work each run actually needs:
//!
//! ```text
//! Scan source ─┐
//!              ├→ Classify → Metadata → Images → Store (+ git commit)
//! Load records ┘
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use lightbox_core::{Config, GalleryBuilder};
//!
//! #[tokio::main]
//! async fn main() -> lightbox_core::Result<()> {
//!     let config = Config::load()?;
//!     let report = GalleryBuilder::from_config(config).process_gallery().await?;
//!     println!("{} built, {} unchanged", report.built, report.unchanged);
//!     Ok(())
//! }
//! ```

// Module declarations
pub mod config;
pub mod error;
pub mod imaging;
pub mod pipeline;
pub mod store;
pub mod types;

// Re-exports for convenient access
pub use config::Config;
pub use error::{ConfigError, ImageError, LightboxError, Result, ScanError, StoreError, StoreResult};
pub use imaging::{ImageExtractor, MetadataExtractor, UrlShortener};
pub use pipeline::{
    BrokenItems, Collaborators, GalleryBuilder, GalleryReport, ItemOutcome, ItemResult,
    ProcessedItems, RebuildDecision,
};
pub use store::{Committer, RepositoryStore, WriteOutcome};
pub use types::{ComponentFile, FileEntry, ImageSize, Photo, PhotoMetadata};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
