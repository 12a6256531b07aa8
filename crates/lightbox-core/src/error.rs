//! Error types for the Lightbox build pipeline.
//!
//! Errors are organized by concern so callers can tell an unreadable source
//! tree from a corrupt write or a broken image, and so the orchestrator can
//! decide which failures stay local to one item and which end the run.

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for Lightbox operations.
#[derive(Error, Debug)]
pub enum LightboxError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Directory scanning errors
    #[error("Scan error: {0}")]
    Scan(#[from] ScanError),

    /// Repository store errors
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Image or metadata collaborator errors
    #[error("Image error: {0}")]
    Image(#[from] ImageError),

    /// General I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A failure that invalidates the whole run.
    #[error("Build aborted while processing {path}: {source}")]
    Aborted {
        path: String,
        #[source]
        source: ImageError,
    },
}

impl LightboxError {
    /// Whether this error must stop the run instead of marking one item broken.
    pub fn is_abort(&self) -> bool {
        match self {
            LightboxError::Aborted { .. } => true,
            LightboxError::Image(e) => e.is_abort(),
            _ => false,
        }
    }
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to read the config file from disk
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    /// Failed to parse TOML configuration
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Configuration values are invalid
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Directory scanning errors.
#[derive(Error, Debug)]
pub enum ScanError {
    /// A folder could not be enumerated
    #[error("Failed to enumerate {path}: {source}")]
    Enumerate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The emitter rejected a discovered entry
    #[error("Failed to handle {path}: {message}")]
    Emit { path: PathBuf, message: String },

    /// A scan task panicked or was cancelled
    #[error("Scan task failed: {0}")]
    Task(String),
}

/// Repository store errors.
#[derive(Error, Debug)]
pub enum StoreError {
    /// I/O failure reading or writing a record
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Post-write readback did not match the bytes written
    #[error("File content mismatch on {path}: wrote {expected} bytes, read back {actual} bytes")]
    FileContent {
        path: PathBuf,
        expected: usize,
        actual: usize,
    },

    /// Record could not be serialized or parsed
    #[error("Invalid record {path}: {source}")]
    Serialization {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Errors from the image and metadata collaborators.
#[derive(Error, Debug)]
pub enum ImageError {
    /// No component file could be decoded
    #[error("No decodable image for {0}")]
    NoSource(String),

    /// Decoding a source image failed
    #[error("Decode error for {path}: {message}")]
    Decode { path: PathBuf, message: String },

    /// Encoding or writing an output failed
    #[error("Encode error for {path}: {message}")]
    Encode { path: PathBuf, message: String },

    /// A written output failed re-validation
    #[error("Generated image {path} is corrupt: {message}")]
    Corrupt { path: PathBuf, message: String },

    /// Metadata extraction failed
    #[error("Metadata extraction failed for {path}: {message}")]
    Metadata { path: PathBuf, message: String },

    /// URL shortening failed
    #[error("URL shortening failed for {url}: {message}")]
    Shortener { url: String, message: String },

    /// General I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ImageError {
    /// Corrupt output means the pipeline itself may be producing bad images.
    pub fn is_abort(&self) -> bool {
        matches!(self, ImageError::Corrupt { .. })
    }
}

/// Convenience type alias for Lightbox results.
pub type Result<T> = std::result::Result<T, LightboxError>;

/// Convenience type alias for store results.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_corrupt_image_is_abort() {
        let err = ImageError::Corrupt {
            path: PathBuf::from("out/a-400x300.jpg"),
            message: "truncated".into(),
        };
        assert!(err.is_abort());
        assert!(LightboxError::from(err).is_abort());
    }

    #[test]
    fn test_decode_error_is_not_abort() {
        let err = ImageError::Decode {
            path: PathBuf::from("a.cr2"),
            message: "unsupported".into(),
        };
        assert!(!err.is_abort());
        assert!(!LightboxError::from(err).is_abort());
    }

    #[test]
    fn test_file_content_message_names_path() {
        let err = StoreError::FileContent {
            path: PathBuf::from("ab/cd/x.info"),
            expected: 10,
            actual: 4,
        };
        let msg = err.to_string();
        assert!(msg.contains("ab/cd/x.info"));
        assert!(msg.contains("10"));
    }
}
