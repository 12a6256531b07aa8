//! Configuration validation with range checks.

use crate::error::ConfigError;

use super::Config;

impl Config {
    /// Validate configuration values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.build.parallel_workers == 0 {
            return Err(ConfigError::ValidationError(
                "build.parallel_workers must be > 0".into(),
            ));
        }
        if self.build.requires_rebuild_below > self.build.current_version {
            return Err(ConfigError::ValidationError(
                "build.requires_rebuild_below must be <= build.current_version".into(),
            ));
        }
        if self.build.out_of_date_below > self.build.current_version {
            return Err(ConfigError::ValidationError(
                "build.out_of_date_below must be <= build.current_version".into(),
            ));
        }
        if self.store.retry_attempts == 0 {
            return Err(ConfigError::ValidationError(
                "store.retry_attempts must be > 0".into(),
            ));
        }
        if self.scan.extension_precedence.is_empty() {
            return Err(ConfigError::ValidationError(
                "scan.extension_precedence must not be empty".into(),
            ));
        }
        if self.images.widths.is_empty() || self.images.widths.contains(&0) {
            return Err(ConfigError::ValidationError(
                "images.widths must be non-empty and > 0".into(),
            ));
        }
        if !self.images.widths.contains(&self.images.thumbnail_width) {
            return Err(ConfigError::ValidationError(
                "images.thumbnail_width must be one of images.widths".into(),
            ));
        }
        if self.images.jpeg_quality == 0 || self.images.jpeg_quality > 100 {
            return Err(ConfigError::ValidationError(
                "images.jpeg_quality must be between 1 and 100".into(),
            ));
        }
        Ok(())
    }
}
