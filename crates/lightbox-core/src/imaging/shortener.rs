//! Short links for published items.

use async_trait::async_trait;

use crate::error::ImageError;
use crate::types::Photo;

/// Turns a long public URL into a short link.
#[async_trait]
pub trait UrlShortener: Send + Sync {
    async fn shorten(&self, long_url: &str) -> Result<String, ImageError>;
}

/// Canonical public URL of an item: `<base_url>/<url_safe_path>/`.
pub fn canonical_url(base_url: &str, photo: &Photo) -> String {
    format!(
        "{}/{}/",
        base_url.trim_end_matches('/'),
        photo.url_safe_path.trim_matches('/')
    )
}

/// Whether an item should get a new short link.
///
/// Private items never do. Otherwise only a missing link, one that just
/// repeats the long URL, or the placeholder value is replaced.
pub fn needs_short_url(photo: &Photo, long_url: &str, placeholder: &str) -> bool {
    if photo.is_private() {
        return false;
    }
    let current = photo.short_url.trim();
    current.is_empty() || current == long_url || current == placeholder
}
