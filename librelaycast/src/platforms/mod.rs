//! Social platform abstraction
//!
//! A relay publishes in two steps: upload the image, then post a status that
//! references the returned media handle. Both calls can be rejected with
//! [`PlatformError::RateLimit`](crate::error::PlatformError::RateLimit)
//! carrying the time the platform window resets.
//!
//! # Examples
//!
//! ```no_run
//! use librelaycast::platforms::Platform;
//! use librelaycast::types::EncodedImage;
//!
//! # async fn example(platform: &dyn Platform, image: &EncodedImage) -> librelaycast::Result<()> {
//! let media = platform.upload_media(image).await?;
//! let status_id = platform.post_status(&image.title, &[media]).await?;
//! println!("Posted {} as {}", image.title, status_id);
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{EncodedImage, MediaHandle};

pub mod oauth;
pub mod twitter;

// Mock platform is available for all builds (not just tests) to support integration tests
pub mod mock;

#[async_trait]
pub trait Platform: Send + Sync {
    /// Upload an encoded image and return the handle to attach it with.
    ///
    /// # Errors
    ///
    /// - `PlatformError::RateLimit` when the platform throttles the call
    /// - `PlatformError::Authentication` for rejected credentials
    /// - `PlatformError::Network` / `Posting` for everything else
    async fn upload_media(&self, image: &EncodedImage) -> Result<MediaHandle>;

    /// Post `text` with the given media attached; returns the status ID.
    async fn post_status(&self, text: &str, media: &[MediaHandle]) -> Result<String>;

    /// Lowercase platform identifier, for logs
    fn name(&self) -> &str;

    /// Maximum status length in characters, if the platform has one
    fn character_limit(&self) -> Option<usize> {
        None
    }
}

/// Fit `text` into `limit` characters, ending in an ellipsis when cut.
pub fn truncate_status(text: &str, limit: Option<usize>) -> String {
    let limit = match limit {
        Some(limit) if text.chars().count() > limit => limit,
        _ => return text.to_string(),
    };
    if limit == 0 {
        return String::new();
    }
    let mut truncated: String = text.chars().take(limit - 1).collect();
    truncated.push('…');
    truncated
}
