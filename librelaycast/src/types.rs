//! Core types for Relaycast

use serde::{Deserialize, Serialize};
use url::Url;

/// A post as listed by the community feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
    pub title: String,
    pub url: String,
    pub domain: String,
    pub is_self: bool,
}

impl Submission {
    pub fn new(
        title: impl Into<String>,
        url: impl Into<String>,
        domain: impl Into<String>,
        is_self: bool,
    ) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
            domain: domain.into(),
            is_self,
        }
    }
}

/// A submission that passed filtering, with its resolved image URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub title: String,
    pub url: Url,
}

impl Candidate {
    /// Identifier used for dedup: the resolved image URL.
    pub fn content_id(&self) -> &str {
        self.url.as_str()
    }
}

/// Fetched image bytes in base64 form, ready for upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    pub title: String,
    pub source: Url,
    pub data: String,
}

impl EncodedImage {
    pub fn new(candidate: Candidate, data: String) -> Self {
        Self {
            title: candidate.title,
            source: candidate.url,
            data,
        }
    }

    pub fn content_id(&self) -> &str {
        self.source.as_str()
    }

    /// Size of the original image, derived from the padded base64 text
    pub fn byte_len(&self) -> usize {
        let padding = self.data.bytes().rev().take_while(|b| *b == b'=').count();
        (self.data.len() / 4 * 3).saturating_sub(padding)
    }
}

/// Platform-assigned identifier for uploaded media.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MediaHandle(pub String);

impl MediaHandle {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for MediaHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where a candidate ended up in the publish state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelayState {
    Pending,
    Uploaded,
    Posted,
    Recorded,
    Failed,
    /// Another publisher already holds the claim for this content.
    Skipped,
}

impl std::fmt::Display for RelayState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RelayState::Pending => "pending",
            RelayState::Uploaded => "uploaded",
            RelayState::Posted => "posted",
            RelayState::Recorded => "recorded",
            RelayState::Failed => "failed",
            RelayState::Skipped => "skipped",
        };
        f.write_str(s)
    }
}

/// Result of publishing a single candidate
#[derive(Debug, Clone)]
pub struct PublishReport {
    pub title: String,
    pub content_id: String,
    pub state: RelayState,
    /// Platform status ID (if posted)
    pub post_id: Option<String>,
    /// Error message (if failed or left unrecorded)
    pub error: Option<String>,
}

impl PublishReport {
    pub fn new(image: &EncodedImage) -> Self {
        Self {
            title: image.title.clone(),
            content_id: image.content_id().to_string(),
            state: RelayState::Pending,
            post_id: None,
            error: None,
        }
    }

    /// True once the platform accepted the status, recorded or not.
    pub fn is_posted(&self) -> bool {
        matches!(self.state, RelayState::Posted | RelayState::Recorded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_id_is_resolved_url() {
        let candidate = Candidate {
            title: "Monks".to_string(),
            url: Url::parse("http://i.imgur.com/abc.jpg").unwrap(),
        };
        assert_eq!(candidate.content_id(), "http://i.imgur.com/abc.jpg");

        let image = EncodedImage::new(candidate, "AAAA".to_string());
        assert_eq!(image.content_id(), "http://i.imgur.com/abc.jpg");
        assert_eq!(image.title, "Monks");
    }

    #[test]
    fn test_report_starts_pending() {
        let image = EncodedImage::new(
            Candidate {
                title: "t".to_string(),
                url: Url::parse("http://x/a.png").unwrap(),
            },
            String::new(),
        );
        let report = PublishReport::new(&image);
        assert_eq!(report.state, RelayState::Pending);
        assert!(!report.is_posted());
    }

    #[test]
    fn test_byte_len_from_base64() {
        let image = |data: &str| EncodedImage {
            title: "t".to_string(),
            source: Url::parse("http://x/a.png").unwrap(),
            data: data.to_string(),
        };
        assert_eq!(image("/9j/4A==").byte_len(), 4);
        assert_eq!(image("YWJj").byte_len(), 3);
        assert_eq!(image("YWI=").byte_len(), 2);
        assert_eq!(image("").byte_len(), 0);
    }

    #[test]
    fn test_relay_state_display() {
        assert_eq!(RelayState::Recorded.to_string(), "recorded");
        assert_eq!(RelayState::Skipped.to_string(), "skipped");
    }
}
