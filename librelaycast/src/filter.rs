//! Submission filtering
//!
//! Decides which feed submissions point at an image we can relay and
//! normalizes their URL. Pure: no I/O, same input gives the same answer.

use serde::{Deserialize, Serialize};
use std::path::Path;
use url::Url;

use crate::types::{Candidate, Submission};

/// House rules for what counts as an image link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterRules {
    /// Accepted file extensions, without the dot. Matched case-sensitively.
    pub extensions: Vec<String>,
    /// Hosts that serve images from extensionless URLs.
    pub suffix_hosts: Vec<String>,
    /// Appended to the path of a suffix-host URL that lacks an accepted extension.
    pub default_suffix: String,
}

impl Default for FilterRules {
    fn default() -> Self {
        Self {
            extensions: ["png", "jpeg", "jpg", "gif"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            suffix_hosts: vec!["imgur.com".to_string()],
            default_suffix: ".jpg".to_string(),
        }
    }
}

/// Why a submission was not turned into a candidate
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    SelfPost,
    EmptyTitle,
    MalformedUrl(String),
    UnsupportedMedia {
        extension: Option<String>,
        domain: String,
    },
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Rejection::SelfPost => write!(f, "self post"),
            Rejection::EmptyTitle => write!(f, "empty title"),
            Rejection::MalformedUrl(reason) => write!(f, "malformed url: {}", reason),
            Rejection::UnsupportedMedia { extension, domain } => write!(
                f,
                "unsupported media (extension: {}, domain: {})",
                extension.as_deref().unwrap_or("none"),
                domain
            ),
        }
    }
}

impl FilterRules {
    /// Turn a submission into a relay candidate, or say why not.
    pub fn filter(&self, submission: &Submission) -> Result<Candidate, Rejection> {
        if submission.is_self {
            return Err(Rejection::SelfPost);
        }

        let title = submission.title.trim();
        if title.is_empty() {
            return Err(Rejection::EmptyTitle);
        }

        let mut url = Url::parse(submission.url.trim())
            .map_err(|e| Rejection::MalformedUrl(format!("{}: {}", submission.url, e)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(Rejection::MalformedUrl(format!(
                "unsupported scheme '{}'",
                url.scheme()
            )));
        }

        let extension = path_extension(&url);
        let accepted = extension
            .as_deref()
            .map(|ext| self.extensions.iter().any(|allowed| allowed == ext))
            .unwrap_or(false);

        if !accepted {
            if !self.is_suffix_host(&submission.domain) {
                return Err(Rejection::UnsupportedMedia {
                    extension,
                    domain: submission.domain.clone(),
                });
            }
            // Extensionless host URLs serve the image whatever suffix is given
            let path = format!("{}{}", url.path(), self.default_suffix);
            url.set_path(&path);
        }

        Ok(Candidate {
            title: title.to_string(),
            url,
        })
    }

    fn is_suffix_host(&self, domain: &str) -> bool {
        self.suffix_hosts.iter().any(|host| host == domain)
    }
}

fn path_extension(url: &Url) -> Option<String> {
    Path::new(url.path())
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_string)
}
