//! Image retrieval and encoding
//!
//! Downloads a candidate's image and returns it base64 encoded for upload.
//! Connection failures and error statuses mean "no image" and are not errors;
//! a body that cannot be read, or is over the size ceiling, is an error for
//! that item only.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::{debug, warn};
use url::Url;

use crate::config::{FetchConfig, HttpConfig};
use crate::error::{FetchError, Result};

#[async_trait]
pub trait ImageSource: Send + Sync {
    /// Fetch and encode the image at `url`; `Ok(None)` when there is no image.
    async fn fetch(&self, url: &Url) -> Result<Option<String>>;
}

pub struct HttpImageFetcher {
    client: reqwest::Client,
    max_bytes: usize,
}

impl HttpImageFetcher {
    pub fn new(fetch: &FetchConfig, http: &HttpConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(http.user_agent.clone())
            .timeout(http.timeout)
            .build()
            .map_err(|e| FetchError::Client(e.to_string()))?;

        Ok(Self {
            client,
            max_bytes: fetch.max_bytes,
        })
    }

    fn too_large(&self, url: &Url, size: usize) -> FetchError {
        FetchError::TooLarge {
            url: url.to_string(),
            size,
            limit: self.max_bytes,
        }
    }
}

#[async_trait]
impl ImageSource for HttpImageFetcher {
    async fn fetch(&self, url: &Url) -> Result<Option<String>> {
        let response = match self.client.get(url.as_str()).send().await {
            Ok(response) => response,
            Err(e) => {
                warn!("Could not fetch {}: {}", url, e);
                return Ok(None);
            }
        };

        let status = response.status();
        if !status.is_success() {
            warn!("Fetching {} returned HTTP {}", url, status.as_u16());
            return Ok(None);
        }

        if let Some(length) = response.content_length() {
            if length as usize > self.max_bytes {
                return Err(self.too_large(url, length as usize).into());
            }
        }

        let body = response.bytes().await.map_err(|e| FetchError::Read {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

        if body.is_empty() {
            warn!("Fetching {} returned an empty body", url);
            return Ok(None);
        }
        if body.len() > self.max_bytes {
            return Err(self.too_large(url, body.len()).into());
        }

        debug!("Fetched {} bytes from {}", body.len(), url);
        Ok(Some(STANDARD.encode(&body)))
    }
}

/// Canned images for tests, keyed by URL. Unknown URLs have no image.
#[derive(Default)]
pub struct MockImages {
    images: HashMap<String, std::result::Result<Vec<u8>, String>>,
    fetched: Mutex<Vec<String>>,
}

impl MockImages {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_image(mut self, url: &str, bytes: &[u8]) -> Self {
        self.images.insert(url.to_string(), Ok(bytes.to_vec()));
        self
    }

    /// Make `url` fail with a read error
    pub fn with_failure(mut self, url: &str, reason: &str) -> Self {
        self.images.insert(url.to_string(), Err(reason.to_string()));
        self
    }

    /// URLs fetched so far, in order
    pub fn fetched(&self) -> Vec<String> {
        self.fetched.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl ImageSource for MockImages {
    async fn fetch(&self, url: &Url) -> Result<Option<String>> {
        self.fetched
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(url.to_string());
        match self.images.get(url.as_str()) {
            Some(Ok(bytes)) => Ok(Some(STANDARD.encode(bytes))),
            Some(Err(reason)) => Err(FetchError::Read {
                url: url.to_string(),
                reason: reason.clone(),
            }
            .into()),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RelayError;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fetcher(max_bytes: usize) -> HttpImageFetcher {
        HttpImageFetcher::new(&FetchConfig { max_bytes }, &HttpConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn test_fetch_encodes_body_with_browser_user_agent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/a.jpg"))
            .and(header("user-agent", crate::config::DEFAULT_USER_AGENT))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(vec![0xFF, 0xD8, 0xFF, 0xE0])
                    .insert_header("content-type", "image/jpeg"),
            )
            .mount(&server)
            .await;

        let url = Url::parse(&format!("{}/a.jpg", server.uri())).unwrap();
        let encoded = fetcher(1024).fetch(&url).await.unwrap();
        assert_eq!(encoded.as_deref(), Some("/9j/4A=="));
    }

    #[tokio::test]
    async fn test_not_found_is_no_image() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let url = Url::parse(&format!("{}/gone.png", server.uri())).unwrap();
        assert_eq!(fetcher(1024).fetch(&url).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_connection_failure_is_no_image() {
        let url = Url::parse("http://127.0.0.1:1/a.jpg").unwrap();
        assert_eq!(fetcher(1024).fetch(&url).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_oversized_image_is_item_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![1u8; 64]))
            .mount(&server)
            .await;

        let url = Url::parse(&format!("{}/big.gif", server.uri())).unwrap();
        let err = fetcher(16).fetch(&url).await.unwrap_err();
        assert!(matches!(
            err,
            RelayError::Fetch(FetchError::TooLarge { size: 64, limit: 16, .. })
        ));
        assert!(!err.is_cycle_fatal());
    }

    #[tokio::test]
    async fn test_empty_body_is_no_image() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let url = Url::parse(&format!("{}/empty.png", server.uri())).unwrap();
        assert_eq!(fetcher(1024).fetch(&url).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_mock_images() {
        let images = MockImages::new()
            .with_image("http://x/a.jpg", b"abc")
            .with_failure("http://x/b.jpg", "connection reset");

        let a = Url::parse("http://x/a.jpg").unwrap();
        let b = Url::parse("http://x/b.jpg").unwrap();
        let c = Url::parse("http://x/c.jpg").unwrap();
        assert_eq!(images.fetch(&a).await.unwrap().as_deref(), Some("YWJj"));
        assert!(images.fetch(&b).await.is_err());
        assert_eq!(images.fetch(&c).await.unwrap(), None);
        assert_eq!(images.fetched().len(), 3);
    }
}
