//! Community feed client
//!
//! Lists the newest submissions of a subreddit through the public JSON
//! listing endpoint. One page, no pagination.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::VecDeque;
use std::sync::Mutex;
use tracing::debug;

use crate::config::{FeedConfig, HttpConfig};
use crate::error::{FeedError, Result};
use crate::types::Submission;

/// Source of candidate submissions.
#[async_trait]
pub trait FeedSource: Send + Sync {
    /// List the newest submissions of `community`, in feed order.
    ///
    /// # Errors
    ///
    /// Any failure is returned as [`FeedError`]; the caller abandons the
    /// cycle rather than processing a partial listing.
    async fn list_submissions(&self, community: &str) -> Result<Vec<Submission>>;
}

#[derive(Debug, Deserialize)]
struct Listing {
    data: ListingData,
}

#[derive(Debug, Deserialize)]
struct ListingData {
    #[serde(default)]
    children: Vec<ListingChild>,
}

#[derive(Debug, Deserialize)]
struct ListingChild {
    data: RawSubmission,
}

#[derive(Debug, Deserialize)]
struct RawSubmission {
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    domain: String,
    #[serde(default)]
    is_self: bool,
}

impl From<RawSubmission> for Submission {
    fn from(raw: RawSubmission) -> Self {
        Submission {
            title: raw.title,
            url: raw.url,
            domain: raw.domain,
            is_self: raw.is_self,
        }
    }
}

/// Reddit "new" listing client
pub struct RedditFeed {
    client: reqwest::Client,
    base_url: String,
    limit: Option<u32>,
}

impl RedditFeed {
    pub fn new(feed: &FeedConfig, http: &HttpConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(http.user_agent.clone())
            .timeout(http.timeout)
            .build()
            .map_err(|e| FeedError::Network(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: feed.base_url.trim_end_matches('/').to_string(),
            limit: feed.limit,
        })
    }

    fn listing_url(&self, community: &str) -> String {
        let mut url = format!(
            "{}/r/{}/new.json?raw_json=1",
            self.base_url,
            urlencoding::encode(community)
        );
        if let Some(limit) = self.limit {
            url.push_str(&format!("&limit={}", limit));
        }
        url
    }
}

#[async_trait]
impl FeedSource for RedditFeed {
    async fn list_submissions(&self, community: &str) -> Result<Vec<Submission>> {
        let url = self.listing_url(community);
        debug!("Fetching listing {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| FeedError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FeedError::Status {
                community: community.to_string(),
                status: status.as_u16(),
            }
            .into());
        }

        let body = response
            .text()
            .await
            .map_err(|e| FeedError::Network(e.to_string()))?;
        let listing: Listing =
            serde_json::from_str(&body).map_err(|e| FeedError::Parse(e.to_string()))?;

        Ok(listing
            .data
            .children
            .into_iter()
            .map(|child| child.data.into())
            .collect())
    }
}

/// Scripted feed for tests: each call pops the next listing.
///
/// When the script runs out, the last listing is repeated.
#[derive(Default)]
pub struct MockFeed {
    script: Mutex<VecDeque<std::result::Result<Vec<Submission>, String>>>,
    last: Mutex<Option<Vec<Submission>>>,
    calls: Mutex<usize>,
}

impl MockFeed {
    /// Feed that always returns `submissions`
    pub fn with_listing(submissions: Vec<Submission>) -> Self {
        let feed = Self::default();
        feed.push_listing(submissions);
        feed
    }

    pub fn push_listing(&self, submissions: Vec<Submission>) {
        self.script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(Ok(submissions));
    }

    pub fn push_failure(&self, message: &str) {
        self.script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(Err(message.to_string()));
    }

    pub fn call_count(&self) -> usize {
        *self.calls.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl FeedSource for MockFeed {
    async fn list_submissions(&self, _community: &str) -> Result<Vec<Submission>> {
        *self.calls.lock().unwrap_or_else(|e| e.into_inner()) += 1;
        let next = self.script.lock().unwrap_or_else(|e| e.into_inner()).pop_front();
        let mut last = self.last.lock().unwrap_or_else(|e| e.into_inner());
        match next {
            Some(Ok(listing)) => {
                *last = Some(listing.clone());
                Ok(listing)
            }
            Some(Err(message)) => Err(FeedError::Network(message).into()),
            None => Ok(last.clone().unwrap_or_default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RelayError;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn feed_for(server: &MockServer, limit: Option<u32>) -> RedditFeed {
        let feed = FeedConfig {
            community: "monkslookingatbeer".to_string(),
            base_url: server.uri(),
            limit,
        };
        RedditFeed::new(&feed, &HttpConfig::default()).unwrap()
    }

    fn listing_json() -> serde_json::Value {
        serde_json::json!({
            "kind": "Listing",
            "data": {
                "after": "t3_xyz",
                "children": [
                    {"kind": "t3", "data": {
                        "title": "Trappist evening",
                        "url": "https://i.redd.it/abc.jpg",
                        "domain": "i.redd.it",
                        "is_self": false,
                        "score": 12
                    }},
                    {"kind": "t3", "data": {
                        "title": "Which abbey is this?",
                        "url": "https://www.reddit.com/r/monkslookingatbeer/comments/1/",
                        "domain": "self.monkslookingatbeer",
                        "is_self": true
                    }}
                ]
            }
        })
    }

    #[tokio::test]
    async fn test_lists_submissions_in_order() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/r/monkslookingatbeer/new.json"))
            .and(query_param("raw_json", "1"))
            .and(header("user-agent", crate::config::DEFAULT_USER_AGENT))
            .respond_with(ResponseTemplate::new(200).set_body_json(listing_json()))
            .mount(&server)
            .await;

        let subs = feed_for(&server, None)
            .list_submissions("monkslookingatbeer")
            .await
            .unwrap();

        assert_eq!(subs.len(), 2);
        assert_eq!(
            subs[0],
            Submission::new(
                "Trappist evening",
                "https://i.redd.it/abc.jpg",
                "i.redd.it",
                false
            )
        );
        assert!(subs[1].is_self);
    }

    #[tokio::test]
    async fn test_limit_is_passed_through() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/r/monkslookingatbeer/new.json"))
            .and(query_param("limit", "5"))
            .respond_with(ResponseTemplate::new(200).set_body_json(listing_json()))
            .expect(1)
            .mount(&server)
            .await;

        let subs = feed_for(&server, Some(5))
            .list_submissions("monkslookingatbeer")
            .await
            .unwrap();
        assert_eq!(subs.len(), 2);
    }

    #[tokio::test]
    async fn test_error_status_is_feed_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = feed_for(&server, None)
            .list_submissions("monkslookingatbeer")
            .await
            .unwrap_err();
        assert!(err.is_cycle_fatal());
        assert!(matches!(
            err,
            RelayError::Feed(FeedError::Status { status: 503, .. })
        ));
    }

    #[tokio::test]
    async fn test_malformed_listing_is_parse_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>busy</html>"))
            .mount(&server)
            .await;

        let err = feed_for(&server, None)
            .list_submissions("monkslookingatbeer")
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::Feed(FeedError::Parse(_))));
    }

    #[tokio::test]
    async fn test_unreachable_feed_is_network_error() {
        let feed = FeedConfig {
            base_url: "http://127.0.0.1:1".to_string(),
            ..FeedConfig::default()
        };
        let err = RedditFeed::new(&feed, &HttpConfig::default())
            .unwrap()
            .list_submissions("monkslookingatbeer")
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::Feed(FeedError::Network(_))));
    }

    #[tokio::test]
    async fn test_mock_feed_script() {
        let feed = MockFeed::default();
        feed.push_failure("boom");
        feed.push_listing(vec![Submission::new("A", "http://x/a.jpg", "x", false)]);

        assert!(feed.list_submissions("c").await.is_err());
        assert_eq!(feed.list_submissions("c").await.unwrap().len(), 1);
        assert_eq!(feed.list_submissions("c").await.unwrap().len(), 1);
        assert_eq!(feed.call_count(), 3);
    }
}
