//! Twitter platform implementation
//!
//! Talks to the v1.1 REST API with OAuth 1.0a user-context signing: media is
//! uploaded as base64 `media_data`, then a status is posted with the returned
//! `media_ids`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, AUTHORIZATION, CONTENT_TYPE};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

use crate::config::{Credentials, HttpConfig, PublishConfig};
use crate::error::{PlatformError, Result};
use crate::platforms::oauth::{percent_encode, OAuthSigner};
use crate::platforms::Platform;
use crate::types::{EncodedImage, MediaHandle};

const CHARACTER_LIMIT: usize = 280;
const RATE_LIMIT_RESET_HEADER: &str = "x-rate-limit-reset";
/// Sent with HTTP 403 when the status repeats a recent one
const DUPLICATE_STATUS_CODE: i64 = 187;

#[derive(Debug, Deserialize)]
struct UploadResponse {
    media_id_string: String,
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    id_str: String,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    errors: Vec<ErrorEntry>,
}

#[derive(Debug, Deserialize)]
struct ErrorEntry {
    #[serde(default)]
    code: Option<i64>,
    message: String,
}

pub struct TwitterClient {
    http: reqwest::Client,
    signer: OAuthSigner,
    api_base: String,
    upload_base: String,
}

impl TwitterClient {
    pub fn new(credentials: Credentials, publish: &PublishConfig, http: &HttpConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(http.timeout)
            .build()
            .map_err(|e| PlatformError::Network(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http: client,
            signer: OAuthSigner::new(credentials),
            api_base: publish.api_base.trim_end_matches('/').to_string(),
            upload_base: publish.upload_base.trim_end_matches('/').to_string(),
        })
    }

    /// POST a signed form-encoded request and decode the JSON reply.
    async fn signed_post<T: DeserializeOwned>(
        &self,
        url: &str,
        params: Vec<(String, String)>,
        context: &str,
    ) -> Result<T> {
        let authorization = self.signer.authorization_header("POST", url, &params)?;
        let body = params
            .iter()
            .map(|(k, v)| format!("{}={}", percent_encode(k), percent_encode(v)))
            .collect::<Vec<_>>()
            .join("&");

        let response = self
            .http
            .post(url)
            .header(AUTHORIZATION, authorization)
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(body)
            .send()
            .await
            .map_err(|e| {
                PlatformError::Network(format!("Twitter request failed ({}): {}", context, e))
            })?;

        let status = response.status();
        let reset_at = rate_limit_reset(response.headers());
        let text = response.text().await.map_err(|e| {
            PlatformError::Network(format!("Twitter response unreadable ({}): {}", context, e))
        })?;

        if !status.is_success() {
            return Err(map_status_error(status, reset_at, &text, context).into());
        }

        let parsed = serde_json::from_str(&text).map_err(|e| {
            PlatformError::Posting(format!(
                "Twitter response parse error ({}): {}",
                context, e
            ))
        })?;
        Ok(parsed)
    }
}

#[async_trait]
impl Platform for TwitterClient {
    async fn upload_media(&self, image: &EncodedImage) -> Result<MediaHandle> {
        let url = format!("{}/1.1/media/upload.json", self.upload_base);
        let params = vec![("media_data".to_string(), image.data.clone())];

        let response: UploadResponse = self.signed_post(&url, params, "upload media").await?;
        debug!("Uploaded {} as media {}", image.source, response.media_id_string);
        Ok(MediaHandle(response.media_id_string))
    }

    async fn post_status(&self, text: &str, media: &[MediaHandle]) -> Result<String> {
        if text.trim().is_empty() {
            return Err(PlatformError::Validation("Status text cannot be empty".to_string()).into());
        }

        let url = format!("{}/1.1/statuses/update.json", self.api_base);
        let mut params = vec![("status".to_string(), text.to_string())];
        if !media.is_empty() {
            let ids = media
                .iter()
                .map(MediaHandle::as_str)
                .collect::<Vec<_>>()
                .join(",");
            params.push(("media_ids".to_string(), ids));
        }

        let response: StatusResponse = self.signed_post(&url, params, "post status").await?;
        Ok(response.id_str)
    }

    fn name(&self) -> &str {
        "twitter"
    }

    fn character_limit(&self) -> Option<usize> {
        Some(CHARACTER_LIMIT)
    }
}

/// Reset time advertised by the platform, in epoch seconds
fn rate_limit_reset(headers: &HeaderMap) -> Option<DateTime<Utc>> {
    headers
        .get(RATE_LIMIT_RESET_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<i64>().ok())
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
}

/// Map an error response to PlatformError
///
/// - HTTP 403 with error code 187 (duplicate status) → `PlatformError::Validation`
/// - HTTP 401/403 → `PlatformError::Authentication`
/// - HTTP 400/422 → `PlatformError::Validation`
/// - HTTP 429 → `PlatformError::RateLimit` with the advertised reset time
/// - HTTP 5xx → `PlatformError::Network`
/// - Anything else → `PlatformError::Posting`
fn map_status_error(
    status: StatusCode,
    reset_at: Option<DateTime<Utc>>,
    body: &str,
    context: &str,
) -> PlatformError {
    let detail = summarize_body(body);
    match status.as_u16() {
        403 if first_error(body).and_then(|e| e.code) == Some(DUPLICATE_STATUS_CODE) => {
            PlatformError::Validation(format!(
                "Twitter rejected a duplicate status ({}): {}",
                context, detail
            ))
        }
        401 | 403 => PlatformError::Authentication(format!(
            "Twitter authentication failed ({}): HTTP {} {}. \
                Suggestion: Check CONSUMERKEY, CONSUMERSECRET, ACCESSTOKEN and ACCESSSECRET.",
            context,
            status.as_u16(),
            detail
        )),
        400 | 422 => PlatformError::Validation(format!(
            "Twitter rejected the request ({}): HTTP {} {}",
            context,
            status.as_u16(),
            detail
        )),
        429 => PlatformError::RateLimit {
            message: format!("Twitter rate limit exceeded ({}): {}", context, detail),
            reset_at,
        },
        500..=599 => PlatformError::Network(format!(
            "Twitter server error ({}): HTTP {} {}",
            context,
            status.as_u16(),
            detail
        )),
        code => PlatformError::Posting(format!(
            "Twitter HTTP error ({}): HTTP {} {}",
            context, code, detail
        )),
    }
}

fn first_error(body: &str) -> Option<ErrorEntry> {
    serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|parsed| parsed.errors.into_iter().next())
}

/// First error message from a `{"errors":[{"message":..}]}` body, else the raw text
fn summarize_body(body: &str) -> String {
    match first_error(body) {
        Some(ErrorEntry {
            code: Some(code),
            message,
        }) => format!("{} (code {})", message, code),
        Some(ErrorEntry {
            code: None,
            message,
        }) => message,
        None => body.chars().take(200).collect(),
    }
}
