//! Publishing with dedup claims, throttling and rate-limit backoff
//!
//! Each image moves through `Pending -> Uploaded -> Posted -> Recorded`.
//! A claim is taken in the dedup store first so no other run can post the same
//! content meanwhile; it is released if the item fails, and overwritten by the
//! relayed marker once the post is confirmed. A rate-limit response holds the
//! whole loop until the platform's reset time and then retries the same step;
//! the claim is extended to cover the wait.

use chrono::{DateTime, Utc};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::config::{PublishConfig, StoreConfig};
use crate::error::Result;
use crate::platforms::{truncate_status, Platform};
use crate::rate_limiter::RateLimiter;
use crate::store::DedupStore;
use crate::types::{EncodedImage, PublishReport, RelayState};

/// Added to the platform's reset time before retrying
const RESET_GRACE: Duration = Duration::from_secs(1);

/// Retry and expiry settings for publishing
#[derive(Debug, Clone)]
pub struct PublishPolicy {
    pub relay_ttl: Duration,
    pub claim_ttl: Duration,
    pub fallback_backoff: Duration,
    pub max_backoff: Duration,
    pub rate_limit_retries: u32,
    pub record_attempts: u32,
}

impl PublishPolicy {
    pub fn from_config(store: &StoreConfig, publish: &PublishConfig) -> Self {
        Self {
            relay_ttl: store.relay_ttl,
            claim_ttl: store.claim_ttl,
            fallback_backoff: publish.fallback_backoff,
            max_backoff: publish.max_backoff,
            rate_limit_retries: publish.rate_limit_retries,
            record_attempts: publish.record_attempts,
        }
    }

    /// How long to hold off after a rate limit resetting at `reset_at`
    ///
    /// An advertised reset is always waited out in full; `max_backoff` only
    /// bounds the fallback used when the platform gives no reset time.
    pub fn backoff_until(&self, reset_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Duration {
        match reset_at {
            Some(reset_at) => (reset_at - now).to_std().unwrap_or(Duration::ZERO) + RESET_GRACE,
            None => self.fallback_backoff.min(self.max_backoff),
        }
    }
}

impl Default for PublishPolicy {
    fn default() -> Self {
        Self::from_config(&StoreConfig::default(), &PublishConfig::default())
    }
}

pub struct Publisher {
    platform: Arc<dyn Platform>,
    store: Arc<dyn DedupStore>,
    limiter: RateLimiter,
    policy: PublishPolicy,
}

impl Publisher {
    pub fn new(
        platform: Arc<dyn Platform>,
        store: Arc<dyn DedupStore>,
        limiter: RateLimiter,
        policy: PublishPolicy,
    ) -> Self {
        Self {
            platform,
            store,
            limiter,
            policy,
        }
    }

    /// Publish images one at a time, stopping early once `shutdown` is set.
    pub async fn publish_batch(
        &self,
        images: &[EncodedImage],
        shutdown: &AtomicBool,
    ) -> Vec<PublishReport> {
        let mut reports = Vec::with_capacity(images.len());
        for image in images {
            if shutdown.load(Ordering::SeqCst) {
                info!(
                    "Shutdown requested, leaving {} image(s) unpublished",
                    images.len() - reports.len()
                );
                break;
            }
            reports.push(self.publish(image).await);
        }
        reports
    }

    /// Take one image through the publish state machine.
    ///
    /// Never fails: the outcome, including any error, is in the report.
    pub async fn publish(&self, image: &EncodedImage) -> PublishReport {
        let mut report = PublishReport::new(image);
        let id = image.content_id();

        let claimed = match self.store.claim(id, self.policy.claim_ttl).await {
            Ok(true) => true,
            Ok(false) => {
                info!("{} is already claimed or relayed, skipping", id);
                report.state = RelayState::Skipped;
                return report;
            }
            Err(e) => {
                warn!("Could not claim {} ({}), publishing unclaimed", id, e);
                false
            }
        };

        debug!("Uploading {} ({} bytes)", id, image.byte_len());
        let media = match self
            .call_with_backoff("upload", id, claimed, || self.platform.upload_media(image))
            .await
        {
            Ok(media) => media,
            Err(e) => {
                warn!("Upload of {} failed: {}", id, e);
                return self.fail(report, e.to_string(), claimed).await;
            }
        };
        report.state = RelayState::Uploaded;
        debug!("Uploaded {} as media {}", id, media);

        let status = truncate_status(&image.title, self.platform.character_limit());
        let media = [media];
        let post_id = match self
            .call_with_backoff("post", id, claimed, || {
                self.platform.post_status(&status, &media)
            })
            .await
        {
            Ok(post_id) => post_id,
            Err(e) => {
                warn!("Posting {} failed: {}", id, e);
                return self.fail(report, e.to_string(), claimed).await;
            }
        };
        report.state = RelayState::Posted;
        report.post_id = Some(post_id.clone());
        info!(
            "Posted \"{}\" to {}: {}",
            image.title,
            self.platform.name(),
            post_id
        );

        match self.record_with_retry(id).await {
            Ok(()) => report.state = RelayState::Recorded,
            Err(e) => {
                error!(
                    "Posted {} but could not record it after {} attempts: {}",
                    id, self.policy.record_attempts, e
                );
                report.error = Some(format!("not recorded: {}", e));
            }
        }
        report
    }

    async fn fail(&self, mut report: PublishReport, error: String, claimed: bool) -> PublishReport {
        report.state = RelayState::Failed;
        report.error = Some(error);
        if claimed {
            if let Err(e) = self.store.release(&report.content_id).await {
                warn!("Could not release claim on {}: {}", report.content_id, e);
            }
        }
        report
    }

    /// Run one platform call under the throttle, waiting out rate limits.
    async fn call_with_backoff<T, F, Fut>(
        &self,
        step: &str,
        id: &str,
        claimed: bool,
        mut call: F,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut rate_limited = 0;
        loop {
            self.limiter.acquire().await;
            let error = match call().await {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };

            let reset_at = match error.rate_limit_reset() {
                Some(reset_at) if rate_limited < self.policy.rate_limit_retries => reset_at,
                _ => return Err(error),
            };

            self.limiter.refund();
            rate_limited += 1;
            let wait = self.policy.backoff_until(reset_at, Utc::now());
            warn!(
                "Rate limited on {} {} (retry {}/{}), waiting {}",
                self.platform.name(),
                step,
                rate_limited,
                self.policy.rate_limit_retries,
                humantime::format_duration(wait)
            );
            if claimed {
                self.hold_claim(id, wait).await;
            }
            sleep(wait).await;
        }
    }

    /// Keep our claim alive through a wait of `wait` plus the usual claim lifetime.
    async fn hold_claim(&self, id: &str, wait: Duration) {
        match self
            .store
            .refresh_claim(id, wait + self.policy.claim_ttl)
            .await
        {
            Ok(true) => {}
            Ok(false) => warn!("Claim on {} lapsed before the rate-limit wait", id),
            Err(e) => warn!("Could not extend claim on {}: {}", id, e),
        }
    }

    async fn record_with_retry(&self, id: &str) -> Result<()> {
        let attempts = self.policy.record_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.store.record(id, self.policy.relay_ttl).await {
                Ok(()) => return Ok(()),
                Err(e) if attempt < attempts => {
                    let delay = Duration::from_secs(2_u64.pow(attempt - 1));
                    warn!(
                        "Recording {} failed (attempt {}/{}): {}. Retrying in {}s...",
                        id,
                        attempt,
                        attempts,
                        e,
                        delay.as_secs()
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
