//! One poll cycle: list, filter, dedup, fetch, publish
//!
//! The pipeline owns every collaborator it needs, so a cycle can run without
//! any process-wide state. Only a feed failure aborts a cycle; everything
//! that goes wrong with a single item is logged, counted and skipped.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::feed::FeedSource;
use crate::fetcher::ImageSource;
use crate::filter::FilterRules;
use crate::publisher::Publisher;
use crate::store::DedupStore;
use crate::types::{EncodedImage, PublishReport, RelayState};

/// Outcome of one cycle
#[derive(Debug, Clone, Default)]
pub struct CycleSummary {
    /// Submissions in the feed listing
    pub listed: usize,
    pub rejected: usize,
    /// Repeats of a URL already seen earlier in the same listing
    pub duplicates: usize,
    pub already_relayed: usize,
    /// No image at the URL, or the download failed
    pub fetch_failures: usize,
    pub batch_size: usize,
    pub relayed: usize,
    pub failed: usize,
    /// Claimed by another run while this one was working
    pub skipped: usize,
    /// Set when shutdown stopped the cycle early
    pub interrupted: bool,
    pub reports: Vec<PublishReport>,
}

pub struct Pipeline {
    feed: Arc<dyn FeedSource>,
    store: Arc<dyn DedupStore>,
    images: Arc<dyn ImageSource>,
    publisher: Publisher,
    community: String,
    rules: FilterRules,
    shutdown: Arc<AtomicBool>,
}

impl Pipeline {
    pub fn new(
        feed: Arc<dyn FeedSource>,
        store: Arc<dyn DedupStore>,
        images: Arc<dyn ImageSource>,
        publisher: Publisher,
        community: impl Into<String>,
        rules: FilterRules,
        shutdown: Arc<AtomicBool>,
    ) -> Self {
        Self {
            feed,
            store,
            images,
            publisher,
            community: community.into(),
            rules,
            shutdown,
        }
    }

    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        self.shutdown.clone()
    }

    fn shutdown_requested(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// Run one full cycle.
    ///
    /// # Errors
    ///
    /// Returns an error only when the feed cannot be listed.
    pub async fn run_cycle(&self) -> Result<CycleSummary> {
        let submissions = self.feed.list_submissions(&self.community).await?;
        let mut summary = CycleSummary {
            listed: submissions.len(),
            ..CycleSummary::default()
        };
        info!(
            "Listed {} submission(s) from r/{}",
            summary.listed, self.community
        );

        let mut in_listing = HashSet::new();
        let mut batch: Vec<EncodedImage> = Vec::new();

        for submission in &submissions {
            if self.shutdown_requested() {
                summary.interrupted = true;
                break;
            }

            let candidate = match self.rules.filter(submission) {
                Ok(candidate) => candidate,
                Err(rejection) => {
                    debug!("Rejected \"{}\": {}", submission.title, rejection);
                    summary.rejected += 1;
                    continue;
                }
            };

            let id = candidate.content_id().to_string();
            if !in_listing.insert(id.clone()) {
                summary.duplicates += 1;
                continue;
            }

            match self.store.seen(&id).await {
                Ok(true) => {
                    debug!("Already relayed {}", id);
                    summary.already_relayed += 1;
                    continue;
                }
                Ok(false) => {}
                Err(e) => warn!("Dedup lookup for {} failed, treating as new: {}", id, e),
            }

            match self.images.fetch(&candidate.url).await {
                Ok(Some(data)) => batch.push(EncodedImage::new(candidate, data)),
                Ok(None) => {
                    debug!("No image at {}", id);
                    summary.fetch_failures += 1;
                }
                Err(e) => {
                    warn!("Skipping {}: {}", id, e);
                    summary.fetch_failures += 1;
                }
            }
        }

        summary.batch_size = batch.len();
        if !summary.interrupted && !batch.is_empty() {
            summary.reports = self.publisher.publish_batch(&batch, &self.shutdown).await;
            summary.interrupted = summary.reports.len() < batch.len();
        }

        for report in &summary.reports {
            match report.state {
                RelayState::Failed => summary.failed += 1,
                RelayState::Skipped => summary.skipped += 1,
                _ if report.is_posted() => summary.relayed += 1,
                _ => {}
            }
        }

        info!(
            listed = summary.listed,
            rejected = summary.rejected,
            already_relayed = summary.already_relayed,
            fetch_failures = summary.fetch_failures,
            relayed = summary.relayed,
            failed = summary.failed,
            "Cycle complete"
        );
        Ok(summary)
    }
}
