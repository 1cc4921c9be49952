//! Mock platform implementation for testing
//!
//! Uploads and posts succeed unless an outcome has been scripted for the next
//! call. Every call is counted and timestamped on the tokio clock so tests can
//! check that backoff waited long enough and that nothing was sent twice.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::{sleep, Instant};

use crate::error::{PlatformError, Result};
use crate::platforms::Platform;
use crate::types::{EncodedImage, MediaHandle};

/// Scripted response for one upcoming call
#[derive(Debug, Clone)]
pub enum MockOutcome {
    Succeed,
    Fail(PlatformError),
    /// Reject with a rate limit resetting this long after the call
    RateLimited(Duration),
}

#[derive(Debug, Default)]
struct MockState {
    upload_script: VecDeque<MockOutcome>,
    post_script: VecDeque<MockOutcome>,
    upload_calls: Vec<Instant>,
    post_calls: Vec<Instant>,
    uploaded: Vec<String>,
    posted: Vec<(String, Vec<MediaHandle>)>,
    next_media_id: u64,
}

/// Mock platform for testing
#[derive(Clone)]
pub struct MockPlatform {
    name: String,
    delay: Duration,
    character_limit: Option<usize>,
    state: Arc<Mutex<MockState>>,
}

impl MockPlatform {
    /// Create a mock platform that always succeeds
    pub fn success(name: &str) -> Self {
        Self {
            name: name.to_string(),
            delay: Duration::ZERO,
            character_limit: None,
            state: Arc::new(Mutex::new(MockState::default())),
        }
    }

    /// Create a mock platform with a delay on every call
    pub fn with_delay(name: &str, delay: Duration) -> Self {
        Self {
            delay,
            ..Self::success(name)
        }
    }

    /// Create a mock platform with a character limit
    pub fn with_limit(name: &str, limit: usize) -> Self {
        Self {
            character_limit: Some(limit),
            ..Self::success(name)
        }
    }

    /// Script the outcome of the next unscripted upload call
    pub fn push_upload(&self, outcome: MockOutcome) {
        self.lock().upload_script.push_back(outcome);
    }

    /// Script the outcome of the next unscripted post call
    pub fn push_post(&self, outcome: MockOutcome) {
        self.lock().post_script.push_back(outcome);
    }

    pub fn upload_call_count(&self) -> usize {
        self.lock().upload_calls.len()
    }

    pub fn post_call_count(&self) -> usize {
        self.lock().post_calls.len()
    }

    /// Instants of every platform call, uploads and posts merged in order
    pub fn call_times(&self) -> Vec<Instant> {
        let state = self.lock();
        let mut times: Vec<Instant> = state
            .upload_calls
            .iter()
            .chain(state.post_calls.iter())
            .copied()
            .collect();
        times.sort();
        times
    }

    /// Sources of successfully uploaded images
    pub fn uploaded(&self) -> Vec<String> {
        self.lock().uploaded.clone()
    }

    /// Status texts that were accepted, in order
    pub fn posted_statuses(&self) -> Vec<String> {
        self.lock().posted.iter().map(|(text, _)| text.clone()).collect()
    }

    /// Accepted statuses with their attached media
    pub fn posted(&self) -> Vec<(String, Vec<MediaHandle>)> {
        self.lock().posted.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn simulate_latency(&self) {
        if !self.delay.is_zero() {
            sleep(self.delay).await;
        }
    }
}

fn outcome_to_result(outcome: MockOutcome) -> Result<()> {
    match outcome {
        MockOutcome::Succeed => Ok(()),
        MockOutcome::Fail(error) => Err(error.into()),
        MockOutcome::RateLimited(window) => {
            let reset_at: DateTime<Utc> = Utc::now()
                + chrono::Duration::from_std(window).unwrap_or_else(|_| chrono::Duration::zero());
            Err(PlatformError::RateLimit {
                message: "Mock rate limit".to_string(),
                reset_at: Some(reset_at),
            }
            .into())
        }
    }
}

#[async_trait]
impl Platform for MockPlatform {
    async fn upload_media(&self, image: &EncodedImage) -> Result<MediaHandle> {
        self.simulate_latency().await;

        let outcome = {
            let mut state = self.lock();
            state.upload_calls.push(Instant::now());
            state.upload_script.pop_front().unwrap_or(MockOutcome::Succeed)
        };
        outcome_to_result(outcome)?;

        let mut state = self.lock();
        state.next_media_id += 1;
        state.uploaded.push(image.content_id().to_string());
        Ok(MediaHandle(format!("media-{}", state.next_media_id)))
    }

    async fn post_status(&self, text: &str, media: &[MediaHandle]) -> Result<String> {
        self.simulate_latency().await;

        let outcome = {
            let mut state = self.lock();
            state.post_calls.push(Instant::now());
            state.post_script.pop_front().unwrap_or(MockOutcome::Succeed)
        };
        outcome_to_result(outcome)?;

        if let Some(limit) = self.character_limit {
            if text.chars().count() > limit {
                return Err(PlatformError::Validation(format!(
                    "Status exceeds {} characters",
                    limit
                ))
                .into());
            }
        }

        let mut state = self.lock();
        state.posted.push((text.to_string(), media.to_vec()));
        Ok(format!("{}-status-{}", self.name, state.posted.len()))
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn character_limit(&self) -> Option<usize> {
        self.character_limit
    }
}
