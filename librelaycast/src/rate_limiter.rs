//! Proactive throttling of platform calls
//!
//! Keeps the publisher under the platform's limits before it gets told off:
//! consecutive calls are spaced by a minimum interval and no more than
//! `max_calls` fall inside any sliding `window`. Reactive handling of an
//! actual rate-limit response lives in the publisher.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::debug;

use crate::config::PublishConfig;

/// Rate limiter for platform calls
pub struct RateLimiter {
    min_interval: Duration,
    window: Duration,
    /// Zero disables the window ceiling
    max_calls: usize,
    history: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    /// Create a new rate limiter with the given limits
    pub fn new(min_interval: Duration, window: Duration, max_calls: usize) -> Self {
        Self {
            min_interval,
            window,
            max_calls,
            history: Mutex::new(VecDeque::new()),
        }
    }

    /// A limiter that never waits
    pub fn unlimited() -> Self {
        Self::new(Duration::ZERO, Duration::ZERO, 0)
    }

    pub fn from_config(config: &PublishConfig) -> Self {
        Self::new(
            config.min_interval,
            config.window,
            config.max_calls_per_window,
        )
    }

    /// Wait until a call is allowed, then count it.
    pub async fn acquire(&self) {
        loop {
            let delay = {
                let mut history = self.lock();
                let now = Instant::now();
                let delay = next_delay(
                    &mut history,
                    now,
                    self.min_interval,
                    self.window,
                    self.max_calls,
                );
                if delay.is_zero() {
                    history.push_back(now);
                    return;
                }
                delay
            };

            debug!("Throttling platform call for {:?}", delay);
            sleep(delay).await;
        }
    }

    /// Uncount the most recent call, for calls the platform rejected.
    pub fn refund(&self) {
        self.lock().pop_back();
    }

    /// Calls counted inside the current window
    pub fn calls_in_window(&self) -> usize {
        let mut history = self.lock();
        prune(&mut history, Instant::now(), self.window);
        history.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<Instant>> {
        self.history.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Drop calls that have left the window
fn prune(history: &mut VecDeque<Instant>, now: Instant, window: Duration) {
    while let Some(oldest) = history.front() {
        if now.saturating_duration_since(*oldest) >= window {
            history.pop_front();
        } else {
            break;
        }
    }
}

/// How long to wait at `now` before the next call may go out
fn next_delay(
    history: &mut VecDeque<Instant>,
    now: Instant,
    min_interval: Duration,
    window: Duration,
    max_calls: usize,
) -> Duration {
    let spacing = history
        .back()
        .map(|last| min_interval.saturating_sub(now.saturating_duration_since(*last)))
        .unwrap_or(Duration::ZERO);

    if max_calls == 0 {
        return spacing;
    }

    prune(history, now, window);
    let ceiling = if history.len() >= max_calls {
        history
            .front()
            .map(|oldest| window.saturating_sub(now.saturating_duration_since(*oldest)))
            .unwrap_or(Duration::ZERO)
    } else {
        Duration::ZERO
    };

    spacing.max(ceiling)
}
