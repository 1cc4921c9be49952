//! End-to-end relay cycles against in-process collaborators
//!
//! These tests verify complete workflows including:
//! - A mixed listing relayed with the default filter rules
//! - Dedup across consecutive cycles
//! - Per-item failure isolation

use librelaycast::error::PlatformError;
use librelaycast::feed::MockFeed;
use librelaycast::fetcher::MockImages;
use librelaycast::filter::FilterRules;
use librelaycast::platforms::mock::{MockOutcome, MockPlatform};
use librelaycast::rate_limiter::RateLimiter;
use librelaycast::store::{DedupStore, MemoryStore};
use librelaycast::{Pipeline, PublishPolicy, Publisher, RelayState, Submission};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

struct Harness {
    feed: Arc<MockFeed>,
    images: Arc<MockImages>,
    platform: MockPlatform,
    store: Arc<MemoryStore>,
    pipeline: Pipeline,
}

fn harness(listing: Vec<Submission>, images: MockImages) -> Harness {
    let feed = Arc::new(MockFeed::with_listing(listing));
    let images = Arc::new(images);
    let platform = MockPlatform::with_limit("twitter", 280);
    let store = Arc::new(MemoryStore::new());

    let publisher = Publisher::new(
        Arc::new(platform.clone()),
        store.clone(),
        RateLimiter::unlimited(),
        PublishPolicy::default(),
    );
    let pipeline = Pipeline::new(
        feed.clone(),
        store.clone(),
        images.clone(),
        publisher,
        "monkslookingatbeer",
        FilterRules::default(),
        Arc::new(AtomicBool::new(false)),
    );

    Harness {
        feed,
        images,
        platform,
        store,
        pipeline,
    }
}

fn mixed_listing() -> Vec<Submission> {
    vec![
        Submission::new("A", "http://x/a.jpg", "x", false),
        Submission::new("B", "http://x/b.txt", "imgur.com", false),
        Submission::new("C", "http://x/c.png", "x", true),
    ]
}

#[tokio::test]
async fn test_mixed_listing_relays_images_and_rejects_self_post() {
    let images = MockImages::new()
        .with_image("http://x/a.jpg", b"image a")
        .with_image("http://x/b.txt.jpg", b"image b")
        .with_image("http://x/c.png", b"image c");
    let h = harness(mixed_listing(), images);

    let summary = h.pipeline.run_cycle().await.unwrap();

    assert_eq!(summary.listed, 3);
    assert_eq!(summary.rejected, 1);
    assert_eq!(summary.batch_size, 2);
    assert_eq!(summary.relayed, 2);
    assert_eq!(summary.failed, 0);
    assert!(summary
        .reports
        .iter()
        .all(|report| report.state == RelayState::Recorded));

    // C is never fetched
    assert_eq!(
        h.images.fetched(),
        vec!["http://x/a.jpg", "http://x/b.txt.jpg"]
    );
    assert_eq!(h.platform.posted_statuses(), vec!["A", "B"]);
    assert_eq!(
        h.store.relayed_ids(),
        vec!["http://x/a.jpg", "http://x/b.txt.jpg"]
    );
    assert!(h.store.claimed_ids().is_empty());
}

#[tokio::test]
async fn test_second_cycle_relays_nothing_new() {
    let images = MockImages::new()
        .with_image("http://x/a.jpg", b"image a")
        .with_image("http://x/b.txt.jpg", b"image b");
    let h = harness(mixed_listing(), images);

    let first = h.pipeline.run_cycle().await.unwrap();
    let second = h.pipeline.run_cycle().await.unwrap();

    assert_eq!(first.relayed, 2);
    assert_eq!(second.relayed, 0);
    assert_eq!(second.already_relayed, 2);
    assert_eq!(second.batch_size, 0);
    assert_eq!(h.feed.call_count(), 2);
    assert_eq!(h.platform.post_call_count(), 2);
    // Only the first cycle fetched anything
    assert_eq!(h.images.fetched().len(), 2);
}

#[tokio::test]
async fn test_record_is_idempotent() {
    let store = MemoryStore::new();
    let ttl = Duration::from_secs(60);

    store.record("http://x/a.jpg", ttl).await.unwrap();
    store.record("http://x/a.jpg", ttl).await.unwrap();

    assert!(store.seen("http://x/a.jpg").await.unwrap());
    assert_eq!(store.relayed_ids(), vec!["http://x/a.jpg"]);
}

#[tokio::test]
async fn test_fetch_failure_for_middle_item_is_isolated() {
    let listing = vec![
        Submission::new("One", "http://x/1.jpg", "x", false),
        Submission::new("Two", "http://x/2.jpg", "x", false),
        Submission::new("Three", "http://x/3.jpg", "x", false),
    ];
    let images = MockImages::new()
        .with_image("http://x/1.jpg", b"one")
        .with_failure("http://x/2.jpg", "connection reset by peer")
        .with_image("http://x/3.jpg", b"three");
    let h = harness(listing, images);

    let summary = h.pipeline.run_cycle().await.unwrap();

    assert_eq!(summary.fetch_failures, 1);
    assert_eq!(summary.relayed, 2);
    assert_eq!(h.platform.posted_statuses(), vec!["One", "Three"]);
    assert_eq!(
        h.store.relayed_ids(),
        vec!["http://x/1.jpg", "http://x/3.jpg"]
    );
}

#[tokio::test]
async fn test_failed_post_is_retried_next_cycle() {
    let images = MockImages::new().with_image("http://x/a.jpg", b"image a");
    let h = harness(
        vec![Submission::new("A", "http://x/a.jpg", "x", false)],
        images,
    );
    h.platform
        .push_post(MockOutcome::Fail(PlatformError::Posting("over capacity".to_string())));

    let first = h.pipeline.run_cycle().await.unwrap();
    assert_eq!(first.failed, 1);
    assert!(h.store.relayed_ids().is_empty());

    let second = h.pipeline.run_cycle().await.unwrap();
    assert_eq!(second.relayed, 1);
    assert_eq!(h.platform.posted_statuses(), vec!["A"]);
    assert_eq!(h.store.relayed_ids(), vec!["http://x/a.jpg"]);
}

#[tokio::test]
async fn test_long_title_truncated_to_platform_limit() {
    let title = "Monk ".repeat(80);
    let images = MockImages::new().with_image("http://x/a.jpg", b"image a");
    let h = harness(
        vec![Submission::new(title.clone(), "http://x/a.jpg", "x", false)],
        images,
    );

    let summary = h.pipeline.run_cycle().await.unwrap();

    assert_eq!(summary.relayed, 1);
    let status = &h.platform.posted_statuses()[0];
    assert_eq!(status.chars().count(), 280);
    assert!(status.ends_with('…'));
}
