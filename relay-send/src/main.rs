//! relay-send - Scheduled image relay daemon
//!
//! Polls the configured community feed, relays new image posts to the social
//! feed and remembers what it relayed in the dedup store.
//!
//! Credentials come from `CONSUMERKEY`, `CONSUMERSECRET`, `ACCESSTOKEN` and
//! `ACCESSSECRET`; the store from `REDISTOGO_URL` or the local socket.
//! Optional settings live in `~/.config/relaycast/config.toml` (or
//! `RELAYCAST_CONFIG`).
//!
//! Exit codes: 0 clean shutdown, 1 runtime error, 2 configuration error.

use librelaycast::config::ScheduleMode;
use librelaycast::feed::RedditFeed;
use librelaycast::fetcher::HttpImageFetcher;
use librelaycast::platforms::twitter::TwitterClient;
use librelaycast::rate_limiter::RateLimiter;
use librelaycast::store::redis_store::{redact_endpoint, resolve_endpoint};
use librelaycast::store::{DedupStore, RedisStore};
use librelaycast::{
    logging, Config, Credentials, Pipeline, PublishPolicy, Publisher, Result, Scheduler,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    logging::init_default();

    if let Err(e) = run().await {
        error!("relay-send stopped: {}", e);
        eprintln!("Error: {}", e);
        std::process::exit(e.exit_code());
    }
}

async fn run() -> Result<()> {
    // Everything that can be wrong with the setup fails here, before any cycle
    let config = Config::load()?;
    config.validate()?;
    let credentials = Credentials::from_env()?;

    let endpoint = resolve_endpoint(&config.store)?;
    let store = RedisStore::connect(&config.store)?;
    match store.ping().await {
        Ok(()) => info!("Dedup store reachable at {}", redact_endpoint(&endpoint)),
        Err(e) => warn!(
            "Dedup store at {} not reachable yet: {}",
            redact_endpoint(&endpoint),
            e
        ),
    }
    let store: Arc<dyn DedupStore> = Arc::new(store);

    let feed = RedditFeed::new(&config.feed, &config.http)?;
    let images = HttpImageFetcher::new(&config.fetch, &config.http)?;
    let platform = TwitterClient::new(credentials, &config.publish, &config.http)?;

    let publisher = Publisher::new(
        Arc::new(platform),
        store.clone(),
        RateLimiter::from_config(&config.publish),
        PublishPolicy::from_config(&config.store, &config.publish),
    );

    let shutdown = Arc::new(AtomicBool::new(false));
    setup_signal_handlers(shutdown.clone())?;

    let pipeline = Pipeline::new(
        Arc::new(feed),
        store,
        Arc::new(images),
        publisher,
        config.feed.community.clone(),
        config.filter.clone(),
        shutdown,
    );
    let scheduler = Scheduler::new(pipeline, config.schedule.interval);

    info!("relay-send starting for r/{}", config.feed.community);
    match config.schedule.mode {
        ScheduleMode::Once => {
            let summary = scheduler.run_once().await?;
            info!(
                "Relayed {} of {} submission(s), {} failed",
                summary.relayed, summary.listed, summary.failed
            );
        }
        ScheduleMode::Interval => {
            let cycles = scheduler.run().await;
            info!("relay-send stopped after {} cycle(s)", cycles);
        }
    }

    Ok(())
}

/// Set up signal handlers for graceful shutdown
#[cfg(unix)]
fn setup_signal_handlers(shutdown: Arc<AtomicBool>) -> Result<()> {
    use signal_hook::consts::{SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;

    let mut signals = Signals::new([SIGINT, SIGTERM])?;

    std::thread::spawn(move || {
        for sig in signals.forever() {
            match sig {
                SIGTERM | SIGINT => {
                    info!("Received shutdown signal, finishing current item...");
                    shutdown.store(true, Ordering::Relaxed);
                    break;
                }
                _ => {}
            }
        }
    });

    Ok(())
}

#[cfg(not(unix))]
fn setup_signal_handlers(shutdown: Arc<AtomicBool>) -> Result<()> {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl-C, finishing current item...");
            shutdown.store(true, Ordering::Relaxed);
        }
    });
    Ok(())
}
