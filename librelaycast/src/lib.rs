//! Relaycast - relay community image posts to a social feed
//!
//! This library polls a community feed, filters and deduplicates image
//! submissions against a persistent store, and republishes them with
//! rate-limit-aware backoff. The `relay-send` daemon wires it together.

pub mod config;
pub mod error;
pub mod feed;
pub mod fetcher;
pub mod filter;
pub mod logging;
pub mod pipeline;
pub mod platforms;
pub mod publisher;
pub mod rate_limiter;
pub mod scheduler;
pub mod store;
pub mod types;

// Re-export commonly used types
pub use config::{Config, Credentials};
pub use error::{RelayError, Result};
pub use pipeline::{CycleSummary, Pipeline};
pub use publisher::{PublishPolicy, Publisher};
pub use scheduler::Scheduler;
pub use types::{Candidate, EncodedImage, PublishReport, RelayState, Submission};
