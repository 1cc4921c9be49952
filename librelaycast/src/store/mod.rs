//! Dedup store: which content has already been relayed
//!
//! Records are keyed by a hash of the content identifier and expire on their
//! own; nothing ever deletes a relayed marker. Before publishing, a short-lived
//! claim is taken with set-if-absent so two runs cannot post the same content
//! between the "seen" check and the final record.

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::time::Duration;

use crate::error::Result;

pub mod memory;
pub mod redis_store;

pub use memory::MemoryStore;
pub use redis_store::RedisStore;

/// Value written once content has been posted
pub const RELAYED_MARKER: &str = "relayed";

/// Value written while a publisher holds the content
pub const CLAIM_MARKER: &str = "claimed";

/// Persistent at-most-once delivery tracking.
#[async_trait]
pub trait DedupStore: Send + Sync {
    /// Whether `id` has been relayed or is currently claimed.
    async fn seen(&self, id: &str) -> Result<bool>;

    /// Mark `id` as relayed for `ttl`, overwriting any claim.
    async fn record(&self, id: &str, ttl: Duration) -> Result<()>;

    /// Take the claim on `id` if nobody holds a claim or record for it.
    ///
    /// Returns `false` when the identifier is already claimed or relayed.
    async fn claim(&self, id: &str, ttl: Duration) -> Result<bool>;

    /// Push the expiry of a claim we still hold to `ttl` from now.
    ///
    /// Returns `false` when the claim has lapsed or was replaced by a record.
    async fn refresh_claim(&self, id: &str, ttl: Duration) -> Result<bool>;

    /// Drop a claim taken with [`DedupStore::claim`]. Relayed markers stay.
    async fn release(&self, id: &str) -> Result<()>;

    /// Liveness probe
    async fn ping(&self) -> Result<()>;
}

/// Store key for a content identifier: prefix plus hex SHA-256.
pub fn record_key(prefix: &str, id: &str) -> String {
    format!("{}{:x}", prefix, Sha256::digest(id.as_bytes()))
}

/// Whether a stored value is one of ours
pub(crate) fn is_marker(value: &str) -> bool {
    value == RELAYED_MARKER || value == CLAIM_MARKER
}
