//! In-process dedup store
//!
//! Same semantics as the Redis store, including expiry, measured on the tokio
//! clock so paused-time tests can move past a TTL. Reads and writes can be
//! made to fail for exercising degraded paths.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

use crate::error::{Result, StoreError};
use crate::store::{is_marker, DedupStore, CLAIM_MARKER, RELAYED_MARKER};

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Instant,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Entry>>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    record_calls: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every `seen` call fail until turned off again
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Make every write (`record`, `claim`, `release`) fail
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of `record` calls made, failed ones included
    pub fn record_calls(&self) -> usize {
        self.record_calls.load(Ordering::SeqCst)
    }

    /// Identifiers currently marked as relayed, sorted
    pub fn relayed_ids(&self) -> Vec<String> {
        self.live_ids(RELAYED_MARKER)
    }

    /// Identifiers currently claimed but not relayed, sorted
    pub fn claimed_ids(&self) -> Vec<String> {
        self.live_ids(CLAIM_MARKER)
    }

    fn live_ids(&self, marker: &str) -> Vec<String> {
        let now = Instant::now();
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let mut ids: Vec<String> = entries
            .iter()
            .filter(|(_, entry)| entry.expires_at > now && entry.value == marker)
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    fn check_writes(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("injected write failure".to_string()).into());
        }
        Ok(())
    }

    fn live_value(entries: &HashMap<String, Entry>, id: &str) -> Option<String> {
        entries
            .get(id)
            .filter(|entry| entry.expires_at > Instant::now())
            .map(|entry| entry.value.clone())
    }
}

#[async_trait]
impl DedupStore for MemoryStore {
    async fn seen(&self, id: &str) -> Result<bool> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("injected read failure".to_string()).into());
        }
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        Ok(Self::live_value(&entries, id)
            .map(|value| is_marker(&value))
            .unwrap_or(false))
    }

    async fn record(&self, id: &str, ttl: Duration) -> Result<()> {
        self.record_calls.fetch_add(1, Ordering::SeqCst);
        self.check_writes()?;
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.insert(
            id.to_string(),
            Entry {
                value: RELAYED_MARKER.to_string(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn claim(&self, id: &str, ttl: Duration) -> Result<bool> {
        self.check_writes()?;
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        if Self::live_value(&entries, id).is_some() {
            return Ok(false);
        }
        entries.insert(
            id.to_string(),
            Entry {
                value: CLAIM_MARKER.to_string(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(true)
    }

    async fn refresh_claim(&self, id: &str, ttl: Duration) -> Result<bool> {
        self.check_writes()?;
        let now = Instant::now();
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        match entries.get_mut(id) {
            Some(entry) if entry.value == CLAIM_MARKER && entry.expires_at > now => {
                entry.expires_at = now + ttl;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn release(&self, id: &str) -> Result<()> {
        self.check_writes()?;
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        if entries
            .get(id)
            .map(|entry| entry.value == CLAIM_MARKER)
            .unwrap_or(false)
        {
            entries.remove(id);
        }
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("injected read failure".to_string()).into());
        }
        Ok(())
    }
}
