//! Redis-backed dedup store
//!
//! Connections live in a small `deadpool` pool. Every checkout is probed with
//! `PING`, and a connection whose previous checkout is older than the idle
//! timeout is dropped instead of reused. A pooled object goes back to the pool when it is
//! dropped, so every command path releases its connection, errors included.

use async_trait::async_trait;
use deadpool::managed::{self, Metrics, Object, Pool, RecycleError, RecycleResult};
use redis::aio::MultiplexedConnection;
use redis::{Client, RedisError, Script};
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

use crate::config::StoreConfig;
use crate::error::{Result, StoreError};
use crate::store::{is_marker, record_key, DedupStore, CLAIM_MARKER, RELAYED_MARKER};

/// Deletes the key only while it still holds the claim marker.
const RELEASE_CLAIM_SCRIPT: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('DEL', KEYS[1])
end
return 0
"#;

/// Resets the expiry only while the key still holds the claim marker.
const REFRESH_CLAIM_SCRIPT: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('EXPIRE', KEYS[1], ARGV[2])
end
return 0
"#;

/// Pool manager producing multiplexed Redis connections.
pub struct RedisConnectionManager {
    client: Client,
    idle_timeout: Duration,
}

impl managed::Manager for RedisConnectionManager {
    type Type = MultiplexedConnection;
    type Error = RedisError;

    async fn create(&self) -> std::result::Result<MultiplexedConnection, RedisError> {
        debug!("Opening new Redis connection");
        self.client.get_multiplexed_async_connection().await
    }

    async fn recycle(
        &self,
        conn: &mut MultiplexedConnection,
        metrics: &Metrics,
    ) -> RecycleResult<RedisError> {
        if idle_expired(metrics, self.idle_timeout) {
            return Err(RecycleError::Message("connection idle past timeout".into()));
        }

        let pong: String = redis::cmd("PING")
            .query_async(conn)
            .await
            .map_err(RecycleError::Backend)?;
        check_pong(&pong)
    }
}

/// Whether a pooled connection sat unused too long to be handed out again.
///
/// deadpool stamps `recycled` at checkout, so this is the time since the
/// connection was last checked out (or created, if it never was).
fn idle_expired(metrics: &Metrics, timeout: Duration) -> bool {
    metrics.last_used() > timeout
}

fn check_pong(reply: &str) -> RecycleResult<RedisError> {
    if reply != "PONG" {
        return Err(RecycleError::Message("unexpected PING reply".into()));
    }
    Ok(())
}

type RedisPool = Pool<RedisConnectionManager>;

#[derive(Clone)]
pub struct RedisStore {
    pool: RedisPool,
    key_prefix: String,
}

impl RedisStore {
    /// Build the pool for the configured endpoint.
    ///
    /// No connection is opened here; the first command dials. A malformed
    /// endpoint fails immediately.
    pub fn connect(config: &StoreConfig) -> Result<Self> {
        let endpoint = resolve_endpoint(config)?;
        let client = Client::open(endpoint.as_str()).map_err(|e| {
            StoreError::InvalidEndpoint(format!("{}: {}", redact_endpoint(&endpoint), e))
        })?;

        let manager = RedisConnectionManager {
            client,
            idle_timeout: config.idle_timeout,
        };
        let pool = Pool::builder(manager)
            .max_size(config.max_idle)
            .build()
            .map_err(|e| StoreError::Pool(e.to_string()))?;

        info!(
            "Dedup store at {} (pool size {}, idle timeout {}s)",
            redact_endpoint(&endpoint),
            config.max_idle,
            config.idle_timeout.as_secs()
        );

        Ok(Self {
            pool,
            key_prefix: config.key_prefix.clone(),
        })
    }

    async fn conn(&self) -> Result<Object<RedisConnectionManager>> {
        let conn = self
            .pool
            .get()
            .await
            .map_err(|e| StoreError::Pool(e.to_string()))?;
        Ok(conn)
    }

    fn key(&self, id: &str) -> String {
        record_key(&self.key_prefix, id)
    }
}

#[async_trait]
impl DedupStore for RedisStore {
    async fn seen(&self, id: &str) -> Result<bool> {
        let mut conn = self.conn().await?;
        let value: Option<String> = redis::cmd("GET")
            .arg(self.key(id))
            .query_async(&mut *conn)
            .await
            .map_err(StoreError::Redis)?;
        Ok(value.map(|v| is_marker(&v)).unwrap_or(false))
    }

    async fn record(&self, id: &str, ttl: Duration) -> Result<()> {
        let mut conn = self.conn().await?;
        redis::cmd("SETEX")
            .arg(self.key(id))
            .arg(ttl_seconds(ttl))
            .arg(RELAYED_MARKER)
            .query_async::<_, ()>(&mut *conn)
            .await
            .map_err(StoreError::Redis)?;
        Ok(())
    }

    async fn claim(&self, id: &str, ttl: Duration) -> Result<bool> {
        let mut conn = self.conn().await?;
        let reply: Option<String> = redis::cmd("SET")
            .arg(self.key(id))
            .arg(CLAIM_MARKER)
            .arg("NX")
            .arg("EX")
            .arg(ttl_seconds(ttl))
            .query_async(&mut *conn)
            .await
            .map_err(StoreError::Redis)?;
        Ok(reply.is_some())
    }

    async fn refresh_claim(&self, id: &str, ttl: Duration) -> Result<bool> {
        let mut conn = self.conn().await?;
        let refreshed = Script::new(REFRESH_CLAIM_SCRIPT)
            .key(self.key(id))
            .arg(CLAIM_MARKER)
            .arg(ttl_seconds(ttl))
            .invoke_async::<_, i64>(&mut *conn)
            .await
            .map_err(StoreError::Redis)?;
        Ok(refreshed == 1)
    }

    async fn release(&self, id: &str) -> Result<()> {
        let mut conn = self.conn().await?;
        Script::new(RELEASE_CLAIM_SCRIPT)
            .key(self.key(id))
            .arg(CLAIM_MARKER)
            .invoke_async::<_, i64>(&mut *conn)
            .await
            .map_err(StoreError::Redis)?;
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self.conn().await?;
        redis::cmd("PING")
            .query_async::<_, String>(&mut *conn)
            .await
            .map_err(StoreError::Redis)?;
        Ok(())
    }
}

/// SETEX rejects a zero expiry
fn ttl_seconds(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}

/// Connection URL for the store: the configured URL, else the Unix socket.
pub fn resolve_endpoint(config: &StoreConfig) -> Result<String> {
    if let Some(raw) = config.url.as_deref().map(str::trim).filter(|u| !u.is_empty()) {
        let parsed = Url::parse(raw).map_err(|e| {
            StoreError::InvalidEndpoint(format!("{}: {}", redact_endpoint(raw), e))
        })?;
        return match parsed.scheme() {
            "redis" | "rediss" | "redis+unix" | "unix" => Ok(raw.to_string()),
            other => Err(StoreError::InvalidEndpoint(format!(
                "unsupported scheme '{}' in {}",
                other,
                redact_endpoint(raw)
            ))
            .into()),
        };
    }

    let socket = config.socket_path.trim();
    if socket.is_empty() {
        return Err(StoreError::InvalidEndpoint(
            "neither store.url nor store.socket_path is set".to_string(),
        )
        .into());
    }
    Ok(format!("redis+unix://{}", socket))
}

/// Endpoint with any password masked, for logs and error messages
pub fn redact_endpoint(endpoint: &str) -> String {
    match Url::parse(endpoint) {
        Ok(mut url) => {
            if url.password().is_some() {
                let _ = url.set_password(Some("***"));
            }
            url.to_string()
        }
        Err(_) => "<unparseable endpoint>".to_string(),
    }
}
