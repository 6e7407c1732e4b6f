//! The shared TTL key-value store abstraction and its implementations.
//!
//! Rate-limit counters and the credential revocation list both live in one
//! external store. The gateway needs only three operations plus a liveness
//! probe, so the store is abstracted behind [`TtlStore`] rather than bound
//! to a specific product. [`RedisStore`] is the production implementation;
//! [`MemoryStore`] backs tests and store-less local runs.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use tracing::info;

use crate::{GatewayError, Result};

/// Timeout for establishing the initial store connection.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Minimal interface over a TTL key-value store.
///
/// Every method is a potentially-suspending I/O operation; implementations
/// must be safe to share across concurrently running request pipelines.
#[async_trait]
pub trait TtlStore: Send + Sync {
    /// Returns the value stored at `key`, or `None` if absent or expired.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Stores `value` at `key`, expiring after `ttl`.
    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;

    /// Atomically increments the counter at `key` and refreshes its TTL,
    /// returning the post-increment count. Concurrent callers must each
    /// observe a distinct count.
    async fn incr_with_ttl(&self, key: &str, ttl: Duration) -> Result<u64>;

    /// Probes store liveness.
    async fn ping(&self) -> Result<()>;
}

/// Redis-backed store using a shared connection manager.
#[derive(Clone)]
pub struct RedisStore {
    connection: ConnectionManager,
}

impl RedisStore {
    /// Connects to Redis at `url` and verifies the connection with a PING.
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url)
            .map_err(|e| GatewayError::Config(format!("invalid redis url \"{url}\": {e}")))?;

        let connection = tokio::time::timeout(CONNECT_TIMEOUT, client.get_connection_manager())
            .await
            .map_err(|_| {
                GatewayError::Store(format!(
                    "timed out connecting to store after {}s",
                    CONNECT_TIMEOUT.as_secs()
                ))
            })?
            .map_err(|e| GatewayError::Store(e.to_string()))?;

        let store = Self { connection };
        store.ping().await?;
        info!(url, "connected to shared store");
        Ok(store)
    }
}

#[async_trait]
impl TtlStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.connection.clone();
        redis::cmd("GET")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| GatewayError::Store(e.to_string()))
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let mut conn = self.connection.clone();
        redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("EX")
            .arg(ttl.as_secs().max(1))
            .query_async(&mut conn)
            .await
            .map_err(|e| GatewayError::Store(e.to_string()))
    }

    async fn incr_with_ttl(&self, key: &str, ttl: Duration) -> Result<u64> {
        let mut conn = self.connection.clone();

        // INCR and EXPIRE run in one atomic pipeline so concurrent requests
        // from the same address each observe a distinct count.
        let (count, _): (u64, i64) = redis::pipe()
            .atomic()
            .incr(key, 1u64)
            .expire(key, ttl.as_secs().max(1) as i64)
            .query_async(&mut conn)
            .await
            .map_err(|e| GatewayError::Store(e.to_string()))?;

        Ok(count)
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self.connection.clone();
        redis::cmd("PING")
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(|e| GatewayError::Store(e.to_string()))
    }
}

/// In-process store with the same TTL semantics as the Redis implementation.
///
/// Counters and revocation entries expire lazily on access. Intended for
/// tests and single-instance local runs; it provides no cross-process
/// sharing.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, (String, Instant)>>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TtlStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut entries = self.entries.lock().expect("store mutex poisoned");
        match entries.get(key) {
            Some((value, expires_at)) if *expires_at > Instant::now() => Ok(Some(value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let mut entries = self.entries.lock().expect("store mutex poisoned");
        entries.insert(key.to_string(), (value.to_string(), Instant::now() + ttl));
        Ok(())
    }

    async fn incr_with_ttl(&self, key: &str, ttl: Duration) -> Result<u64> {
        let mut entries = self.entries.lock().expect("store mutex poisoned");
        let now = Instant::now();

        let count = match entries.get(key) {
            Some((value, expires_at)) if *expires_at > now => {
                value.parse::<u64>().unwrap_or(0) + 1
            }
            _ => 1,
        };
        entries.insert(key.to_string(), (count.to_string(), now + ttl));
        Ok(count)
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}
