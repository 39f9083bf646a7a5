// ============================================================================
// Rate Cache - Shared Counter Storage
// ============================================================================
//
// The rate limiter only needs four primitives from the shared cache:
// - get: current integer value, if any
// - increment: +1, keeping the existing expiry
// - set_with_expiry: overwrite the value and start a new TTL
// - time_to_live: remaining TTL in seconds
//
// RedisCache is the production implementation; MemoryCache reproduces the
// same expiry semantics in process on top of tokio's clock, so tests can
// pause and advance time.
//
// ============================================================================

use anyhow::{Context, Result};
use async_trait::async_trait;
use redis::{aio::ConnectionManager, AsyncCommands};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

#[async_trait]
pub trait RateCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<u64>>;

    /// Adds one and returns the new value; the TTL is left untouched
    async fn increment(&self, key: &str) -> Result<u64>;

    async fn set_with_expiry(&self, key: &str, value: u64, ttl_secs: u64) -> Result<()>;

    /// Remaining TTL, `None` when the key is missing or never expires
    async fn time_to_live(&self, key: &str) -> Result<Option<u64>>;

    async fn ping(&self) -> Result<()>;
}

// ============================================================================
// Redis
// ============================================================================

/// Redis cache with automatic reconnection
#[derive(Clone)]
pub struct RedisCache {
    conn: ConnectionManager,
}

impl RedisCache {
    /// Connect to Redis server
    ///
    /// Supports both redis:// and rediss:// (TLS) URLs
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url).context("Invalid REDIS_URL")?;
        let conn = ConnectionManager::new(client)
            .await
            .context("Failed to connect to Redis")?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl RateCache for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<u64>> {
        let mut conn = self.conn.clone();
        let value: Option<u64> = conn.get(key).await?;
        Ok(value)
    }

    async fn increment(&self, key: &str) -> Result<u64> {
        let mut conn = self.conn.clone();
        let value: u64 = conn.incr(key, 1u64).await?;
        Ok(value)
    }

    async fn set_with_expiry(&self, key: &str, value: u64, ttl_secs: u64) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.set_ex(key, value, ttl_secs).await?;
        Ok(())
    }

    async fn time_to_live(&self, key: &str) -> Result<Option<u64>> {
        let mut conn = self.conn.clone();
        // -2: no such key, -1: no expiry
        let ttl: i64 = conn.ttl(key).await?;
        Ok(u64::try_from(ttl).ok())
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self.conn.clone();
        let _pong: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}

// ============================================================================
// In-process
// ============================================================================

struct Entry {
    value: u64,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

/// In-process cache with Redis-like TTL behaviour
#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_entries<T>(
        &self,
        f: impl FnOnce(&mut HashMap<String, Entry>, Instant) -> T,
    ) -> Result<T> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| anyhow::anyhow!("memory cache lock poisoned"))?;
        let now = Instant::now();
        entries.retain(|_, entry| entry.is_live(now));
        Ok(f(&mut *entries, now))
    }
}

#[async_trait]
impl RateCache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<u64>> {
        self.with_entries(|entries, _| entries.get(key).map(|e| e.value))
    }

    async fn increment(&self, key: &str) -> Result<u64> {
        self.with_entries(|entries, _| {
            let entry = entries.entry(key.to_string()).or_insert(Entry {
                value: 0,
                expires_at: None,
            });
            entry.value += 1;
            entry.value
        })
    }

    async fn set_with_expiry(&self, key: &str, value: u64, ttl_secs: u64) -> Result<()> {
        self.with_entries(|entries, now| {
            entries.insert(
                key.to_string(),
                Entry {
                    value,
                    expires_at: Some(now + Duration::from_secs(ttl_secs)),
                },
            );
        })
    }

    async fn time_to_live(&self, key: &str) -> Result<Option<u64>> {
        self.with_entries(|entries, now| {
            entries
                .get(key)
                .and_then(|e| e.expires_at)
                .map(|at| {
                    let remaining = at.saturating_duration_since(now);
                    remaining.as_secs() + u64::from(remaining.subsec_nanos() > 0)
                })
        })
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}
