//! Key/value cache used for public view caching and session freshness
//!
//! This module provides the [`Cache`] abstraction together with a Redis
//! backed implementation and an in-process implementation with TTL support.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use async_trait::async_trait;
use redis::{AsyncCommands, Client};
use serde::{Serialize, de::DeserializeOwned};
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Minimal cache contract shared by every backend
#[async_trait]
pub trait Cache: Send + Sync {
    /// Set a key-value pair with optional TTL
    async fn set(&self, key: &str, value: &str, ttl_seconds: Option<u64>) -> Result<()>;

    /// Get a value by key
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Delete a key
    async fn delete(&self, key: &str) -> Result<()>;

    /// Check if the backend is reachable
    async fn health_check(&self) -> Result<bool>;
}

/// Configuration for Redis connection
#[derive(Debug, Clone)]
pub struct RedisConfig {
    /// Redis connection URL (e.g., "redis://localhost:6379")
    pub url: String,
    /// Maximum number of connections in the pool
    pub max_connections: u32,
}

impl RedisConfig {
    /// Create a new RedisConfig from environment variables
    ///
    /// # Environment Variables
    /// - `REDIS_URL`: Redis connection URL (default: "redis://localhost:6379")
    /// - `REDIS_MAX_CONNECTIONS`: Maximum number of connections (default: 10)
    pub fn from_env() -> Result<Self> {
        let url =
            std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string());
        let max_connections = std::env::var("REDIS_MAX_CONNECTIONS")
            .unwrap_or_else(|_| "10".to_string())
            .parse()
            .unwrap_or(10);

        Ok(RedisConfig {
            url,
            max_connections,
        })
    }
}

/// Redis connection pool
#[derive(Clone)]
pub struct RedisPool {
    client: Client,
}

impl RedisPool {
    /// Initialize a new Redis connection pool
    pub async fn new(config: &RedisConfig) -> Result<Self> {
        let client = Client::open(config.url.clone())?;
        info!("Redis client initialized with URL: {}", config.url);
        Ok(RedisPool { client })
    }

    async fn get_connection(&self) -> Result<redis::aio::MultiplexedConnection> {
        let conn = self.client.get_multiplexed_async_connection().await?;
        Ok(conn)
    }
}

#[async_trait]
impl Cache for RedisPool {
    async fn set(&self, key: &str, value: &str, ttl_seconds: Option<u64>) -> Result<()> {
        let mut conn = self.get_connection().await?;

        if let Some(ttl) = ttl_seconds {
            let _: () = conn.set_ex(key, value, ttl).await?;
        } else {
            let _: () = conn.set(key, value).await?;
        }

        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.get_connection().await?;
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.get_connection().await?;
        let _: u64 = conn.del(key).await?;
        Ok(())
    }

    async fn health_check(&self) -> Result<bool> {
        let mut conn = self.get_connection().await?;
        let pong: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(pong == "PONG")
    }
}

/// Minimum time between sweeps of expired entries
const SWEEP_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug)]
struct MemoryEntry {
    value: String,
    expires_at: Option<Instant>,
}

impl MemoryEntry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }
}

#[derive(Debug)]
struct MemoryStore {
    entries: HashMap<String, MemoryEntry>,
    last_sweep: Instant,
}

impl MemoryStore {
    /// Drop every expired entry, at most once per [`SWEEP_INTERVAL`]
    fn sweep(&mut self, now: Instant) {
        if now.duration_since(self.last_sweep) < SWEEP_INTERVAL {
            return;
        }
        self.entries.retain(|_, entry| entry.is_live(now));
        self.last_sweep = now;
    }
}

/// In-process cache, used when no Redis URL is configured. Keys that are
/// never read again are reclaimed by a sweep on write.
#[derive(Debug, Clone)]
pub struct MemoryCache {
    store: Arc<Mutex<MemoryStore>>,
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self {
            store: Arc::new(Mutex::new(MemoryStore {
                entries: HashMap::new(),
                last_sweep: Instant::now(),
            })),
        }
    }
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        let store = self.store.lock().await;
        store.entries.values().filter(|entry| entry.is_live(now)).count()
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn set(&self, key: &str, value: &str, ttl_seconds: Option<u64>) -> Result<()> {
        let now = Instant::now();
        let expires_at = ttl_seconds.map(|ttl| now + Duration::from_secs(ttl));
        let mut store = self.store.lock().await;
        store.sweep(now);
        store.entries.insert(
            key.to_string(),
            MemoryEntry {
                value: value.to_string(),
                expires_at,
            },
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut store = self.store.lock().await;
        let live = match store.entries.get(key) {
            Some(entry) => entry.is_live(Instant::now()),
            None => return Ok(None),
        };

        if !live {
            store.entries.remove(key);
            return Ok(None);
        }

        Ok(store.entries.get(key).map(|entry| entry.value.clone()))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.store.lock().await.entries.remove(key);
        Ok(())
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }
}

/// Connect to Redis when `REDIS_URL` is set, otherwise fall back to the
/// in-process cache.
pub async fn connect_from_env() -> Result<Arc<dyn Cache>> {
    if std::env::var("REDIS_URL").is_err() {
        warn!("REDIS_URL not set, using in-process cache");
        return Ok(Arc::new(MemoryCache::new()));
    }

    let config = RedisConfig::from_env()?;
    let pool = RedisPool::new(&config).await?;
    Ok(Arc::new(pool))
}

/// Read and deserialize a JSON value
pub async fn get_json<T: DeserializeOwned>(cache: &dyn Cache, key: &str) -> Result<Option<T>> {
    match cache.get(key).await? {
        Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        None => Ok(None),
    }
}

/// Serialize and store a JSON value
pub async fn set_json<T: Serialize + Sync>(
    cache: &dyn Cache,
    key: &str,
    value: &T,
    ttl_seconds: Option<u64>,
) -> Result<()> {
    let raw = serde_json::to_string(value)?;
    cache.set(key, &raw, ttl_seconds).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    #[ignore = "requires a running Redis"]
    async fn test_redis_connection() -> Result<()> {
        let config = RedisConfig {
            url: "redis://localhost:6379".to_string(),
            max_connections: 10,
        };

        let pool = RedisPool::new(&config).await?;
        assert!(pool.health_check().await?);
        Ok(())
    }

    #[tokio::test]
    async fn test_memory_set_get_delete() -> Result<()> {
        let cache = MemoryCache::new();

        cache.set("view:article:slug:hello", "{}", Some(60)).await?;
        assert_eq!(
            cache.get("view:article:slug:hello").await?,
            Some("{}".to_string())
        );

        cache.delete("view:article:slug:hello").await?;
        assert_eq!(cache.get("view:article:slug:hello").await?, None);
        Ok(())
    }

    #[tokio::test]
    async fn test_memory_entry_expires() -> Result<()> {
        let cache = MemoryCache::new();

        cache.set("session:expired", "x", Some(0)).await?;
        cache.set("session:live", "y", None).await?;

        assert_eq!(cache.get("session:expired").await?, None);
        assert_eq!(cache.len().await, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_memory_sweeps_unread_expired_keys_on_write() -> Result<()> {
        let cache = MemoryCache::new();
        for i in 0..500 {
            cache
                .set(&format!("view:article:list:g0:search={i}"), "[]", Some(1))
                .await?;
        }

        tokio::time::sleep(Duration::from_millis(1100)).await;
        cache.set("view:article:list:g1:all", "[]", Some(300)).await?;

        let stored = cache.store.lock().await.entries.len();
        assert_eq!(stored, 1);
        assert_eq!(cache.len().await, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_json_helpers() -> Result<()> {
        let cache = MemoryCache::new();
        set_json(&cache, "numbers", &vec![1, 2, 3], None).await?;

        let numbers: Option<Vec<i32>> = get_json(&cache, "numbers").await?;
        assert_eq!(numbers, Some(vec![1, 2, 3]));

        let missing: Option<Vec<i32>> = get_json(&cache, "missing").await?;
        assert!(missing.is_none());
        Ok(())
    }
}
