//! Cache module for the Brewline services
//!
//! Wraps Redis for multi-instance deployments and keeps an in-process TTL map
//! as a fallback when Redis is not configured or temporarily unreachable.
//! Values are stored as JSON strings in both backends.

use crate::error::CacheResult;
use redis::{AsyncCommands, Client};
use serde::{Serialize, de::DeserializeOwned};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::{sync::RwLock, task::JoinHandle, time::MissedTickBehavior};
use tracing::{debug, info, warn};

/// Entry count past which a write also sweeps expired entries
const MEMORY_SWEEP_THRESHOLD: usize = 10_000;

/// Configuration for Redis connection
#[derive(Debug, Clone, Default)]
pub struct RedisConfig {
    /// Redis connection URL (e.g., "redis://localhost:6379"); `None` keeps everything in memory
    pub url: Option<String>,
}

impl RedisConfig {
    /// Create a new RedisConfig from environment variables
    ///
    /// # Environment Variables
    /// - `REDIS_URL`: Redis connection URL (optional)
    pub fn from_env() -> Self {
        let url = std::env::var("REDIS_URL")
            .ok()
            .map(|u| u.trim().to_string())
            .filter(|u| !u.is_empty());

        RedisConfig { url }
    }
}

/// Redis connection pool
#[derive(Clone)]
pub struct RedisPool {
    client: Client,
}

impl RedisPool {
    /// Create a client for the given URL; no connection is made until first use
    pub fn new(url: &str) -> CacheResult<Self> {
        let client = Client::open(url)?;
        info!("Redis client initialized with URL: {}", url);
        Ok(RedisPool { client })
    }

    async fn get_connection(&self) -> CacheResult<redis::aio::MultiplexedConnection> {
        let conn = self.client.get_multiplexed_async_connection().await?;
        Ok(conn)
    }

    /// Set a key-value pair in Redis with optional TTL
    pub async fn set(&self, key: &str, value: &str, ttl_seconds: Option<u64>) -> CacheResult<()> {
        let mut conn = self.get_connection().await?;

        if let Some(ttl) = ttl_seconds {
            let _: () = conn.set_ex(key, value, ttl).await?;
        } else {
            let _: () = conn.set(key, value).await?;
        }

        Ok(())
    }

    /// Get a value from Redis by key
    pub async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        let mut conn = self.get_connection().await?;
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    /// Delete a key from Redis
    pub async fn delete(&self, key: &str) -> CacheResult<()> {
        let mut conn = self.get_connection().await?;
        let _: u64 = conn.del(key).await?;
        Ok(())
    }

    /// Delete every key matching a glob pattern
    pub async fn delete_pattern(&self, pattern: &str) -> CacheResult<()> {
        let mut conn = self.get_connection().await?;
        let keys: Vec<String> = conn.keys(pattern).await?;
        if !keys.is_empty() {
            let _: u64 = conn.del(keys).await?;
        }
        Ok(())
    }

    /// Check if Redis is reachable
    pub async fn health_check(&self) -> CacheResult<bool> {
        let mut conn = self.get_connection().await?;
        let pong: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(pong == "PONG")
    }
}

#[derive(Debug, Clone)]
struct MemoryEntry {
    value: String,
    expires_at: Instant,
}

/// In-process TTL cache
#[derive(Debug, Clone, Default)]
pub struct MemoryCache {
    entries: Arc<RwLock<HashMap<String, MemoryEntry>>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, key: &str) -> Option<String> {
        let now = Instant::now();
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                Some(entry) if entry.expires_at > now => return Some(entry.value.clone()),
                Some(_) => {}
                None => return None,
            }
        }

        // expired: drop it
        self.entries.write().await.remove(key);
        None
    }

    pub async fn set(&self, key: &str, value: String, ttl: Duration) {
        let entry = MemoryEntry {
            value,
            expires_at: Instant::now() + ttl,
        };
        let mut entries = self.entries.write().await;
        if entries.len() >= MEMORY_SWEEP_THRESHOLD {
            let now = Instant::now();
            entries.retain(|_, e| e.expires_at > now);
        }
        entries.insert(key.to_string(), entry);
    }

    pub async fn delete(&self, key: &str) {
        self.entries.write().await.remove(key);
    }

    pub async fn delete_pattern(&self, pattern: &str) {
        self.entries
            .write()
            .await
            .retain(|key, _| !glob_matches(pattern, key));
    }

    /// Remove expired entries, returning how many were dropped
    pub async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| entry.expires_at > now);
        before - entries.len()
    }

    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

/// Glob matching with `*` wildcards only
pub fn glob_matches(pattern: &str, key: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();
    if parts.len() == 1 {
        return pattern == key;
    }

    let mut rest = key;
    for (i, part) in parts.iter().enumerate() {
        if part.is_empty() {
            continue;
        }
        if i == 0 {
            match rest.strip_prefix(part) {
                Some(r) => rest = r,
                None => return false,
            }
        } else if i == parts.len() - 1 {
            return rest.ends_with(part);
        } else {
            match rest.find(part) {
                Some(idx) => rest = &rest[idx + part.len()..],
                None => return false,
            }
        }
    }
    true
}

/// Cache facade used by the services
///
/// Reads and writes go to Redis when configured. Any Redis failure is logged
/// and the in-memory map is used instead, so callers never see cache errors.
#[derive(Clone)]
pub struct CacheStore {
    redis: Option<RedisPool>,
    memory: MemoryCache,
}

impl CacheStore {
    /// Build a store from configuration, probing Redis once
    pub async fn connect(config: &RedisConfig) -> Self {
        let redis = match &config.url {
            Some(url) => match RedisPool::new(url) {
                Ok(pool) => match pool.health_check().await {
                    Ok(true) => Some(pool),
                    Ok(false) | Err(_) => {
                        warn!("Redis at {} is unreachable, using in-memory cache", url);
                        None
                    }
                },
                Err(e) => {
                    warn!("Invalid Redis URL, using in-memory cache: {}", e);
                    None
                }
            },
            None => {
                info!("REDIS_URL not configured, using in-memory cache");
                None
            }
        };

        Self {
            redis,
            memory: MemoryCache::new(),
        }
    }

    pub fn in_memory() -> Self {
        Self {
            redis: None,
            memory: MemoryCache::new(),
        }
    }

    pub fn backend(&self) -> &'static str {
        if self.redis.is_some() { "redis" } else { "memory" }
    }

    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = match &self.redis {
            Some(redis) => match redis.get(key).await {
                Ok(value) => value,
                Err(e) => {
                    warn!("Redis get failed for {}: {}", key, e);
                    self.memory.get(key).await
                }
            },
            None => self.memory.get(key).await,
        }?;

        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("Discarding undecodable cache entry {}: {}", key, e);
                None
            }
        }
    }

    pub async fn set_json<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) {
        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Failed to encode cache entry {}: {}", key, e);
                return;
            }
        };

        if let Some(redis) = &self.redis {
            match redis.set(key, &raw, Some(ttl.as_secs().max(1))).await {
                Ok(()) => return,
                Err(e) => warn!("Redis set failed for {}: {}", key, e),
            }
        }

        self.memory.set(key, raw, ttl).await;
    }

    pub async fn delete(&self, key: &str) {
        self.memory.delete(key).await;
        if let Some(redis) = &self.redis {
            if let Err(e) = redis.delete(key).await {
                warn!("Redis delete failed for {}: {}", key, e);
            }
        }
    }

    pub async fn delete_pattern(&self, pattern: &str) {
        self.memory.delete_pattern(pattern).await;
        if let Some(redis) = &self.redis {
            if let Err(e) = redis.delete_pattern(pattern).await {
                warn!("Redis pattern delete failed for {}: {}", pattern, e);
            }
        }
    }

    /// Drop expired in-memory entries now
    pub async fn purge_expired(&self) -> usize {
        self.memory.purge_expired().await
    }

    /// Sweep expired in-memory entries every `period` until the handle is aborted
    pub fn spawn_janitor(&self, period: Duration) -> JoinHandle<()> {
        let memory = self.memory.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let dropped = memory.purge_expired().await;
                if dropped > 0 {
                    debug!("Purged {} expired cache entries", dropped);
                }
            }
        })
    }

    /// Release in-process state on shutdown
    pub async fn shutdown(&self) {
        self.memory.clear().await;
        info!("Cache store shut down ({})", self.backend());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Entry {
        order_id: String,
        total: i64,
    }

    #[test]
    fn test_glob_matches() {
        assert!(glob_matches("products:*", "products:list:1"));
        assert!(glob_matches("product:*", "product:latte"));
        assert!(!glob_matches("product:*", "products:list"));
        assert!(glob_matches("a*c", "abc"));
        assert!(glob_matches("*:list", "products:list"));
        assert!(glob_matches("exact", "exact"));
        assert!(!glob_matches("exact", "exact2"));
        assert!(glob_matches("*", "anything"));
    }

    #[tokio::test]
    async fn test_memory_store_round_trip() {
        let store = CacheStore::in_memory();
        let entry = Entry {
            order_id: "abc".to_string(),
            total: 120_000,
        };

        store.set_json("idem:1", &entry, Duration::from_secs(60)).await;
        let loaded: Option<Entry> = store.get_json("idem:1").await;
        assert_eq!(loaded, Some(entry));

        store.delete("idem:1").await;
        let loaded: Option<Entry> = store.get_json("idem:1").await;
        assert_eq!(loaded, None);
    }

    #[tokio::test]
    async fn test_memory_entries_expire() {
        let cache = MemoryCache::new();
        cache
            .set("short", "1".to_string(), Duration::from_millis(10))
            .await;
        cache
            .set("long", "2".to_string(), Duration::from_secs(60))
            .await;

        tokio::time::sleep(Duration::from_millis(30)).await;

        assert_eq!(cache.get("short").await, None);
        assert_eq!(cache.get("long").await, Some("2".to_string()));
        assert_eq!(cache.purge_expired().await, 0);
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn test_janitor_drops_entries_nobody_reads() {
        let store = CacheStore::in_memory();
        for i in 0..500 {
            store
                .set_json(&format!("products:list:search-{}", i), &i, Duration::from_millis(5))
                .await;
        }
        assert_eq!(store.memory.len().await, 500);

        let janitor = store.spawn_janitor(Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(60)).await;
        janitor.abort();

        assert_eq!(store.memory.len().await, 0);
    }

    #[tokio::test]
    async fn test_large_map_sweeps_on_write() {
        let cache = MemoryCache::new();
        for i in 0..MEMORY_SWEEP_THRESHOLD {
            cache
                .set(&format!("k{}", i), String::new(), Duration::from_millis(1))
                .await;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;

        cache
            .set("fresh", "1".to_string(), Duration::from_secs(60))
            .await;
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn test_delete_pattern_only_hits_matching_keys() {
        let store = CacheStore::in_memory();
        let ttl = Duration::from_secs(60);
        store.set_json("products:list:a", &1, ttl).await;
        store.set_json("products:list:b", &2, ttl).await;
        store.set_json("compare:user", &3, ttl).await;

        store.delete_pattern("products:*").await;

        assert_eq!(store.get_json::<i32>("products:list:a").await, None);
        assert_eq!(store.get_json::<i32>("products:list:b").await, None);
        assert_eq!(store.get_json::<i32>("compare:user").await, Some(3));
    }

    #[tokio::test]
    async fn test_connect_without_url_uses_memory() {
        let store = CacheStore::connect(&RedisConfig { url: None }).await;
        assert_eq!(store.backend(), "memory");
    }
}
