//! Catalog cache.
//!
//! Storage and freshness are split: a [`CatalogStore`] only keeps one entry
//! per server, and [`FreshnessPolicy`] decides whether an entry may be served.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::aio::{ConnectionManager as RedisConnectionManager, ConnectionManagerConfig};
use redis::AsyncCommands;
use tokio::sync::RwLock;

use common::errors::{AppError, AppResult};
use common::models::{CacheStatus, CatalogCacheEntry};

const KEY_PREFIX: &str = "catalog:entry:";

/// Per-server catalog storage with upsert semantics.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Returns the stored entry, fresh or not.
    async fn get(&self, server_id: &str) -> AppResult<Option<CatalogCacheEntry>>;

    /// Inserts or replaces the entry for `entry.server_id`.
    async fn put(&self, entry: &CatalogCacheEntry) -> AppResult<()>;

    /// Deletes entries; absent ids are ignored.
    async fn invalidate(&self, server_ids: &[String]) -> AppResult<()>;

    /// Backend name for health output.
    fn backend(&self) -> &'static str;
}

/// Decides whether a cached entry may be served instead of probing.
#[derive(Debug, Clone, Copy)]
pub struct FreshnessPolicy {
    max_age: chrono::Duration,
}

impl FreshnessPolicy {
    pub fn new(max_age: Duration) -> Self {
        Self {
            max_age: chrono::Duration::from_std(max_age).unwrap_or(chrono::Duration::MAX),
        }
    }

    /// True iff `now - last_updated < max_age`.
    pub fn is_fresh(&self, entry: &CatalogCacheEntry, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(entry.last_updated) < self.max_age
    }

    /// Fresh successful entries are served; errors and pending entries are
    /// re-probed so a recovered server shows up without waiting for expiry.
    pub fn is_servable(&self, entry: &CatalogCacheEntry, now: DateTime<Utc>) -> bool {
        entry.status == CacheStatus::Success && self.is_fresh(entry, now)
    }
}

/// Durable store: one JSON value per server under `catalog:entry:{id}`.
#[derive(Clone)]
pub struct RedisCatalogStore {
    conn: RedisConnectionManager,
}

impl RedisCatalogStore {
    /// Connects to Redis at `url`. Connects and replies are both bounded by
    /// `op_timeout`, so a silent server surfaces as an error.
    pub async fn connect(url: &str, op_timeout: Duration) -> AppResult<Self> {
        let client =
            redis::Client::open(url).map_err(|e| AppError::RedisConnection(e.to_string()))?;
        let config = ConnectionManagerConfig::new()
            .set_connection_timeout(op_timeout)
            .set_response_timeout(op_timeout);
        let conn = RedisConnectionManager::new_with_config(client, config)
            .await
            .map_err(|e| AppError::RedisConnection(e.to_string()))?;
        Ok(Self { conn })
    }

    fn key(server_id: &str) -> String {
        format!("{}{}", KEY_PREFIX, server_id)
    }
}

#[async_trait]
impl CatalogStore for RedisCatalogStore {
    async fn get(&self, server_id: &str) -> AppResult<Option<CatalogCacheEntry>> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn
            .get(Self::key(server_id))
            .await
            .map_err(|e| AppError::RedisOperation(e.to_string()))?;

        match raw {
            None => Ok(None),
            Some(json) => match serde_json::from_str(&json) {
                Ok(entry) => Ok(Some(entry)),
                Err(e) => {
                    // Unreadable records behave like a miss and get overwritten.
                    tracing::warn!(server_id = %server_id, error = %e, "Discarding unreadable cache entry");
                    Ok(None)
                }
            },
        }
    }

    async fn put(&self, entry: &CatalogCacheEntry) -> AppResult<()> {
        let json =
            serde_json::to_string(entry).map_err(|e| AppError::Internal(e.to_string()))?;
        let mut conn = self.conn.clone();
        conn.set::<_, _, ()>(Self::key(&entry.server_id), json)
            .await
            .map_err(|e| AppError::RedisOperation(e.to_string()))
    }

    async fn invalidate(&self, server_ids: &[String]) -> AppResult<()> {
        if server_ids.is_empty() {
            return Ok(());
        }
        let keys: Vec<String> = server_ids.iter().map(|id| Self::key(id)).collect();
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(keys)
            .await
            .map_err(|e| AppError::RedisOperation(e.to_string()))
    }

    fn backend(&self) -> &'static str {
        "redis"
    }
}

/// In-process store with the same semantics, used when no Redis is configured.
///
/// Entries do not survive a restart.
#[derive(Default)]
pub struct MemoryCatalogStore {
    entries: RwLock<HashMap<String, CatalogCacheEntry>>,
}

impl MemoryCatalogStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CatalogStore for MemoryCatalogStore {
    async fn get(&self, server_id: &str) -> AppResult<Option<CatalogCacheEntry>> {
        Ok(self.entries.read().await.get(server_id).cloned())
    }

    async fn put(&self, entry: &CatalogCacheEntry) -> AppResult<()> {
        self.entries
            .write()
            .await
            .insert(entry.server_id.clone(), entry.clone());
        Ok(())
    }

    async fn invalidate(&self, server_ids: &[String]) -> AppResult<()> {
        let mut entries = self.entries.write().await;
        for id in server_ids {
            entries.remove(id);
        }
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::models::{DatabaseDescriptor, Server, ServerType};

    fn server(id: &str) -> Server {
        Server {
            id: id.into(),
            name: id.into(),
            host: "localhost".into(),
            port: 5432,
            username: "catalog".into(),
            encrypted_password: String::new(),
            server_type: ServerType::Postgresql,
            is_active: true,
        }
    }

    fn entry_aged(age: chrono::Duration) -> (CatalogCacheEntry, DateTime<Utc>) {
        let now = Utc::now();
        let mut entry = CatalogCacheEntry::success(&server("srv-1"), vec![], 1);
        entry.last_updated = now - age;
        (entry, now)
    }

    #[test]
    fn test_freshness_boundary() {
        let policy = FreshnessPolicy::new(Duration::from_secs(3600));

        let (entry, now) = entry_aged(chrono::Duration::minutes(59) + chrono::Duration::seconds(59));
        assert!(policy.is_fresh(&entry, now));

        let (entry, now) = entry_aged(chrono::Duration::minutes(60) + chrono::Duration::seconds(1));
        assert!(!policy.is_fresh(&entry, now));

        let (entry, now) = entry_aged(chrono::Duration::minutes(60));
        assert!(!policy.is_fresh(&entry, now));
    }

    #[test]
    fn test_error_entries_are_not_servable() {
        let policy = FreshnessPolicy::new(Duration::from_secs(3600));
        let now = Utc::now();
        let entry = CatalogCacheEntry::failure(&server("srv-1"), "timeout", 1);
        assert!(policy.is_fresh(&entry, now));
        assert!(!policy.is_servable(&entry, now));
    }

    #[test]
    fn test_redis_key_layout() {
        assert_eq!(RedisCatalogStore::key("srv-1"), "catalog:entry:srv-1");
    }

    #[tokio::test]
    async fn test_put_is_upsert() {
        let store = MemoryCatalogStore::new();
        let srv = server("srv-1");
        store
            .put(&CatalogCacheEntry::failure(&srv, "refused", 1))
            .await
            .unwrap();
        let dbs = vec![DatabaseDescriptor::new("app", "8 kB", "postgres", None)];
        store
            .put(&CatalogCacheEntry::success(&srv, dbs, 2))
            .await
            .unwrap();

        let entry = store.get("srv-1").await.unwrap().unwrap();
        assert_eq!(entry.status, CacheStatus::Success);
        assert_eq!(entry.cache_version, 2);
        assert_eq!(entry.total_databases, 1);
        assert_eq!(store.entries.read().await.len(), 1);
    }

    #[tokio::test]
    async fn test_invalidate_is_idempotent() {
        let store = MemoryCatalogStore::new();
        store
            .put(&CatalogCacheEntry::success(&server("a"), vec![], 1))
            .await
            .unwrap();
        let ids = vec!["a".to_string(), "never-cached".to_string()];

        store.invalidate(&ids).await.unwrap();
        store.invalidate(&ids).await.unwrap();

        assert!(store.get("a").await.unwrap().is_none());
        assert!(store.entries.read().await.is_empty());
    }
}
