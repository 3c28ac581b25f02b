//! 目录聚合服务模块
//!
//! Fans a listing request out to every requested server. Per server:
//! cache check, driver lookup, credential decryption, probe and version
//! resolution raced against the server timeout, then a guarded cache write.
//! A failing server only ever produces its own error outcome.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use futures::future::join_all;
use tokio::time::{timeout, timeout_at, Instant};

use common::errors::{AppError, AppResult};
use common::models::{
    CacheRefreshResult, CatalogCacheEntry, CatalogListing, DatabaseDescriptor, ProbeOutcome,
    Server,
};

use crate::attempts::AttemptTracker;
use crate::batcher::VersionBatcher;
use crate::cache::{CatalogStore, FreshnessPolicy};
use crate::probe::{DriverRegistry, ProbeError};
use crate::registry::ServerRegistry;
use crate::settings::CatalogSettings;
use crate::vault::CredentialVault;

/// 目录服务 Trait
#[async_trait]
pub trait CatalogServiceTrait: Send + Sync {
    /// 列出所选服务器上的全部数据库
    async fn list_databases(&self, server_ids: &[String]) -> AppResult<CatalogListing>;

    /// 强制失效缓存（不重新探测）
    async fn force_cache_update(&self, server_ids: &[String]) -> AppResult<CacheRefreshResult>;
}

/// Catalog aggregation orchestrator.
pub struct CatalogService {
    registry: Arc<dyn ServerRegistry>,
    store: Arc<dyn CatalogStore>,
    vault: Arc<CredentialVault>,
    drivers: DriverRegistry,
    batcher: VersionBatcher,
    freshness: FreshnessPolicy,
    server_timeout: Duration,
    cache_timeout: Duration,
    attempts: AttemptTracker,
}

impl CatalogService {
    /// 创建新的目录服务实例
    pub fn new(
        registry: Arc<dyn ServerRegistry>,
        store: Arc<dyn CatalogStore>,
        vault: Arc<CredentialVault>,
        drivers: DriverRegistry,
        settings: &CatalogSettings,
    ) -> Self {
        Self {
            registry,
            store,
            vault,
            drivers,
            batcher: VersionBatcher::from_settings(settings),
            freshness: FreshnessPolicy::new(settings.cache_ttl),
            server_timeout: settings.server_timeout,
            cache_timeout: settings.cache_timeout,
            attempts: AttemptTracker::new(),
        }
    }

    /// Name of the cache backend in use.
    pub fn cache_backend(&self) -> &'static str {
        self.store.backend()
    }

    async fn resolve_server(&self, server: &Server) -> ProbeOutcome {
        if let Some(entry) = self.servable_entry(&server.id).await {
            tracing::debug!(server_id = %server.id, "Serving catalog from cache");
            return ProbeOutcome::cached(entry);
        }

        let token = self.attempts.begin(&server.id);
        let started = std::time::Instant::now();

        let (outcome, entry) = match self.probe_server(server).await {
            Ok(databases) => {
                tracing::info!(
                    server_id = %server.id,
                    databases = databases.len(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Server catalogued"
                );
                (
                    ProbeOutcome::success(server, databases.clone()),
                    CatalogCacheEntry::success(server, databases, token),
                )
            }
            Err(e) => {
                tracing::warn!(
                    server_id = %server.id,
                    host = %server.host,
                    kind = e.kind(),
                    transient = e.is_transient(),
                    error = %e,
                    "Server probe failed"
                );
                let message = e.to_string();
                (
                    ProbeOutcome::failure(server, message.clone()),
                    CatalogCacheEntry::failure(server, message, token),
                )
            }
        };

        self.commit(entry, token).await;
        outcome
    }

    /// Fresh successful entry for `server_id`, if any. Store errors and
    /// slow reads count as a miss.
    async fn servable_entry(&self, server_id: &str) -> Option<CatalogCacheEntry> {
        match timeout(self.cache_timeout, self.store.get(server_id)).await {
            Ok(Ok(Some(entry))) if self.freshness.is_servable(&entry, Utc::now()) => Some(entry),
            Ok(Ok(_)) => None,
            Ok(Err(e)) => {
                tracing::warn!(server_id = %server_id, error = %e, "Cache read failed, probing live");
                None
            }
            Err(_) => {
                tracing::warn!(server_id = %server_id, "Cache read timed out, probing live");
                None
            }
        }
    }

    /// Driver lookup, decryption, then probe + versions under the server timeout.
    async fn probe_server(&self, server: &Server) -> Result<Vec<DatabaseDescriptor>, ProbeError> {
        let driver = self.drivers.get(server.server_type)?;
        let credential = self.vault.decrypt(&server.encrypted_password)?;
        let deadline = Instant::now() + self.server_timeout;

        let pipeline = async {
            let mut databases = driver.list_databases(server, &credential, deadline).await?;
            self.batcher
                .resolve_versions(driver.as_ref(), server, &credential, &mut databases)
                .await;
            Ok(databases)
        };

        match timeout_at(deadline, pipeline).await {
            Ok(result) => result,
            Err(_) => Err(ProbeError::ServerTimeout(self.server_timeout.as_secs())),
        }
    }

    /// Writes `entry` unless a newer attempt for the same server has started.
    async fn commit(&self, entry: CatalogCacheEntry, token: u64) {
        if !self.attempts.finish(&entry.server_id, token) {
            tracing::debug!(server_id = %entry.server_id, token, "Superseded attempt, result discarded");
            return;
        }
        match timeout(self.cache_timeout, self.store.put(&entry)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::warn!(server_id = %entry.server_id, error = %e, "Cache write failed");
            }
            Err(_) => {
                tracing::warn!(server_id = %entry.server_id, "Cache write timed out");
            }
        }
    }
}

#[async_trait]
impl CatalogServiceTrait for CatalogService {
    async fn list_databases(&self, server_ids: &[String]) -> AppResult<CatalogListing> {
        let ids = normalize_ids(server_ids)?;

        let servers: HashMap<String, Server> = self
            .registry
            .get_servers_by_ids(&ids)
            .await?
            .into_iter()
            .filter(|s| s.is_active)
            .map(|s| (s.id.clone(), s))
            .collect();
        if servers.is_empty() {
            return Err(AppError::NoActiveServers(ids.join(", ")));
        }

        let outcomes = join_all(ids.iter().map(|id| {
            let server = servers.get(id);
            async move {
                match server {
                    Some(server) => self.resolve_server(server).await,
                    None => ProbeOutcome::missing(id),
                }
            }
        }))
        .await;

        let listing = CatalogListing::new(outcomes);
        tracing::info!(
            total_servers = listing.summary.total_servers,
            successful_servers = listing.summary.successful_servers,
            total_databases = listing.summary.total_databases,
            "Catalog listing assembled"
        );
        Ok(listing)
    }

    async fn force_cache_update(&self, server_ids: &[String]) -> AppResult<CacheRefreshResult> {
        let ids = normalize_ids(server_ids)?;
        timeout(self.cache_timeout, self.store.invalidate(&ids))
            .await
            .map_err(|_| AppError::RedisOperation("cache invalidation timed out".into()))??;

        tracing::info!(count = ids.len(), "Catalog cache invalidated");
        Ok(CacheRefreshResult {
            success: true,
            message: format!("Cache cleared for {} server(s)", ids.len()),
        })
    }
}

/// Trims, drops blanks and de-duplicates ids, keeping first-seen order.
fn normalize_ids(server_ids: &[String]) -> AppResult<Vec<String>> {
    let mut seen = HashSet::new();
    let ids: Vec<String> = server_ids
        .iter()
        .map(|id| id.trim())
        .filter(|id| !id.is_empty() && seen.insert(*id))
        .map(String::from)
        .collect();

    if ids.is_empty() {
        return Err(AppError::Validation(
            "at least one server id is required".into(),
        ));
    }
    Ok(ids)
}
