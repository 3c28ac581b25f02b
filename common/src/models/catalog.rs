//! Catalog models: per-database descriptors, cache records and the
//! aggregated listing returned to callers.
//!
//! `CatalogCacheEntry` is also the durable record shape written to the cache
//! store, so its field names are part of the storage format.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use super::server::Server;

/// Sentinel for a version marker that was not (or could not be) resolved.
pub const VERSION_UNAVAILABLE: &str = "N/A";

/// One database on a server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseDescriptor {
    pub name: String,
    /// Human readable size, e.g. `"8137 kB"`.
    pub size_pretty: String,
    pub owner: String,
    /// Database-level comment, if any.
    #[serde(default)]
    pub comment: Option<String>,
    /// Application version marker, or `"N/A"`.
    pub version: String,
}

impl DatabaseDescriptor {
    /// Creates a descriptor whose version is still unresolved.
    pub fn new(
        name: impl Into<String>,
        size_pretty: impl Into<String>,
        owner: impl Into<String>,
        comment: Option<String>,
    ) -> Self {
        Self {
            name: name.into(),
            size_pretty: size_pretty.into(),
            owner: owner.into(),
            comment,
            version: VERSION_UNAVAILABLE.to_string(),
        }
    }
}

/// Status of a cached probe result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum CacheStatus {
    Success,
    Error,
    Pending,
}

/// Cached probe result for one server. One entry per `server_id`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CatalogCacheEntry {
    pub server_id: String,
    pub server_name: String,
    pub server_host: String,
    pub databases: Vec<DatabaseDescriptor>,
    pub status: CacheStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub total_databases: usize,
    pub last_updated: DateTime<Utc>,
    /// Generation token of the probe attempt that produced this entry.
    pub cache_version: u64,
}

impl CatalogCacheEntry {
    /// Entry for a completed, successful probe.
    pub fn success(server: &Server, databases: Vec<DatabaseDescriptor>, cache_version: u64) -> Self {
        Self {
            server_id: server.id.clone(),
            server_name: server.name.clone(),
            server_host: server.host.clone(),
            total_databases: databases.len(),
            databases,
            status: CacheStatus::Success,
            error_message: None,
            last_updated: Utc::now(),
            cache_version,
        }
    }

    /// Entry for a failed probe.
    pub fn failure(server: &Server, message: impl Into<String>, cache_version: u64) -> Self {
        Self {
            server_id: server.id.clone(),
            server_name: server.name.clone(),
            server_host: server.host.clone(),
            databases: Vec::new(),
            status: CacheStatus::Error,
            error_message: Some(message.into()),
            total_databases: 0,
            last_updated: Utc::now(),
            cache_version,
        }
    }
}

/// Per-server result returned to the caller.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProbeOutcome {
    pub server_id: String,
    pub server_name: String,
    pub server_host: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub databases: Option<Vec<DatabaseDescriptor>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub from_cache: bool,
}

impl ProbeOutcome {
    /// Outcome served from a cache entry.
    pub fn cached(entry: CatalogCacheEntry) -> Self {
        let success = entry.status == CacheStatus::Success;
        Self {
            server_id: entry.server_id,
            server_name: entry.server_name,
            server_host: entry.server_host,
            success,
            databases: success.then_some(entry.databases),
            error: entry.error_message,
            from_cache: true,
        }
    }

    /// Outcome of a fresh, successful probe.
    pub fn success(server: &Server, databases: Vec<DatabaseDescriptor>) -> Self {
        Self {
            server_id: server.id.clone(),
            server_name: server.name.clone(),
            server_host: server.host.clone(),
            success: true,
            databases: Some(databases),
            error: None,
            from_cache: false,
        }
    }

    /// Outcome of a failed probe.
    pub fn failure(server: &Server, error: impl Into<String>) -> Self {
        Self {
            server_id: server.id.clone(),
            server_name: server.name.clone(),
            server_host: server.host.clone(),
            success: false,
            databases: None,
            error: Some(error.into()),
            from_cache: false,
        }
    }

    /// Outcome for a requested id the registry did not return.
    pub fn missing(server_id: &str) -> Self {
        Self {
            server_id: server_id.to_string(),
            server_name: String::new(),
            server_host: String::new(),
            success: false,
            databases: None,
            error: Some("server not found or inactive".to_string()),
            from_cache: false,
        }
    }

    /// Number of databases in a successful outcome, zero otherwise.
    pub fn database_count(&self) -> usize {
        match (&self.databases, self.success) {
            (Some(dbs), true) => dbs.len(),
            _ => 0,
        }
    }
}

/// Totals folded from an outcome list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AggregationSummary {
    pub total_servers: usize,
    pub successful_servers: usize,
    pub total_databases: usize,
}

impl AggregationSummary {
    /// Folds the outcome list into totals.
    pub fn from_outcomes(outcomes: &[ProbeOutcome]) -> Self {
        outcomes.iter().fold(Self::default(), |acc, o| Self {
            total_servers: acc.total_servers + 1,
            successful_servers: acc.successful_servers + usize::from(o.success),
            total_databases: acc.total_databases + o.database_count(),
        })
    }
}

/// Response of a catalog listing call.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CatalogListing {
    pub results: Vec<ProbeOutcome>,
    pub summary: AggregationSummary,
}

impl CatalogListing {
    /// Builds a listing whose summary is derived from `results`.
    pub fn new(results: Vec<ProbeOutcome>) -> Self {
        let summary = AggregationSummary::from_outcomes(&results);
        Self { results, summary }
    }
}

/// Request body naming the servers to act on.
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ServerIdsRequest {
    #[validate(length(min = 1, message = "At least one server id is required"))]
    pub server_ids: Vec<String>,
}

/// Result of a forced cache invalidation.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CacheRefreshResult {
    pub success: bool,
    pub message: String,
}
