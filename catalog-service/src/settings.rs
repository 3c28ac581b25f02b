//! Catalog engine settings.

use std::time::Duration;

use common::config::{env_opt, env_or};
use common::errors::{AppError, AppResult};
use common::utils::SqlIdentifier;

/// Upper bound for every configured timeout; deadlines are computed from these.
const MAX_TIMEOUT: Duration = Duration::from_secs(24 * 60 * 60);

/// Timeouts, batch width and cache policy of the aggregation engine.
#[derive(Debug, Clone)]
pub struct CatalogSettings {
    /// Secret the vault key is derived from.
    pub encryption_key: String,
    /// Outer bound on probe + version resolution for one server.
    pub server_timeout: Duration,
    /// Connect timeout of the catalog probe.
    pub connect_timeout: Duration,
    /// Timeout of the database listing query.
    pub query_timeout: Duration,
    /// Timeout of each per-database version lookup.
    pub version_timeout: Duration,
    /// Databases resolved concurrently per batch.
    pub version_batch_size: usize,
    /// Maximum age at which a cache entry is served.
    pub cache_ttl: Duration,
    /// Bound on a single cache read or write.
    pub cache_timeout: Duration,
    /// Table holding the version marker row.
    pub version_table: String,
    /// Column of the version marker.
    pub version_column: String,
}

impl Default for CatalogSettings {
    fn default() -> Self {
        Self {
            encryption_key: String::new(),
            server_timeout: Duration::from_secs(45),
            connect_timeout: Duration::from_secs(10),
            query_timeout: Duration::from_secs(30),
            version_timeout: Duration::from_secs(2),
            version_batch_size: 10,
            cache_ttl: Duration::from_secs(60 * 60),
            cache_timeout: Duration::from_secs(2),
            version_table: "schema_version".to_string(),
            version_column: "version".to_string(),
        }
    }
}

impl CatalogSettings {
    /// Reads `CATALOG_*` variables on top of the defaults.
    pub fn from_env() -> AppResult<Self> {
        let defaults = Self::default();
        let encryption_key = env_opt("CATALOG_ENCRYPTION_KEY")
            .ok_or_else(|| AppError::Config("CATALOG_ENCRYPTION_KEY must be set".into()))?;

        let settings = Self {
            encryption_key,
            server_timeout: secs("CATALOG_SERVER_TIMEOUT_SECS", defaults.server_timeout)?,
            connect_timeout: secs("CATALOG_CONNECT_TIMEOUT_SECS", defaults.connect_timeout)?,
            query_timeout: secs("CATALOG_QUERY_TIMEOUT_SECS", defaults.query_timeout)?,
            version_timeout: secs("CATALOG_VERSION_TIMEOUT_SECS", defaults.version_timeout)?,
            version_batch_size: env_or("CATALOG_VERSION_BATCH_SIZE", defaults.version_batch_size)?,
            cache_ttl: secs("CATALOG_CACHE_TTL_SECS", defaults.cache_ttl)?,
            cache_timeout: secs("CATALOG_CACHE_TIMEOUT_SECS", defaults.cache_timeout)?,
            version_table: env_or("CATALOG_VERSION_TABLE", defaults.version_table)?,
            version_column: env_or("CATALOG_VERSION_COLUMN", defaults.version_column)?,
        };
        settings.validate()?;
        Ok(settings)
    }

    /// Checks invariants that the environment cannot express.
    pub fn validate(&self) -> AppResult<()> {
        if self.version_batch_size == 0 {
            return Err(AppError::Config(
                "CATALOG_VERSION_BATCH_SIZE must be at least 1".into(),
            ));
        }
        if self.server_timeout.is_zero() {
            return Err(AppError::Config(
                "CATALOG_SERVER_TIMEOUT_SECS must be at least 1".into(),
            ));
        }
        let timeouts = [
            ("CATALOG_SERVER_TIMEOUT_SECS", self.server_timeout),
            ("CATALOG_CONNECT_TIMEOUT_SECS", self.connect_timeout),
            ("CATALOG_QUERY_TIMEOUT_SECS", self.query_timeout),
            ("CATALOG_VERSION_TIMEOUT_SECS", self.version_timeout),
            ("CATALOG_CACHE_TIMEOUT_SECS", self.cache_timeout),
        ];
        for (key, value) in timeouts {
            if value > MAX_TIMEOUT {
                return Err(AppError::Config(format!(
                    "{} must not exceed {} seconds",
                    key,
                    MAX_TIMEOUT.as_secs()
                )));
            }
        }
        SqlIdentifier::validate(&self.version_table)?;
        SqlIdentifier::validate(&self.version_column)?;
        Ok(())
    }
}

fn secs(key: &str, default: Duration) -> AppResult<Duration> {
    env_or(key, default.as_secs()).map(Duration::from_secs)
}
