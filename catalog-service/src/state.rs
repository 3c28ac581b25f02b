//! Application state for catalog service.

use std::sync::Arc;

use common::config::AppConfig;
use common::errors::{AppError, AppResult};
use common::models::ServerType;

use crate::cache::{CatalogStore, MemoryCatalogStore, RedisCatalogStore};
use crate::probe::DriverRegistry;
use crate::registry::MySqlServerRegistry;
use crate::service::{CatalogService, CatalogServiceTrait};
use crate::settings::CatalogSettings;
use crate::vault::CredentialVault;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub catalog: Arc<dyn CatalogServiceTrait>,
    /// Cache backend name reported by the health endpoint.
    pub cache_backend: &'static str,
    pub supported_types: Vec<ServerType>,
}

impl AppState {
    /// Connects the registry and cache, then wires the catalog service.
    pub async fn new(config: AppConfig, settings: CatalogSettings) -> AppResult<Self> {
        let database_url = config
            .database_url
            .clone()
            .ok_or_else(|| AppError::Config("DATABASE_URL must be set".into()))?;
        let registry = MySqlServerRegistry::connect(&config, &database_url).await?;

        let store: Arc<dyn CatalogStore> = match &config.redis_url {
            Some(url) => Arc::new(RedisCatalogStore::connect(url, settings.cache_timeout).await?),
            None => {
                tracing::warn!("REDIS_URL not set, catalog cache is in-memory and lost on restart");
                Arc::new(MemoryCatalogStore::new())
            }
        };

        let drivers = DriverRegistry::with_defaults(&settings);
        let supported_types = drivers.supported();
        let service = CatalogService::new(
            Arc::new(registry),
            store,
            Arc::new(CredentialVault::new(&settings.encryption_key)),
            drivers,
            &settings,
        );
        let cache_backend = service.cache_backend();

        Ok(Self {
            config,
            catalog: Arc::new(service),
            cache_backend,
            supported_types,
        })
    }
}
