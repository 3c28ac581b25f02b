//! Version batcher.
//!
//! Resolves each database's version marker in fixed-size chunks: chunks run
//! one after another, the databases of a chunk run concurrently. A failed or
//! slow lookup only costs that database its version.

use std::time::Duration;

use futures::future::join_all;
use tokio::time::timeout;

use common::models::{DatabaseDescriptor, Server, VERSION_UNAVAILABLE};

use crate::probe::CatalogDriver;
use crate::settings::CatalogSettings;
use crate::vault::DecryptedCredential;

/// Fills `version` on database descriptors.
#[derive(Debug, Clone, Copy)]
pub struct VersionBatcher {
    batch_size: usize,
    lookup_timeout: Duration,
}

impl VersionBatcher {
    pub fn new(batch_size: usize, lookup_timeout: Duration) -> Self {
        Self {
            batch_size: batch_size.max(1),
            lookup_timeout,
        }
    }

    pub fn from_settings(settings: &CatalogSettings) -> Self {
        Self::new(settings.version_batch_size, settings.version_timeout)
    }

    /// Resolves versions in place. Never fails; unresolved entries get `"N/A"`.
    pub async fn resolve_versions(
        &self,
        driver: &dyn CatalogDriver,
        server: &Server,
        credential: &DecryptedCredential,
        databases: &mut [DatabaseDescriptor],
    ) {
        for chunk in databases.chunks_mut(self.batch_size) {
            let lookups = chunk
                .iter()
                .map(|db| self.lookup(driver, server, credential, &db.name));
            let versions = join_all(lookups).await;

            for (db, version) in chunk.iter_mut().zip(versions) {
                db.version = version;
            }
        }
    }

    async fn lookup(
        &self,
        driver: &dyn CatalogDriver,
        server: &Server,
        credential: &DecryptedCredential,
        database: &str,
    ) -> String {
        match timeout(
            self.lookup_timeout,
            driver.fetch_version(server, credential, database),
        )
        .await
        {
            Ok(Ok(version)) => version,
            Ok(Err(e)) => {
                tracing::debug!(server_id = %server.id, database = %database, kind = e.kind(), error = %e, "Version lookup failed");
                VERSION_UNAVAILABLE.to_string()
            }
            Err(_) => {
                tracing::debug!(server_id = %server.id, database = %database, "Version lookup timed out");
                VERSION_UNAVAILABLE.to_string()
            }
        }
    }
}
