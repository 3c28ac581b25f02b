//! Server registry access.
//!
//! Server records are managed elsewhere; the catalog only reads active
//! servers by id from the MySQL metadata database.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::{mysql::MySqlPoolOptions, MySql, MySqlPool, QueryBuilder};

use common::config::AppConfig;
use common::errors::{AppError, AppResult};
use common::models::{Server, ServerType};

/// Read access to registered servers.
#[async_trait]
pub trait ServerRegistry: Send + Sync {
    /// Returns the active servers among `ids`. Unknown or inactive ids are omitted.
    async fn get_servers_by_ids(&self, ids: &[String]) -> AppResult<Vec<Server>>;
}

/// Row from the `servers` MySQL table.
#[derive(sqlx::FromRow)]
struct ServerRow {
    id: String,
    name: String,
    host: String,
    port: u16,
    username: String,
    encrypted_password: String,
    server_type: String,
    is_active: bool,
}

impl ServerRow {
    fn into_server(self) -> Option<Server> {
        match self.server_type.parse::<ServerType>() {
            Ok(server_type) => Some(Server {
                id: self.id,
                name: self.name,
                host: self.host,
                port: if self.port == 0 {
                    server_type.default_port()
                } else {
                    self.port
                },
                username: self.username,
                encrypted_password: self.encrypted_password,
                server_type,
                is_active: self.is_active,
            }),
            Err(e) => {
                tracing::warn!(id = %self.id, error = %e, "Skipping server with unknown type");
                None
            }
        }
    }
}

/// Registry backed by the `servers` table of the metadata database.
pub struct MySqlServerRegistry {
    pool: MySqlPool,
}

impl MySqlServerRegistry {
    /// Connects to the metadata database and ensures the table exists.
    pub async fn connect(config: &AppConfig, url: &str) -> AppResult<Self> {
        let pool = MySqlPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .connect(url)
            .await
            .map_err(|e| AppError::DatabaseConnection(e.to_string()))?;

        let registry = Self { pool };
        registry.ensure_table().await?;
        Ok(registry)
    }

    /// Creates the servers table if it does not exist.
    async fn ensure_table(&self) -> AppResult<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS `servers` (
                `id`                 VARCHAR(64)   NOT NULL,
                `name`               VARCHAR(100)  NOT NULL,
                `host`               VARCHAR(255)  NOT NULL,
                `port`               SMALLINT UNSIGNED NOT NULL,
                `username`           VARCHAR(128)  NOT NULL,
                `encrypted_password` VARCHAR(1024) NOT NULL,
                `server_type`        VARCHAR(32)   NOT NULL,
                `is_active`          BOOLEAN       NOT NULL DEFAULT TRUE,
                `created_at`         DATETIME      NOT NULL DEFAULT CURRENT_TIMESTAMP,
                `updated_at`         DATETIME      NOT NULL DEFAULT CURRENT_TIMESTAMP ON UPDATE CURRENT_TIMESTAMP,
                PRIMARY KEY (`id`),
                KEY `idx_is_active` (`is_active`)
            ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4 COLLATE=utf8mb4_unicode_ci",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseQuery(format!("Failed to create servers table: {}", e)))?;

        tracing::info!("Metadata table `servers` ensured");
        Ok(())
    }
}

#[async_trait]
impl ServerRegistry for MySqlServerRegistry {
    async fn get_servers_by_ids(&self, ids: &[String]) -> AppResult<Vec<Server>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut query: QueryBuilder<MySql> = QueryBuilder::new(
            "SELECT `id`, `name`, `host`, `port`, `username`, `encrypted_password`, \
             `server_type`, `is_active` FROM `servers` WHERE `is_active` = TRUE AND `id` IN (",
        );
        let mut separated = query.separated(", ");
        for id in ids {
            separated.push_bind(id);
        }
        separated.push_unseparated(")");

        let rows = query
            .build_query_as::<ServerRow>()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseQuery(format!("Failed to load servers: {}", e)))?;

        Ok(rows.into_iter().filter_map(ServerRow::into_server).collect())
    }
}
