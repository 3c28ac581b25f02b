//! PostgreSQL catalog driver.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgConnection, PgRow};
use sqlx::{ConnectOptions, Connection, Row};
use tokio::time::{timeout, Instant};

use common::models::{DatabaseDescriptor, Server, ServerType};
use common::utils::SqlIdentifier;

use super::{CatalogDriver, ProbeError};
use crate::settings::CatalogSettings;
use crate::vault::DecryptedCredential;

/// Maintenance database the listing query connects to.
const MAINTENANCE_DATABASE: &str = "postgres";
const APPLICATION_NAME: &str = "catalog-service";

const LIST_DATABASES_SQL: &str = "SELECT d.datname AS name,
        pg_size_pretty(pg_database_size(d.datname)) AS size_pretty,
        pg_get_userbyid(d.datdba) AS owner,
        shobj_description(d.oid, 'pg_database') AS comment
     FROM pg_database d
     WHERE d.datistemplate = false
     ORDER BY d.datname";

/// Lists databases through `pg_database` and reads version markers.
///
/// Every call opens one dedicated connection and closes it before returning;
/// nothing is pooled across probes.
pub struct PostgresDriver {
    connect_timeout: Duration,
    query_timeout: Duration,
    version_sql: String,
}

impl PostgresDriver {
    pub fn new(settings: &CatalogSettings) -> Self {
        Self {
            connect_timeout: settings.connect_timeout,
            query_timeout: settings.query_timeout,
            version_sql: version_sql(&settings.version_table, &settings.version_column),
        }
    }

    fn connect_options(
        &self,
        server: &Server,
        credential: &DecryptedCredential,
        database: &str,
    ) -> PgConnectOptions {
        PgConnectOptions::new()
            .host(&server.host)
            .port(server.port)
            .username(&server.username)
            .password(credential.expose())
            .database(database)
            .application_name(APPLICATION_NAME)
            .disable_statement_logging()
    }

    /// Single connection attempt bounded by `limit`.
    async fn connect(
        &self,
        options: &PgConnectOptions,
        limit: Duration,
    ) -> Result<PgConnection, ProbeError> {
        match timeout(limit, PgConnection::connect_with(options)).await {
            Ok(conn) => Ok(conn?),
            Err(_) => Err(ProbeError::ConnectionRefused(format!(
                "connect timed out after {}ms",
                limit.as_millis()
            ))),
        }
    }
}

#[async_trait]
impl CatalogDriver for PostgresDriver {
    fn server_type(&self) -> ServerType {
        ServerType::Postgresql
    }

    async fn list_databases(
        &self,
        server: &Server,
        credential: &DecryptedCredential,
        deadline: Instant,
    ) -> Result<Vec<DatabaseDescriptor>, ProbeError> {
        let options = self.connect_options(server, credential, MAINTENANCE_DATABASE);
        let remaining = deadline.saturating_duration_since(Instant::now());
        let mut conn = self
            .connect(&options, self.connect_timeout.min(remaining))
            .await?;

        let query_limit = self
            .query_timeout
            .min(deadline.saturating_duration_since(Instant::now()));
        let result = bounded_query(
            query_limit,
            "database listing",
            sqlx::query(LIST_DATABASES_SQL).fetch_all(&mut conn),
        )
        .await;
        close_quietly(conn, &server.id).await;

        result?.iter().map(descriptor_from_row).collect()
    }

    async fn fetch_version(
        &self,
        server: &Server,
        credential: &DecryptedCredential,
        database: &str,
    ) -> Result<String, ProbeError> {
        let options = self.connect_options(server, credential, database);
        let mut conn = self.connect(&options, self.connect_timeout).await?;

        let result = sqlx::query(&self.version_sql)
            .fetch_optional(&mut conn)
            .await;
        close_quietly(conn, &server.id).await;

        let row = result?.ok_or_else(|| ProbeError::QueryFailed("no version row".into()))?;
        row.try_get::<Option<String>, _>("version")?
            .ok_or_else(|| ProbeError::QueryFailed("version marker is NULL".into()))
    }
}

fn descriptor_from_row(row: &PgRow) -> Result<DatabaseDescriptor, ProbeError> {
    Ok(DatabaseDescriptor::new(
        row.try_get::<String, _>("name")?,
        row.try_get::<Option<String>, _>("size_pretty")?
            .unwrap_or_default(),
        row.try_get::<Option<String>, _>("owner")?
            .unwrap_or_default(),
        row.try_get::<Option<String>, _>("comment")?,
    ))
}

/// Runs `query` under `limit`; running out of time is a `QueryTimeout`.
async fn bounded_query<T>(
    limit: Duration,
    what: &str,
    query: impl Future<Output = Result<T, sqlx::Error>>,
) -> Result<T, ProbeError> {
    match timeout(limit, query).await {
        Ok(result) => Ok(result?),
        Err(_) => Err(ProbeError::QueryTimeout(format!(
            "{} exceeded {}ms",
            what,
            limit.as_millis()
        ))),
    }
}

async fn close_quietly(conn: PgConnection, server_id: &str) {
    if let Err(e) = conn.close().await {
        tracing::debug!(server_id = %server_id, error = %e, "Closing probe connection failed");
    }
}

/// Builds the marker query. Identifiers must already be validated.
fn version_sql(table: &str, column: &str) -> String {
    format!(
        "SELECT {}::text AS version FROM {} LIMIT 1",
        SqlIdentifier::quote(column),
        SqlIdentifier::quote(table)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vault::DecryptedCredential;

    fn server() -> Server {
        Server {
            id: "srv-1".into(),
            name: "primary".into(),
            host: "db1.internal".into(),
            port: 6543,
            username: "catalog".into(),
            encrypted_password: String::new(),
            server_type: ServerType::Postgresql,
            is_active: true,
        }
    }

    #[test]
    fn test_version_sql() {
        assert_eq!(
            version_sql("schema_version", "version"),
            "SELECT \"version\"::text AS version FROM \"schema_version\" LIMIT 1"
        );
        assert_eq!(
            version_sql("app.meta", "release"),
            "SELECT \"release\"::text AS version FROM \"app\".\"meta\" LIMIT 1"
        );
    }

    #[test]
    fn test_connect_options_target_server() {
        let driver = PostgresDriver::new(&CatalogSettings::default());
        let cred = DecryptedCredential::new("s3cret");
        let options = driver.connect_options(&server(), &cred, "billing");
        assert_eq!(options.get_host(), "db1.internal");
        assert_eq!(options.get_port(), 6543);
        assert_eq!(options.get_username(), "catalog");
        assert_eq!(options.get_database(), Some("billing"));
    }

    #[tokio::test]
    async fn test_expired_deadline_fails_fast() {
        let driver = PostgresDriver::new(&CatalogSettings::default());
        let cred = DecryptedCredential::new("s3cret");
        let started = std::time::Instant::now();
        let err = driver
            .list_databases(&server(), &cred, Instant::now())
            .await
            .unwrap_err();
        assert!(matches!(err, ProbeError::ConnectionRefused(_)));
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_slow_listing_query_is_query_timeout() {
        let err = bounded_query::<Vec<PgRow>>(
            Duration::from_millis(20),
            "database listing",
            std::future::pending(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, ProbeError::QueryTimeout(_)));
        assert!(err.is_transient());
        assert_eq!(err.to_string(), "query timeout: database listing exceeded 20ms");
    }

    #[tokio::test]
    async fn test_bounded_query_passes_through_results() {
        let rows = bounded_query(Duration::from_secs(1), "database listing", async {
            Ok::<_, sqlx::Error>(vec![1, 2])
        })
        .await
        .unwrap();
        assert_eq!(rows, vec![1, 2]);

        let err = bounded_query::<()>(Duration::from_secs(1), "database listing", async {
            Err(sqlx::Error::RowNotFound)
        })
        .await
        .unwrap_err();
        assert!(matches!(err, ProbeError::QueryFailed(_)));
    }
}
