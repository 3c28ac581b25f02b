//! Connection probe.
//!
//! One [`CatalogDriver`] per server type, looked up in a [`DriverRegistry`].
//! A type without a registered driver is unsupported and fails before any
//! network activity.

mod postgres;

pub use postgres::PostgresDriver;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::time::Instant;

use common::models::{DatabaseDescriptor, Server, ServerType};

use crate::settings::CatalogSettings;
use crate::vault::{DecryptError, DecryptedCredential};

/// Why a server could not be catalogued.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("credential unusable: {0}")]
    CredentialDecryption(#[from] DecryptError),

    #[error("unsupported server type: {0}")]
    UnsupportedServerType(ServerType),

    /// Host unreachable, connection refused or connect timeout.
    #[error("connection refused: {0}")]
    ConnectionRefused(String),

    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("query timeout: {0}")]
    QueryTimeout(String),

    #[error("query failed: {0}")]
    QueryFailed(String),

    /// The whole server pipeline exceeded its time budget.
    #[error("timeout: no result within {0}s")]
    ServerTimeout(u64),
}

impl ProbeError {
    /// Short label for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            ProbeError::CredentialDecryption(_) => "credential",
            ProbeError::UnsupportedServerType(_) => "unsupported_type",
            ProbeError::ConnectionRefused(_) => "connection",
            ProbeError::Authentication(_) => "authentication",
            ProbeError::QueryTimeout(_) => "query_timeout",
            ProbeError::QueryFailed(_) => "query",
            ProbeError::ServerTimeout(_) => "server_timeout",
        }
    }

    /// Whether retrying later may succeed without operator action.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ProbeError::ConnectionRefused(_)
                | ProbeError::QueryTimeout(_)
                | ProbeError::ServerTimeout(_)
        )
    }
}

impl From<sqlx::Error> for ProbeError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db) => match db.code().as_deref() {
                // SQLSTATE class 28: invalid authorization specification
                Some(code) if code.starts_with("28") => {
                    ProbeError::Authentication(db.message().to_string())
                }
                // query_canceled, raised by statement_timeout
                Some("57014") => ProbeError::QueryTimeout(db.message().to_string()),
                _ => ProbeError::QueryFailed(db.message().to_string()),
            },
            sqlx::Error::Io(_) | sqlx::Error::Tls(_) | sqlx::Error::PoolTimedOut => {
                ProbeError::ConnectionRefused(err.to_string())
            }
            _ => ProbeError::QueryFailed(err.to_string()),
        }
    }
}

/// Catalog access for one server type.
#[async_trait]
pub trait CatalogDriver: Send + Sync {
    /// Type this driver handles.
    fn server_type(&self) -> ServerType;

    /// Lists all non-template databases ordered by name, versions unresolved.
    ///
    /// Enumeration is all-or-nothing. The driver never waits past `deadline`
    /// and releases its connection on every exit path.
    async fn list_databases(
        &self,
        server: &Server,
        credential: &DecryptedCredential,
        deadline: Instant,
    ) -> Result<Vec<DatabaseDescriptor>, ProbeError>;

    /// Reads the version marker of one database over its own short-lived
    /// connection, with a single connection attempt.
    async fn fetch_version(
        &self,
        server: &Server,
        credential: &DecryptedCredential,
        database: &str,
    ) -> Result<String, ProbeError>;
}

/// Lookup table of drivers keyed by server type.
#[derive(Clone, Default)]
pub struct DriverRegistry {
    drivers: HashMap<ServerType, Arc<dyn CatalogDriver>>,
}

impl DriverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in driver.
    pub fn with_defaults(settings: &CatalogSettings) -> Self {
        Self::new().register(Arc::new(PostgresDriver::new(settings)))
    }

    /// Adds or replaces the driver for its server type.
    pub fn register(mut self, driver: Arc<dyn CatalogDriver>) -> Self {
        self.drivers.insert(driver.server_type(), driver);
        self
    }

    /// Returns the driver for `server_type`, or `UnsupportedServerType`.
    pub fn get(&self, server_type: ServerType) -> Result<Arc<dyn CatalogDriver>, ProbeError> {
        self.drivers
            .get(&server_type)
            .cloned()
            .ok_or(ProbeError::UnsupportedServerType(server_type))
    }

    /// Server types with a registered driver.
    pub fn supported(&self) -> Vec<ServerType> {
        let mut types: Vec<ServerType> = self.drivers.keys().copied().collect();
        types.sort_by_key(|t| t.to_string());
        types
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::borrow::Cow;

    use sqlx::error::{DatabaseError, ErrorKind};

    /// Server-side error carrying a SQLSTATE, as a driver would report it.
    #[derive(Debug)]
    struct SqlState {
        code: &'static str,
        message: &'static str,
    }

    impl std::fmt::Display for SqlState {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{} ({})", self.message, self.code)
        }
    }

    impl std::error::Error for SqlState {}

    impl DatabaseError for SqlState {
        fn message(&self) -> &str {
            self.message
        }

        fn code(&self) -> Option<Cow<'_, str>> {
            Some(Cow::Borrowed(self.code))
        }

        fn as_error(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
            self
        }

        fn as_error_mut(&mut self) -> &mut (dyn std::error::Error + Send + Sync + 'static) {
            self
        }

        fn into_error(self: Box<Self>) -> Box<dyn std::error::Error + Send + Sync + 'static> {
            self
        }

        fn kind(&self) -> ErrorKind {
            ErrorKind::Other
        }
    }

    fn database_error(code: &'static str, message: &'static str) -> ProbeError {
        ProbeError::from(sqlx::Error::Database(Box::new(SqlState { code, message })))
    }

    #[test]
    fn test_sqlstate_class_28_is_authentication() {
        let err = database_error("28P01", "password authentication failed for user \"catalog\"");
        assert!(matches!(err, ProbeError::Authentication(_)));
        assert_eq!(err.kind(), "authentication");
        assert!(!err.is_transient());
        assert!(err.to_string().contains("password authentication failed"));

        let err = database_error("28000", "no pg_hba.conf entry");
        assert!(matches!(err, ProbeError::Authentication(_)));
    }

    #[test]
    fn test_query_canceled_is_query_timeout() {
        let err = database_error("57014", "canceling statement due to statement timeout");
        assert!(matches!(err, ProbeError::QueryTimeout(_)));
        assert_eq!(err.kind(), "query_timeout");
        assert!(err.is_transient());
    }

    #[test]
    fn test_other_sqlstate_is_query_failed() {
        let err = database_error("42P01", "relation \"pg_database\" does not exist");
        assert!(matches!(err, ProbeError::QueryFailed(_)));
        assert!(!err.is_transient());
    }

    #[test]
    fn test_only_postgres_is_supported_by_default() {
        let registry = DriverRegistry::with_defaults(&CatalogSettings::default());
        assert_eq!(registry.supported(), vec![ServerType::Postgresql]);
        assert!(registry.get(ServerType::Postgresql).is_ok());
        assert!(matches!(
            registry.get(ServerType::Mysql),
            Err(ProbeError::UnsupportedServerType(ServerType::Mysql))
        ));
        assert!(matches!(
            registry.get(ServerType::Sqlserver),
            Err(ProbeError::UnsupportedServerType(ServerType::Sqlserver))
        ));
    }

    #[test]
    fn test_io_errors_classify_as_connection_refused() {
        let io = std::io::Error::from(std::io::ErrorKind::ConnectionRefused);
        let err = ProbeError::from(sqlx::Error::Io(io));
        assert_eq!(err.kind(), "connection");
        assert!(err.is_transient());

        let err = ProbeError::from(sqlx::Error::PoolTimedOut);
        assert!(matches!(err, ProbeError::ConnectionRefused(_)));
    }

    #[test]
    fn test_row_errors_classify_as_query_failed() {
        let err = ProbeError::from(sqlx::Error::RowNotFound);
        assert!(matches!(err, ProbeError::QueryFailed(_)));
        assert!(!err.is_transient());
    }

    #[test]
    fn test_messages_match_outcome_wording() {
        assert!(ProbeError::ServerTimeout(45).to_string().starts_with("timeout"));
        assert!(ProbeError::from(DecryptError::Malformed)
            .to_string()
            .starts_with("credential unusable"));
    }
}
