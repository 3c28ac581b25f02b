//! Service configuration loaded from the environment.

use std::str::FromStr;

use crate::errors::{AppError, AppResult};

/// Process-level settings every service needs.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Service name used in logs and response metadata.
    pub service_name: String,
    /// Bind host.
    pub host: String,
    /// Bind port.
    pub port: u16,
    /// MySQL URL of the metadata database holding the server registry.
    pub database_url: Option<String>,
    /// Redis URL of the durable catalog cache.
    pub redis_url: Option<String>,
    /// Connect timeout for the service's own stores, in seconds.
    pub connect_timeout_secs: u64,
    /// Pool size for the registry database.
    pub max_connections: u32,
}

impl AppConfig {
    /// Loads `.env` (if present) and then reads the environment.
    ///
    /// Variables already set in the process environment win over `.env`.
    pub fn load_with_service(service_name: &str) -> AppResult<Self> {
        dotenv::dotenv().ok();

        Ok(Self {
            service_name: service_name.to_string(),
            host: env_or("SERVER_HOST", "0.0.0.0".to_string())?,
            port: env_or("SERVER_PORT", 8084)?,
            database_url: env_opt("DATABASE_URL"),
            redis_url: env_opt("REDIS_URL"),
            connect_timeout_secs: env_or("DB_CONNECT_TIMEOUT_SECS", 5)?,
            max_connections: env_or("DB_MAX_CONNECTIONS", 5)?,
        })
    }

    /// Returns the bind address `host:port`.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Reads a non-empty environment variable.
pub fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Reads and parses an environment variable, falling back to `default` when unset.
///
/// # Errors
/// Returns `AppError::Config` when the variable is set but does not parse.
pub fn env_or<T: FromStr>(key: &str, default: T) -> AppResult<T> {
    parse_or(key, env_opt(key), default)
}

fn parse_or<T: FromStr>(key: &str, raw: Option<String>, default: T) -> AppResult<T> {
    match raw {
        None => Ok(default),
        Some(v) => v
            .trim()
            .parse()
            .map_err(|_| AppError::Config(format!("{} has an invalid value: {}", key, v))),
    }
}
