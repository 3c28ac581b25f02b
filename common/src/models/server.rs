//! Server registry models.
//!
//! A `Server` is owned by the registry and read-only to the catalog core.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Database server type.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ServerType {
    /// PostgreSQL server.
    Postgresql,
    /// MySQL server.
    Mysql,
    /// Microsoft SQL Server.
    Sqlserver,
}

impl ServerType {
    /// Returns the default port for this server type.
    pub fn default_port(&self) -> u16 {
        match self {
            ServerType::Postgresql => 5432,
            ServerType::Mysql => 3306,
            ServerType::Sqlserver => 1433,
        }
    }
}

impl fmt::Display for ServerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerType::Postgresql => write!(f, "postgresql"),
            ServerType::Mysql => write!(f, "mysql"),
            ServerType::Sqlserver => write!(f, "sqlserver"),
        }
    }
}

impl FromStr for ServerType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "postgresql" | "postgres" => Ok(ServerType::Postgresql),
            "mysql" => Ok(ServerType::Mysql),
            "sqlserver" | "mssql" => Ok(ServerType::Sqlserver),
            other => Err(format!("unknown server type: {}", other)),
        }
    }
}

/// A registered database server.
#[derive(Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Server {
    /// Unique server identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Host name or address.
    pub host: String,
    /// Port number.
    pub port: u16,
    /// Login user.
    pub username: String,
    /// Vault ciphertext of the password. Never serialized.
    #[serde(skip_serializing, default)]
    pub encrypted_password: String,
    /// Server type.
    #[serde(rename = "type")]
    pub server_type: ServerType,
    /// Inactive servers are never probed.
    pub is_active: bool,
}

impl fmt::Debug for Server {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Server")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("encrypted_password", &"<redacted>")
            .field("server_type", &self.server_type)
            .field("is_active", &self.is_active)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server() -> Server {
        Server {
            id: "srv-1".into(),
            name: "primary".into(),
            host: "db1.internal".into(),
            port: 5432,
            username: "catalog".into(),
            encrypted_password: "00ff:abcd".into(),
            server_type: ServerType::Postgresql,
            is_active: true,
        }
    }

    #[test]
    fn test_password_is_not_serialized() {
        let json = serde_json::to_value(server()).unwrap();
        assert!(json.get("encryptedPassword").is_none());
        assert_eq!(json["type"], "postgresql");
        assert_eq!(json["isActive"], true);
    }

    #[test]
    fn test_password_is_not_debug_printed() {
        let printed = format!("{:?}", server());
        assert!(!printed.contains("00ff:abcd"));
        assert!(printed.contains("<redacted>"));
    }

    #[test]
    fn test_server_type_parsing() {
        assert_eq!("postgres".parse::<ServerType>().unwrap(), ServerType::Postgresql);
        assert_eq!("SQLServer".parse::<ServerType>().unwrap(), ServerType::Sqlserver);
        assert!("oracle".parse::<ServerType>().is_err());
        assert_eq!(ServerType::Mysql.default_port(), 3306);
    }
}
