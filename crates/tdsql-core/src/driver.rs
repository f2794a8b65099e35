//! Database driver trait definition

use crate::{Connection, Result, TdsqlError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Capabilities that a driver may support
#[derive(Debug, Clone, Default)]
pub struct DriverCapabilities {
    /// Supports transactions
    pub supports_transactions: bool,
    /// Supports savepoints
    pub supports_savepoints: bool,
    /// Supports prepared statements
    pub supports_prepared_statements: bool,
    /// Supports multiple statements in one batch
    pub supports_multiple_statements: bool,
    /// Reports the identity value generated by an insert
    pub supports_last_insert_id: bool,
    /// Supports SSL/TLS
    pub supports_ssl: bool,
    /// Maximum identifier length (None = no limit)
    pub max_identifier_length: Option<usize>,
    /// Maximum parameters per statement (None = no limit)
    pub max_parameters: Option<usize>,
}

/// Core driver trait that all database drivers must implement
#[async_trait]
pub trait DatabaseDriver: Send + Sync {
    /// Unique identifier for this driver (e.g., "mssql")
    fn id(&self) -> &'static str {
        self.name()
    }

    /// Registry name of the driver
    fn name(&self) -> &'static str;

    /// Human-readable name
    fn display_name(&self) -> &'static str {
        self.name()
    }

    /// Driver version
    fn version(&self) -> &'static str {
        env!("CARGO_PKG_VERSION")
    }

    /// Supported features/capabilities
    fn capabilities(&self) -> DriverCapabilities;

    /// Default connection port
    fn default_port(&self) -> Option<u16> {
        None
    }

    /// Connection string format help text
    fn connection_string_help(&self) -> &'static str {
        ""
    }

    /// Create a new connection
    async fn connect(&self, config: &ConnectionConfig) -> Result<Arc<dyn Connection>>;

    /// Parse a DSN and connect in one step
    async fn open(&self, dsn: &str) -> Result<Arc<dyn Connection>> {
        let config = self.parse_connection_string(dsn)?;
        self.connect(&config).await
    }

    /// Test connection without keeping it open
    async fn test_connection(&self, config: &ConnectionConfig) -> Result<()> {
        let conn = self.connect(config).await?;
        conn.ping().await?;
        conn.close().await
    }

    /// Parse a connection string into a configuration
    fn parse_connection_string(&self, _conn_str: &str) -> Result<ConnectionConfig> {
        Err(TdsqlError::NotSupported(
            "Connection string parsing not implemented for this driver".into(),
        ))
    }

    /// Build a connection string from configuration
    fn build_connection_string(&self, config: &ConnectionConfig) -> String;
}

/// Connection configuration
///
/// Usually produced by a driver from a DSN, but can also be loaded from TOML:
///
/// ```toml
/// driver = "mssql"
/// host = "db.internal"
/// port = 1433
/// database = "pubs"
/// username = "sa"
/// password = "secret"
///
/// [params]
/// max_pool_size = "20"
/// ```
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Driver ID (e.g., "mssql")
    #[serde(default)]
    pub driver: String,
    /// Host address
    #[serde(default)]
    pub host: String,
    /// Port number (0 for the driver default)
    #[serde(default)]
    pub port: u16,
    /// Database name
    #[serde(default)]
    pub database: Option<String>,
    /// Username
    #[serde(default)]
    pub username: Option<String>,
    /// Password
    #[serde(default)]
    pub password: Option<String>,
    /// Additional connection parameters
    #[serde(default)]
    pub params: HashMap<String, String>,
}

impl ConnectionConfig {
    /// Create a new configuration with default values
    pub fn new(driver: &str) -> Self {
        Self {
            driver: driver.to_string(),
            ..Self::default()
        }
    }

    /// Load a configuration from a TOML document
    pub fn from_toml_str(source: &str) -> Result<Self> {
        toml::from_str(source).map_err(|e| TdsqlError::Configuration(e.to_string()))
    }

    /// Set a connection parameter
    pub fn with_param(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        let val = value.into();
        let str_val = match val {
            serde_json::Value::String(s) => s,
            other => other.to_string(),
        };
        self.params.insert(key.to_string(), str_val);
        self
    }

    /// Get a string parameter
    pub fn get_string(&self, key: &str) -> Option<String> {
        if let Some(val) = self.params.get(key) {
            return Some(val.clone());
        }
        match key {
            "host" if !self.host.is_empty() => Some(self.host.clone()),
            "database" => self.database.clone(),
            "username" | "user" => self.username.clone(),
            "password" => self.password.clone(),
            _ => None,
        }
    }

    /// Get a boolean parameter; accepts true/false, yes/no, 1/0
    pub fn get_bool(&self, key: &str) -> Result<Option<bool>> {
        match self.params.get(key) {
            None => Ok(None),
            Some(raw) => parse_bool(raw).map(Some).ok_or_else(|| {
                TdsqlError::Configuration(format!("invalid boolean for '{}': {}", key, raw))
            }),
        }
    }

    /// Get an unsigned integer parameter
    pub fn get_u64(&self, key: &str) -> Result<Option<u64>> {
        match self.params.get(key) {
            None => Ok(None),
            Some(raw) => raw.trim().parse::<u64>().map(Some).map_err(|_| {
                TdsqlError::Configuration(format!("invalid number for '{}': {}", key, raw))
            }),
        }
    }

    /// Get port
    pub fn get_port(&self) -> u16 {
        self.port
    }
}

impl std::fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("driver", &self.driver)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("params", &self.params)
            .finish()
    }
}

/// Parse the boolean spellings accepted in connection strings
pub fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "1" | "on" => Some(true),
        "false" | "no" | "0" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;

    #[test]
    fn test_config_from_toml() {
        let config = ConnectionConfig::from_toml_str(indoc! {r#"
            driver = "mssql"
            host = "db.internal"
            port = 1433
            database = "pubs"
            username = "sa"
            password = "secret"

            [params]
            max_pool_size = "20"
            trust_server_certificate = "yes"
        "#})
        .unwrap();

        assert_eq!(config.driver, "mssql");
        assert_eq!(config.get_string("host").as_deref(), Some("db.internal"));
        assert_eq!(config.get_port(), 1433);
        assert_eq!(config.get_string("user").as_deref(), Some("sa"));
        assert_eq!(config.get_u64("max_pool_size").unwrap(), Some(20));
        assert_eq!(config.get_bool("trust_server_certificate").unwrap(), Some(true));
        assert_eq!(config.get_bool("encrypt").unwrap(), None);
    }

    #[test]
    fn test_config_from_invalid_toml() {
        let err = ConnectionConfig::from_toml_str("port = \"not a number\"").unwrap_err();
        assert!(matches!(err, TdsqlError::Configuration(_)));
    }

    #[test]
    fn test_config_invalid_param_values() {
        let config = ConnectionConfig::new("mssql")
            .with_param("lock_timeout", "soon")
            .with_param("encrypt", "maybe");
        assert!(config.get_u64("lock_timeout").is_err());
        assert!(config.get_bool("encrypt").is_err());
    }

    #[test]
    fn test_config_with_param_numbers() {
        let config = ConnectionConfig::new("mssql").with_param("lock_timeout", 500);
        assert_eq!(config.get_u64("lock_timeout").unwrap(), Some(500));
    }

    #[test]
    fn test_config_debug_hides_password() {
        let mut config = ConnectionConfig::new("mssql");
        config.password = Some("hunter2".into());
        let debug = format!("{:?}", config);
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("***"));
    }
}
