//! MS SQL Server driver implementation

use crate::connection::MssqlConnection;
use crate::dsn::{self, DEFAULT_PORT};
use async_trait::async_trait;
use std::sync::Arc;
use tdsql_core::{Connection, ConnectionConfig, DatabaseDriver, DriverCapabilities, Result};

/// MS SQL Server database driver
pub struct MssqlDriver;

impl MssqlDriver {
    /// Create a new MS SQL Server driver instance
    pub fn new() -> Self {
        tracing::debug!("MS SQL Server driver initialized");
        Self
    }
}

impl Default for MssqlDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DatabaseDriver for MssqlDriver {
    fn id(&self) -> &'static str {
        "mssql"
    }

    fn name(&self) -> &'static str {
        "mssql"
    }

    fn display_name(&self) -> &'static str {
        "MS SQL Server"
    }

    fn default_port(&self) -> Option<u16> {
        Some(DEFAULT_PORT)
    }

    fn capabilities(&self) -> DriverCapabilities {
        DriverCapabilities {
            supports_transactions: true,
            supports_savepoints: true,
            supports_prepared_statements: true,
            supports_multiple_statements: true,
            supports_last_insert_id: true, // SCOPE_IDENTITY()
            supports_ssl: true,
            max_identifier_length: Some(128),
            max_parameters: Some(2100), // SQL Server limit
        }
    }

    #[tracing::instrument(skip(self, config), fields(host = %config.host, database = config.database.as_deref()))]
    async fn connect(&self, config: &ConnectionConfig) -> Result<Arc<dyn Connection>> {
        tracing::debug!("connecting to MS SQL Server");
        let connection = MssqlConnection::from_config(config).await?;
        Ok(Arc::new(connection))
    }

    fn parse_connection_string(&self, conn_str: &str) -> Result<ConnectionConfig> {
        dsn::parse_dsn(conn_str)
    }

    fn build_connection_string(&self, config: &ConnectionConfig) -> String {
        dsn::build_connection_string(config)
    }

    fn connection_string_help(&self) -> &'static str {
        "server=host[,port];port=1433;database=dbname;user id=user;password=pass;\
         encrypt=true|false|not_supported;trust_server_certificate=true;\
         mirror=host[,port];app=name;lock_timeout=ms;connect_timeout=s;max_pool_size=n"
    }
}
