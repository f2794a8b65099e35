//! Unit tests for MS SQL Server driver

use super::*;
use tdsql_core::{ConnectionConfig, DatabaseDriver, TdsqlError};

#[test]
fn test_mssql_driver_id() {
    let driver = MssqlDriver::new();
    assert_eq!(driver.id(), "mssql");
}

#[test]
fn test_mssql_driver_name() {
    let driver = MssqlDriver::new();
    assert_eq!(driver.name(), "mssql");
    assert_eq!(driver.display_name(), "MS SQL Server");
    assert!(!driver.version().is_empty());
}

#[test]
fn test_mssql_default_port() {
    let driver = MssqlDriver::new();
    assert_eq!(driver.default_port(), Some(1433));
}

#[test]
fn test_mssql_capabilities() {
    let driver = MssqlDriver::new();
    let caps = driver.capabilities();

    assert!(caps.supports_transactions);
    assert!(caps.supports_savepoints);
    assert!(caps.supports_prepared_statements);
    assert!(caps.supports_multiple_statements);
    assert!(caps.supports_last_insert_id);
    assert!(caps.supports_ssl);
    assert_eq!(caps.max_identifier_length, Some(128));
    assert_eq!(caps.max_parameters, Some(2100));
}

#[test]
fn test_mssql_parse_connection_string() {
    let driver = MssqlDriver::new();
    let config = driver
        .parse_connection_string("server=localhost,1433;user id=sa;password=pw;database=pubs")
        .unwrap();

    assert_eq!(config.driver, "mssql");
    assert_eq!(config.host, "localhost");
    assert_eq!(config.port, 1433);
    assert_eq!(config.database.as_deref(), Some("pubs"));
}

#[test]
fn test_mssql_parse_connection_string_without_host() {
    let driver = MssqlDriver::new();
    let err = driver.parse_connection_string("database=pubs").unwrap_err();
    assert!(matches!(err, TdsqlError::Configuration(_)));
}

#[test]
fn test_mssql_build_connection_string() {
    let driver = MssqlDriver::new();
    let mut config = ConnectionConfig::new("mssql");
    config.host = "localhost".to_string();
    config.port = 1433;
    config.database = Some("testdb".to_string());
    config.username = Some("sa".to_string());
    config.password = Some("password123".to_string());

    let conn_str = driver.build_connection_string(&config);
    assert_eq!(
        conn_str,
        "Server=localhost,1433;Database=testdb;User Id=sa;Password=password123"
    );
}

#[test]
fn test_mssql_build_connection_string_custom_port() {
    let driver = MssqlDriver::new();
    let mut config = ConnectionConfig::new("mssql");
    config.host = "sqlserver.example.com".to_string();
    config.port = 1434;

    let conn_str = driver.build_connection_string(&config);
    assert!(conn_str.starts_with("Server=sqlserver.example.com,1434"));
}

#[test]
fn test_mssql_connection_string_help() {
    let driver = MssqlDriver::new();
    let help = driver.connection_string_help();
    assert!(help.contains("server="));
    assert!(help.contains("user id="));
    assert!(help.contains("lock_timeout="));
}

#[tokio::test]
async fn test_mssql_open_rejects_bad_dsn_before_connecting() {
    let driver = MssqlDriver::new();
    let err = driver.open("server=db;port=nope").await.err().unwrap();
    assert!(matches!(err, TdsqlError::Configuration(_)));
}

#[tokio::test]
async fn test_mssql_connect_refused() {
    // Port 1 on loopback is never a SQL Server
    let driver = MssqlDriver::new();
    let config = driver
        .parse_connection_string("server=127.0.0.1,1;user id=sa;password=pw;connect_timeout=5")
        .unwrap();
    let err = driver.connect(&config).await.err().unwrap();
    assert!(err.is_connection_lost(), "unexpected error: {err}");
}
