//! Connection Tests
//!
//! Opening handles and connections, pinging, and closed-handle behavior.

use crate::fixtures::{DRIVER, test_connection, test_database, test_dsn};
use anyhow::Result;
use pretty_assertions::assert_eq;
use tdsql_connection::Database;
use tdsql_core::{Connection, TdsqlError};
use tdsql_driver_mssql::MssqlConnection;

/// Opening a handle validates the DSN without touching the server
#[tokio::test]
#[ignore = "requires SQL Server"]
async fn test_open() -> Result<()> {
    let dsn = test_dsn().await?;
    let db = Database::open(DRIVER, &dsn)?;
    assert_eq!(db.stats().total(), 0);

    db.ping().await?;
    assert_eq!(db.stats().idle(), 1);
    db.close().await?;
    Ok(())
}

/// The driver-level open returns a concrete connection
#[tokio::test]
#[ignore = "requires SQL Server"]
async fn test_driver_open() -> Result<()> {
    crate::fixtures::initialize_logging();
    let dsn = test_dsn().await?;
    let conn = MssqlConnection::open(&dsn).await?;
    assert!(conn.database().is_some());
    assert_eq!(conn.driver_name(), DRIVER);
    Ok(())
}

#[tokio::test]
#[ignore = "requires SQL Server"]
async fn test_connection_ping_and_close() -> Result<()> {
    let conn = test_connection().await?;
    conn.ping().await?;
    assert!(!conn.is_closed());

    conn.close().await?;
    assert!(conn.is_closed());
    assert!(matches!(
        conn.query("select 1", &[]).await,
        Err(TdsqlError::ConnectionClosed)
    ));
    Ok(())
}

#[tokio::test]
#[ignore = "requires SQL Server"]
async fn test_closed_database_rejects_queries() -> Result<()> {
    let db = test_database().await?;
    db.close().await?;
    assert!(db.is_closed());
    assert!(matches!(
        db.query("select 1", &[]).await,
        Err(TdsqlError::ConnectionClosed)
    ));
    Ok(())
}

#[tokio::test]
#[ignore = "requires SQL Server"]
async fn test_bad_password_fails() -> Result<()> {
    let dsn = test_dsn().await?;
    let dsn = format!("{};password=not-the-password", dsn);
    let db = Database::open(DRIVER, &dsn)?;
    let err = db.ping().await.unwrap_err();
    assert!(matches!(err, TdsqlError::Connection(_)));
    assert!(
        err.to_string().to_lowercase().contains("login"),
        "unexpected error: {}",
        err
    );
    Ok(())
}
