//! Transaction Tests
//!
//! BEGIN / COMMIT / ROLLBACK through `Database::begin`, savepoints, and
//! transactions dropped without finishing.

use crate::fixtures::{count_rows, create_test_table, drop_test_table, test_database};
use anyhow::Result;
use pretty_assertions::assert_eq;
use rstest::rstest;
use tdsql_connection::PoolConfig;

/// Two inserts in a transaction leave two rows after commit and none after rollback
#[rstest]
#[case::commit(true, 2)]
#[case::rollback(false, 0)]
#[tokio::test]
#[ignore = "requires SQL Server"]
async fn test_transaction(#[case] commit: bool, #[case] expected: i64) -> Result<()> {
    let db = test_database().await?;
    let table = if commit { "tdsql_tx_commit" } else { "tdsql_tx_rollback" };
    create_test_table(&db, table).await?;

    let tx = db.begin().await?;
    let insert = format!("insert into {} (name) values (?)", table);
    tx.exec(&insert, &["Jones".into()]).await?;
    tx.exec(&insert, &["Smith".into()]).await?;

    let inside = tx
        .query_row(&format!("select count(*) from {}", table), &[])
        .await?
        .try_get::<i64>(0)?;
    assert_eq!(inside, 2, "inserts should be visible inside the transaction");

    if commit {
        tx.commit().await?;
    } else {
        tx.rollback().await?;
    }

    assert_eq!(count_rows(&db, table).await?, expected);
    drop_test_table(&db, table).await?;
    Ok(())
}

#[tokio::test]
#[ignore = "requires SQL Server"]
async fn test_savepoint_rollback() -> Result<()> {
    let db = test_database().await?;
    let table = "tdsql_tx_savepoint";
    create_test_table(&db, table).await?;
    let insert = format!("insert into {} (name) values (?)", table);

    let tx = db.begin().await?;
    tx.exec(&insert, &["kept".into()]).await?;
    tx.savepoint("before_second").await?;
    tx.exec(&insert, &["discarded".into()]).await?;
    tx.rollback_to_savepoint("before_second").await?;
    tx.release_savepoint("before_second").await?;
    tx.commit().await?;

    let result = db
        .query(&format!("select name from {}", table), &[])
        .await?;
    let names = result
        .iter()
        .map(|row| row.try_get::<String>(0))
        .collect::<tdsql_core::Result<Vec<_>>>()?;
    assert_eq!(names, vec!["kept"]);

    drop_test_table(&db, table).await?;
    Ok(())
}

/// A transaction dropped mid-flight is rolled back before its connection is reused
#[tokio::test]
#[ignore = "requires SQL Server"]
async fn test_dropped_transaction_rolls_back() -> Result<()> {
    crate::fixtures::initialize_logging();
    let dsn = crate::fixtures::test_dsn().await?;
    let db = tdsql_connection::Database::with_driver(
        std::sync::Arc::new(tdsql_driver_mssql::MssqlDriver::new()),
        tdsql_driver_mssql::parse_dsn(&dsn)?,
        PoolConfig::new(0, 1)?,
    );
    let table = "tdsql_tx_dropped";
    create_test_table(&db, table).await?;

    {
        let tx = db.begin().await?;
        tx.exec(&format!("insert into {} (name) values (?)", table), &["lost".into()])
            .await?;
    }

    // Single-connection pool: this runs on the connection the transaction used.
    let open = db
        .query_row("select @@trancount", &[])
        .await?
        .try_get::<i64>(0)?;
    assert_eq!(open, 0);
    assert_eq!(count_rows(&db, table).await?, 0);

    drop_test_table(&db, table).await?;
    Ok(())
}
