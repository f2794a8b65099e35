//! Test fixtures for the SQL Server integration suite.
//!
//! Tests get a [`Database`] handle pointed at a server seeded with a slice of
//! the `pubs` sample database. The server is either the one named by the
//! `TDSQL_TEST_DSN` environment variable or a container started on demand by
//! [`crate::test_containers`].
//!
//! ```rust,ignore
//! use crate::fixtures::test_database;
//!
//! #[tokio::test]
//! #[ignore = "requires SQL Server"]
//! async fn test_select() -> anyhow::Result<()> {
//!     let db = test_database().await?;
//!     let row = db.query_row("select au_fname from authors where au_id = ?", &["172-32-1176".into()]).await?;
//!     Ok(())
//! }
//! ```

use anyhow::{Context, Result};
use indoc::{formatdoc, indoc};
use once_cell::sync::Lazy;
use std::env;
use std::sync::Mutex;
use std::time::Duration;
use tdsql_connection::Database;
use tdsql_core::{Connection, DatabaseDriver};
use tdsql_driver_mssql::MssqlDriver;

use crate::test_containers::mssql_container;

/// Environment variable naming an already running server
pub const TEST_DSN_VAR: &str = "TDSQL_TEST_DSN";

/// Driver name every test opens
pub const DRIVER: &str = "mssql";

/// Rows of the `authors` table the suite relies on
pub const AUTHORS: &[(&str, &str, &str)] = &[
    ("172-32-1176", "White", "Johnson"),
    ("213-46-8915", "Green", "Marjorie"),
    ("238-95-7766", "Carson", "Cheryl"),
    ("267-41-2394", "O'Leary", "Michael"),
    ("899-46-2035", "Ringer", "Anne"),
    ("998-72-3567", "Ringer", "Albert"),
];

/// DSN resolved for this test process
static TEST_DSN: Lazy<Mutex<Option<String>>> = Lazy::new(|| Mutex::new(None));

/// Resolve the DSN of the server under test
///
/// Uses `TDSQL_TEST_DSN` when set, seeding that database once. Otherwise a
/// SQL Server container is started and seeded.
pub async fn test_dsn() -> Result<String> {
    {
        let guard = TEST_DSN
            .lock()
            .map_err(|e| anyhow::anyhow!("failed to lock test dsn: {}", e))?;
        if let Some(dsn) = &*guard {
            return Ok(dsn.clone());
        }
    }

    let dsn = match env::var(TEST_DSN_VAR) {
        Ok(dsn) if !dsn.trim().is_empty() => {
            tracing::info!("using server from {}", TEST_DSN_VAR);
            seed(&dsn).await?;
            dsn
        }
        _ => mssql_container()
            .await
            .context("failed to start SQL Server container - is Docker running?")?
            .dsn(),
    };

    let mut guard = TEST_DSN
        .lock()
        .map_err(|e| anyhow::anyhow!("failed to lock test dsn: {}", e))?;
    Ok(guard.get_or_insert(dsn).clone())
}

/// Open a database handle against the seeded test server
///
/// Retries with a growing delay while the server is still starting up.
pub async fn test_database() -> Result<Database> {
    initialize_logging();
    let dsn = test_dsn().await?;
    connect_with_retry(&dsn, 5, 2).await
}

/// Open a single driver-level connection against the seeded test server
pub async fn test_connection() -> Result<std::sync::Arc<dyn Connection>> {
    initialize_logging();
    let dsn = test_dsn().await?;
    MssqlDriver::new()
        .open(&dsn)
        .await
        .context("failed to open SQL Server connection")
}

async fn connect_with_retry(dsn: &str, max_attempts: u32, base_delay_secs: u64) -> Result<Database> {
    let mut attempt = 1;
    loop {
        match Database::connect(DRIVER, dsn).await {
            Ok(db) => {
                if attempt > 1 {
                    tracing::info!(attempts = attempt, "database ready after retry");
                }
                return Ok(db);
            }
            Err(e) if attempt < max_attempts => {
                let delay = Duration::from_secs(base_delay_secs * attempt as u64);
                tracing::warn!(
                    attempt,
                    max_attempts,
                    delay_secs = delay.as_secs(),
                    error = %e,
                    "database not ready, retrying..."
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => {
                return Err(anyhow::Error::new(e).context(format!(
                    "database not ready after {} attempts",
                    max_attempts
                )));
            }
        }
    }
}

/// Create `name` on the server reached through `master_dsn` if it is missing
pub async fn create_database(master_dsn: &str, name: &str) -> Result<()> {
    let db = connect_with_retry(master_dsn, 10, 2).await?;
    db.exec(&format!("if db_id('{0}') is null create database [{0}]", name), &[])
        .await
        .with_context(|| format!("failed to create database {}", name))?;
    db.close().await?;
    Ok(())
}

/// Create and fill the `authors` table unless it already exists
pub async fn seed(dsn: &str) -> Result<()> {
    let db = connect_with_retry(dsn, 10, 2).await?;

    db.exec(
        indoc! {"
            if not exists (select * from sys.tables where name = 'authors')
            create table authors (
                au_id varchar(11) not null primary key,
                au_lname varchar(40) not null,
                au_fname varchar(20) not null,
                contract bit not null default 1
            )
        "},
        &[],
    )
    .await
    .context("failed to create authors table")?;

    let existing = db
        .query_row("select count(*) from authors", &[])
        .await?
        .try_get::<i64>(0)?;
    if existing == 0 {
        let insert = db
            .prepare("insert into authors (au_id, au_lname, au_fname) values (?, ?, ?)")
            .await?;
        for (id, last, first) in AUTHORS {
            insert
                .exec(&[(*id).into(), (*last).into(), (*first).into()])
                .await
                .with_context(|| format!("failed to insert author {}", id))?;
        }
    }

    tracing::info!(authors = AUTHORS.len(), "pubs sample data ready");
    db.close().await?;
    Ok(())
}

/// Drop and recreate `name` as an identity table
///
/// Each test uses its own table so tests can run concurrently.
pub async fn create_test_table(db: &Database, name: &str) -> Result<()> {
    db.exec(
        &formatdoc! {"
            if exists (select * from sys.tables where name = '{0}') drop table {0};
            create table {0} (id int not null identity, name varchar(255))
        ", name},
        &[],
    )
    .await
    .with_context(|| format!("failed to create test table {}", name))?;
    Ok(())
}

/// Drop a table created by a test
pub async fn drop_test_table(db: &Database, name: &str) -> Result<()> {
    db.exec(
        &format!("if exists (select * from sys.tables where name = '{0}') drop table {0}", name),
        &[],
    )
    .await?;
    Ok(())
}

/// Count the rows of `table`
pub async fn count_rows(db: &Database, table: &str) -> Result<i64> {
    let row = db
        .query_row(&format!("select count(*) from {}", table), &[])
        .await?;
    Ok(row.try_get::<i64>(0)?)
}

/// Initialize logging for tests if not already initialized
///
/// `RUST_LOG` overrides the default of debug output for the TDSQL crates.
pub fn initialize_logging() {
    use std::sync::Once;
    static INIT: Once = Once::new();

    INIT.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("tdsql=debug"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}
