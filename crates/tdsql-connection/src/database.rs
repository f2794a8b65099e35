//! The database handle: a driver, its DSN and a pool of connections

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tdsql_core::{
    Connection, ConnectionConfig, DatabaseDriver, ExecResult, QueryResult, Result, Row,
    Savepoint, TdsqlError, Transaction, Value, check_parameter_count,
};
use tdsql_drivers::DriverRegistry;

use crate::pool::{ConnectionFactory, ConnectionPool, PoolConfig, PoolStats, PooledConnection};

/// Opens connections for the pool through a driver
struct DriverFactory {
    driver: Arc<dyn DatabaseDriver>,
    config: ConnectionConfig,
}

#[async_trait]
impl ConnectionFactory for DriverFactory {
    async fn create(&self) -> Result<Arc<dyn Connection>> {
        self.driver.connect(&self.config).await
    }
}

/// A handle to a database
///
/// Opening a handle does not touch the network; connections are made on
/// first use and pooled. All statements use `?` placeholders.
///
/// ```ignore
/// let db = Database::open("mssql", "server=localhost;user id=sa;password=...;database=pubs")?;
///
/// let row = db
///     .query_row("select au_fname, au_lname from authors where au_id = ?", &["172-32-1176".into()])
///     .await?;
/// let (first, last): (String, String) = row.scan()?;
/// ```
pub struct Database {
    driver: Arc<dyn DatabaseDriver>,
    config: ConnectionConfig,
    pool: ConnectionPool,
}

impl Database {
    /// Open a handle using the built-in drivers
    pub fn open(driver_name: &str, dsn: &str) -> Result<Self> {
        Self::open_with_registry(&DriverRegistry::with_defaults(), driver_name, dsn)
    }

    /// Open a handle using a driver from `registry`
    ///
    /// Fails with [`TdsqlError::NotFound`] for an unknown driver and with the
    /// driver's parse error for a malformed DSN.
    pub fn open_with_registry(registry: &DriverRegistry, driver_name: &str, dsn: &str) -> Result<Self> {
        let driver = registry
            .get(driver_name)
            .ok_or_else(|| TdsqlError::NotFound(format!("unknown driver '{}'", driver_name)))?;
        let config = driver.parse_connection_string(dsn)?;
        let pool_config = PoolConfig::from_connection_config(&config)?;
        Ok(Self::with_driver(driver, config, pool_config))
    }

    /// Build a handle from an already resolved driver and configuration
    pub fn with_driver(
        driver: Arc<dyn DatabaseDriver>,
        config: ConnectionConfig,
        pool_config: PoolConfig,
    ) -> Self {
        tracing::debug!(
            driver = driver.name(),
            host = %config.host,
            max_pool_size = pool_config.max_size(),
            "database handle opened"
        );
        let factory = DriverFactory {
            driver: Arc::clone(&driver),
            config: config.clone(),
        };
        Self {
            driver,
            config,
            pool: ConnectionPool::new(pool_config, factory),
        }
    }

    /// Open a handle and verify the server is reachable
    pub async fn connect(driver_name: &str, dsn: &str) -> Result<Self> {
        let db = Self::open(driver_name, dsn)?;
        db.pool.warm_up().await?;
        db.ping().await?;
        Ok(db)
    }

    pub fn driver(&self) -> &Arc<dyn DatabaseDriver> {
        &self.driver
    }

    /// Configuration parsed from the DSN
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Round-trip to the server
    pub async fn ping(&self) -> Result<()> {
        let conn = self.pool.get().await?;
        let result = conn.ping().await;
        settle(&conn, result).await
    }

    /// Run a query and collect its rows
    pub async fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        let conn = self.pool.get().await?;
        let result = conn.query(sql, params).await;
        settle(&conn, result).await
    }

    /// Run a query and return its first row
    ///
    /// Fails with [`TdsqlError::NoRows`] when nothing matches.
    pub async fn query_row(&self, sql: &str, params: &[Value]) -> Result<Row> {
        let conn = self.pool.get().await?;
        let result = conn.query_row(sql, params).await;
        settle(&conn, result).await
    }

    /// Run a statement that returns no rows
    pub async fn exec(&self, sql: &str, params: &[Value]) -> Result<ExecResult> {
        let conn = self.pool.get().await?;
        let result = conn.execute(sql, params).await;
        settle(&conn, result).await
    }

    /// Prepare a statement for repeated use
    ///
    /// The statement is checked by preparing it once; each later use
    /// prepares it again on whichever pooled connection runs it.
    pub async fn prepare(&self, sql: &str) -> Result<Statement<'_>> {
        let conn = self.pool.get().await?;
        let prepared = settle(&conn, conn.prepare(sql).await).await?;
        let parameter_count = prepared.parameter_count();
        prepared.close().await?;

        Ok(Statement {
            db: self,
            sql: sql.to_string(),
            parameter_count,
            closed: AtomicBool::new(false),
        })
    }

    /// Begin a transaction on a connection reserved for its lifetime
    pub async fn begin(&self) -> Result<Tx<'_>> {
        let conn = self.pool.get().await?;
        let tx = settle(&conn, conn.begin_transaction().await).await?;
        Ok(Tx {
            tx: Some(tx),
            _conn: conn,
        })
    }

    /// Close idle connections and refuse further use
    pub async fn close(&self) -> Result<()> {
        self.pool.close().await;
        tracing::debug!(driver = self.driver.name(), "database handle closed");
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.pool.is_closed()
    }

    /// Pool statistics
    pub fn stats(&self) -> PoolStats {
        self.pool.stats()
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("driver", &self.driver.name())
            .field("config", &self.config)
            .field("stats", &self.pool.stats())
            .finish()
    }
}

/// Drop a connection from the pool when an error says it is unusable
async fn settle<T>(conn: &PooledConnection<'_>, result: Result<T>) -> Result<T> {
    if let Err(e) = &result {
        if e.is_connection_lost() {
            tracing::warn!(error = %e, "discarding broken connection");
            conn.discard().await;
        }
    }
    result
}

/// A prepared statement bound to a [`Database`]
pub struct Statement<'a> {
    db: &'a Database,
    sql: String,
    parameter_count: usize,
    closed: AtomicBool,
}

impl<'a> Statement<'a> {
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Number of `?` placeholders
    pub fn parameter_count(&self) -> usize {
        self.parameter_count
    }

    fn check(&self, params: &[Value]) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TdsqlError::StatementClosed);
        }
        check_parameter_count(self.parameter_count, params)
    }

    /// Run the statement as a query
    pub async fn query(&self, params: &[Value]) -> Result<QueryResult> {
        self.check(params)?;
        let conn = self.db.pool.get().await?;
        let result = match conn.prepare(&self.sql).await {
            Ok(stmt) => stmt.query(params).await,
            Err(e) => Err(e),
        };
        settle(&conn, result).await
    }

    /// Run the statement as a query and return its first row
    pub async fn query_row(&self, params: &[Value]) -> Result<Row> {
        self.query(params)
            .await?
            .into_rows()
            .into_iter()
            .next()
            .ok_or(TdsqlError::NoRows)
    }

    /// Run the statement for its side effects
    pub async fn exec(&self, params: &[Value]) -> Result<ExecResult> {
        self.check(params)?;
        let conn = self.db.pool.get().await?;
        let result = match conn.prepare(&self.sql).await {
            Ok(stmt) => stmt.execute(params).await,
            Err(e) => Err(e),
        };
        settle(&conn, result).await
    }

    /// Close the statement; later uses fail with [`TdsqlError::StatementClosed`]
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// A transaction begun from a [`Database`]
///
/// Dropping a `Tx` without calling [`Tx::commit`] or [`Tx::rollback`] rolls
/// the transaction back.
pub struct Tx<'a> {
    // Declared first so the transaction is dropped before its connection
    // goes back to the pool.
    tx: Option<Box<dyn Transaction>>,
    _conn: PooledConnection<'a>,
}

impl<'a> Tx<'a> {
    fn active(&self) -> Result<&dyn Transaction> {
        self.tx.as_deref().ok_or(TdsqlError::TransactionFinished)
    }

    pub async fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        self.active()?.query(sql, params).await
    }

    pub async fn query_row(&self, sql: &str, params: &[Value]) -> Result<Row> {
        self.active()?.query_row(sql, params).await
    }

    pub async fn exec(&self, sql: &str, params: &[Value]) -> Result<ExecResult> {
        self.active()?.execute(sql, params).await
    }

    /// Make the transaction's changes durable
    pub async fn commit(mut self) -> Result<()> {
        let tx = self.tx.take().ok_or(TdsqlError::TransactionFinished)?;
        tx.commit().await
    }

    /// Discard the transaction's changes
    pub async fn rollback(mut self) -> Result<()> {
        let tx = self.tx.take().ok_or(TdsqlError::TransactionFinished)?;
        tx.rollback().await
    }

    pub async fn savepoint(&self, name: &str) -> Result<Savepoint> {
        self.savepoints()?.savepoint(name).await
    }

    pub async fn rollback_to_savepoint(&self, name: &str) -> Result<()> {
        self.savepoints()?.rollback_to_savepoint(name).await
    }

    pub async fn release_savepoint(&self, name: &str) -> Result<()> {
        self.savepoints()?.release_savepoint(name).await
    }

    fn savepoints(&self) -> Result<&dyn tdsql_core::SavepointSupport> {
        self.active()?
            .as_savepoint_support()
            .ok_or_else(|| TdsqlError::NotSupported("savepoints".into()))
    }
}
