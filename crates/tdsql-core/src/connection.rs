//! Connection, transaction and prepared statement traits

use crate::{ExecResult, QueryResult, Result, Row, SavepointSupport, TdsqlError, Value};
use async_trait::async_trait;

/// A database connection
///
/// Statements use `?` as the positional parameter placeholder regardless of
/// the server's native syntax; drivers rewrite it before execution.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Get the driver name (e.g., "mssql")
    fn driver_name(&self) -> &str;

    /// Execute a statement that modifies data (INSERT/UPDATE/DELETE/DDL)
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<ExecResult>;

    /// Execute a query that returns rows (SELECT)
    async fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResult>;

    /// Execute a query and return its first row
    ///
    /// Fails with [`TdsqlError::NoRows`] when the query returns nothing.
    async fn query_row(&self, sql: &str, params: &[Value]) -> Result<Row> {
        self.query(sql, params)
            .await?
            .into_rows()
            .into_iter()
            .next()
            .ok_or(TdsqlError::NoRows)
    }

    /// Prepare a statement for repeated execution
    async fn prepare(&self, sql: &str) -> Result<Box<dyn PreparedStatement>>;

    /// Begin a transaction
    async fn begin_transaction(&self) -> Result<Box<dyn Transaction>>;

    /// Round-trip to the server to check the connection is alive
    async fn ping(&self) -> Result<()> {
        self.query("SELECT 1", &[]).await.map(|_| ())
    }

    /// Close the connection
    async fn close(&self) -> Result<()>;

    /// Check if the connection is closed
    fn is_closed(&self) -> bool;
}

/// A database transaction
#[async_trait]
pub trait Transaction: Send + Sync {
    /// Commit the transaction
    async fn commit(self: Box<Self>) -> Result<()>;

    /// Rollback the transaction
    async fn rollback(self: Box<Self>) -> Result<()>;

    /// Execute a query within the transaction
    async fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResult>;

    /// Execute a statement within the transaction
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<ExecResult>;

    /// Execute a query within the transaction and return its first row
    async fn query_row(&self, sql: &str, params: &[Value]) -> Result<Row> {
        self.query(sql, params)
            .await?
            .into_rows()
            .into_iter()
            .next()
            .ok_or(TdsqlError::NoRows)
    }

    /// Get savepoint support if the transaction offers it
    fn as_savepoint_support(&self) -> Option<&dyn SavepointSupport> {
        None
    }
}

/// A prepared statement
#[async_trait]
pub trait PreparedStatement: Send + Sync {
    /// SQL text the statement was prepared from
    fn sql(&self) -> &str;

    /// Number of positional parameters the statement expects
    fn parameter_count(&self) -> usize;

    /// Execute the prepared statement with parameters
    async fn execute(&self, params: &[Value]) -> Result<ExecResult>;

    /// Query the prepared statement with parameters
    async fn query(&self, params: &[Value]) -> Result<QueryResult>;

    /// Query the prepared statement and return its first row
    async fn query_row(&self, params: &[Value]) -> Result<Row> {
        self.query(params)
            .await?
            .into_rows()
            .into_iter()
            .next()
            .ok_or(TdsqlError::NoRows)
    }

    /// Close/deallocate the prepared statement
    async fn close(self: Box<Self>) -> Result<()>;
}

/// Check a parameter list against the number of placeholders in a statement
pub fn check_parameter_count(expected: usize, params: &[Value]) -> Result<()> {
    if expected != params.len() {
        return Err(TdsqlError::ParameterCount {
            expected,
            actual: params.len(),
        });
    }
    Ok(())
}
