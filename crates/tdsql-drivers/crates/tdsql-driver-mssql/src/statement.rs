//! Prepared statements for MS SQL Server

use crate::connection::Session;
use async_trait::async_trait;
use std::sync::Arc;
use tdsql_core::{
    ExecResult, PreparedStatement, QueryResult, Result, Value, check_parameter_count,
};

/// A statement whose placeholders were rewritten once at prepare time
///
/// Each execution is a parameterized `sp_executesql` call, so the server
/// caches the plan across executions.
pub struct MssqlPreparedStatement {
    session: Arc<Session>,
    sql: String,
    rewritten: String,
    parameter_count: usize,
}

impl MssqlPreparedStatement {
    pub(crate) fn new(session: Arc<Session>, sql: &str) -> Self {
        let rewritten = session.dialect.rewrite_placeholders(sql);
        tracing::debug!(
            parameter_count = rewritten.parameter_count,
            "statement prepared"
        );
        Self {
            session,
            sql: sql.to_string(),
            rewritten: rewritten.sql,
            parameter_count: rewritten.parameter_count,
        }
    }
}

#[async_trait]
impl PreparedStatement for MssqlPreparedStatement {
    fn sql(&self) -> &str {
        &self.sql
    }

    fn parameter_count(&self) -> usize {
        self.parameter_count
    }

    async fn execute(&self, params: &[Value]) -> Result<ExecResult> {
        check_parameter_count(self.parameter_count, params)?;
        self.session.execute_rewritten(&self.rewritten, params).await
    }

    async fn query(&self, params: &[Value]) -> Result<QueryResult> {
        check_parameter_count(self.parameter_count, params)?;
        self.session.query_rewritten(&self.rewritten, params).await
    }

    async fn close(self: Box<Self>) -> Result<()> {
        tracing::trace!(sql = %self.sql, "statement closed");
        Ok(())
    }
}

impl std::fmt::Debug for MssqlPreparedStatement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MssqlPreparedStatement")
            .field("sql", &self.sql)
            .field("parameter_count", &self.parameter_count)
            .finish()
    }
}
