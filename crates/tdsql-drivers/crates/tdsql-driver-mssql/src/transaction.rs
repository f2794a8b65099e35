//! Transactions on a MS SQL Server session

use crate::connection::Session;
use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tdsql_core::{
    ExecResult, QueryResult, Result, Savepoint, SavepointSupport, TdsqlError, Transaction, Value,
};

/// A transaction opened with `BEGIN TRANSACTION`
///
/// The transaction runs on the session of the connection that began it. If
/// it is dropped without `commit` or `rollback`, the session rolls it back
/// before its next round trip.
pub struct MssqlTransaction {
    session: Arc<Session>,
    finished: AtomicBool,
}

impl MssqlTransaction {
    pub(crate) async fn begin(session: Arc<Session>) -> Result<Self> {
        session.batch("BEGIN TRANSACTION").await?;
        tracing::debug!("transaction started");
        Ok(Self {
            session,
            finished: AtomicBool::new(false),
        })
    }

    fn ensure_active(&self) -> Result<()> {
        if self.finished.load(Ordering::SeqCst) {
            return Err(TdsqlError::TransactionFinished);
        }
        Ok(())
    }
}

#[async_trait]
impl Transaction for MssqlTransaction {
    async fn commit(self: Box<Self>) -> Result<()> {
        self.ensure_active()?;
        self.session.batch("COMMIT TRANSACTION").await?;
        self.finished.store(true, Ordering::SeqCst);
        tracing::debug!("transaction committed");
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.ensure_active()?;
        self.session
            .batch("IF @@TRANCOUNT > 0 ROLLBACK TRANSACTION")
            .await?;
        self.finished.store(true, Ordering::SeqCst);
        tracing::debug!("transaction rolled back");
        Ok(())
    }

    async fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        self.ensure_active()?;
        self.session.query(sql, params).await
    }

    async fn execute(&self, sql: &str, params: &[Value]) -> Result<ExecResult> {
        self.ensure_active()?;
        self.session.execute(sql, params).await
    }

    fn as_savepoint_support(&self) -> Option<&dyn SavepointSupport> {
        Some(self)
    }
}

#[async_trait]
impl SavepointSupport for MssqlTransaction {
    async fn savepoint(&self, name: &str) -> Result<Savepoint> {
        self.ensure_active()?;
        let savepoint = Savepoint::new(name)?;
        self.session
            .batch(&format!("SAVE TRANSACTION {}", savepoint.name()))
            .await?;
        Ok(savepoint)
    }

    async fn rollback_to_savepoint(&self, name: &str) -> Result<()> {
        self.ensure_active()?;
        let savepoint = Savepoint::new(name)?;
        self.session
            .batch(&format!("ROLLBACK TRANSACTION {}", savepoint.name()))
            .await
    }

    async fn release_savepoint(&self, name: &str) -> Result<()> {
        self.ensure_active()?;
        // SQL Server has no RELEASE SAVEPOINT
        Savepoint::new(name).map(|_| ())
    }
}

impl Drop for MssqlTransaction {
    fn drop(&mut self) {
        if !self.finished.load(Ordering::SeqCst) {
            tracing::warn!("transaction dropped without commit or rollback");
            self.session.mark_pending_rollback();
        }
    }
}
