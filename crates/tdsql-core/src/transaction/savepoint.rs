//! Savepoint support for database transactions
//!
//! A savepoint is a named point within a transaction that can be rolled back
//! to without aborting the whole transaction.

use crate::{Result, TdsqlError};
use async_trait::async_trait;

/// A savepoint within a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Savepoint {
    name: String,
}

impl Savepoint {
    /// Create a savepoint handle, validating the name.
    ///
    /// Names are interpolated into SQL, so only identifier characters are
    /// accepted: a letter or underscore followed by letters, digits or
    /// underscores, at most 32 characters (the SQL Server limit).
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        validate_savepoint_name(&name)?;
        Ok(Self { name })
    }

    /// Get the name of the savepoint.
    pub fn name(&self) -> &str {
        &self.name
    }
}

fn validate_savepoint_name(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid_start = chars
        .next()
        .map(|c| c.is_ascii_alphabetic() || c == '_')
        .unwrap_or(false);
    if !valid_start || name.len() > 32 || !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(TdsqlError::Query(format!("invalid savepoint name: '{}'", name)));
    }
    Ok(())
}

/// Trait for transactions that support savepoints.
///
/// ```ignore
/// let tx = conn.begin_transaction().await?;
/// tx.execute("INSERT INTO authors (au_id) VALUES (?)", &["111-11-1111".into()]).await?;
///
/// let sp = tx.as_savepoint_support().unwrap();
/// sp.savepoint("before_second").await?;
/// tx.execute("INSERT INTO authors (au_id) VALUES (?)", &["222-22-2222".into()]).await?;
/// sp.rollback_to_savepoint("before_second").await?;
///
/// tx.commit().await?; // only the first insert survives
/// ```
#[async_trait]
pub trait SavepointSupport: Send + Sync {
    /// Create a savepoint with the given name.
    async fn savepoint(&self, name: &str) -> Result<Savepoint>;

    /// Rollback to a previously created savepoint.
    ///
    /// All changes made after the savepoint was created are undone; the
    /// transaction itself stays open.
    async fn rollback_to_savepoint(&self, name: &str) -> Result<()>;

    /// Release a savepoint.
    ///
    /// Servers without an explicit release (SQL Server) treat this as a no-op;
    /// savepoints go away when the transaction ends.
    async fn release_savepoint(&self, name: &str) -> Result<()>;
}
