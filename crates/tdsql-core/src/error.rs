//! Error types for TDSQL

use thiserror::Error;

/// Core error type for TDSQL operations
#[derive(Error, Debug)]
pub enum TdsqlError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Query error: {0}")]
    Query(String),

    #[error("Driver error: {0}")]
    Driver(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Conversion error: {0}")]
    Conversion(String),

    #[error("Expected {expected} parameters, got {actual}")]
    ParameterCount { expected: usize, actual: usize },

    #[error("No rows in result set")]
    NoRows,

    #[error("No last insert id available for this statement")]
    NoLastInsertId,

    #[error("Transaction has already been committed or rolled back")]
    TransactionFinished,

    #[error("Statement is closed")]
    StatementClosed,

    #[error("Connection is closed")]
    ConnectionClosed,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Not supported: {0}")]
    NotSupported(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("{0}")]
    Other(String),
}

impl TdsqlError {
    /// Whether the error means the connection can no longer be used
    pub fn is_connection_lost(&self) -> bool {
        matches!(
            self,
            TdsqlError::Connection(_) | TdsqlError::ConnectionClosed | TdsqlError::Io(_)
        )
    }
}

/// Result type alias for TDSQL operations
pub type Result<T> = std::result::Result<T, TdsqlError>;
