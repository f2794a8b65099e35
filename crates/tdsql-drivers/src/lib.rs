//! TDSQL Drivers - database driver implementations
//!
//! This crate re-exports the concrete drivers behind cargo features and
//! provides a [`DriverRegistry`] to look them up by name.

// SQL Databases
#[cfg(feature = "mssql")]
pub use tdsql_driver_mssql as mssql;

mod registry;

pub use registry::DriverRegistry;

/// Re-export commonly used types from tdsql-core
pub use tdsql_core::{
    ColumnMeta, Connection, ConnectionConfig, DatabaseDriver, DriverCapabilities, ExecResult,
    PreparedStatement, QueryResult, Result, Row, TdsqlError, Transaction, Value,
};
