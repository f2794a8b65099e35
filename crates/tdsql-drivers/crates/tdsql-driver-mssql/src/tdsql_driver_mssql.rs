//! MS SQL Server driver for TDSQL
//!
//! Adapts the `tiberius` TDS client to the `tdsql-core` interfaces:
//!
//! - DSN parsing (`server=...;user id=...;password=...`)
//! - `?` placeholders rewritten to `@P1`, `@P2`, ...
//! - rows affected and `SCOPE_IDENTITY()` reported for every exec
//! - transactions with savepoints, prepared statements
//! - mirror failover and routing redirects at connect time

mod connection;
mod dialect;
mod driver;
pub mod dsn;
mod statement;
mod transaction;

#[cfg(test)]
mod connection_tests;
#[cfg(test)]
mod dialect_tests;
#[cfg(test)]
mod driver_tests;
#[cfg(test)]
mod dsn_tests;

pub use connection::{MssqlConnection, MssqlConnectionError};
pub use dialect::{MssqlDialect, RewrittenSql};
pub use driver::MssqlDriver;
pub use dsn::{MssqlConnectOptions, build_connection_string, parse_dsn};
pub use statement::MssqlPreparedStatement;
pub use transaction::MssqlTransaction;
