//! TDSQL Core - the standard relational access interface
//!
//! This crate provides the traits and types that drivers implement and that
//! the database handle consumes:
//!
//! - `DatabaseDriver` - Trait for database driver implementations
//! - `Connection`, `Transaction`, `PreparedStatement` - statement execution
//! - `Value`, `Row`, `QueryResult`, `ExecResult` - data exchanged with drivers
//! - `FromValue`, `FromRow` - typed scanning of result rows

mod connection;
mod driver;
mod error;
mod scan;
pub mod transaction;
mod types;


pub use connection::*;
pub use driver::*;
pub use error::*;
pub use scan::*;
pub use transaction::*;
pub use types::*;
