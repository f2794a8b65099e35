//! TDSQL Connection - the database handle and connection pooling
//!
//! [`Database`] is the entry point: open it with a driver name and a DSN,
//! then query, exec, prepare and begin transactions. Connections come from a
//! [`ConnectionPool`] sized by the DSN's `max_pool_size`.

mod database;
pub mod pool;


pub use database::{Database, Statement, Tx};
pub use pool::{ConnectionFactory, ConnectionPool, PoolConfig, PoolStats, PooledConnection};
