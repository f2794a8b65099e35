//! Connection pooling for database connections
//!
//! A [`Database`](crate::Database) keeps one [`ConnectionPool`] of driver
//! connections. The pool bounds how many connections are open at once,
//! hands idle ones back out after validating them, and retires connections
//! that are closed, idle too long or past their maximum lifetime.
//!
//! # Example
//!
//! ```ignore
//! use tdsql_connection::pool::{ConnectionPool, PoolConfig};
//!
//! let config = PoolConfig::new(1, 20)?
//!     .with_acquire_timeout_ms(5000)
//!     .with_idle_timeout_ms(300000);
//!
//! let pool = ConnectionPool::new(config, connection_factory);
//! let conn = pool.get().await?;
//! conn.execute("DELETE FROM test_tran", &[]).await?;
//! // Connection returned to pool on drop
//! ```

mod config;
mod pool;
mod stats;


pub use config::PoolConfig;
pub use pool::{ConnectionFactory, ConnectionPool, PooledConnection};
pub use stats::PoolStats;
