//! Connection pool implementation

use std::collections::VecDeque;
use std::ops::Deref;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use async_trait::async_trait;
use parking_lot::Mutex;
use tdsql_core::{Connection, Result, TdsqlError};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use super::config::PoolConfig;
use super::stats::PoolStats;

/// Factory trait for creating new connections
#[async_trait]
pub trait ConnectionFactory: Send + Sync + 'static {
    /// Create a new connection
    async fn create(&self) -> Result<Arc<dyn Connection>>;

    /// Check that an idle connection is still usable
    ///
    /// Default implementation pings the server.
    async fn validate(&self, conn: &dyn Connection) -> bool {
        if conn.is_closed() {
            return false;
        }
        match conn.ping().await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(error = %e, "idle connection failed validation");
                false
            }
        }
    }
}

#[async_trait]
impl<T: ConnectionFactory> ConnectionFactory for Arc<T> {
    async fn create(&self) -> Result<Arc<dyn Connection>> {
        (**self).create().await
    }

    async fn validate(&self, conn: &dyn Connection) -> bool {
        (**self).validate(conn).await
    }
}

/// Idle connection with its lifecycle timestamps
struct IdleConnection {
    connection: Arc<dyn Connection>,
    created_at: Instant,
    idle_since: Instant,
}

/// A pool of driver connections
///
/// Connections are created lazily through the [`ConnectionFactory`] and
/// returned to the pool when the [`PooledConnection`] guard is dropped.
pub struct ConnectionPool {
    config: PoolConfig,
    factory: Arc<dyn ConnectionFactory>,
    idle: Mutex<VecDeque<IdleConnection>>,
    /// One permit per connection that may be checked out
    semaphore: Arc<Semaphore>,
    active_count: AtomicUsize,
    waiting_count: AtomicUsize,
}

impl ConnectionPool {
    /// Create a new connection pool with the given configuration and factory
    pub fn new<F: ConnectionFactory>(config: PoolConfig, factory: F) -> Self {
        let semaphore = Arc::new(Semaphore::new(config.max_size()));
        Self {
            config,
            factory: Arc::new(factory),
            idle: Mutex::new(VecDeque::new()),
            semaphore,
            active_count: AtomicUsize::new(0),
            waiting_count: AtomicUsize::new(0),
        }
    }

    /// Get a connection from the pool
    ///
    /// Reuses a valid idle connection when there is one and creates a new
    /// one otherwise. Waits at most the acquire timeout when every
    /// connection is checked out.
    pub async fn get(&self) -> Result<PooledConnection<'_>> {
        if self.semaphore.is_closed() {
            return Err(TdsqlError::ConnectionClosed);
        }

        self.waiting_count.fetch_add(1, Ordering::SeqCst);
        let result = tokio::time::timeout(self.config.acquire_timeout(), self.checkout()).await;
        self.waiting_count.fetch_sub(1, Ordering::SeqCst);

        match result {
            Ok(conn) => conn,
            Err(_) => Err(TdsqlError::Timeout(format!(
                "Timed out waiting for connection (timeout: {:?})",
                self.config.acquire_timeout()
            ))),
        }
    }

    async fn checkout(&self) -> Result<PooledConnection<'_>> {
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| TdsqlError::ConnectionClosed)?;

        let connection = match self.try_get_idle().await {
            Some(conn) => conn,
            None => {
                let conn = self.factory.create().await?;
                tracing::debug!(stats = ?self.stats(), "opened new pooled connection");
                (conn, Instant::now())
            }
        };

        self.active_count.fetch_add(1, Ordering::SeqCst);

        Ok(PooledConnection {
            connection: Some(connection.0),
            created_at: connection.1,
            pool: self,
            _permit: permit,
        })
    }

    /// Pop idle connections until one passes the lifetime, idle and
    /// validation checks
    ///
    /// Only connections idle for at least `validate_after_idle` are pinged.
    async fn try_get_idle(&self) -> Option<(Arc<dyn Connection>, Instant)> {
        loop {
            let candidate = { self.idle.lock().pop_front() }?;

            let expired = self
                .config
                .max_lifetime()
                .is_some_and(|max| candidate.created_at.elapsed() > max);
            let stale = candidate.idle_since.elapsed() > self.config.idle_timeout();

            if expired || stale || candidate.connection.is_closed() {
                tracing::debug!(expired, stale, "retiring pooled connection");
                let _ = candidate.connection.close().await;
                continue;
            }

            let needs_check = self.config.validate_idle()
                && candidate.idle_since.elapsed() >= self.config.validate_after_idle();
            if needs_check && !self.factory.validate(&*candidate.connection).await {
                let _ = candidate.connection.close().await;
                continue;
            }

            return Some((candidate.connection, candidate.created_at));
        }
    }

    fn return_connection(&self, connection: Arc<dyn Connection>, created_at: Instant) {
        self.active_count.fetch_sub(1, Ordering::SeqCst);

        if connection.is_closed() || self.semaphore.is_closed() {
            return;
        }

        self.idle.lock().push_back(IdleConnection {
            connection,
            created_at,
            idle_since: Instant::now(),
        });
    }

    /// Open connections until `min_size` are idle
    pub async fn warm_up(&self) -> Result<()> {
        loop {
            let open = self.idle.lock().len() + self.active_count.load(Ordering::SeqCst);
            if open >= self.config.min_size() {
                break;
            }
            let connection = self.factory.create().await?;
            let now = Instant::now();
            self.idle.lock().push_back(IdleConnection {
                connection,
                created_at: now,
                idle_since: now,
            });
        }
        Ok(())
    }

    /// Get current pool statistics
    pub fn stats(&self) -> PoolStats {
        PoolStats::new(
            self.idle.lock().len(),
            self.active_count.load(Ordering::SeqCst),
            self.waiting_count.load(Ordering::SeqCst),
            self.config.max_size(),
        )
    }

    /// Get the pool configuration
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Close all idle connections in the pool
    pub async fn close_idle(&self) {
        let connections: Vec<_> = { self.idle.lock().drain(..).collect() };

        for idle in connections {
            if let Err(e) = idle.connection.close().await {
                tracing::warn!(error = %e, "failed to close idle connection");
            }
        }
    }

    /// Refuse further checkouts and close idle connections
    ///
    /// Connections still checked out are closed when they come back.
    pub async fn close(&self) {
        self.semaphore.close();
        self.close_idle().await;
    }

    pub fn is_closed(&self) -> bool {
        self.semaphore.is_closed()
    }
}

/// A connection borrowed from the pool
///
/// When dropped, the connection is returned to the pool unless it has been
/// closed.
pub struct PooledConnection<'a> {
    connection: Option<Arc<dyn Connection>>,
    created_at: Instant,
    pool: &'a ConnectionPool,
    _permit: OwnedSemaphorePermit,
}

impl<'a> Deref for PooledConnection<'a> {
    type Target = dyn Connection;

    fn deref(&self) -> &Self::Target {
        self.inner().as_ref()
    }
}

impl<'a> Drop for PooledConnection<'a> {
    fn drop(&mut self) {
        if let Some(conn) = self.connection.take() {
            self.pool.return_connection(conn, self.created_at);
        }
    }
}

impl<'a> PooledConnection<'a> {
    /// Get the underlying connection as an Arc
    pub fn inner(&self) -> &Arc<dyn Connection> {
        self.connection.as_ref().expect("connection taken")
    }

    /// Close the connection so it is dropped instead of returned to the pool
    pub async fn discard(&self) {
        if let Err(e) = self.inner().close().await {
            tracing::warn!(error = %e, "failed to close discarded connection");
        }
    }
}
