//! Pool configuration types

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tdsql_core::{ConnectionConfig, Result, TdsqlError};

/// Configuration for a connection pool
///
/// Controls pool sizing, timeouts, and connection lifecycle. Can be
/// deserialized from TOML or JSON; missing fields take the defaults listed
/// on [`PoolConfig::default`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "PoolConfigFile")]
pub struct PoolConfig {
    /// Connections opened eagerly by `warm_up`
    min_size: usize,
    /// Maximum number of connections open at once
    max_size: usize,
    /// Timeout in milliseconds when acquiring a connection from the pool
    acquire_timeout_ms: u64,
    /// Timeout in milliseconds before an idle connection is closed
    idle_timeout_ms: u64,
    /// Maximum lifetime of a connection in milliseconds before it's recycled
    max_lifetime_ms: Option<u64>,
    /// Ping idle connections before handing them out
    validate_idle: bool,
    /// Only ping connections that sat idle at least this long
    validate_after_idle_ms: u64,
}

/// Field-for-field mirror of [`PoolConfig`] so deserialized sizes go
/// through the same checks as [`PoolConfig::new`]
#[derive(Deserialize)]
#[serde(default)]
struct PoolConfigFile {
    min_size: usize,
    max_size: usize,
    acquire_timeout_ms: u64,
    idle_timeout_ms: u64,
    max_lifetime_ms: Option<u64>,
    validate_idle: bool,
    validate_after_idle_ms: u64,
}

impl Default for PoolConfigFile {
    fn default() -> Self {
        let d = PoolConfig::default();
        Self {
            min_size: d.min_size,
            max_size: d.max_size,
            acquire_timeout_ms: d.acquire_timeout_ms,
            idle_timeout_ms: d.idle_timeout_ms,
            max_lifetime_ms: d.max_lifetime_ms,
            validate_idle: d.validate_idle,
            validate_after_idle_ms: d.validate_after_idle_ms,
        }
    }
}

impl TryFrom<PoolConfigFile> for PoolConfig {
    type Error = TdsqlError;

    fn try_from(file: PoolConfigFile) -> Result<Self> {
        check_sizes(file.min_size, file.max_size)?;
        Ok(Self {
            min_size: file.min_size,
            max_size: file.max_size,
            acquire_timeout_ms: file.acquire_timeout_ms,
            idle_timeout_ms: file.idle_timeout_ms,
            max_lifetime_ms: file.max_lifetime_ms,
            validate_idle: file.validate_idle,
            validate_after_idle_ms: file.validate_after_idle_ms,
        })
    }
}

fn check_sizes(min_size: usize, max_size: usize) -> Result<()> {
    if max_size == 0 {
        return Err(TdsqlError::Configuration(
            "max pool size must be greater than 0".into(),
        ));
    }
    if min_size > max_size {
        return Err(TdsqlError::Configuration(format!(
            "min pool size ({}) cannot exceed max pool size ({})",
            min_size, max_size
        )));
    }
    Ok(())
}

impl PoolConfig {
    /// Create a new pool configuration with the given min and max sizes
    ///
    /// Fails if `max_size` is 0 or `min_size > max_size`.
    pub fn new(min_size: usize, max_size: usize) -> Result<Self> {
        check_sizes(min_size, max_size)?;
        Ok(Self {
            min_size,
            max_size,
            ..Self::default()
        })
    }

    /// Defaults adjusted by the `max_pool_size` connection parameter
    ///
    /// The minimum size is lowered when it would exceed the maximum.
    pub fn from_connection_config(config: &ConnectionConfig) -> Result<Self> {
        let defaults = Self::default();
        match config.get_u64("max_pool_size")? {
            Some(max) => {
                let max = usize::try_from(max).map_err(|_| {
                    TdsqlError::Configuration(format!("max_pool_size too large: {}", max))
                })?;
                Self::new(defaults.min_size.min(max), max)
            }
            None => Ok(defaults),
        }
    }

    /// Set the acquire timeout in milliseconds
    pub fn with_acquire_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.acquire_timeout_ms = timeout_ms;
        self
    }

    /// Set the idle timeout in milliseconds
    pub fn with_idle_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.idle_timeout_ms = timeout_ms;
        self
    }

    /// Set the maximum connection lifetime in milliseconds
    pub fn with_max_lifetime_ms(mut self, lifetime_ms: u64) -> Self {
        self.max_lifetime_ms = Some(lifetime_ms);
        self
    }

    /// Enable or disable pinging idle connections before reuse
    pub fn with_validate_idle(mut self, validate: bool) -> Self {
        self.validate_idle = validate;
        self
    }

    /// Set how long a connection must sit idle before it is pinged on checkout
    pub fn with_validate_after_idle_ms(mut self, idle_ms: u64) -> Self {
        self.validate_after_idle_ms = idle_ms;
        self
    }

    /// Get the minimum pool size
    pub fn min_size(&self) -> usize {
        self.min_size
    }

    /// Get the maximum pool size
    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Get the acquire timeout as a Duration
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }

    /// Get the idle timeout as a Duration
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }

    /// Get the maximum lifetime as a Duration if set
    pub fn max_lifetime(&self) -> Option<Duration> {
        self.max_lifetime_ms.map(Duration::from_millis)
    }

    pub fn validate_idle(&self) -> bool {
        self.validate_idle
    }

    /// Idle time after which a checkout pings the connection first
    pub fn validate_after_idle(&self) -> Duration {
        Duration::from_millis(self.validate_after_idle_ms)
    }
}

impl Default for PoolConfig {
    /// Defaults:
    /// - min_size: 0
    /// - max_size: 10
    /// - acquire_timeout: 30 seconds
    /// - idle_timeout: 10 minutes
    /// - max_lifetime: None
    /// - validate_idle: true
    /// - validate_after_idle: 5 seconds
    fn default() -> Self {
        Self {
            min_size: 0,
            max_size: 10,
            acquire_timeout_ms: 30_000,
            idle_timeout_ms: 600_000,
            max_lifetime_ms: None,
            validate_idle: true,
            validate_after_idle_ms: 5_000,
        }
    }
}
