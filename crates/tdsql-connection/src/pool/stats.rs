//! Pool statistics types

use serde::{Deserialize, Serialize};

/// Snapshot of a connection pool's state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStats {
    /// Open connections (idle + active)
    total: usize,
    /// Connections sitting in the pool
    idle: usize,
    /// Connections checked out
    active: usize,
    /// Requests waiting for a connection
    waiting: usize,
    /// Configured maximum
    max_size: usize,
}

impl PoolStats {
    pub fn new(idle: usize, active: usize, waiting: usize, max_size: usize) -> Self {
        Self {
            total: idle + active,
            idle,
            active,
            waiting,
            max_size,
        }
    }

    /// Get the total number of open connections
    pub fn total(&self) -> usize {
        self.total
    }

    /// Get the number of idle connections
    pub fn idle(&self) -> usize {
        self.idle
    }

    /// Get the number of active (checked out) connections
    pub fn active(&self) -> usize {
        self.active
    }

    /// Get the number of waiting requests
    pub fn waiting(&self) -> usize {
        self.waiting
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Connections that can still be checked out without waiting
    pub fn available(&self) -> usize {
        self.max_size.saturating_sub(self.active)
    }

    /// Share of the maximum currently checked out (0.0 to 1.0)
    pub fn utilization(&self) -> f64 {
        if self.max_size == 0 {
            0.0
        } else {
            self.active as f64 / self.max_size as f64
        }
    }

    /// Check if every allowed connection is checked out
    pub fn is_exhausted(&self) -> bool {
        self.max_size > 0 && self.active >= self.max_size
    }
}

impl Default for PoolStats {
    fn default() -> Self {
        Self::new(0, 0, 0, 0)
    }
}
