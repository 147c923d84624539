use std::time::Duration;
use serde::{Serialize, Deserialize};

use crate::common::types::{DEFAULT_PAGE_SIZE, DEFAULT_POOL_SIZE};

/// Configuration for the buffer pool manager
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BufferPoolConfig {
    /// Maximum number of resident pages
    pub pool_size: usize,

    /// Size of every page in bytes. Pages read from a store of a different
    /// size are rejected.
    pub page_size: usize,

    /// Longest a blocked lock request sleeps before re-checking the lock
    /// table and the wait-for graph
    pub lock_wait_interval: Duration,
}

impl Default for BufferPoolConfig {
    fn default() -> Self {
        Self {
            pool_size: DEFAULT_POOL_SIZE,
            page_size: DEFAULT_PAGE_SIZE,
            lock_wait_interval: Duration::from_millis(20),
        }
    }
}

impl BufferPoolConfig {
    pub fn with_pool_size(pool_size: usize) -> Self {
        Self {
            pool_size,
            ..Self::default()
        }
    }
}
