//! Buffer pool configuration.

use crate::error::{DbError, DbResult};
use std::time::Duration;

/// Default number of pages cached by a buffer pool.
pub const DEFAULT_PAGES: usize = 50;

/// Default size of a page in bytes, header included.
pub const DEFAULT_PAGE_SIZE: usize = 4096;

/// Default time a transaction waits for a page lock before it is aborted.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_millis(1000);

/// Tunables for a [`BufferPool`](crate::storage::BufferPool).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferPoolConfig {
    /// Maximum number of pages held in memory.
    pub num_pages: usize,
    /// Bytes per page on disk and in memory.
    pub page_size: usize,
    /// Lock wait budget for `get_page`.
    pub lock_timeout: Duration,
}

impl BufferPoolConfig {
    pub fn new(num_pages: usize) -> Self {
        Self {
            num_pages,
            ..Self::default()
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_lock_timeout(mut self, lock_timeout: Duration) -> Self {
        self.lock_timeout = lock_timeout;
        self
    }

    pub fn validate(&self) -> DbResult<()> {
        if self.num_pages == 0 {
            return Err(DbError::Catalog(
                "buffer pool must hold at least one page".to_string(),
            ));
        }
        if self.page_size < 64 {
            return Err(DbError::Catalog(format!(
                "page size {} is too small",
                self.page_size
            )));
        }
        Ok(())
    }
}

impl Default for BufferPoolConfig {
    fn default() -> Self {
        Self {
            num_pages: DEFAULT_PAGES,
            page_size: DEFAULT_PAGE_SIZE,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }
}
