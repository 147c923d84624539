// Buffer pool manager
//
// Bounded cache of pages shared by all transactions. Every page access first
// takes a page lock through the lock manager; pages are loaded from their
// table's page store on a miss. Dirty pages are never evicted (NO-STEAL), so
// aborting a transaction only needs to re-read its pages from storage.

mod basic_operations;
mod frame_management;
mod transactions;

use std::sync::Arc;
use parking_lot::Mutex;

use crate::catalog::Catalog;
use crate::common::config::BufferPoolConfig;
use crate::common::types::{PageId, TableId};
use crate::storage::buffer::error::BufferPoolError;
use crate::storage::buffer::replacer::LruPageTable;
use crate::storage::store::PageStore;
use crate::transaction::concurrency::LockManager;

pub struct BufferPoolManager {
    pub(crate) config: BufferPoolConfig,
    pub(crate) page_table: Mutex<LruPageTable>,
    pub(crate) lock_manager: LockManager,
    pub(crate) catalog: Arc<Catalog>,
}

impl BufferPoolManager {
    pub fn new(config: BufferPoolConfig, catalog: Arc<Catalog>) -> Result<Self, BufferPoolError> {
        if config.pool_size == 0 {
            return Err(BufferPoolError::InvalidOperation(
                "Buffer pool must hold at least one page".to_string(),
            ));
        }

        Ok(Self {
            page_table: Mutex::new(LruPageTable::new(config.pool_size)),
            lock_manager: LockManager::new(config.lock_wait_interval),
            catalog,
            config,
        })
    }

    /// Create a buffer pool with default settings and `pool_size` pages
    pub fn with_pool_size(pool_size: usize, catalog: Arc<Catalog>) -> Result<Self, BufferPoolError> {
        Self::new(BufferPoolConfig::with_pool_size(pool_size), catalog)
    }

    pub fn config(&self) -> &BufferPoolConfig {
        &self.config
    }

    pub fn pool_size(&self) -> usize {
        self.config.pool_size
    }

    pub fn page_size(&self) -> usize {
        self.config.page_size
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    pub fn lock_manager(&self) -> &LockManager {
        &self.lock_manager
    }

    /// Number of pages currently cached
    pub fn resident_page_count(&self) -> usize {
        self.page_table.lock().len()
    }

    pub fn is_resident(&self, page_id: PageId) -> bool {
        self.page_table.lock().contains(page_id)
    }

    /// Resolve the page store of a table through the catalog
    pub(crate) fn page_store(&self, table_id: TableId) -> Result<Arc<dyn PageStore>, BufferPoolError> {
        self.catalog
            .page_store(table_id)
            .ok_or(BufferPoolError::TableNotFound(table_id))
    }
}
