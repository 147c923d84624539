use std::sync::Arc;
use log::debug;
use parking_lot::RwLock;

use crate::common::types::{PageId, PagePtr, Permissions, TransactionId};
use crate::storage::buffer::error::BufferPoolError;
use crate::storage::disk::DiskManagerError;
use crate::transaction::concurrency::{LockError, LockMode};
use super::BufferPoolManager;
use super::frame_management::evict_page;

impl BufferPoolManager {
    /// Fetch a page on behalf of `txn`.
    ///
    /// Blocks until the page lock for `perm` is granted. If waiting would
    /// close a cycle in the wait-for graph the call fails with
    /// `TransactionAborted`, and the caller must abort `txn`.
    pub fn fetch_page(
        &self,
        txn: TransactionId,
        page_id: PageId,
        perm: Permissions,
    ) -> Result<PagePtr, BufferPoolError> {
        self.lock_manager
            .acquire(page_id, txn, LockMode::from(perm))
            .map_err(|err| match err {
                LockError::Deadlock { txn, .. } => BufferPoolError::TransactionAborted(txn),
            })?;

        let mut page_table = self.page_table.lock();

        // Check if page is already in the buffer pool
        if let Some(page) = page_table.record_access(page_id) {
            return Ok(page);
        }

        // Page not in buffer pool, make room and read it from its store
        evict_page(&mut page_table)?;
        let store = self.page_store(page_id.table_id)?;
        let page = store.read_page(page_id)?;
        if page.data.len() != self.page_size() {
            return Err(DiskManagerError::PageSizeMismatch {
                expected: self.page_size(),
                actual: page.data.len(),
            }
            .into());
        }

        let page = Arc::new(RwLock::new(page));
        page_table.insert(page_id, Arc::clone(&page), false);
        debug!("Loaded page {} for {}", page_id, txn);

        Ok(page)
    }

    /// Does `txn` hold a lock on `page_id`?
    pub fn holds_lock(&self, txn: TransactionId, page_id: PageId) -> bool {
        self.lock_manager.holds(page_id, txn)
    }

    /// Release `txn`'s lock on a single page before the transaction ends.
    ///
    /// This breaks two-phase locking. Only call it for a page the
    /// transaction has read but neither modified nor based a decision on
    /// that must stay true, such as a full page skipped during an insert.
    pub fn release_page(&self, txn: TransactionId, page_id: PageId) {
        self.lock_manager.release(page_id, txn);
    }

    /// Mark a page `txn` modified in place as dirty and keep it cached
    pub fn mark_dirty(&self, txn: TransactionId, page: &PagePtr) -> Result<(), BufferPoolError> {
        let page_id = page.read().id;
        if self.lock_manager.lock_mode(page_id, txn) != Some(LockMode::Exclusive) {
            return Err(BufferPoolError::InvalidOperation(format!(
                "{} does not hold an exclusive lock on page {}",
                txn, page_id
            )));
        }

        self.install_dirty_pages(txn, vec![Arc::clone(page)])
    }

    /// Drop a page from the cache without writing it back
    pub fn discard_page(&self, page_id: PageId) {
        if self.page_table.lock().remove(page_id).is_some() {
            debug!("Discarded page {}", page_id);
        }
    }

    /// Write a resident page to its store if it is dirty
    pub fn flush_page(&self, page_id: PageId) -> Result<(), BufferPoolError> {
        let page = self
            .page_table
            .lock()
            .get(page_id)
            .ok_or(BufferPoolError::PageNotFound(page_id))?;

        self.write_back(&page, |_| true)
    }

    /// Write every dirty page to its store.
    ///
    /// This persists uncommitted changes and so breaks NO-STEAL recovery;
    /// use it only at shutdown or in tests.
    pub fn flush_all_pages(&self) -> Result<(), BufferPoolError> {
        let entries = self.page_table.lock().entries();
        for (_, page) in entries {
            self.write_back(&page, |_| true)?;
        }
        Ok(())
    }

    /// Write every page dirtied by `txn` to its store
    pub fn flush_pages(&self, txn: TransactionId) -> Result<(), BufferPoolError> {
        let entries = self.page_table.lock().entries();
        for (_, page) in entries {
            self.write_back(&page, |dirtied_by| dirtied_by == txn)?;
        }
        Ok(())
    }

    /// Write `page` back and mark it clean if it is dirty and `dirtied_by`
    /// accepts the transaction that dirtied it
    fn write_back(
        &self,
        page: &PagePtr,
        dirtied_by: impl Fn(TransactionId) -> bool,
    ) -> Result<(), BufferPoolError> {
        let mut guard = page.write();
        match guard.dirtied_by() {
            Some(owner) if dirtied_by(owner) => {
                let store = self.page_store(guard.id.table_id)?;
                store.write_page(&guard)?;
                guard.mark_dirty(None);
                self.page_table.lock().set_dirty(guard.id, false);
                debug!("Flushed page {} dirtied by {}", guard.id, owner);
                Ok(())
            }
            _ => Ok(()),
        }
    }
}
