use std::sync::Arc;
use log::{debug, warn};

use crate::common::types::{PagePtr, TableId, Tuple, TransactionId};
use crate::storage::buffer::error::BufferPoolError;
use super::BufferPoolManager;
use super::frame_management::evict_page;

impl BufferPoolManager {
    /// Insert a tuple into `table_id` on behalf of `txn`.
    ///
    /// The table's page store decides where the tuple goes and fetches those
    /// pages through this pool; every page it reports as modified is marked
    /// dirty by `txn` and (re)installed in the cache. On success the tuple's
    /// record ID is set.
    pub fn insert_tuple(
        &self,
        txn: TransactionId,
        table_id: TableId,
        tuple: &mut Tuple,
    ) -> Result<(), BufferPoolError> {
        let store = self.page_store(table_id)?;
        let pages = store.insert_tuple(self, txn, tuple)?;
        self.install_dirty_pages(txn, pages)
    }

    /// Delete a stored tuple on behalf of `txn`
    pub fn delete_tuple(&self, txn: TransactionId, tuple: &Tuple) -> Result<(), BufferPoolError> {
        let record_id = tuple.record_id.ok_or_else(|| {
            BufferPoolError::InvalidOperation("Cannot delete a tuple without a record ID".to_string())
        })?;

        let store = self.page_store(record_id.page_id.table_id)?;
        let pages = store.delete_tuple(self, txn, tuple)?;
        self.install_dirty_pages(txn, pages)
    }

    /// Commit `txn`: flush its dirty pages, then release its locks
    pub fn transaction_commit(&self, txn: TransactionId) -> Result<(), BufferPoolError> {
        self.transaction_complete(txn, true)
    }

    /// End `txn`.
    ///
    /// On commit every page it dirtied is written to its store and marked
    /// clean. On abort every resident page it locked or dirtied is replaced by
    /// a fresh read from storage, which still holds the pre-transaction
    /// image because dirty pages are never flushed early. Either way all of
    /// `txn`'s locks are released, even if writing or re-reading fails.
    pub fn transaction_complete(&self, txn: TransactionId, commit: bool) -> Result<(), BufferPoolError> {
        let result = if commit {
            self.flush_pages(txn)
        } else {
            self.rollback_pages(txn)
        };

        self.lock_manager.release_all(txn);
        debug!("{} {}", txn, if commit { "committed" } else { "aborted" });

        result
    }

    // Every page is attempted even after a failure. A page that cannot be
    // re-read is dropped from the cache so its uncommitted bytes are never
    // served again; the first error is returned.
    fn rollback_pages(&self, txn: TransactionId) -> Result<(), BufferPoolError> {
        let held = self.lock_manager.held_pages(txn);
        let entries = self.page_table.lock().entries();
        let mut first_error = None;

        for (page_id, page) in entries {
            let dirtied_by_txn = page.read().dirtied_by() == Some(txn);
            if !held.contains(&page_id) && !dirtied_by_txn {
                continue;
            }

            let fresh = self
                .page_store(page_id.table_id)
                .and_then(|store| store.read_page(page_id));

            let mut guard = page.write();
            match fresh {
                Ok(fresh) => {
                    *guard = fresh;
                    self.page_table.lock().set_dirty(page_id, false);
                    debug!("Rolled back page {} for {}", page_id, txn);
                }
                Err(err) => {
                    guard.mark_dirty(None);
                    self.page_table.lock().remove(page_id);
                    warn!("Dropped page {} after failed rollback of {}: {}", page_id, txn, err);
                    first_error.get_or_insert(err);
                }
            }
        }

        first_error.map_or(Ok(()), Err)
    }

    /// Mark `pages` dirty by `txn` and install them in the cache,
    /// overwriting any cached copy
    pub(crate) fn install_dirty_pages(
        &self,
        txn: TransactionId,
        pages: Vec<PagePtr>,
    ) -> Result<(), BufferPoolError> {
        for page in pages {
            let mut guard = page.write();
            guard.mark_dirty(Some(txn));
            let page_id = guard.id;

            let mut page_table = self.page_table.lock();
            if !page_table.contains(page_id) {
                evict_page(&mut page_table)?;
            }
            page_table.insert(page_id, Arc::clone(&page), true);
        }

        Ok(())
    }
}
