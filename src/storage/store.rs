use crate::common::types::{Page, PageId, PagePtr, TableId, Tuple, TransactionId};
use crate::storage::buffer::{BufferPoolError, BufferPoolManager};

/// Per-table page storage consumed by the buffer pool.
///
/// The buffer pool never interprets page bytes; it only moves whole pages
/// between memory and the store. Tuple mutations are delegated here so the
/// table's own layout decides which pages change. Implementations fetch the
/// pages they touch through `pool`, so they are locked like any other access.
pub trait PageStore: Send + Sync {
    /// Table this store backs
    fn table_id(&self) -> TableId;

    /// Read a page fresh from storage. The result is clean.
    fn read_page(&self, page_id: PageId) -> Result<Page, BufferPoolError>;

    /// Write a page back to storage
    fn write_page(&self, page: &Page) -> Result<(), BufferPoolError>;

    /// Number of pages currently in storage
    fn page_count(&self) -> Result<u32, BufferPoolError>;

    /// Insert `tuple` on behalf of `txn`, setting its record ID.
    /// Returns every page the insert modified.
    fn insert_tuple(
        &self,
        pool: &BufferPoolManager,
        txn: TransactionId,
        tuple: &mut Tuple,
    ) -> Result<Vec<PagePtr>, BufferPoolError>;

    /// Delete `tuple` on behalf of `txn`.
    /// Returns every page the delete modified.
    fn delete_tuple(
        &self,
        pool: &BufferPoolManager,
        txn: TransactionId,
        tuple: &Tuple,
    ) -> Result<Vec<PagePtr>, BufferPoolError>;
}
