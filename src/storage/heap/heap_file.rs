use std::path::Path;
use log::debug;

use crate::common::types::{
    Page, PageId, PageNo, PagePtr, Permissions, RecordId, TableId, TransactionId, Tuple,
};
use crate::storage::buffer::{BufferPoolError, BufferPoolManager};
use crate::storage::disk::DiskManager;
use crate::storage::page::PageManager;
use crate::storage::page::PageError;
use crate::storage::page::layout::{HEADER_SIZE, RECORD_OFFSET_SIZE};
use crate::storage::store::PageStore;

/// Unordered table of tuples stored in slotted pages of one file
pub struct HeapFile {
    table_id: TableId,
    disk_manager: DiskManager,
    page_manager: PageManager,
}

impl HeapFile {
    /// Open or create the heap file at `path`
    pub fn create(
        path: impl AsRef<Path>,
        table_id: TableId,
        page_size: usize,
    ) -> Result<Self, BufferPoolError> {
        if page_size <= HEADER_SIZE + RECORD_OFFSET_SIZE {
            return Err(BufferPoolError::InvalidOperation(format!(
                "Page size {} is too small for a heap page",
                page_size
            )));
        }

        Ok(Self {
            table_id,
            disk_manager: DiskManager::new(path, page_size)?,
            page_manager: PageManager::new(),
        })
    }

    pub fn page_size(&self) -> usize {
        self.disk_manager.page_size()
    }

    /// Append an empty, initialised page to the file
    pub fn allocate_page(&self) -> Result<PageId, BufferPoolError> {
        let mut data = vec![0u8; self.page_size()];
        self.page_manager.init_page(&mut data);
        let page_no = self.disk_manager.allocate_page(&data)?;
        debug!("Allocated page {} in table {}", page_no, self.table_id);
        Ok(self.page_id(page_no))
    }

    /// Read every live tuple under shared locks held by `txn`
    pub fn scan(&self, pool: &BufferPoolManager, txn: TransactionId) -> Result<Vec<Tuple>, BufferPoolError> {
        let mut tuples = Vec::new();

        for page_no in 0..self.page_count()? {
            let page_id = self.page_id(page_no);
            let page = pool.fetch_page(txn, page_id, Permissions::ReadOnly)?;
            let guard = page.read();

            for (slot, data) in self.page_manager.records(&guard.data) {
                tuples.push(Tuple {
                    record_id: Some(RecordId::new(page_id, slot)),
                    data,
                });
            }
        }

        Ok(tuples)
    }

    fn page_id(&self, page_no: PageNo) -> PageId {
        PageId::new(self.table_id, page_no)
    }

    fn check_table(&self, page_id: PageId) -> Result<(), BufferPoolError> {
        if page_id.table_id != self.table_id {
            return Err(BufferPoolError::InvalidOperation(format!(
                "Page {} does not belong to table {}",
                page_id, self.table_id
            )));
        }
        Ok(())
    }

    fn insert_into(&self, page: &PagePtr, tuple: &mut Tuple) -> Result<(), BufferPoolError> {
        let mut guard = page.write();
        let slot = self.page_manager.insert_record(&mut guard.data, &tuple.data)?;
        tuple.record_id = Some(RecordId::new(guard.id, slot));
        Ok(())
    }
}

impl PageStore for HeapFile {
    fn table_id(&self) -> TableId {
        self.table_id
    }

    fn read_page(&self, page_id: PageId) -> Result<Page, BufferPoolError> {
        self.check_table(page_id)?;
        let data = self.disk_manager.read_page(page_id.page_no)?;
        Ok(Page::new(page_id, data))
    }

    fn write_page(&self, page: &Page) -> Result<(), BufferPoolError> {
        self.check_table(page.id)?;
        self.disk_manager.write_page(page.id.page_no, &page.data)?;
        Ok(())
    }

    fn page_count(&self) -> Result<u32, BufferPoolError> {
        Ok(self.disk_manager.num_pages()?)
    }

    fn insert_tuple(
        &self,
        pool: &BufferPoolManager,
        txn: TransactionId,
        tuple: &mut Tuple,
    ) -> Result<Vec<PagePtr>, BufferPoolError> {
        let len = tuple.data.len();
        if len == 0 || len + RECORD_OFFSET_SIZE > self.page_size() - HEADER_SIZE {
            return Err(PageError::InsufficientSpace.into());
        }

        for page_no in 0..self.page_count()? {
            let page_id = self.page_id(page_no);
            let already_held = pool.holds_lock(txn, page_id);

            // probe with a shared lock; only a page with room is upgraded
            let page = pool.fetch_page(txn, page_id, Permissions::ReadOnly)?;
            let has_room = self.page_manager.has_room_for(&page.read().data, len);
            if !has_room {
                if !already_held {
                    pool.release_page(txn, page_id);
                }
                continue;
            }

            let page = pool.fetch_page(txn, page_id, Permissions::ReadWrite)?;
            self.insert_into(&page, tuple)?;
            return Ok(vec![page]);
        }

        let page_id = self.allocate_page()?;
        let page = pool.fetch_page(txn, page_id, Permissions::ReadWrite)?;
        self.insert_into(&page, tuple)?;
        Ok(vec![page])
    }

    fn delete_tuple(
        &self,
        pool: &BufferPoolManager,
        txn: TransactionId,
        tuple: &Tuple,
    ) -> Result<Vec<PagePtr>, BufferPoolError> {
        let record_id = tuple.record_id.ok_or_else(|| {
            BufferPoolError::InvalidOperation("Cannot delete a tuple without a record ID".to_string())
        })?;
        self.check_table(record_id.page_id)?;

        let page = pool.fetch_page(txn, record_id.page_id, Permissions::ReadWrite)?;
        self.page_manager.delete_record(&mut page.write().data, record_id.slot)?;
        Ok(vec![page])
    }
}
