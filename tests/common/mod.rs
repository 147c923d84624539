#![allow(dead_code)]

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use anyhow::Result;
use parking_lot::Mutex;
use tempfile::TempDir;

use bayuncore::storage::disk::DiskManagerError;
use bayuncore::{
    BufferPoolConfig, BufferPoolError, BufferPoolManager, Catalog, HeapFile, Page, PageId,
    PagePtr, PageStore, TableId, TransactionId, Tuple,
};

pub const TABLE_ID: TableId = 1;
pub const PAGE_SIZE: usize = 256;

/// Buffer pool over one heap file in a temporary directory
pub struct TestDb {
    pub pool: Arc<BufferPoolManager>,
    pub heap: Arc<HeapFile>,
    pub catalog: Arc<Catalog>,
    pub dir: TempDir,
}

pub fn test_config(pool_size: usize) -> BufferPoolConfig {
    BufferPoolConfig {
        pool_size,
        page_size: PAGE_SIZE,
        lock_wait_interval: Duration::from_millis(10),
    }
}

// Create a buffer pool over a heap file holding `num_pages` empty pages
pub fn create_test_db(pool_size: usize, num_pages: u32) -> Result<TestDb> {
    let dir = TempDir::new()?;
    let heap = Arc::new(HeapFile::create(dir.path().join("table.dat"), TABLE_ID, PAGE_SIZE)?);
    for _ in 0..num_pages {
        heap.allocate_page()?;
    }

    let catalog = Arc::new(Catalog::new());
    catalog.add_table(heap.clone());
    let pool = Arc::new(BufferPoolManager::new(test_config(pool_size), catalog.clone())?);

    Ok(TestDb { pool, heap, catalog, dir })
}

// Open a second, cold buffer pool over the same table file
pub fn reopen(db: &TestDb, pool_size: usize) -> Result<(Arc<BufferPoolManager>, Arc<HeapFile>)> {
    let heap = Arc::new(HeapFile::create(db.dir.path().join("table.dat"), TABLE_ID, PAGE_SIZE)?);
    let catalog = Arc::new(Catalog::new());
    catalog.add_table(heap.clone());
    let pool = Arc::new(BufferPoolManager::new(test_config(pool_size), catalog)?);
    Ok((pool, heap))
}

pub fn page(no: u32) -> PageId {
    PageId::new(TABLE_ID, no)
}

// Overwrite bytes past the heap page header
pub fn scribble(page: &PagePtr, bytes: &[u8]) {
    let mut guard = page.write();
    guard.data[100..100 + bytes.len()].copy_from_slice(bytes);
}

pub fn scribbled(page: &PagePtr, len: usize) -> Vec<u8> {
    page.read().data[100..100 + len].to_vec()
}

// Poll until `condition` holds, failing the test after two seconds
pub fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..2000 {
        if condition() {
            return;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
    panic!("condition not reached in time");
}

/// In-memory page store with injectable I/O failures
pub struct MemoryStore {
    table_id: TableId,
    pages: Mutex<Vec<Vec<u8>>>,
    pub fail_reads: AtomicBool,
    pub fail_writes: AtomicBool,
    pub writes: AtomicUsize,
}

impl MemoryStore {
    pub fn new(table_id: TableId, num_pages: usize) -> Self {
        Self {
            table_id,
            pages: Mutex::new(vec![vec![0u8; PAGE_SIZE]; num_pages]),
            fail_reads: AtomicBool::new(false),
            fail_writes: AtomicBool::new(false),
            writes: AtomicUsize::new(0),
        }
    }

    pub fn stored(&self, page_no: u32) -> Vec<u8> {
        self.pages.lock()[page_no as usize].clone()
    }

    fn injected() -> BufferPoolError {
        DiskManagerError::IoError(io::Error::new(io::ErrorKind::Other, "injected failure")).into()
    }
}

impl PageStore for MemoryStore {
    fn table_id(&self) -> TableId {
        self.table_id
    }

    fn read_page(&self, page_id: PageId) -> Result<Page, BufferPoolError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(Self::injected());
        }
        let data = self
            .pages
            .lock()
            .get(page_id.page_no as usize)
            .cloned()
            .ok_or(BufferPoolError::PageNotFound(page_id))?;
        Ok(Page::new(page_id, data))
    }

    fn write_page(&self, page: &Page) -> Result<(), BufferPoolError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Self::injected());
        }
        self.pages.lock()[page.id.page_no as usize] = page.data.clone();
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn page_count(&self) -> Result<u32, BufferPoolError> {
        Ok(self.pages.lock().len() as u32)
    }

    fn insert_tuple(
        &self,
        _pool: &BufferPoolManager,
        _txn: TransactionId,
        _tuple: &mut Tuple,
    ) -> Result<Vec<PagePtr>, BufferPoolError> {
        Err(BufferPoolError::InvalidOperation("memory store holds raw pages".to_string()))
    }

    fn delete_tuple(
        &self,
        _pool: &BufferPoolManager,
        _txn: TransactionId,
        _tuple: &Tuple,
    ) -> Result<Vec<PagePtr>, BufferPoolError> {
        Err(BufferPoolError::InvalidOperation("memory store holds raw pages".to_string()))
    }
}

// Create a buffer pool over a single in-memory store
pub fn create_memory_db(
    pool_size: usize,
    table_id: TableId,
    num_pages: usize,
) -> Result<(Arc<BufferPoolManager>, Arc<MemoryStore>)> {
    let store = Arc::new(MemoryStore::new(table_id, num_pages));
    let catalog = Arc::new(Catalog::new());
    catalog.add_table(store.clone());
    let pool = Arc::new(BufferPoolManager::new(test_config(pool_size), catalog)?);
    Ok((pool, store))
}
