use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use parking_lot::RwLock;
use serde::{Serialize, Deserialize};

/// Default page size in bytes (4KB)
pub const DEFAULT_PAGE_SIZE: usize = 4096;

/// Default number of pages held by the buffer pool
pub const DEFAULT_POOL_SIZE: usize = 50;

/// Table ID type
pub type TableId = u32;

/// Page number within a table file
pub type PageNo = u32;

/// Slot index within a page
pub type SlotId = u32;

/// Identifies one fixed-size page of one table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PageId {
    pub table_id: TableId,
    pub page_no: PageNo,
}

impl PageId {
    pub fn new(table_id: TableId, page_no: PageNo) -> Self {
        Self { table_id, page_no }
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.table_id, self.page_no)
    }
}

static NEXT_TXN_ID: AtomicU64 = AtomicU64::new(1);

/// Transaction ID, unique for the lifetime of the process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TransactionId(u64);

impl TransactionId {
    /// Allocate a fresh transaction ID
    pub fn new() -> Self {
        Self(NEXT_TXN_ID.fetch_add(1, Ordering::SeqCst))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for TransactionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "txn#{}", self.0)
    }
}

/// Access a caller needs on a page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Permissions {
    ReadOnly,
    ReadWrite,
}

/// Location of a tuple: page plus slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecordId {
    pub page_id: PageId,
    pub slot: SlotId,
}

impl RecordId {
    pub fn new(page_id: PageId, slot: SlotId) -> Self {
        Self { page_id, slot }
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.page_id, self.slot)
    }
}

/// An opaque row payload. `record_id` is set once the tuple is stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tuple {
    pub record_id: Option<RecordId>,
    pub data: Vec<u8>,
}

impl Tuple {
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self {
            record_id: None,
            data: data.into(),
        }
    }
}

/// In-memory copy of one page
///
/// A page is dirty exactly when it records the transaction that dirtied it,
/// so the two can never disagree.
#[derive(Debug, Clone)]
pub struct Page {
    pub id: PageId,
    pub data: Vec<u8>,
    dirtied_by: Option<TransactionId>,
}

impl Page {
    pub fn new(id: PageId, data: Vec<u8>) -> Self {
        Self {
            id,
            data,
            dirtied_by: None,
        }
    }

    /// Zero-filled page of the given size
    pub fn empty(id: PageId, page_size: usize) -> Self {
        Self::new(id, vec![0; page_size])
    }

    pub fn is_dirty(&self) -> bool {
        self.dirtied_by.is_some()
    }

    pub fn dirtied_by(&self) -> Option<TransactionId> {
        self.dirtied_by
    }

    /// Mark dirty on behalf of `txn`, or clean when `txn` is `None`
    pub fn mark_dirty(&mut self, txn: Option<TransactionId>) {
        self.dirtied_by = txn;
    }
}

/// Shared handle to a cached page
pub type PagePtr = Arc<RwLock<Page>>;
