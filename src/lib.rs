// Bayun transactional storage core
//
// Buffer pool, page-level two-phase locking and deadlock detection.

pub mod catalog;
pub mod common;
pub mod storage;
pub mod transaction;

// Re-export key items for convenient access
pub use catalog::Catalog;
pub use common::config::BufferPoolConfig;
pub use common::types::{Page, PageId, PagePtr, Permissions, RecordId, TableId, TransactionId, Tuple};
pub use storage::buffer::BufferPoolManager;
pub use storage::buffer::BufferPoolError;
pub use storage::heap::HeapFile;
pub use storage::store::PageStore;
pub use transaction::{LockManager, LockMode, Transaction, TransactionError, TransactionState};
