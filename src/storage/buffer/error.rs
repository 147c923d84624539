use thiserror::Error;
use crate::common::types::{PageId, TableId, TransactionId};
use crate::storage::disk::DiskManagerError;
use crate::storage::page::PageError;

#[derive(Error, Debug)]
pub enum BufferPoolError {
    #[error("Transaction {0} aborted: deadlock detected")]
    TransactionAborted(TransactionId),
    #[error("Buffer pool is full: every resident page is dirty")]
    BufferPoolFull,
    #[error("Page {0} not found in buffer pool")]
    PageNotFound(PageId),
    #[error("Table {0} not found in catalog")]
    TableNotFound(TableId),
    #[error("Disk manager error: {0}")]
    DiskManagerError(#[from] DiskManagerError),
    #[error("Page error: {0}")]
    PageError(#[from] PageError),
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),
}

impl BufferPoolError {
    /// Deadlock victims may retry the whole transaction after rolling back
    pub fn is_transaction_aborted(&self) -> bool {
        matches!(self, BufferPoolError::TransactionAborted(_))
    }
}
