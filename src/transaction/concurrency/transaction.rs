// Transaction handle
//
// Drives one transaction against a shared buffer pool. Ending it (commit or
// abort) releases every page lock it holds; dropping an active handle aborts.

use std::sync::Arc;
use log::warn;
use thiserror::Error;

use crate::common::types::{PageId, PagePtr, Permissions, TableId, TransactionId, Tuple};
use crate::storage::buffer::{BufferPoolError, BufferPoolManager};

/// Transaction states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Active,
    Committed,
    Aborted,
}

/// Errors that can occur during transaction processing
#[derive(Error, Debug)]
pub enum TransactionError {
    #[error("Transaction {0} is already committed or aborted")]
    InvalidState(TransactionId),

    #[error(transparent)]
    BufferPool(#[from] BufferPoolError),
}

impl TransactionError {
    /// True when the transaction lost a deadlock and should be retried
    pub fn is_deadlock(&self) -> bool {
        matches!(self, TransactionError::BufferPool(err) if err.is_transaction_aborted())
    }
}

/// Result type for transaction operations
pub type Result<T> = std::result::Result<T, TransactionError>;

/// Transaction - an active unit of work on the buffer pool
pub struct Transaction {
    id: TransactionId,
    state: TransactionState,
    pool: Arc<BufferPoolManager>,
}

impl Transaction {
    /// Begin a transaction with a fresh ID
    pub fn begin(pool: Arc<BufferPoolManager>) -> Self {
        Self {
            id: TransactionId::new(),
            state: TransactionState::Active,
            pool,
        }
    }

    pub fn id(&self) -> TransactionId {
        self.id
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    pub fn fetch_page(&self, page_id: PageId, perm: Permissions) -> Result<PagePtr> {
        self.ensure_active()?;
        Ok(self.pool.fetch_page(self.id, page_id, perm)?)
    }

    pub fn mark_dirty(&self, page: &PagePtr) -> Result<()> {
        self.ensure_active()?;
        Ok(self.pool.mark_dirty(self.id, page)?)
    }

    pub fn insert_tuple(&self, table_id: TableId, tuple: &mut Tuple) -> Result<()> {
        self.ensure_active()?;
        Ok(self.pool.insert_tuple(self.id, table_id, tuple)?)
    }

    pub fn delete_tuple(&self, tuple: &Tuple) -> Result<()> {
        self.ensure_active()?;
        Ok(self.pool.delete_tuple(self.id, tuple)?)
    }

    /// Commit the transaction
    pub fn commit(&mut self) -> Result<()> {
        self.complete(true)
    }

    /// Abort the transaction, rolling back its cached pages
    pub fn abort(&mut self) -> Result<()> {
        self.complete(false)
    }

    fn complete(&mut self, commit: bool) -> Result<()> {
        self.ensure_active()?;

        // the transaction is over even if the pool reports an error
        self.state = if commit {
            TransactionState::Committed
        } else {
            TransactionState::Aborted
        };
        self.pool.transaction_complete(self.id, commit)?;

        Ok(())
    }

    fn ensure_active(&self) -> Result<()> {
        if self.state != TransactionState::Active {
            return Err(TransactionError::InvalidState(self.id));
        }
        Ok(())
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if self.state == TransactionState::Active {
            warn!("{} dropped while active, aborting", self.id);
            if let Err(err) = self.abort() {
                warn!("Failed to abort {}: {}", self.id, err);
            }
        }
    }
}
