// Transaction concurrency module exports

pub mod deadlock;
pub mod lock_manager;
pub mod transaction;

// Public exports
pub use deadlock::WaitForGraph;
pub use lock_manager::{LockError, LockGrant, LockManager, LockMode, LockRecord};
pub use transaction::{Transaction, TransactionError, TransactionState};
