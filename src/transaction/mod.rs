// Transaction concurrency control: page locks, deadlock detection and the
// transaction handle

pub mod concurrency;

// Public exports
pub use concurrency::{LockManager, LockMode, Transaction, TransactionError, TransactionState};
