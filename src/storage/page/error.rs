use thiserror::Error;

use crate::common::types::SlotId;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum PageError {
    #[error("Not enough space in page")]
    InsufficientSpace,
    #[error("Record in slot {0} not found")]
    RecordNotFound(SlotId),
    #[error("Invalid slot: {0}")]
    InvalidSlot(SlotId),
}
