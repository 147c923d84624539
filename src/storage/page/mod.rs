pub mod header;
pub mod manager;
pub mod error;
pub mod layout;

pub use manager::PageManager;
pub use error::PageError;
pub use header::PageHeader;
